//! Public and internal types for the indexpipe API and pipeline.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Identifier of one domain entity (a database uid).
pub type Uid = u64;

/// Logical partition of the search index, tracked independently for status and statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Product,
    Category,
    Customer,
    Promotion,
    Sku,
}

impl IndexType {
    /// Every index type, in slot order. Per-type registries are sized from this.
    pub const ALL: [IndexType; 5] = [
        IndexType::Product,
        IndexType::Category,
        IndexType::Customer,
        IndexType::Promotion,
        IndexType::Sku,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Stable slot used by fixed-size per-type tables.
    pub fn slot(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            IndexType::Product => "product",
            IndexType::Category => "category",
            IndexType::Customer => "customer",
            IndexType::Promotion => "promotion",
            IndexType::Sku => "sku",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndexType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown index type: {s}"))
    }
}

/// The unit pushed into a pipeline: a deduplicated set of ids for one index type.
#[derive(Clone, Debug)]
pub struct IdentifierSet {
    pub index_type: IndexType,
    uids: Vec<Uid>,
}

impl IdentifierSet {
    /// Deduplicate `uids`. Order is not meaningful downstream; sorted for stable batching.
    pub fn new(index_type: IndexType, uids: impl IntoIterator<Item = Uid>) -> Self {
        let uids: BTreeSet<Uid> = uids.into_iter().collect();
        Self {
            index_type,
            uids: uids.into_iter().collect(),
        }
    }

    pub fn uids(&self) -> &[Uid] {
        &self.uids
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }
}

/// A bounded set of unique ids processed together by one loader invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub index_type: IndexType,
    pub uids: Vec<Uid>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }
}

/// Implemented by the domain objects a lookup service resolves.
pub trait IndexableEntity: Send + 'static {
    fn uid(&self) -> Uid;
}

/// One resolved entity on its way from the loader to the document creator.
#[derive(Debug)]
pub struct Loaded<E> {
    pub index_type: IndexType,
    pub entity: E,
}

/// Engine-agnostic representation of one entity: field name → values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub index_type: IndexType,
    pub uid: Uid,
    pub fields: BTreeMap<String, Vec<String>>,
}

impl Document {
    pub fn new(index_type: IndexType, uid: Uid) -> Self {
        Self {
            index_type,
            uid,
            fields: BTreeMap::new(),
        }
    }

    /// Append `value` to the field `name`. Multi-valued fields keep insertion order.
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(name.into()).or_default().push(value.into());
    }

    pub fn field(&self, name: &str) -> Option<&[String]> {
        self.fields.get(name).map(Vec::as_slice)
    }
}

/// Where a build currently stands, as recorded in the status store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    #[default]
    Missing,
    RebuildInProgress,
    Updating,
    Complete,
}

impl IndexState {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexState::Missing => "missing",
            IndexState::RebuildInProgress => "rebuild_in_progress",
            IndexState::Updating => "updating",
            IndexState::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "missing" => Some(IndexState::Missing),
            "rebuild_in_progress" => Some(IndexState::RebuildInProgress),
            "updating" => Some(IndexState::Updating),
            "complete" => Some(IndexState::Complete),
            _ => None,
        }
    }
}

/// Progress record for one index type, persisted by the build status updater.
///
/// `processed_records <= total_records` holds at every observation point; both are replaced
/// together when a build starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBuildStatus {
    pub index_type: IndexType,
    pub state: IndexState,
    pub total_records: u64,
    pub processed_records: u64,
    /// Build start, milliseconds since epoch.
    pub started_at_ms: i64,
    /// Last successful build completion, milliseconds since epoch.
    pub last_build_date_ms: Option<i64>,
}

impl IndexBuildStatus {
    pub fn new(index_type: IndexType) -> Self {
        Self {
            index_type,
            state: IndexState::Missing,
            total_records: 0,
            processed_records: 0,
            started_at_ms: 0,
            last_build_date_ms: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.processed_records >= self.total_records
    }
}
