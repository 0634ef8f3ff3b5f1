//! File-backed collaborators for the CLI: a JSON fixture catalog as the entity store and a
//! JSON lines writer as the search engine.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::pipeline::{DocumentCreator, DocumentPublisher, EntityLookup};
use crate::types::{Document, IndexType, IndexableEntity, Uid};
use crate::utils::tools::lock;

/// One catalog record. `fail` makes every lookup touching it error out.
#[derive(Clone, Debug, Deserialize)]
pub struct FixtureRecord {
    pub uid: Uid,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub fail: bool,
}

impl IndexableEntity for FixtureRecord {
    fn uid(&self) -> Uid {
        self.uid
    }
}

#[derive(Debug, Default)]
pub struct FixtureCatalog {
    records: HashMap<Uid, FixtureRecord>,
}

impl FixtureCatalog {
    pub fn from_records(records: impl IntoIterator<Item = FixtureRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.uid, r)).collect(),
        }
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let records: Vec<FixtureRecord> = serde_json::from_str(s).context("parse fixture catalog")?;
        Ok(Self::from_records(records))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read fixture catalog {}", path.display()))?;
        Self::from_json(&s).with_context(|| path.display().to_string())
    }

    /// Every id in the catalog, ascending.
    pub fn uids(&self) -> Vec<Uid> {
        let mut uids: Vec<Uid> = self.records.keys().copied().collect();
        uids.sort_unstable();
        uids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl EntityLookup<FixtureRecord> for FixtureCatalog {
    fn find_by_ids(&self, index_type: IndexType, uids: &[Uid]) -> Result<Vec<FixtureRecord>> {
        let mut found = Vec::with_capacity(uids.len());
        for uid in uids {
            if let Some(record) = self.records.get(uid) {
                if record.fail {
                    bail!("{index_type} record {uid} is poisoned");
                }
                found.push(record.clone());
            }
        }
        Ok(found)
    }

    fn find_by_id(&self, index_type: IndexType, uid: Uid) -> Result<Option<FixtureRecord>> {
        match self.records.get(&uid) {
            Some(record) if record.fail => bail!("{index_type} record {uid} is poisoned"),
            found => Ok(found.cloned()),
        }
    }
}

/// Copies record fields into the document; arrays become multi-valued fields.
pub struct FixtureDocumentCreator;

fn field_values(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(field_values).collect(),
        other => vec![other.to_string()],
    }
}

impl DocumentCreator<FixtureRecord> for FixtureDocumentCreator {
    fn create_document(&self, index_type: IndexType, record: FixtureRecord) -> Result<Document> {
        let mut document = Document::new(index_type, record.uid);
        for (name, value) in &record.fields {
            if let Value::Object(_) = value {
                bail!("field '{name}' of record {} is an object", record.uid);
            }
            for v in field_values(value) {
                document.add_field(name.clone(), v);
            }
        }
        Ok(document)
    }
}

/// Writes each published document as one JSON line. Deletes and commits are written as
/// `{"op": ...}` lines.
pub struct JsonLinesPublisher {
    out: Mutex<Box<dyn Write + Send>>,
    published: AtomicU64,
}

impl JsonLinesPublisher {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            published: AtomicU64::new(0),
        }
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn write_line(&self, value: &impl serde::Serialize) -> Result<()> {
        let mut out = lock(&self.out);
        serde_json::to_writer(&mut *out, value).context("write json line")?;
        out.write_all(b"\n").context("write json line")?;
        Ok(())
    }
}

impl DocumentPublisher for JsonLinesPublisher {
    fn publish(&self, document: Document) -> Result<()> {
        self.write_line(&document)?;
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete(&self, index_type: IndexType, uid: Uid) -> Result<()> {
        self.write_line(&json!({ "op": "delete", "index_type": index_type, "uid": uid }))
    }

    fn delete_all(&self, index_type: IndexType) -> Result<()> {
        self.write_line(&json!({ "op": "delete_all", "index_type": index_type }))
    }

    fn commit(&self, index_type: IndexType) -> Result<()> {
        self.write_line(&json!({ "op": "commit", "index_type": index_type }))?;
        lock(&self.out).flush().context("flush documents")
    }
}
