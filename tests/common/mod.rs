#![allow(dead_code)]

use anyhow::{Result, bail};
use indexpipe::pipeline::{DocumentCreator, DocumentPublisher, EntityLookup};
use indexpipe::{Document, IndexType, IndexableEntity, Uid};
use std::collections::HashSet;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestEntity {
    pub uid: Uid,
    pub name: String,
}

impl IndexableEntity for TestEntity {
    fn uid(&self) -> Uid {
        self.uid
    }
}

/// Resolves every id in `present`. Any request touching a poisoned id fails.
#[derive(Default)]
pub struct TestLookup {
    pub present: HashSet<Uid>,
    pub poisoned: HashSet<Uid>,
    pub bulk_calls: Mutex<usize>,
}

impl TestLookup {
    pub fn with_ids(ids: impl IntoIterator<Item = Uid>) -> Self {
        Self {
            present: ids.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn poison(mut self, uid: Uid) -> Self {
        self.poisoned.insert(uid);
        self
    }

    fn entity(uid: Uid) -> TestEntity {
        TestEntity {
            uid,
            name: format!("entity-{uid}"),
        }
    }
}

impl EntityLookup<TestEntity> for TestLookup {
    fn find_by_ids(&self, _index_type: IndexType, uids: &[Uid]) -> Result<Vec<TestEntity>> {
        *self.bulk_calls.lock().unwrap() += 1;
        if let Some(uid) = uids.iter().find(|u| self.poisoned.contains(u)) {
            bail!("poisoned id {uid}");
        }
        Ok(uids
            .iter()
            .filter(|u| self.present.contains(u))
            .map(|&u| Self::entity(u))
            .collect())
    }

    fn find_by_id(&self, _index_type: IndexType, uid: Uid) -> Result<Option<TestEntity>> {
        if self.poisoned.contains(&uid) {
            bail!("poisoned id {uid}");
        }
        Ok(self.present.contains(&uid).then(|| Self::entity(uid)))
    }
}

/// Maps the entity name into a `name` field; fails for ids in `failing`, panics for ids in
/// `panicking`.
#[derive(Default)]
pub struct TestCreator {
    pub failing: HashSet<Uid>,
    pub panicking: HashSet<Uid>,
}

impl TestCreator {
    pub fn failing_on(uids: impl IntoIterator<Item = Uid>) -> Self {
        Self {
            failing: uids.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn panicking_on(uids: impl IntoIterator<Item = Uid>) -> Self {
        Self {
            panicking: uids.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl DocumentCreator<TestEntity> for TestCreator {
    fn create_document(&self, index_type: IndexType, entity: TestEntity) -> Result<Document> {
        if self.panicking.contains(&entity.uid) {
            panic!("mapper bug on entity {}", entity.uid);
        }
        if self.failing.contains(&entity.uid) {
            bail!("cannot map entity {}", entity.uid);
        }
        let mut document = Document::new(index_type, entity.uid);
        document.add_field("name", entity.name);
        Ok(document)
    }
}

/// Collects everything it is asked to do.
#[derive(Default)]
pub struct TestPublisher {
    pub failing: HashSet<Uid>,
    pub failing_commits: bool,
    pub delay: Option<Duration>,
    pub documents: Mutex<Vec<Document>>,
    pub deleted: Mutex<Vec<Uid>>,
    pub deleted_all: Mutex<Vec<IndexType>>,
    pub commits: Mutex<Vec<IndexType>>,
}

impl TestPublisher {
    pub fn failing_on(uids: impl IntoIterator<Item = Uid>) -> Self {
        Self {
            failing: uids.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn failing_commits() -> Self {
        Self {
            failing_commits: true,
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn published_uids(&self) -> Vec<Uid> {
        let mut uids: Vec<Uid> = self.documents.lock().unwrap().iter().map(|d| d.uid).collect();
        uids.sort_unstable();
        uids
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }
}

impl DocumentPublisher for TestPublisher {
    fn publish(&self, document: Document) -> Result<()> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.failing.contains(&document.uid) {
            bail!("engine rejected document {}", document.uid);
        }
        self.documents.lock().unwrap().push(document);
        Ok(())
    }

    fn delete(&self, _index_type: IndexType, uid: Uid) -> Result<()> {
        self.deleted.lock().unwrap().push(uid);
        Ok(())
    }

    fn delete_all(&self, index_type: IndexType) -> Result<()> {
        self.documents.lock().unwrap().clear();
        self.deleted_all.lock().unwrap().push(index_type);
        Ok(())
    }

    fn commit(&self, index_type: IndexType) -> Result<()> {
        if self.failing_commits {
            bail!("engine refused commit");
        }
        self.commits.lock().unwrap().push(index_type);
        Ok(())
    }
}
