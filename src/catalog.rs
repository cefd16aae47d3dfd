#![forbid(unsafe_code)]

//! Ordered catalog snapshots and the store that swaps them.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::VideoRecord;

/// Videos in server response order. Built in full before it is published,
/// never edited afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    records: Vec<VideoRecord>,
}

impl Catalog {
    pub fn new(records: Vec<VideoRecord>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[VideoRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VideoRecord> {
        self.records.iter()
    }

    /// Finds a record by its server-relative path.
    pub fn get(&self, url: &str) -> Option<&VideoRecord> {
        self.records.iter().find(|record| record.url() == url)
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a VideoRecord;
    type IntoIter = std::slice::Iter<'a, VideoRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Holds the catalog snapshot the presentation layer reads.
///
/// Readers clone the inner `Arc` and keep a consistent view for as long as
/// they like; writers replace the whole snapshot in one assignment, so nobody
/// observes a half-populated catalog.
#[derive(Debug)]
pub struct CatalogStore {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Catalog::empty())),
        }
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        self.current.read().clone()
    }

    /// Publishes `catalog` and returns the snapshot it superseded.
    pub fn replace(&self, catalog: Catalog) -> Arc<Catalog> {
        let next = Arc::new(catalog);
        std::mem::replace(&mut *self.current.write(), next)
    }
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}
