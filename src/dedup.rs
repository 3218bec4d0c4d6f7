//! Dedup index over external comment ids.
//!
//! The authoritative check is the UNIQUE constraint behind
//! `Store::record_comment`; this index lets the pipeline skip classification
//! and generation for comments it has already recorded.

use crate::error::Result;
use crate::storage::Store;
use std::collections::HashSet;

pub struct DedupIndex<'a> {
    store: &'a dyn Store,
    seen: HashSet<String>,
}

impl<'a> DedupIndex<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            seen: HashSet::new(),
        }
    }

    /// Already processed, either in the store or earlier in this run
    pub fn exists(&self, external_id: &str) -> Result<bool> {
        if self.seen.contains(external_id) {
            return Ok(true);
        }
        self.store.comment_exists(external_id)
    }

    /// Remember an id handled in this run. Repeats within one fetched batch
    /// are then skipped even when no record was written for them.
    pub fn mark(&mut self, external_id: &str) {
        self.seen.insert(external_id.to_string());
    }
}
