use std::collections::HashMap;

use crate::domain::{Member, PersistedInterest};
use crate::error::Result;

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Outcome of an all-or-nothing multi-batch insert
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchInsertReport {
    /// Records committed; zero whenever any batch failed
    pub inserted: usize,
    pub committed: bool,
    /// One message per failed batch plus the rollback notice
    pub errors: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertCounts {
    pub added: usize,
    pub updated: usize,
}

/// Storage contract for the member directory and registered interests
pub trait InterestStore {
    /// Snapshot of every member keyed by external id
    fn member_directory(&self) -> Result<HashMap<String, Member>>;

    fn find_member(&self, api_id: &str) -> Result<Option<Member>>;

    /// Inserts or updates members by external id, in one transaction
    fn upsert_members(&mut self, members: &[Member]) -> Result<UpsertCounts>;

    /// Writes every batch inside a single transaction.
    ///
    /// Each batch is attempted even after an earlier one failed so that all
    /// errors are reported, but any failure rolls the whole write back.
    fn insert_batches(&mut self, batches: &[&[PersistedInterest]]) -> Result<BatchInsertReport>;

    fn count_interests(&self) -> Result<usize>;

    fn list_interests(&self) -> Result<Vec<PersistedInterest>>;
}

pub(crate) const ROLLBACK_NOTICE: &str = "Errors occurred during bulk save, all batches rolled back.";

pub(crate) fn batch_error(batch_index: usize, batch_len: usize, error: &dyn std::fmt::Display) -> String {
    format!(
        "Batch {} ({} records) failed during bulk create: {}",
        batch_index + 1,
        batch_len,
        error
    )
}
