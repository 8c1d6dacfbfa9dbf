use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

use crate::domain::PersistedInterest;
use crate::error::Result;
use crate::metrics;
use crate::storage::InterestStore;

pub const ERROR_LOG_HEADER: &str = "Error Message";

/// CSV file of the run's error messages, replaced on every run
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrites the file with a header row and one row per message
    pub fn write(&self, errors: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record([ERROR_LOG_HEADER])?;
        for message in errors {
            writer.write_record([message.as_str()])?;
        }
        writer.flush()?;
        info!("📝 Wrote {} error(s) to {}", errors.len(), self.path.display());
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PersistOutcome {
    /// Records committed by this run; zero when anything failed
    pub records_created: usize,
    /// Records excluded because their member is not in the directory
    pub unresolved_members: usize,
    pub batches: usize,
    pub errors: Vec<String>,
}

/// Resolves members, batches the records and writes them all-or-nothing
pub struct BulkPersister<'a, S: InterestStore> {
    store: &'a mut S,
    batch_size: usize,
}

impl<'a, S: InterestStore> BulkPersister<'a, S> {
    pub fn new(store: &'a mut S, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    #[instrument(skip(self, records), fields(records = records.len(), batch_size = self.batch_size))]
    pub fn persist(&mut self, records: Vec<PersistedInterest>) -> Result<PersistOutcome> {
        let mut outcome = PersistOutcome::default();

        // One read of the directory per run
        let directory = self.store.member_directory()?;
        let (resolved, unresolved): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|r| directory.contains_key(&r.member_of_parliament));

        for record in &unresolved {
            let message = format!(
                "Member {} not found in member directory; interest {} excluded",
                record.member_of_parliament, record.unique_api_generated_id
            );
            warn!("{}", message);
            outcome.errors.push(message);
        }
        outcome.unresolved_members = unresolved.len();

        if resolved.is_empty() {
            warn!("No records left to persist after member resolution");
            return Ok(outcome);
        }

        let batches: Vec<&[PersistedInterest]> = resolved.chunks(self.batch_size).collect();
        outcome.batches = batches.len();

        match self.store.insert_batches(&batches) {
            Ok(report) => {
                outcome.records_created = report.inserted;
                outcome.errors.extend(report.errors);
            }
            Err(e) => {
                let message = format!("Transaction failed during bulk save: {}", e);
                error!("{}", message);
                outcome.errors.push(message);
            }
        }

        if outcome.records_created > 0 {
            info!(
                "💾 Persisted {} records in {} batches",
                outcome.records_created, outcome.batches
            );
        } else {
            error!("Bulk save rolled back; no records persisted");
        }
        metrics::record_rows_persisted(outcome.records_created);
        metrics::record_persist_errors(outcome.errors.len());
        Ok(outcome)
    }
}
