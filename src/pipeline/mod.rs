// Extraction pipeline: source -> flatten -> normalize -> monetary -> entities -> schema -> persist

pub mod entities;
pub mod flatten;
pub mod monetary;
pub mod normalize;
pub mod persist;
pub mod schema;
pub mod source;
pub mod table;

use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::metrics;
use crate::storage::InterestStore;

pub use persist::{BulkPersister, ErrorLog, PersistOutcome};
pub use table::{Cell, InterestTable};

/// Summary of one import run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub source_sha256: String,
    pub members_read: usize,
    pub members_skipped: usize,
    pub rows_flattened: usize,
    pub rows_with_amounts: usize,
    pub multiple_fullstop_rows: usize,
    pub records_mapped: usize,
    pub records_created: usize,
    pub errors: Vec<String>,
}

/// The enriched table plus per-stage counts, before mapping and persistence
#[derive(Debug)]
pub struct Extraction {
    pub table: InterestTable,
    pub members_read: usize,
    pub members_skipped: usize,
    pub rows_with_amounts: usize,
    pub multiple_fullstop_rows: usize,
    pub errors: Vec<String>,
}

fn timed<T>(stage: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let started = Instant::now();
    let out = f();
    metrics::record_stage_duration(stage, started.elapsed().as_secs_f64());
    out
}

/// Runs the in-memory stages over decoded member objects
pub fn extract(members: &[Value], strict_abbreviations: bool) -> Result<Extraction> {
    let flattened = timed("flatten", || flatten::flatten_interests(members))?;
    metrics::record_rows_flattened(flattened.table.len());
    metrics::record_members_skipped(flattened.members_skipped);

    let mut table = flattened.table;
    timed("normalize", || normalize::normalize(&mut table, strict_abbreviations))?;
    let monetary = timed("monetary", || monetary::extract_monetary(&mut table))?;
    timed("entities", || entities::extract_entities(&mut table))?;

    Ok(Extraction {
        table,
        members_read: flattened.members_read,
        members_skipped: flattened.members_skipped,
        rows_with_amounts: monetary.rows_with_amounts,
        multiple_fullstop_rows: monetary.multiple_fullstop_rows,
        errors: flattened.errors,
    })
}

pub struct InterestsPipeline<'a, S: InterestStore> {
    store: &'a mut S,
    config: PipelineConfig,
}

impl<'a, S: InterestStore> InterestsPipeline<'a, S> {
    pub fn new(store: &'a mut S, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    /// Imports one Registered Interests dump and writes the run's error log.
    ///
    /// A fatal error still leaves an error log behind, holding the row-level
    /// messages gathered so far followed by the fatal one.
    pub fn run(&mut self, path: &Path) -> Result<PipelineResult> {
        let mut result = PipelineResult {
            run_id: Uuid::new_v4(),
            ..PipelineResult::default()
        };
        let span = info_span!("import", run_id = %result.run_id, source = %path.display());
        let _enter = span.enter();
        info!("🚀 Starting registered interests import");

        let error_log = ErrorLog::new(&self.config.error_file);
        let outcome = self.run_stages(path, &mut result);
        if let Err(e) = &outcome {
            error!("Import aborted: {}", e);
            result.errors.push(format!("Import aborted: {}", e));
        }
        error_log.write(&result.errors)?;
        outcome?;

        info!(
            "✅ Import finished: {} records created from {} rows, {} errors",
            result.records_created,
            result.rows_flattened,
            result.errors.len()
        );
        Ok(result)
    }

    fn run_stages(&mut self, path: &Path, result: &mut PipelineResult) -> Result<()> {
        let source = timed("source", || source::read_source_file(path))?;
        result.source_sha256 = source.sha256.clone();

        let extraction = match extract(&source.members, self.config.strict_abbreviations) {
            Ok(extraction) => extraction,
            Err(e) => {
                result.members_read = source.members.len();
                return Err(e);
            }
        };
        result.members_read = extraction.members_read;
        result.members_skipped = extraction.members_skipped;
        result.rows_flattened = extraction.table.len();
        result.rows_with_amounts = extraction.rows_with_amounts;
        result.multiple_fullstop_rows = extraction.multiple_fullstop_rows;
        result.errors.extend(extraction.errors);

        let mapped = timed("schema", || schema::map_interests(&extraction.table))?;
        result.records_mapped = mapped.records.len();

        let batch_size = self.config.batch_size;
        let store = &mut *self.store;
        let persisted = timed("persist", || BulkPersister::new(store, batch_size).persist(mapped.records))?;
        result.records_created = persisted.records_created;
        result.errors.extend(persisted.errors);
        Ok(())
    }
}
