//! Pipeline metrics.
//!
//! Stages emit through the `metrics` facade unconditionally. A Prometheus
//! recorder is installed only when a snapshot file is requested; the batch job
//! exits too quickly to be scraped, so the rendered text is written to disk.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Installs an in-process Prometheus recorder. Returns None if one is already installed.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus recorder installed");
            Some(handle)
        }
        Err(e) => {
            warn!("Prometheus recorder install failed (possibly already installed): {}", e);
            None
        }
    }
}

pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, handle.render())?;
    info!("Wrote metrics snapshot to {}", path.display());
    Ok(())
}

pub fn record_stage_duration(stage: &'static str, secs: f64) {
    ::metrics::histogram!("interests_stage_duration_seconds", "stage" => stage).record(secs);
}

pub fn record_rows_flattened(rows: usize) {
    ::metrics::counter!("interests_rows_flattened_total").increment(rows as u64);
}

pub fn record_members_skipped(count: usize) {
    ::metrics::counter!("interests_members_skipped_total").increment(count as u64);
}

pub fn record_amounts_extracted(rows: usize) {
    ::metrics::counter!("interests_amounts_extracted_total").increment(rows as u64);
}

pub fn record_multiple_fullstop_rows(rows: usize) {
    ::metrics::counter!("interests_multiple_fullstop_rows_total").increment(rows as u64);
}

pub fn record_rows_persisted(rows: usize) {
    ::metrics::counter!("interests_rows_persisted_total").increment(rows as u64);
}

pub fn record_persist_errors(count: usize) {
    ::metrics::counter!("interests_persist_errors_total").increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_contains_recorded_counters() {
        let handle = init_metrics().expect("recorder installs once per test binary");
        record_rows_flattened(7);
        record_stage_duration("flatten", 0.25);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("metrics.prom");
        write_snapshot(&handle, &path).unwrap();

        let rendered = fs::read_to_string(&path).unwrap();
        assert!(rendered.contains("interests_rows_flattened_total"), "{}", rendered);
        assert!(rendered.contains("interests_stage_duration_seconds"), "{}", rendered);
    }
}
