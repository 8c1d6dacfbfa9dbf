use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{InterestsError, Result};

/// Separator the Registered Interests fetch job writes between JSON objects
pub const OBJECT_SEPARATOR: &str = "\n\n\n";

/// Decoded contents of one Registered Interests dump
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Hex SHA-256 of the raw file, recorded with each run
    pub sha256: String,
    /// Per-member objects that carry a non-empty `value` array, in file order
    pub members: Vec<Value>,
    /// Objects dropped because they had no interests
    pub empty_objects: usize,
}

/// Reads the whole file, splits it on the triple-newline separator and decodes each object.
///
/// A missing file or any undecodable object aborts the run.
pub fn read_source_file(path: &Path) -> Result<SourceFile> {
    if !path.exists() {
        return Err(InterestsError::SourceNotFound(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path)?;
    let sha256 = hex::encode(Sha256::digest(contents.as_bytes()));

    let parsed = parse_source(&contents)?;
    info!(
        "📄 Read {} member objects from {} ({} without interests)",
        parsed.0.len(),
        path.display(),
        parsed.1
    );

    Ok(SourceFile {
        sha256,
        members: parsed.0,
        empty_objects: parsed.1,
    })
}

/// Returns the member objects with interests and the count of those without
pub fn parse_source(contents: &str) -> Result<(Vec<Value>, usize)> {
    let mut members = Vec::new();
    let mut empty = 0;

    for (index, segment) in contents
        .split(OBJECT_SEPARATOR)
        .filter(|s| !s.trim().is_empty())
        .enumerate()
    {
        let object: Value = serde_json::from_str(segment)?;
        if has_values(&object) {
            members.push(object);
        } else {
            debug!("Skipping object {} with no interest values", index);
            empty += 1;
        }
    }

    Ok((members, empty))
}

fn has_values(object: &Value) -> bool {
    match object.get("value") {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}
