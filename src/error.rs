use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InterestsError {
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Error log write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid member links: {0}")]
    InvalidLinks(String),

    #[error("Flattening produced no interest rows; the source data is degenerate")]
    EmptyDataset,

    #[error("Input drift detected: {0}")]
    InputDrift(String),

    #[error(
        "Column mismatch: values could be written to the wrong fields.\nExpected columns: {expected:?}\nActual columns: {actual:?}"
    )]
    ColumnMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Column name collision: {0}")]
    ColumnCollision(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Join key not present in the dataset: {0}")]
    UnknownJoinKey(String),
}

pub type Result<T> = std::result::Result<T, InterestsError>;
