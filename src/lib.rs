pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod members;
pub mod metrics;
pub mod pipeline;
pub mod storage;

// Row and record shapes shared across stages
pub mod domain;
pub mod types;
