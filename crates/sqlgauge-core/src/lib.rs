pub mod config;
pub mod database;
pub mod engine;
pub mod errors;
pub mod ingest;
pub mod metrics_api;
pub mod model;
pub mod oracle;
pub mod providers;
pub mod report;
