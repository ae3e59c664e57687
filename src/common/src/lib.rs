pub mod config;

pub use config::{CompactionConfig, Configuration, DatabaseConfig, RetentionRule};
