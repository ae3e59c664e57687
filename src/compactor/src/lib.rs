//! Retention compaction engine for pageview snapshots.
//!
//! Snapshots are written at high resolution and progressively downsampled as
//! they age: each retention rule maps an age band to a minimum spacing
//! (cadence) between retained timestamps. The engine translates the rules
//! into day-aligned periods, asks a [`selector::TimePointSelector`] which
//! timestamps in each period fall off-cadence, and deletes those through a
//! [`store::SnapshotStore`] in bounded batches.
//!
//! The selector and store are injected capabilities: the engine has zero
//! knowledge of how exclusion is decided or how snapshots are persisted.

pub mod job;
pub mod metrics;
pub mod period;
pub mod rules;
pub mod selector;
pub mod sql;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use job::{CompactionJob, CompactionRunResult, DELETE_BATCH_SIZE, RuleCompactionResult};
pub use metrics::{CompactionMetrics, MetricsSummary};
pub use period::{Period, compute_day_periods};
pub use rules::{RetentionRuleSet, RuleSetError};
pub use selector::{TimePointSelector, TimePoints, select_time_points};
pub use sql::{SqlSnapshotStore, SqlTimePointSelector};
pub use store::SnapshotStore;
