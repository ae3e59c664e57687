//! Snapshot storage boundary.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Bulk deletion of snapshot records by timestamp.
///
/// Deletions are committed per call; the engine never asks for rollback.
/// The returned count may be smaller than the batch when some timestamps no
/// longer match any stored row, which the engine treats as benign.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Delete every snapshot whose `time` matches one of the given
    /// timestamps, returning the number of deleted rows.
    async fn delete_for_times(&self, times: &[DateTime<Utc>]) -> Result<u64>;
}
