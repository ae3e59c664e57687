//! In-memory collaborators for tests.
//!
//! `MemorySnapshots` stands in for the snapshot table: a timestamp-keyed
//! row-count map shared by a selector and a store so that compaction runs
//! observe their own deletions, the property the idempotence tests rely on.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::selector::{TimePointSelector, TimePoints, select_time_points};
use crate::store::SnapshotStore;

/// Shared in-memory snapshot table: time → number of rows at that time.
#[derive(Clone, Debug, Default)]
pub struct MemorySnapshots {
    rows: Arc<Mutex<BTreeMap<DateTime<Utc>, usize>>>,
}

impl MemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one snapshot row at the given time.
    pub fn insert(&self, time: DateTime<Utc>) {
        *self.rows.lock().unwrap().entry(time).or_insert(0) += 1;
    }

    /// Total number of rows across all timestamps.
    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().values().sum()
    }

    /// Distinct timestamps currently present, ascending.
    pub fn times(&self) -> Vec<DateTime<Utc>> {
        self.rows.lock().unwrap().keys().copied().collect()
    }

    fn delete(&self, times: &[DateTime<Utc>]) -> u64 {
        let mut rows = self.rows.lock().unwrap();
        let mut deleted = 0u64;
        for time in times {
            if let Some(count) = rows.remove(time) {
                deleted += count as u64;
            }
        }
        deleted
    }
}

/// Selector applying the default first-per-window policy over the shared
/// in-memory table.
#[derive(Clone, Debug)]
pub struct MemoryTimePointSelector {
    snapshots: MemorySnapshots,
}

impl MemoryTimePointSelector {
    pub fn new(snapshots: MemorySnapshots) -> Self {
        Self { snapshots }
    }
}

#[async_trait]
impl TimePointSelector for MemoryTimePointSelector {
    async fn time_points(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        window_size_minutes: u32,
    ) -> Result<TimePoints> {
        Ok(select_time_points(
            &self.snapshots.times(),
            from,
            to,
            window_size_minutes,
        ))
    }
}

/// Store deleting from the shared in-memory table while recording every
/// batch it is handed, so tests can assert batch sizes and contents.
#[derive(Clone, Debug)]
pub struct MemorySnapshotStore {
    snapshots: MemorySnapshots,
    batches: Arc<Mutex<Vec<Vec<DateTime<Utc>>>>>,
    fail: bool,
}

impl MemorySnapshotStore {
    pub fn new(snapshots: MemorySnapshots) -> Self {
        Self {
            snapshots,
            batches: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    /// A store whose deletions always fail, for propagation tests.
    pub fn failing(snapshots: MemorySnapshots) -> Self {
        Self {
            fail: true,
            ..Self::new(snapshots)
        }
    }

    /// Every batch passed to `delete_for_times`, in call order.
    pub fn recorded_batches(&self) -> Vec<Vec<DateTime<Utc>>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn delete_for_times(&self, times: &[DateTime<Utc>]) -> Result<u64> {
        if self.fail {
            bail!("snapshot store unavailable");
        }
        self.batches.lock().unwrap().push(times.to_vec());
        Ok(self.snapshots.delete(times))
    }
}
