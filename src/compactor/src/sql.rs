//! PostgreSQL-backed collaborators over the `view_snapshots` table.
//!
//! Both round-trips are synchronous with respect to the compaction loop:
//! the job blocks on each query before moving to the next batch. Schema is
//! owned by the workspace `migrations/` directory.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::selector::{TimePointSelector, TimePoints, select_time_points};
use crate::store::SnapshotStore;

/// Selector that reads the distinct snapshot timestamps of a period from
/// Postgres and applies the default first-per-window policy.
#[derive(Clone)]
pub struct SqlTimePointSelector {
    pool: PgPool,
}

impl SqlTimePointSelector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TimePointSelector for SqlTimePointSelector {
    async fn time_points(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        window_size_minutes: u32,
    ) -> Result<TimePoints> {
        let times: Vec<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT DISTINCT time FROM view_snapshots WHERE time >= $1 AND time < $2 ORDER BY time",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to query snapshot times in [{from}, {to})"))?;

        Ok(select_time_points(&times, from, to, window_size_minutes))
    }
}

/// Store that bulk-deletes snapshot rows by timestamp.
#[derive(Clone)]
pub struct SqlSnapshotStore {
    pool: PgPool,
}

impl SqlSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for SqlSnapshotStore {
    async fn delete_for_times(&self, times: &[DateTime<Utc>]) -> Result<u64> {
        if times.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM view_snapshots WHERE time = ANY($1)")
            .bind(times)
            .execute(&self.pool)
            .await
            .context("failed to delete snapshot batch")?;

        Ok(result.rows_affected())
    }
}
