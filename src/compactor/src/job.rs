//! Compaction job orchestration.
//!
//! A single invocation walks the retention rules in order, splits each
//! rule's age band into day-aligned periods, asks the selector which
//! timestamps fall off-cadence, and deletes them in bounded batches.
//! Deletions commit batch by batch; any collaborator failure propagates
//! immediately and aborts the remaining work. The next scheduled run
//! re-evaluates the same age bands against a fresh `now`, so a blind
//! re-invocation is always safe: compacting an already-compacted period is
//! a no-op.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::config::RetentionRule;
use tracing::{debug, info};

use crate::metrics::CompactionMetrics;
use crate::period::{Period, compute_day_periods};
use crate::rules::RetentionRuleSet;
use crate::selector::TimePointSelector;
use crate::store::SnapshotStore;

/// Upper bound on timestamps per bulk-delete call. Bounds query payload
/// size and lock duration; it is not a concurrency mechanism.
pub const DELETE_BATCH_SIZE: usize = 200;

/// Outcome of applying one retention rule.
#[derive(Debug, Clone)]
pub struct RuleCompactionResult {
    pub rule: RetentionRule,
    pub periods_compacted: usize,
    pub delete_batches: usize,
    pub snapshots_deleted: u64,
}

/// Outcome of a complete compaction pass.
#[derive(Debug, Clone)]
pub struct CompactionRunResult {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub rules_applied: usize,
    pub periods_compacted: usize,
    pub snapshots_deleted: u64,
    pub rule_results: Vec<RuleCompactionResult>,
}

impl CompactionRunResult {
    /// Total bulk-delete calls issued (in dry-run, the calls that would
    /// have been issued).
    pub fn delete_batch_count(&self) -> usize {
        self.rule_results.iter().map(|r| r.delete_batches).sum()
    }
}

/// Orchestrates one compaction pass over injected collaborators.
pub struct CompactionJob<S, D> {
    rules: RetentionRuleSet,
    selector: S,
    store: D,
    metrics: CompactionMetrics,
    dry_run: bool,
}

impl<S: TimePointSelector, D: SnapshotStore> CompactionJob<S, D> {
    pub fn new(
        rules: RetentionRuleSet,
        selector: S,
        store: D,
        metrics: CompactionMetrics,
        dry_run: bool,
    ) -> Self {
        Self {
            rules,
            selector,
            store,
            metrics,
            dry_run,
        }
    }

    /// Run the compaction pass anchored at `now`.
    ///
    /// Rules and periods are processed strictly sequentially; the order
    /// only affects progress reporting, each period's compaction is
    /// independent and idempotent.
    pub async fn compact(&self, now: DateTime<Utc>) -> Result<CompactionRunResult> {
        let started_at = Utc::now();

        info!(
            now = %now,
            rules = self.rules.len(),
            dry_run = self.dry_run,
            "Starting snapshot compaction run"
        );

        let mut rule_results = Vec::with_capacity(self.rules.len());
        for rule in self.rules.rules() {
            let result = self.compact_rule(now, rule).await?;
            self.metrics.record_rule_applied();
            rule_results.push(result);
        }

        let completed_at = Utc::now();
        let periods_compacted = rule_results.iter().map(|r| r.periods_compacted).sum();
        let snapshots_deleted = rule_results.iter().map(|r| r.snapshots_deleted).sum();

        info!(
            rules_applied = rule_results.len(),
            periods_compacted,
            snapshots_deleted,
            duration_ms = (completed_at - started_at).num_milliseconds(),
            "Snapshot compaction run completed"
        );

        Ok(CompactionRunResult {
            started_at,
            completed_at,
            rules_applied: rule_results.len(),
            periods_compacted,
            snapshots_deleted,
            rule_results,
        })
    }

    async fn compact_rule(
        &self,
        now: DateTime<Utc>,
        rule: &RetentionRule,
    ) -> Result<RuleCompactionResult> {
        info!(
            start_offset_minutes = rule.start_offset_minutes,
            end_offset_minutes = ?rule.end_offset_minutes,
            window_size_minutes = rule.window_size_minutes,
            "Applying retention rule"
        );

        let periods = compute_day_periods(now, rule.start_offset_minutes, rule.end_offset_minutes);

        let mut result = RuleCompactionResult {
            rule: *rule,
            periods_compacted: 0,
            delete_batches: 0,
            snapshots_deleted: 0,
        };

        for period in periods {
            let (batches, deleted) = self
                .compact_period(period, rule.window_size_minutes)
                .await?;
            self.metrics.record_period_compacted();
            result.periods_compacted += 1;
            result.delete_batches += batches;
            result.snapshots_deleted += deleted;
        }

        Ok(result)
    }

    /// Compact a single period: select off-cadence timestamps, parse them
    /// back from the wire representation, and delete them in batches.
    async fn compact_period(&self, period: Period, window_size_minutes: u32) -> Result<(usize, u64)> {
        info!(period = %period, window_size_minutes, "Compacting snapshots");

        let points = self
            .selector
            .time_points(period.from, period.to, window_size_minutes)
            .await
            .with_context(|| format!("time point selection failed for {period}"))?;

        // Timestamps cross the selector boundary as RFC 3339/Zulu strings;
        // a malformed one is a collaborator failure and aborts the run.
        let mut excluded = Vec::with_capacity(points.to_exclude.len());
        for raw in &points.to_exclude {
            let time = DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("selector returned malformed time point '{raw}'"))?
                .with_timezone(&Utc);
            excluded.push(time);
        }

        debug!(
            retained = points.to_include.len(),
            excluded = excluded.len(),
            period = %period,
            "Time point selection complete"
        );

        let mut batches = 0usize;
        let mut deleted_total = 0u64;

        for chunk in excluded.chunks(DELETE_BATCH_SIZE) {
            batches += 1;

            if self.dry_run {
                info!(
                    count = chunk.len(),
                    period = %period,
                    "[DRY RUN] Would delete snapshots"
                );
                // Keep the batch counter in step with the run result; no
                // rows are deleted so the deletion counter stays untouched.
                self.metrics.record_delete_batch(0);
                continue;
            }

            let deleted = self
                .store
                .delete_for_times(chunk)
                .await
                .with_context(|| format!("snapshot deletion failed for {period}"))?;

            // A count below the batch size means some timestamps matched no
            // stored row; benign, reflected only in the totals.
            if deleted > 0 {
                info!(deleted, period = %period, "Snapshots deleted");
            }
            self.metrics.record_delete_batch(deleted);
            deleted_total += deleted;
        }

        Ok((batches, deleted_total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemorySnapshotStore, MemorySnapshots, MemoryTimePointSelector};
    use chrono::{Duration, TimeZone};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn job_over(
        snapshots: &MemorySnapshots,
        rules: Vec<RetentionRule>,
        dry_run: bool,
    ) -> CompactionJob<MemoryTimePointSelector, MemorySnapshotStore> {
        CompactionJob::new(
            RetentionRuleSet::new(rules).unwrap(),
            MemoryTimePointSelector::new(snapshots.clone()),
            MemorySnapshotStore::new(snapshots.clone()),
            CompactionMetrics::new(),
            dry_run,
        )
    }

    fn seed_minutes(snapshots: &MemorySnapshots, now: DateTime<Utc>, minutes: std::ops::Range<i64>) {
        for minute in minutes {
            snapshots.insert(now - Duration::minutes(minute));
        }
    }

    #[tokio::test]
    async fn test_delete_batches_never_exceed_bound() {
        let now = fixed_now();
        let snapshots = MemorySnapshots::new();
        // Minute-level snapshots under a 60-minute cadence: one per hourly
        // window survives, the rest force multiple delete batches. The
        // snapshot at `now` itself sits outside the half-open band.
        seed_minutes(&snapshots, now, 0..600);

        let store = MemorySnapshotStore::new(snapshots.clone());
        let job = CompactionJob::new(
            RetentionRuleSet::new(vec![RetentionRule::new(0, Some(600), 60)]).unwrap(),
            MemoryTimePointSelector::new(snapshots.clone()),
            store.clone(),
            CompactionMetrics::new(),
            false,
        );

        let result = job.compact(now).await.unwrap();
        assert_eq!(result.snapshots_deleted, 589);
        assert_eq!(snapshots.row_count(), 11);

        let batches = store.recorded_batches();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() <= DELETE_BATCH_SIZE));
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 589);
    }

    #[tokio::test]
    async fn test_retained_timestamps_are_never_deleted() {
        let now = fixed_now();
        let snapshots = MemorySnapshots::new();
        seed_minutes(&snapshots, now, 0..120);

        let before: Vec<_> = snapshots.times();
        let store = MemorySnapshotStore::new(snapshots.clone());
        let job = CompactionJob::new(
            RetentionRuleSet::new(vec![RetentionRule::new(0, Some(120), 15)]).unwrap(),
            MemoryTimePointSelector::new(snapshots.clone()),
            store.clone(),
            CompactionMetrics::new(),
            false,
        );

        job.compact(now).await.unwrap();

        // Every timestamp the selector retained must still be present
        let retained = crate::selector::select_time_points(
            &before,
            now - Duration::minutes(120),
            now,
            15,
        )
        .to_include;
        let remaining = snapshots.times();
        for raw in &retained {
            let time = DateTime::parse_from_rfc3339(raw)
                .unwrap()
                .with_timezone(&Utc);
            assert!(remaining.contains(&time), "retained timestamp was deleted");
        }

        // And nothing that was deleted appears in the retained set
        for batch in store.recorded_batches() {
            for time in batch {
                let raw = time.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true);
                assert!(!retained.contains(&raw));
            }
        }
    }

    #[tokio::test]
    async fn test_second_run_deletes_nothing() {
        let now = fixed_now();
        let snapshots = MemorySnapshots::new();
        // Minute marks aligned with the window grids of all three bands, so
        // every retained timestamp sits on a window boundary
        seed_minutes(&snapshots, now, 0..181);

        let rules = vec![
            RetentionRule::new(0, Some(10), 1),
            RetentionRule::new(10, Some(60), 5),
            RetentionRule::new(60, None, 15),
        ];

        let first = job_over(&snapshots, rules.clone(), false)
            .compact(now)
            .await
            .unwrap();
        assert!(first.snapshots_deleted > 0);

        let second = job_over(&snapshots, rules.clone(), false)
            .compact(now)
            .await
            .unwrap();
        assert_eq!(second.snapshots_deleted, 0);
        assert_eq!(second.delete_batch_count(), 0);

        // Advancing now by less than the smallest window changes nothing
        let third = job_over(&snapshots, rules, false)
            .compact(now + Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(third.snapshots_deleted, 0);
    }

    #[tokio::test]
    async fn test_subsecond_timestamps_are_compacted() {
        let now = fixed_now();
        let snapshots = MemorySnapshots::new();
        // Two snapshots sharing one 5-minute window; the off-cadence one
        // carries a fractional-second component, as rows stamped by the
        // database clock do
        let kept = now - Duration::minutes(20);
        let off_cadence = now - Duration::minutes(18) - Duration::milliseconds(500);
        snapshots.insert(kept);
        snapshots.insert(off_cadence);

        let rules = vec![RetentionRule::new(0, Some(60), 5)];
        let first = job_over(&snapshots, rules.clone(), false)
            .compact(now)
            .await
            .unwrap();

        assert_eq!(first.snapshots_deleted, 1);
        assert_eq!(snapshots.times(), vec![kept]);

        let second = job_over(&snapshots, rules, false)
            .compact(now)
            .await
            .unwrap();
        assert_eq!(second.snapshots_deleted, 0);
    }

    #[tokio::test]
    async fn test_store_failure_aborts_run() {
        let now = fixed_now();
        let snapshots = MemorySnapshots::new();
        seed_minutes(&snapshots, now, 0..60);

        let job = CompactionJob::new(
            RetentionRuleSet::new(vec![RetentionRule::new(0, Some(60), 10)]).unwrap(),
            MemoryTimePointSelector::new(snapshots.clone()),
            MemorySnapshotStore::failing(snapshots.clone()),
            CompactionMetrics::new(),
            false,
        );

        let err = job.compact(now).await.unwrap_err();
        assert!(err.to_string().contains("snapshot deletion failed"));
        // Nothing was removed from the table
        assert_eq!(snapshots.row_count(), 60);
    }

    #[tokio::test]
    async fn test_dry_run_deletes_nothing() {
        let now = fixed_now();
        let snapshots = MemorySnapshots::new();
        seed_minutes(&snapshots, now, 0..60);

        let store = MemorySnapshotStore::new(snapshots.clone());
        let metrics = CompactionMetrics::new();
        let job = CompactionJob::new(
            RetentionRuleSet::new(vec![RetentionRule::new(0, Some(60), 10)]).unwrap(),
            MemoryTimePointSelector::new(snapshots.clone()),
            store.clone(),
            metrics.clone(),
            true,
        );

        let result = job.compact(now).await.unwrap();
        assert_eq!(result.snapshots_deleted, 0);
        assert!(result.delete_batch_count() > 0);
        assert!(store.recorded_batches().is_empty());
        assert_eq!(snapshots.row_count(), 60);

        // Would-be batches are still counted, deletions are not
        assert_eq!(metrics.delete_batches(), result.delete_batch_count());
        assert_eq!(metrics.snapshots_deleted(), 0);
    }

    #[tokio::test]
    async fn test_metrics_match_run_result() {
        let now = fixed_now();
        let snapshots = MemorySnapshots::new();
        seed_minutes(&snapshots, now, 0..90);

        let metrics = CompactionMetrics::new();
        let job = CompactionJob::new(
            RetentionRuleSet::new(vec![RetentionRule::new(0, Some(90), 30)]).unwrap(),
            MemoryTimePointSelector::new(snapshots.clone()),
            MemorySnapshotStore::new(snapshots.clone()),
            metrics.clone(),
            false,
        );

        let result = job.compact(now).await.unwrap();
        let summary = metrics.summary();
        assert_eq!(summary.rules_applied, result.rules_applied);
        assert_eq!(summary.periods_compacted, result.periods_compacted);
        assert_eq!(summary.delete_batches, result.delete_batch_count());
        assert_eq!(summary.snapshots_deleted, result.snapshots_deleted);
    }
}
