//! Time-point selection boundary.
//!
//! The selector decides which timestamps inside a period survive a target
//! cadence. The compaction job consumes it as a black box: only the split
//! into `to_include` / `to_exclude` matters, the alignment policy is
//! entirely the selector's concern.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

/// Selection result for one period. Timestamps are exchanged as
/// RFC 3339/Zulu strings at full precision across this boundary; the engine
/// parses them back into `DateTime<Utc>` before acting on them.
#[derive(Clone, Debug, Default)]
pub struct TimePoints {
    /// Timestamps aligned to the cadence, to be retained
    pub to_include: Vec<String>,
    /// Off-cadence timestamps that must be discarded
    pub to_exclude: Vec<String>,
}

/// Decides which timestamps within `[from, to)` violate the target cadence.
#[async_trait]
pub trait TimePointSelector: Send + Sync {
    async fn time_points(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        window_size_minutes: u32,
    ) -> Result<TimePoints>;
}

/// Default selection policy shared by the SQL-backed and in-memory
/// selectors: divide `[from, to)` into consecutive cadence windows and keep
/// the first timestamp seen in each window.
///
/// Input timestamps outside `[from, to)` are ignored. The input need not be
/// sorted. Applied to already-sparse data (at most one timestamp per
/// window) this selects everything, which is what makes compaction
/// idempotent.
pub fn select_time_points(
    times: &[DateTime<Utc>],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    window_size_minutes: u32,
) -> TimePoints {
    let window_seconds = i64::from(window_size_minutes) * 60;

    let mut in_range: Vec<DateTime<Utc>> = times
        .iter()
        .copied()
        .filter(|t| *t >= from && *t < to)
        .collect();
    in_range.sort_unstable();

    let mut result = TimePoints::default();
    let mut last_kept_window: Option<i64> = None;

    for time in in_range {
        let window = (time - from).num_seconds() / window_seconds;
        // AutoSi keeps any sub-second component; deletion matches by exact
        // equality, so a truncated timestamp would never hit a stored row.
        let formatted = time.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        if last_kept_window == Some(window) {
            result.to_exclude.push(formatted);
        } else {
            result.to_include.push(formatted);
            last_kept_window = Some(window);
        }
    }

    result
}
