//! Day-aligned period splitting.
//!
//! Converts one retention rule's relative age band into absolute,
//! day-bounded `[from, to)` intervals anchored at an invocation instant.
//! Splitting by days bounds the working set each selector query has to
//! consider.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// How far back an unbounded (open-ended) age band is re-scanned.
///
/// Everything older was already compacted by previous runs, so only recently
/// transitioned data needs re-validation.
pub const UNBOUNDED_LOOKBACK_DAYS: i64 = 2;

/// A half-open time interval: `from` inclusive, `to` exclusive.
///
/// Never spans more than 24 hours (enforced by construction in
/// [`compute_day_periods`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Period {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.from.to_rfc3339(),
            self.to.to_rfc3339()
        )
    }
}

/// Compute the absolute interval `[now - end_offset, now - start_offset)`
/// for one rule and split it into day-aligned sub-periods.
///
/// An absent `end_offset_minutes` marks the open-ended band; its interval is
/// clamped to [`UNBOUNDED_LOOKBACK_DAYS`] before `to`.
///
/// Periods are yielded oldest to newest. The final period is clipped exactly
/// at `to`, but the cursor still advances a full day per step; this is what
/// makes the emitted periods reconstruct `[from, to)` with no gaps or
/// overlaps.
///
/// Offsets are validated by [`crate::rules::RetentionRuleSet`] before they
/// reach this function; a bounded band with `end <= start` is a
/// configuration error, not a runtime condition.
pub fn compute_day_periods(
    now: DateTime<Utc>,
    start_offset_minutes: u32,
    end_offset_minutes: Option<u32>,
) -> Vec<Period> {
    let to = now - Duration::minutes(i64::from(start_offset_minutes));
    let from = match end_offset_minutes {
        Some(end) => {
            debug_assert!(end >= start_offset_minutes, "inverted age band");
            now - Duration::minutes(i64::from(end))
        }
        None => to - Duration::days(UNBOUNDED_LOOKBACK_DAYS),
    };

    let mut periods = Vec::new();
    let mut cursor = from;
    while cursor < to {
        let day_end = cursor + Duration::days(1);
        periods.push(Period {
            from: cursor,
            to: day_end.min(to),
        });
        cursor = day_end;
    }

    periods
}
