use crate::storage::write_json_atomic;
use anyhow::Result;
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

const ROUND_MINUTES: u32 = 5;

/// Cumulative spend inside the current 5-hour billing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodCostRecord {
    pub resets_at: DateTime<Utc>,
    pub cost: f64,
    pub last_session_id: String,
}

/// Rounds to the nearest 5-minute boundary (minutes round half up, seconds
/// and sub-seconds dropped) so API jitter maps to one window key.
pub fn normalize_reset(ts: DateTime<Utc>) -> DateTime<Utc> {
    let minute = ts.minute();
    let rem = minute % ROUND_MINUTES;
    let truncated = ts
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts);
    if rem * 2 >= ROUND_MINUTES {
        truncated + Duration::minutes(i64::from(ROUND_MINUTES - rem))
    } else {
        truncated - Duration::minutes(i64::from(rem))
    }
}

/// Next record state for one invocation, or `None` when nothing changes.
pub fn advance(
    current: Option<&PeriodCostRecord>,
    resets_at: Option<DateTime<Utc>>,
    session_id: &str,
    session_cost: f64,
) -> Option<PeriodCostRecord> {
    let resets_at = normalize_reset(resets_at?);
    if session_cost <= 0.0 || session_id.is_empty() {
        return None;
    }

    match current {
        Some(record) if normalize_reset(record.resets_at) == resets_at => {
            if record.last_session_id == session_id {
                return None;
            }
            Some(PeriodCostRecord {
                resets_at,
                cost: record.cost + session_cost,
                last_session_id: session_id.to_string(),
            })
        }
        _ => Some(PeriodCostRecord {
            resets_at,
            cost: session_cost,
            last_session_id: session_id.to_string(),
        }),
    }
}

/// Cost of a window that has not reset yet; expired windows read as zero.
pub fn current_cost(record: Option<&PeriodCostRecord>, now: DateTime<Utc>) -> f64 {
    match record {
        Some(record) if record.resets_at > now => record.cost,
        _ => 0.0,
    }
}

/// Single-record JSON file backing the period tracker.
#[derive(Debug, Clone)]
pub struct PeriodTracker {
    path: PathBuf,
}

impl PeriodTracker {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Option<PeriodCostRecord> {
        let contents = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(error = %err, path = %self.path.display(), "period record is corrupt, ignoring");
                None
            }
        }
    }

    pub fn current_cost(&self, now: DateTime<Utc>) -> f64 {
        current_cost(self.load().as_ref(), now)
    }

    /// Folds this session into the window record. Returns whether the file
    /// was rewritten.
    pub fn update(
        &self,
        resets_at: Option<DateTime<Utc>>,
        session_id: &str,
        session_cost: f64,
    ) -> Result<bool> {
        let current = self.load();
        let Some(next) = advance(current.as_ref(), resets_at, session_id, session_cost) else {
            return Ok(false);
        };
        write_json_atomic(&self.path, &next)?;
        tracing::debug!(resets_at = %next.resets_at, cost = next.cost, "period cost updated");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn normalizes_to_nearest_five_minutes() {
        assert_eq!(
            normalize_reset(ts("2025-06-01T14:59:59.870Z")),
            ts("2025-06-01T15:00:00Z")
        );
        assert_eq!(
            normalize_reset(ts("2025-06-01T15:02:10Z")),
            ts("2025-06-01T15:00:00Z")
        );
        assert_eq!(
            normalize_reset(ts("2025-06-01T15:03:00Z")),
            ts("2025-06-01T15:05:00Z")
        );
        assert_eq!(
            normalize_reset(ts("2025-06-01T23:58:00Z")),
            ts("2025-06-02T00:00:00Z")
        );
    }

    #[test]
    fn same_session_in_same_window_is_not_double_counted() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = PeriodTracker::new(dir.path().join("period.json"));
        let reset = Some(ts("2025-06-01T15:00:00Z"));

        assert!(tracker.update(reset, "s1", 1.5).unwrap());
        assert!(!tracker.update(Some(ts("2025-06-01T15:01:30Z")), "s1", 1.5).unwrap());

        let record = tracker.load().unwrap();
        assert!((record.cost - 1.5).abs() < 1e-9);
        assert_eq!(record.last_session_id, "s1");
    }

    #[test]
    fn different_sessions_in_same_window_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = PeriodTracker::new(dir.path().join("period.json"));

        tracker.update(Some(ts("2025-06-01T15:00:00Z")), "s1", 1.5).unwrap();
        tracker.update(Some(ts("2025-06-01T14:59:58Z")), "s2", 0.75).unwrap();

        let record = tracker.load().unwrap();
        assert!((record.cost - 2.25).abs() < 1e-9);
        assert_eq!(record.last_session_id, "s2");
        assert_eq!(record.resets_at, ts("2025-06-01T15:00:00Z"));
    }

    #[test]
    fn new_window_resets_to_session_cost() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = PeriodTracker::new(dir.path().join("period.json"));

        tracker.update(Some(ts("2025-06-01T15:00:00Z")), "s1", 1.5).unwrap();
        tracker.update(Some(ts("2025-06-01T15:00:00Z")), "s2", 2.0).unwrap();
        tracker.update(Some(ts("2025-06-01T20:00:00Z")), "s3", 0.4).unwrap();

        let record = tracker.load().unwrap();
        assert!((record.cost - 0.4).abs() < 1e-9);
        assert_eq!(record.resets_at, ts("2025-06-01T20:00:00Z"));
    }

    #[test]
    fn missing_reset_or_zero_cost_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = PeriodTracker::new(dir.path().join("period.json"));

        assert!(!tracker.update(None, "s1", 1.0).unwrap());
        assert!(!tracker.update(Some(ts("2025-06-01T15:00:00Z")), "s1", 0.0).unwrap());
        assert!(tracker.load().is_none());
        assert!(!dir.path().join("period.json").exists());
    }

    #[test]
    fn anonymous_session_does_not_touch_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = PeriodTracker::new(dir.path().join("period.json"));
        let reset = Some(ts("2025-06-01T15:00:00Z"));

        assert!(!tracker.update(reset, "", 1.0).unwrap());
        assert!(tracker.load().is_none());

        tracker.update(reset, "s1", 1.0).unwrap();
        assert!(!tracker.update(reset, "", 2.0).unwrap());
        let record = tracker.load().unwrap();
        assert!((record.cost - 1.0).abs() < 1e-9);
        assert_eq!(record.last_session_id, "s1");
    }

    #[test]
    fn expired_window_reads_as_zero() {
        let record = PeriodCostRecord {
            resets_at: ts("2025-06-01T15:00:00Z"),
            cost: 3.0,
            last_session_id: "s1".into(),
        };
        assert_eq!(current_cost(Some(&record), ts("2025-06-01T15:00:01Z")), 0.0);
        assert_eq!(current_cost(Some(&record), ts("2025-06-01T14:00:00Z")), 3.0);
        assert_eq!(current_cost(None, ts("2025-06-01T14:00:00Z")), 0.0);
    }

    #[test]
    fn persisted_shape_matches_period_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("period.json");
        let tracker = PeriodTracker::new(&path);
        tracker.update(Some(ts("2025-06-01T15:00:00Z")), "s1", 1.0).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["last_session_id"], "s1");
        assert_eq!(raw["cost"], 1.0);
        assert!(raw["resets_at"].as_str().unwrap().starts_with("2025-06-01T15:00:00"));
    }
}
