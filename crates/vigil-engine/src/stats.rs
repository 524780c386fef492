//! Read-side statistics derived from the check and incident stores.
//!
//! Nothing here is persisted — uptime, response aggregates and rollups are
//! computed on query over the `(target, timestamp)` index.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::TimeZone;
use serde::{Deserialize, Serialize};

use vigil_core::{Check, Incident, TargetId, TimestampMs, VigilError};
use vigil_store::{CheckStore, IncidentStore};

const MS_PER_DAY: i64 = 86_400_000;
const RECENT_INCIDENT_LIMIT: usize = 10;

/// Outcome of the most recent check; `Unknown` when none exists yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrentStatus {
    Up,
    Down,
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseStats {
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DayRollup {
    /// UTC date, `YYYY-MM-DD`.
    pub date: String,
    pub total_checks: u64,
    pub successful: u64,
    pub uptime_pct: f64,
    pub avg_response_ms: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetStats {
    pub target_id: String,
    pub window_days: u32,
    pub total_checks: u64,
    pub successful: u64,
    pub uptime_pct: f64,
    /// Absent when no checks fall inside the window.
    pub response: Option<ResponseStats>,
    pub current_status: CurrentStatus,
    pub daily: Vec<DayRollup>,
    pub open_incident: Option<Incident>,
    pub recent_incidents: Vec<Incident>,
}

pub struct StatsView {
    checks: Arc<dyn CheckStore>,
    incidents: Arc<dyn IncidentStore>,
}

impl StatsView {
    pub fn new(checks: Arc<dyn CheckStore>, incidents: Arc<dyn IncidentStore>) -> Self {
        Self { checks, incidents }
    }

    pub fn target_stats(
        &self,
        target: &TargetId,
        window_days: u32,
        now: TimestampMs,
    ) -> Result<TargetStats, VigilError> {
        let from = now - window_days as i64 * MS_PER_DAY;
        let checks = self.checks.checks_in_range(target, from, now + 1)?;

        let total = checks.len() as u64;
        let successful = checks.iter().filter(|c| c.success).count() as u64;
        let uptime_pct = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64 * 100.0
        };

        let response = if checks.is_empty() {
            None
        } else {
            let sum: u64 = checks.iter().map(|c| c.response_time_ms).sum();
            let min = checks.iter().map(|c| c.response_time_ms).min().unwrap_or(0);
            let max = checks.iter().map(|c| c.response_time_ms).max().unwrap_or(0);
            Some(ResponseStats {
                avg_ms: sum as f64 / checks.len() as f64,
                min_ms: min,
                max_ms: max,
            })
        };

        let current_status = match self.checks.latest_check(target)? {
            Some(check) if check.success => CurrentStatus::Up,
            Some(_) => CurrentStatus::Down,
            None => CurrentStatus::Unknown,
        };

        Ok(TargetStats {
            target_id: target.to_hex(),
            window_days,
            total_checks: total,
            successful,
            uptime_pct,
            response,
            current_status,
            daily: daily_rollups(&checks),
            open_incident: self.incidents.open_incident_for(target)?,
            recent_incidents: self.incidents.recent_resolved(target, RECENT_INCIDENT_LIMIT)?,
        })
    }
}

fn daily_rollups(checks: &[Check]) -> Vec<DayRollup> {
    let mut buckets: BTreeMap<String, (u64, u64, u64)> = BTreeMap::new();
    for check in checks {
        let date = match chrono::Utc.timestamp_millis_opt(check.timestamp).single() {
            Some(dt) => dt.format("%Y-%m-%d").to_string(),
            None => continue,
        };
        let bucket = buckets.entry(date).or_insert((0, 0, 0));
        bucket.0 += 1;
        if check.success {
            bucket.1 += 1;
        }
        bucket.2 += check.response_time_ms;
    }

    buckets
        .into_iter()
        .map(|(date, (total, successful, sum_ms))| DayRollup {
            date,
            total_checks: total,
            successful,
            uptime_pct: successful as f64 / total as f64 * 100.0,
            avg_response_ms: sum_ms as f64 / total as f64,
        })
        .collect()
}
