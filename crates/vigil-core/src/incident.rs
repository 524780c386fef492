use serde::{Deserialize, Serialize};

use crate::types::{CheckId, IncidentId, Region, TargetId, TimestampMs};

/// A contiguous period during which a target is considered down.
///
/// Opened by the result processor when the consecutive-failure threshold
/// fires; closed exactly once when the recovery streak completes. At most one
/// unresolved incident exists per target.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub target_id: TargetId,
    /// The check that crossed the alert threshold.
    pub start_check_id: CheckId,
    /// The first check of the recovery streak. Set on close.
    pub end_check_id: Option<CheckId>,
    pub started_at: TimestampMs,
    pub resolved_at: Option<TimestampMs>,
    pub duration_ms: Option<i64>,
    /// Error category of the opening check, e.g. "timeout".
    pub reason: String,
    /// Region that observed the opening failure.
    pub region: Region,
}

impl Incident {
    pub fn open(
        target_id: TargetId,
        start_check_id: CheckId,
        started_at: TimestampMs,
        reason: String,
        region: Region,
    ) -> Self {
        Self {
            id: IncidentId::random(),
            target_id,
            start_check_id,
            end_check_id: None,
            started_at,
            resolved_at: None,
            duration_ms: None,
            reason,
            region,
        }
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    /// Resolve the incident. `end_check_id` is the first recovering check.
    /// Idempotent fields are set exactly once; calling on a resolved incident
    /// is a programming error and is ignored.
    pub fn close(&mut self, end_check_id: CheckId, resolved_at: TimestampMs) {
        if self.resolved_at.is_some() {
            return;
        }
        self.end_check_id = Some(end_check_id);
        self.resolved_at = Some(resolved_at);
        self.duration_ms = Some(resolved_at - self.started_at);
    }
}
