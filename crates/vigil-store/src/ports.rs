//! Store port interfaces.
//!
//! Engine components are injected with these traits rather than a concrete
//! database handle; [`crate::MonitorDb`] implements all of them, and tests
//! substitute failing or scripted stores where useful. Methods are synchronous
//! — sled operations are in-memory-page writes and the callers already run on
//! dedicated worker tasks.

use vigil_core::{
    Check, CheckId, CreditResult, Incident, IncidentId, LedgerEntry, MinorUnits, OwnerId,
    ProberId, ProberWallet, Region, Target, TargetId, TimestampMs, VigilError,
};

pub trait TargetStore: Send + Sync {
    fn put_target(&self, target: &Target) -> Result<(), VigilError>;
    fn get_target(&self, id: &TargetId) -> Result<Option<Target>, VigilError>;
    fn delete_target(&self, id: &TargetId) -> Result<(), VigilError>;
    /// All targets, optionally restricted to one owner.
    fn list_targets(&self, owner: Option<&OwnerId>) -> Result<Vec<Target>, VigilError>;
    fn list_active_targets(&self) -> Result<Vec<Target>, VigilError>;
}

pub trait CheckStore: Send + Sync {
    /// Write a new check. Checks are immutable; re-inserting an id is an error.
    fn insert_check(&self, check: &Check) -> Result<(), VigilError>;
    fn get_check(&self, id: &CheckId) -> Result<Option<Check>, VigilError>;
    /// Flip `payment_settled` false → true. Returns false when it already was
    /// settled — the flag transitions at most once.
    fn settle_payment(&self, id: &CheckId) -> Result<bool, VigilError>;
    fn latest_check(&self, target: &TargetId) -> Result<Option<Check>, VigilError>;
    /// Timestamp of the newest check for one (target, region) pair.
    fn latest_timestamp(
        &self,
        target: &TargetId,
        region: &Region,
    ) -> Result<Option<TimestampMs>, VigilError>;
    /// Checks for a target in `[from, to)`, ascending by timestamp.
    fn checks_in_range(
        &self,
        target: &TargetId,
        from: TimestampMs,
        to: TimestampMs,
    ) -> Result<Vec<Check>, VigilError>;
    /// Delete checks older than `cutoff`. Returns how many were removed.
    fn prune_checks_before(&self, cutoff: TimestampMs) -> Result<usize, VigilError>;
}

pub trait IncidentStore: Send + Sync {
    /// Persist a newly opened incident. Fails with `Internal` if the target
    /// already has an unresolved one — at most one may be open.
    fn insert_open_incident(&self, incident: &Incident) -> Result<(), VigilError>;
    /// Close an open incident and return the resolved record.
    fn resolve_incident(
        &self,
        id: &IncidentId,
        end_check_id: &CheckId,
        resolved_at: TimestampMs,
    ) -> Result<Incident, VigilError>;
    fn get_incident(&self, id: &IncidentId) -> Result<Option<Incident>, VigilError>;
    fn open_incident_for(&self, target: &TargetId) -> Result<Option<Incident>, VigilError>;
    /// Incidents newest-first, optionally for one target.
    fn list_incidents(&self, target: Option<&TargetId>) -> Result<Vec<Incident>, VigilError>;
    fn recent_resolved(&self, target: &TargetId, limit: usize)
        -> Result<Vec<Incident>, VigilError>;
}

pub trait WalletStore: Send + Sync {
    /// Credit a wallet for one check. Keyed by check id: the second credit for
    /// the same check is a no-op reported as `Duplicate`. Ledger entry and
    /// balance move together atomically.
    fn credit(
        &self,
        prober: &ProberId,
        check: &CheckId,
        amount: MinorUnits,
        now: TimestampMs,
    ) -> Result<CreditResult, VigilError>;
    fn get_wallet(&self, prober: &ProberId) -> Result<Option<ProberWallet>, VigilError>;
    fn ledger(&self, prober: &ProberId) -> Result<Vec<LedgerEntry>, VigilError>;
}

pub trait CooldownStore: Send + Sync {
    fn last_submission(
        &self,
        prober: &ProberId,
        target: &TargetId,
    ) -> Result<Option<TimestampMs>, VigilError>;
    fn record_submission(
        &self,
        prober: &ProberId,
        target: &TargetId,
        now: TimestampMs,
    ) -> Result<(), VigilError>;
}

/// Idempotency index for outbound alerts, keyed by (incident, transition).
pub trait AlertLedger: Send + Sync {
    fn already_sent(&self, incident: &IncidentId, transition: &str) -> Result<bool, VigilError>;
    fn mark_sent(
        &self,
        incident: &IncidentId,
        transition: &str,
        now: TimestampMs,
    ) -> Result<(), VigilError>;
}
