use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use tracing::debug;

use vigil_core::{
    Check, CheckId, CreditResult, Incident, IncidentId, LedgerEntry, MinorUnits, OwnerId,
    ProberId, ProberWallet, Region, Target, TargetId, TimestampMs, VigilError,
};

use crate::ports::{
    AlertLedger, CheckStore, CooldownStore, IncidentStore, TargetStore, WalletStore,
};

/// Persistent monitoring database backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   targets            — TargetId bytes                    → bincode(Target)
///   checks             — CheckId bytes                     → bincode(Check)
///   checks_by_target   — target ++ ts_be ++ check_id       → check_id bytes
///   region_cursor      — target ++ region utf8             → ts_be ++ check_id
///   incidents          — IncidentId bytes                  → bincode(Incident)
///   incidents_by_target— target ++ started_be ++ id        → incident_id bytes
///   open_incidents     — target                            → incident_id (≤1 per target)
///   wallets            — prober utf8                       → bincode(ProberWallet)
///   wallet_ledger      — prober ++ 0x00 ++ check_id        → bincode(LedgerEntry)
///   cooldowns          — prober ++ 0x00 ++ target          → ts_be
///   alerts_sent        — incident ++ transition utf8       → ts_be
pub struct MonitorDb {
    db: sled::Db,
    targets: sled::Tree,
    checks: sled::Tree,
    checks_by_target: sled::Tree,
    region_cursor: sled::Tree,
    incidents: sled::Tree,
    incidents_by_target: sled::Tree,
    open_incidents: sled::Tree,
    wallets: sled::Tree,
    wallet_ledger: sled::Tree,
    cooldowns: sled::Tree,
    alerts_sent: sled::Tree,
}

fn storage(e: sled::Error) -> VigilError {
    VigilError::Unavailable(format!("storage: {e}"))
}

fn codec(e: bincode::Error) -> VigilError {
    VigilError::Internal(format!("serialization: {e}"))
}

fn ts_be(ts: TimestampMs) -> [u8; 8] {
    // Timestamps are epoch-millis and always non-negative, so the unsigned
    // big-endian encoding sorts correctly under sled's byte order.
    (ts as u64).to_be_bytes()
}

fn ts_from_be(bytes: &[u8]) -> TimestampMs {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(arr) as TimestampMs
}

fn check_index_key(target: &TargetId, ts: TimestampMs, check: &CheckId) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(target.as_bytes());
    key.extend_from_slice(&ts_be(ts));
    key.extend_from_slice(check.as_bytes());
    key
}

fn cursor_key(target: &TargetId, region: &Region) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + region.as_str().len());
    key.extend_from_slice(target.as_bytes());
    key.extend_from_slice(region.as_str().as_bytes());
    key
}

fn incident_index_key(target: &TargetId, started_at: TimestampMs, id: &IncidentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(target.as_bytes());
    key.extend_from_slice(&ts_be(started_at));
    key.extend_from_slice(id.as_bytes());
    key
}

fn ledger_key(prober: &ProberId, check: &CheckId) -> Vec<u8> {
    let mut key = Vec::with_capacity(prober.as_str().len() + 17);
    key.extend_from_slice(prober.as_str().as_bytes());
    key.push(0);
    key.extend_from_slice(check.as_bytes());
    key
}

fn ledger_prefix(prober: &ProberId) -> Vec<u8> {
    let mut key = Vec::with_capacity(prober.as_str().len() + 1);
    key.extend_from_slice(prober.as_str().as_bytes());
    key.push(0);
    key
}

fn cooldown_key(prober: &ProberId, target: &TargetId) -> Vec<u8> {
    let mut key = Vec::with_capacity(prober.as_str().len() + 17);
    key.extend_from_slice(prober.as_str().as_bytes());
    key.push(0);
    key.extend_from_slice(target.as_bytes());
    key
}

fn alert_key(incident: &IncidentId, transition: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + transition.len());
    key.extend_from_slice(incident.as_bytes());
    key.extend_from_slice(transition.as_bytes());
    key
}

fn id16(bytes: &[u8]) -> [u8; 16] {
    let mut arr = [0u8; 16];
    arr.copy_from_slice(&bytes[..16]);
    arr
}

impl MonitorDb {
    /// Open or create the monitoring database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VigilError> {
        let db = sled::open(path).map_err(storage)?;
        let targets             = db.open_tree("targets").map_err(storage)?;
        let checks              = db.open_tree("checks").map_err(storage)?;
        let checks_by_target    = db.open_tree("checks_by_target").map_err(storage)?;
        let region_cursor       = db.open_tree("region_cursor").map_err(storage)?;
        let incidents           = db.open_tree("incidents").map_err(storage)?;
        let incidents_by_target = db.open_tree("incidents_by_target").map_err(storage)?;
        let open_incidents      = db.open_tree("open_incidents").map_err(storage)?;
        let wallets             = db.open_tree("wallets").map_err(storage)?;
        let wallet_ledger       = db.open_tree("wallet_ledger").map_err(storage)?;
        let cooldowns           = db.open_tree("cooldowns").map_err(storage)?;
        let alerts_sent         = db.open_tree("alerts_sent").map_err(storage)?;
        Ok(Self {
            db, targets, checks, checks_by_target, region_cursor, incidents,
            incidents_by_target, open_incidents, wallets, wallet_ledger,
            cooldowns, alerts_sent,
        })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), VigilError> {
        self.db.flush().map_err(storage)?;
        Ok(())
    }
}

// ── TargetStore ──────────────────────────────────────────────────────────────

impl TargetStore for MonitorDb {
    fn put_target(&self, target: &Target) -> Result<(), VigilError> {
        let bytes = bincode::serialize(target).map_err(codec)?;
        self.targets
            .insert(target.id.as_bytes(), bytes)
            .map_err(storage)?;
        Ok(())
    }

    fn get_target(&self, id: &TargetId) -> Result<Option<Target>, VigilError> {
        match self.targets.get(id.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(codec)?)),
            None => Ok(None),
        }
    }

    fn delete_target(&self, id: &TargetId) -> Result<(), VigilError> {
        self.targets.remove(id.as_bytes()).map_err(storage)?;
        Ok(())
    }

    fn list_targets(&self, owner: Option<&OwnerId>) -> Result<Vec<Target>, VigilError> {
        let mut out = Vec::new();
        for item in self.targets.iter() {
            let (_, bytes) = item.map_err(storage)?;
            let target: Target = bincode::deserialize(&bytes).map_err(codec)?;
            if owner.map_or(true, |o| &target.owner_id == o) {
                out.push(target);
            }
        }
        Ok(out)
    }

    fn list_active_targets(&self) -> Result<Vec<Target>, VigilError> {
        Ok(self.list_targets(None)?.into_iter().filter(|t| t.active).collect())
    }
}

// ── CheckStore ───────────────────────────────────────────────────────────────

impl CheckStore for MonitorDb {
    fn insert_check(&self, check: &Check) -> Result<(), VigilError> {
        if self.checks.contains_key(check.id.as_bytes()).map_err(storage)? {
            return Err(VigilError::Internal(format!(
                "check {} already written",
                check.id
            )));
        }
        let bytes = bincode::serialize(check).map_err(codec)?;
        self.checks.insert(check.id.as_bytes(), bytes).map_err(storage)?;
        self.checks_by_target
            .insert(
                check_index_key(&check.target_id, check.timestamp, &check.id),
                check.id.as_bytes().as_slice(),
            )
            .map_err(storage)?;

        let mut cursor = Vec::with_capacity(24);
        cursor.extend_from_slice(&ts_be(check.timestamp));
        cursor.extend_from_slice(check.id.as_bytes());
        self.region_cursor
            .insert(cursor_key(&check.target_id, &check.region), cursor)
            .map_err(storage)?;
        Ok(())
    }

    fn get_check(&self, id: &CheckId) -> Result<Option<Check>, VigilError> {
        match self.checks.get(id.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(codec)?)),
            None => Ok(None),
        }
    }

    fn settle_payment(&self, id: &CheckId) -> Result<bool, VigilError> {
        let mut check = self
            .get_check(id)?
            .ok_or_else(|| VigilError::not_found(format!("check {id}")))?;
        if check.payment_settled {
            return Ok(false);
        }
        check.payment_settled = true;
        let bytes = bincode::serialize(&check).map_err(codec)?;
        self.checks.insert(id.as_bytes(), bytes).map_err(storage)?;
        Ok(true)
    }

    fn latest_check(&self, target: &TargetId) -> Result<Option<Check>, VigilError> {
        let entry = self
            .checks_by_target
            .scan_prefix(target.as_bytes())
            .rev()
            .next();
        match entry {
            Some(item) => {
                let (_, id_bytes) = item.map_err(storage)?;
                self.get_check(&CheckId::from_bytes(id16(&id_bytes)))
            }
            None => Ok(None),
        }
    }

    fn latest_timestamp(
        &self,
        target: &TargetId,
        region: &Region,
    ) -> Result<Option<TimestampMs>, VigilError> {
        match self.region_cursor.get(cursor_key(target, region)).map_err(storage)? {
            Some(bytes) => Ok(Some(ts_from_be(&bytes))),
            None => Ok(None),
        }
    }

    fn checks_in_range(
        &self,
        target: &TargetId,
        from: TimestampMs,
        to: TimestampMs,
    ) -> Result<Vec<Check>, VigilError> {
        let mut lo = Vec::with_capacity(24);
        lo.extend_from_slice(target.as_bytes());
        lo.extend_from_slice(&ts_be(from));
        let mut hi = Vec::with_capacity(24);
        hi.extend_from_slice(target.as_bytes());
        hi.extend_from_slice(&ts_be(to));

        let mut out = Vec::new();
        for item in self.checks_by_target.range(lo..hi) {
            let (_, id_bytes) = item.map_err(storage)?;
            if let Some(check) = self.get_check(&CheckId::from_bytes(id16(&id_bytes)))? {
                out.push(check);
            }
        }
        Ok(out)
    }

    fn prune_checks_before(&self, cutoff: TimestampMs) -> Result<usize, VigilError> {
        let mut removed = 0usize;
        for item in self.checks.iter() {
            let (key, bytes) = item.map_err(storage)?;
            let check: Check = bincode::deserialize(&bytes).map_err(codec)?;
            if check.timestamp >= cutoff {
                continue;
            }
            self.checks.remove(&key).map_err(storage)?;
            self.checks_by_target
                .remove(check_index_key(&check.target_id, check.timestamp, &check.id))
                .map_err(storage)?;
            removed += 1;
        }
        if removed > 0 {
            debug!(removed, cutoff, "pruned old checks");
        }
        Ok(removed)
    }
}

// ── IncidentStore ────────────────────────────────────────────────────────────

impl IncidentStore for MonitorDb {
    fn insert_open_incident(&self, incident: &Incident) -> Result<(), VigilError> {
        let target_key = incident.target_id.as_bytes();
        if self.open_incidents.contains_key(target_key).map_err(storage)? {
            return Err(VigilError::Internal(format!(
                "target {} already has an open incident",
                incident.target_id
            )));
        }
        let bytes = bincode::serialize(incident).map_err(codec)?;
        self.incidents
            .insert(incident.id.as_bytes(), bytes)
            .map_err(storage)?;
        self.incidents_by_target
            .insert(
                incident_index_key(&incident.target_id, incident.started_at, &incident.id),
                incident.id.as_bytes().as_slice(),
            )
            .map_err(storage)?;
        self.open_incidents
            .insert(target_key, incident.id.as_bytes().as_slice())
            .map_err(storage)?;
        Ok(())
    }

    fn resolve_incident(
        &self,
        id: &IncidentId,
        end_check_id: &CheckId,
        resolved_at: TimestampMs,
    ) -> Result<Incident, VigilError> {
        let mut incident = self
            .get_incident(id)?
            .ok_or_else(|| VigilError::not_found(format!("incident {id}")))?;
        if !incident.is_open() {
            return Ok(incident);
        }
        incident.close(*end_check_id, resolved_at);
        let bytes = bincode::serialize(&incident).map_err(codec)?;
        self.incidents.insert(id.as_bytes(), bytes).map_err(storage)?;
        self.open_incidents
            .remove(incident.target_id.as_bytes())
            .map_err(storage)?;
        Ok(incident)
    }

    fn get_incident(&self, id: &IncidentId) -> Result<Option<Incident>, VigilError> {
        match self.incidents.get(id.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(codec)?)),
            None => Ok(None),
        }
    }

    fn open_incident_for(&self, target: &TargetId) -> Result<Option<Incident>, VigilError> {
        match self.open_incidents.get(target.as_bytes()).map_err(storage)? {
            Some(id_bytes) => self.get_incident(&IncidentId::from_bytes(id16(&id_bytes))),
            None => Ok(None),
        }
    }

    fn list_incidents(&self, target: Option<&TargetId>) -> Result<Vec<Incident>, VigilError> {
        let mut out = Vec::new();
        match target {
            Some(t) => {
                for item in self.incidents_by_target.scan_prefix(t.as_bytes()).rev() {
                    let (_, id_bytes) = item.map_err(storage)?;
                    if let Some(incident) =
                        self.get_incident(&IncidentId::from_bytes(id16(&id_bytes)))?
                    {
                        out.push(incident);
                    }
                }
            }
            None => {
                for item in self.incidents.iter() {
                    let (_, bytes) = item.map_err(storage)?;
                    out.push(bincode::deserialize(&bytes).map_err(codec)?);
                }
                out.sort_by_key(|i: &Incident| std::cmp::Reverse(i.started_at));
            }
        }
        Ok(out)
    }

    fn recent_resolved(
        &self,
        target: &TargetId,
        limit: usize,
    ) -> Result<Vec<Incident>, VigilError> {
        let mut out = Vec::new();
        for item in self.incidents_by_target.scan_prefix(target.as_bytes()).rev() {
            let (_, id_bytes) = item.map_err(storage)?;
            if let Some(incident) = self.get_incident(&IncidentId::from_bytes(id16(&id_bytes)))? {
                if !incident.is_open() {
                    out.push(incident);
                    if out.len() == limit {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }
}

// ── WalletStore ──────────────────────────────────────────────────────────────

impl WalletStore for MonitorDb {
    fn credit(
        &self,
        prober: &ProberId,
        check: &CheckId,
        amount: MinorUnits,
        now: TimestampMs,
    ) -> Result<CreditResult, VigilError> {
        let entry = LedgerEntry {
            check_id: *check,
            amount,
            credited_at: now,
        };
        let entry_bytes = bincode::serialize(&entry).map_err(codec)?;
        let key = ledger_key(prober, check);
        let wallet_key = prober.as_str().as_bytes().to_vec();

        // Ledger entry and balance move together or not at all.
        let result = (&self.wallets, &self.wallet_ledger).transaction(|(wallets, ledger)| {
            if ledger.get(key.as_slice())?.is_some() {
                return Ok(CreditResult::Duplicate);
            }
            ledger.insert(key.as_slice(), entry_bytes.as_slice())?;
            let mut wallet = match wallets.get(wallet_key.as_slice())? {
                Some(bytes) => bincode::deserialize::<ProberWallet>(&bytes).map_err(|e| {
                    ConflictableTransactionError::Abort(codec(e))
                })?,
                None => ProberWallet::new(prober.clone(), now),
            };
            wallet.balance += amount;
            let wallet_bytes = bincode::serialize(&wallet)
                .map_err(|e| ConflictableTransactionError::Abort(codec(e)))?;
            wallets.insert(wallet_key.as_slice(), wallet_bytes)?;
            Ok(CreditResult::Applied)
        });

        match result {
            Ok(r) => Ok(r),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(storage(e)),
        }
    }

    fn get_wallet(&self, prober: &ProberId) -> Result<Option<ProberWallet>, VigilError> {
        match self.wallets.get(prober.as_str().as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(codec)?)),
            None => Ok(None),
        }
    }

    fn ledger(&self, prober: &ProberId) -> Result<Vec<LedgerEntry>, VigilError> {
        let mut out = Vec::new();
        for item in self.wallet_ledger.scan_prefix(ledger_prefix(prober)) {
            let (_, bytes) = item.map_err(storage)?;
            out.push(bincode::deserialize(&bytes).map_err(codec)?);
        }
        Ok(out)
    }
}

// ── CooldownStore ────────────────────────────────────────────────────────────

impl CooldownStore for MonitorDb {
    fn last_submission(
        &self,
        prober: &ProberId,
        target: &TargetId,
    ) -> Result<Option<TimestampMs>, VigilError> {
        match self.cooldowns.get(cooldown_key(prober, target)).map_err(storage)? {
            Some(bytes) => Ok(Some(ts_from_be(&bytes))),
            None => Ok(None),
        }
    }

    fn record_submission(
        &self,
        prober: &ProberId,
        target: &TargetId,
        now: TimestampMs,
    ) -> Result<(), VigilError> {
        self.cooldowns
            .insert(cooldown_key(prober, target), ts_be(now).to_vec())
            .map_err(storage)?;
        Ok(())
    }
}

// ── AlertLedger ──────────────────────────────────────────────────────────────

impl AlertLedger for MonitorDb {
    fn already_sent(&self, incident: &IncidentId, transition: &str) -> Result<bool, VigilError> {
        self.alerts_sent
            .contains_key(alert_key(incident, transition))
            .map_err(storage)
    }

    fn mark_sent(
        &self,
        incident: &IncidentId,
        transition: &str,
        now: TimestampMs,
    ) -> Result<(), VigilError> {
        self.alerts_sent
            .insert(alert_key(incident, transition), ts_be(now).to_vec())
            .map_err(storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{CheckOutcome, ProbeErrorKind, ProbeKind, TargetSpec};

    fn open_db() -> (MonitorDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = MonitorDb::open(dir.path()).unwrap();
        (db, dir)
    }

    fn sample_target() -> Target {
        Target::new(
            OwnerId::from("owner-1"),
            TargetSpec {
                name: "example".into(),
                url: "https://example.com".into(),
                kind: ProbeKind::Https,
                interval_secs: 60,
                timeout_ms: 5_000,
                expected_status: 200,
                regions: vec![Region::from("eu-west")],
                alert_threshold: 3,
                recovery_threshold: 1,
                alert_contacts: vec![],
                owner_email: None,
            },
            1_000,
        )
    }

    fn sample_check(target: &Target, ts: TimestampMs, success: bool) -> Check {
        let outcome = if success {
            CheckOutcome::pass(Some(200), 42)
        } else {
            CheckOutcome::fail(ProbeErrorKind::Timeout, "deadline exceeded", None, 5_000)
        };
        Check::from_outcome(
            target.id,
            target.owner_id.clone(),
            Region::from("eu-west"),
            &outcome,
            None,
            None,
            ts,
        )
    }

    #[test]
    fn target_round_trip_and_listing() {
        let (db, _dir) = open_db();
        let target = sample_target();
        db.put_target(&target).unwrap();

        let loaded = db.get_target(&target.id).unwrap().unwrap();
        assert_eq!(loaded.url, target.url);

        assert_eq!(db.list_active_targets().unwrap().len(), 1);
        assert_eq!(
            db.list_targets(Some(&OwnerId::from("someone-else"))).unwrap().len(),
            0
        );

        db.delete_target(&target.id).unwrap();
        assert!(db.get_target(&target.id).unwrap().is_none());
    }

    #[test]
    fn checks_are_write_once() {
        let (db, _dir) = open_db();
        let target = sample_target();
        let check = sample_check(&target, 2_000, true);
        db.insert_check(&check).unwrap();
        assert!(matches!(
            db.insert_check(&check),
            Err(VigilError::Internal(_))
        ));
    }

    #[test]
    fn payment_settles_exactly_once() {
        let (db, _dir) = open_db();
        let target = sample_target();
        let check = sample_check(&target, 2_000, true);
        db.insert_check(&check).unwrap();

        assert!(db.settle_payment(&check.id).unwrap());
        assert!(!db.settle_payment(&check.id).unwrap());
        assert!(db.get_check(&check.id).unwrap().unwrap().payment_settled);
    }

    #[test]
    fn range_scan_is_ordered_and_latest_wins() {
        let (db, _dir) = open_db();
        let target = sample_target();
        for ts in [5_000, 1_000, 3_000] {
            db.insert_check(&sample_check(&target, ts, true)).unwrap();
        }

        let checks = db.checks_in_range(&target.id, 0, 10_000).unwrap();
        let stamps: Vec<_> = checks.iter().map(|c| c.timestamp).collect();
        assert_eq!(stamps, vec![1_000, 3_000, 5_000]);

        assert_eq!(db.latest_check(&target.id).unwrap().unwrap().timestamp, 5_000);
        assert_eq!(
            db.latest_timestamp(&target.id, &Region::from("eu-west")).unwrap(),
            Some(3_000) // cursor tracks insertion order; processor enforces monotonicity
        );
    }

    #[test]
    fn prune_removes_old_checks_and_index_entries() {
        let (db, _dir) = open_db();
        let target = sample_target();
        for ts in [1_000, 2_000, 9_000] {
            db.insert_check(&sample_check(&target, ts, true)).unwrap();
        }
        assert_eq!(db.prune_checks_before(5_000).unwrap(), 2);
        let left = db.checks_in_range(&target.id, 0, 100_000).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].timestamp, 9_000);
    }

    #[test]
    fn at_most_one_open_incident_per_target() {
        let (db, _dir) = open_db();
        let target = sample_target();
        let incident = Incident::open(
            target.id,
            CheckId::random(),
            3_000,
            "timeout".into(),
            Region::from("eu-west"),
        );
        db.insert_open_incident(&incident).unwrap();

        let second = Incident::open(
            target.id,
            CheckId::random(),
            4_000,
            "timeout".into(),
            Region::from("eu-west"),
        );
        assert!(db.insert_open_incident(&second).is_err());

        // Closing frees the slot.
        let end = CheckId::random();
        let resolved = db.resolve_incident(&incident.id, &end, 10_000).unwrap();
        assert_eq!(resolved.duration_ms, Some(7_000));
        assert!(db.open_incident_for(&target.id).unwrap().is_none());
        db.insert_open_incident(&second).unwrap();
    }

    #[test]
    fn incident_listing_is_newest_first() {
        let (db, _dir) = open_db();
        let target = sample_target();
        for started in [1_000, 5_000, 3_000] {
            let mut i = Incident::open(
                target.id,
                CheckId::random(),
                started,
                "transport".into(),
                Region::from("eu-west"),
            );
            i.close(CheckId::random(), started + 500);
            let bytes = bincode::serialize(&i).unwrap();
            db.incidents.insert(i.id.as_bytes(), bytes).unwrap();
            db.incidents_by_target
                .insert(
                    incident_index_key(&target.id, i.started_at, &i.id),
                    i.id.as_bytes().as_slice(),
                )
                .unwrap();
        }
        let listed = db.list_incidents(Some(&target.id)).unwrap();
        let starts: Vec<_> = listed.iter().map(|i| i.started_at).collect();
        assert_eq!(starts, vec![5_000, 3_000, 1_000]);

        let recent = db.recent_resolved(&target.id, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].started_at, 5_000);
    }

    #[test]
    fn wallet_credit_is_idempotent_per_check() {
        let (db, _dir) = open_db();
        let prober = ProberId::from("prober-1");
        let check = CheckId::random();

        assert_eq!(db.credit(&prober, &check, 5, 1_000).unwrap(), CreditResult::Applied);
        assert_eq!(db.credit(&prober, &check, 5, 2_000).unwrap(), CreditResult::Duplicate);
        assert_eq!(db.credit(&prober, &check, 5, 3_000).unwrap(), CreditResult::Duplicate);

        let wallet = db.get_wallet(&prober).unwrap().unwrap();
        assert_eq!(wallet.balance, 5);

        let ledger = db.ledger(&prober).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].check_id, check);
        assert_eq!(
            wallet.balance,
            ledger.iter().map(|e| e.amount).sum::<u64>()
        );
    }

    #[test]
    fn wallet_balance_tracks_ledger_sum() {
        let (db, _dir) = open_db();
        let prober = ProberId::from("prober-2");
        for _ in 0..4 {
            db.credit(&prober, &CheckId::random(), 5, 1_000).unwrap();
        }
        let wallet = db.get_wallet(&prober).unwrap().unwrap();
        let ledger = db.ledger(&prober).unwrap();
        assert_eq!(wallet.balance, 20);
        assert_eq!(wallet.balance, ledger.iter().map(|e| e.amount).sum::<u64>());
    }

    #[test]
    fn cooldown_upserts_per_pair() {
        let (db, _dir) = open_db();
        let prober = ProberId::from("prober-1");
        let target = TargetId::random();

        assert!(db.last_submission(&prober, &target).unwrap().is_none());
        db.record_submission(&prober, &target, 1_000).unwrap();
        assert_eq!(db.last_submission(&prober, &target).unwrap(), Some(1_000));
        db.record_submission(&prober, &target, 2_000).unwrap();
        assert_eq!(db.last_submission(&prober, &target).unwrap(), Some(2_000));
    }

    #[test]
    fn alert_ledger_tracks_incident_transitions() {
        let (db, _dir) = open_db();
        let incident = IncidentId::random();
        assert!(!db.already_sent(&incident, "down").unwrap());
        db.mark_sent(&incident, "down", 1_000).unwrap();
        assert!(db.already_sent(&incident, "down").unwrap());
        assert!(!db.already_sent(&incident, "up").unwrap());
    }
}
