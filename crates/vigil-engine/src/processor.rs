//! Result processor — the single writer for checks and incidents.
//!
//! Probe outcomes from the scheduler and the submission gateway funnel into
//! sharded worker queues, routed by target id hash, so every target is
//! processed by exactly one worker and the incident state machine sees its
//! checks strictly ordered without per-target locks.
//!
//! Per result, in order: ordering guard, persist the check, advance the
//! state machine (open/close incidents), enqueue payment for payable actors,
//! publish the live update.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vigil_core::{
    Check, CheckOutcome, Incident, LocationDetails, ProbeActor, ProberId, Region, Target,
    TargetId, TimestampMs, VigilError,
};
use vigil_store::{CheckStore, IncidentStore};

use crate::machine::{self, HealthState, StepOutcome};
use crate::notifier::{AlertEvent, AlertTransition};
use crate::payment::CreditTask;
use crate::push::{monitor_update_topic, PushChannel, PushMessage, PushPayload};

// ── Jobs ─────────────────────────────────────────────────────────────────────

/// One probe outcome on its way to persistence.
#[derive(Clone, Debug)]
pub struct ProbeResult {
    /// Target snapshot taken when the probe fired; thresholds and alert
    /// contacts come from here, not from a re-read.
    pub target: Target,
    pub region: Region,
    pub actor: ProbeActor,
    pub outcome: CheckOutcome,
    pub location: Option<LocationDetails>,
    pub timestamp: TimestampMs,
}

struct ProcessorJob {
    result: ProbeResult,
    reply: Option<oneshot::Sender<Result<Check, VigilError>>>,
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Cheap-to-clone submission side of the processor.
#[derive(Clone)]
pub struct ProcessorHandle {
    shards: Arc<Vec<mpsc::Sender<ProcessorJob>>>,
}

impl ProcessorHandle {
    /// Fire-and-forget submission (scheduler path).
    pub async fn submit(&self, result: ProbeResult) -> Result<(), VigilError> {
        self.sender_for(&result.target.id)
            .send(ProcessorJob { result, reply: None })
            .await
            .map_err(|_| VigilError::Unavailable("result processor stopped".into()))
    }

    /// Submit and wait for the persisted check (gateway path).
    pub async fn process(&self, result: ProbeResult) -> Result<Check, VigilError> {
        let (tx, rx) = oneshot::channel();
        self.sender_for(&result.target.id)
            .send(ProcessorJob {
                result,
                reply: Some(tx),
            })
            .await
            .map_err(|_| VigilError::Unavailable("result processor stopped".into()))?;
        rx.await
            .map_err(|_| VigilError::Unavailable("result processor dropped the job".into()))?
    }

    fn sender_for(&self, target: &TargetId) -> &mpsc::Sender<ProcessorJob> {
        let mut hasher = DefaultHasher::new();
        target.as_bytes().hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }
}

// ── Workers ──────────────────────────────────────────────────────────────────

pub struct ProcessorDeps {
    pub checks: Arc<dyn CheckStore>,
    pub incidents: Arc<dyn IncidentStore>,
    pub alerts: mpsc::Sender<AlertEvent>,
    pub credits: mpsc::Sender<CreditTask>,
    pub push: Arc<dyn PushChannel>,
}

pub fn spawn(shards: usize, deps: ProcessorDeps) -> (ProcessorHandle, Vec<JoinHandle<()>>) {
    let shards = shards.max(1);
    let deps = Arc::new(deps);
    let mut senders = Vec::with_capacity(shards);
    let mut tasks = Vec::with_capacity(shards);

    for shard_id in 0..shards {
        let (tx, rx) = mpsc::channel::<ProcessorJob>(256);
        senders.push(tx);
        tasks.push(tokio::spawn(run_shard(shard_id, rx, Arc::clone(&deps))));
    }

    (
        ProcessorHandle {
            shards: Arc::new(senders),
        },
        tasks,
    )
}

async fn run_shard(shard_id: usize, mut rx: mpsc::Receiver<ProcessorJob>, deps: Arc<ProcessorDeps>) {
    // Both maps are confined to this worker; sharding by target id makes
    // that the single-writer guarantee.
    let mut states: HashMap<TargetId, HealthState> = HashMap::new();
    let mut cursors: HashMap<(TargetId, Region), TimestampMs> = HashMap::new();

    while let Some(job) = rx.recv().await {
        let result = handle_result(&deps, &mut states, &mut cursors, job.result).await;
        match (job.reply, result) {
            (Some(reply), result) => {
                let _ = reply.send(result);
            }
            (None, Err(e)) => warn!(shard = shard_id, error = %e, "probe result dropped"),
            (None, Ok(_)) => {}
        }
    }
    debug!(shard = shard_id, "processor shard stopped");
}

async fn handle_result(
    deps: &ProcessorDeps,
    states: &mut HashMap<TargetId, HealthState>,
    cursors: &mut HashMap<(TargetId, Region), TimestampMs>,
    result: ProbeResult,
) -> Result<Check, VigilError> {
    let target = &result.target;
    let cursor_key = (target.id, result.region.clone());

    // ── Ordering guard ────────────────────────────────────────────────────
    let cursor = match cursors.get(&cursor_key) {
        Some(ts) => *ts,
        None => deps
            .checks
            .latest_timestamp(&target.id, &result.region)?
            .unwrap_or(i64::MIN),
    };
    let mut timestamp = result.timestamp;
    if timestamp < cursor {
        warn!(
            target = %target.id,
            region = %result.region,
            timestamp,
            cursor,
            "out-of-order check dropped"
        );
        return Err(VigilError::Internal("out-of-order check dropped".into()));
    }
    if timestamp == cursor {
        // Same-millisecond burst from the bounded pool; keep per-region
        // timestamps strictly increasing.
        timestamp = cursor + 1;
    }

    // ── Seed machine state on first sight of a target ─────────────────────
    let state = match states.get(&target.id) {
        Some(state) => *state,
        None => match deps.incidents.open_incident_for(&target.id)? {
            Some(incident) => HealthState::Down {
                incident: incident.id,
            },
            None => HealthState::Healthy,
        },
    };

    // ── Persist the check ─────────────────────────────────────────────────
    let prober: Option<ProberId> = result
        .actor
        .is_payable()
        .then(|| ProberId(result.actor.id.clone()));
    let check = Check::from_outcome(
        target.id,
        target.owner_id.clone(),
        result.region.clone(),
        &result.outcome,
        prober.clone(),
        result.location.clone(),
        timestamp,
    );
    deps.checks.insert_check(&check)?;
    cursors.insert(cursor_key, timestamp);

    // ── Advance the incident state machine ────────────────────────────────
    let alert_threshold = target.alert_threshold.max(1);
    let recovery_threshold = target.recovery_threshold.max(1);
    match machine::advance(state, check.success, check.id, alert_threshold, recovery_threshold) {
        StepOutcome::Stay(next) => {
            states.insert(target.id, next);
        }
        StepOutcome::OpenIncident => {
            let reason = check
                .error_kind
                .map(|k| k.as_str().to_string())
                .unwrap_or_else(|| "failure".to_string());
            let incident = Incident::open(
                target.id,
                check.id,
                timestamp,
                reason.clone(),
                result.region.clone(),
            );
            deps.incidents.insert_open_incident(&incident)?;
            states.insert(
                target.id,
                HealthState::Down {
                    incident: incident.id,
                },
            );
            info!(target = %target.id, incident = %incident.id, reason, "incident opened");
            let _ = deps
                .alerts
                .send(AlertEvent {
                    incident_id: incident.id,
                    transition: AlertTransition::Down,
                    target: target.clone(),
                    reason,
                    region: result.region.clone(),
                    location: result.location.clone(),
                    timestamp,
                })
                .await;
        }
        StepOutcome::CloseIncident { incident, end_check } => {
            let resolved = deps.incidents.resolve_incident(&incident, &end_check, timestamp)?;
            states.insert(target.id, HealthState::Healthy);
            info!(
                target = %target.id,
                incident = %incident,
                duration_ms = resolved.duration_ms,
                "incident resolved"
            );
            let _ = deps
                .alerts
                .send(AlertEvent {
                    incident_id: incident,
                    transition: AlertTransition::Up,
                    target: target.clone(),
                    reason: resolved.reason.clone(),
                    region: result.region.clone(),
                    location: result.location.clone(),
                    timestamp,
                })
                .await;
        }
    }

    // ── Payment & live update ─────────────────────────────────────────────
    if let Some(prober) = prober {
        let _ = deps
            .credits
            .send(CreditTask {
                check_id: check.id,
                prober_id: prober,
            })
            .await;
    }

    deps.push.publish(PushMessage {
        topic: monitor_update_topic(&target.id),
        payload: PushPayload {
            target_id: target.id.to_hex(),
            status: if check.success { "up".into() } else { "down".into() },
            response_time_ms: Some(check.response_time_ms),
            region: check.region.to_string(),
            timestamp,
            reason: check.error_kind.map(|k| k.as_str().to_string()),
        },
    });

    Ok(check)
}
