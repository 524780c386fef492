//! Clock-driven probe scheduler.
//!
//! A min-heap of `(next_due, target)` entries is popped on a one-second
//! driver tick. Each due target is re-read from the store (entries carrying a
//! stale version or a deactivated target are dropped), then one probe job per
//! region is fanned out to the bounded executor pool. Reinsertion uses
//! `max(now, previous_due) + interval`, which bounds drift to one tick per
//! cycle.
//!
//! An in-flight (target, region) guard prevents pile-ups when a probe runs
//! longer than its interval: the overlapping slot is skipped, and if the
//! still-running probe then fails, the skipped slot is recorded as an
//! `overrun` check.
//!
//! Store trouble never kills the driver — ticks back off exponentially
//! (1s base, 60s cap) and no probes are emitted while backing off.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use vigil_core::{
    now_ms, CheckOutcome, EngineConfig, ProbeActor, ProbeErrorKind, Region, Target, TargetId,
    VigilError, SCHEDULER_BACKOFF_BASE_SECS, SCHEDULER_BACKOFF_CAP_SECS, SCHEDULER_TICK_MS,
};
use vigil_probe::ProbeRunner;
use vigil_store::TargetStore;

use crate::processor::{ProbeResult, ProcessorHandle};

// ── Queue entries ────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq)]
struct QueueEntry {
    due_at: Instant,
    target_id: TargetId,
    /// Target version when queued; a mismatch at pop time means the target
    /// was edited and a fresh entry is already queued.
    version: u64,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due_at
            .cmp(&other.due_at)
            .then_with(|| self.target_id.cmp(&other.target_id))
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// ── Commands & handle ────────────────────────────────────────────────────────

enum SchedulerCmd {
    /// A target was created or updated; queue it at its current version.
    Reload(TargetId),
    /// A target was deactivated or deleted; drop its queue entries.
    Remove(TargetId),
}

#[derive(Clone)]
pub struct SchedulerHandle {
    cmd_tx: mpsc::Sender<SchedulerCmd>,
}

impl SchedulerHandle {
    pub async fn reload(&self, id: TargetId) {
        let _ = self.cmd_tx.send(SchedulerCmd::Reload(id)).await;
    }

    pub async fn remove(&self, id: TargetId) {
        let _ = self.cmd_tx.send(SchedulerCmd::Remove(id)).await;
    }
}

struct ProbeDone {
    target: Target,
    region: Region,
    failed: bool,
}

// ── Scheduler ────────────────────────────────────────────────────────────────

pub fn spawn(
    targets: Arc<dyn TargetStore>,
    runner: Arc<dyn ProbeRunner>,
    processor: ProcessorHandle,
    config: EngineConfig,
    shutdown: watch::Receiver<bool>,
) -> (SchedulerHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let semaphore = Arc::new(Semaphore::new(config.executor_concurrency.max(1)));
    let scheduler = Scheduler {
        targets,
        runner,
        processor,
        config,
        cmd_rx,
        shutdown,
        semaphore,
    };
    let task = tokio::spawn(scheduler.run());
    (SchedulerHandle { cmd_tx }, task)
}

struct Scheduler {
    targets: Arc<dyn TargetStore>,
    runner: Arc<dyn ProbeRunner>,
    processor: ProcessorHandle,
    config: EngineConfig,
    cmd_rx: mpsc::Receiver<SchedulerCmd>,
    shutdown: watch::Receiver<bool>,
    semaphore: Arc<Semaphore>,
}

impl Scheduler {
    async fn run(mut self) {
        let mut heap: BinaryHeap<Reverse<QueueEntry>> = BinaryHeap::new();
        let mut inflight: HashSet<(TargetId, Region)> = HashSet::new();
        let mut skipped: HashSet<(TargetId, Region)> = HashSet::new();
        let (done_tx, mut done_rx) = mpsc::channel::<ProbeDone>(1024);

        if !self.load_initial(&mut heap).await {
            return; // shut down before the store came up
        }
        info!(targets = heap.len(), "scheduler started");

        let mut tick = tokio::time::interval(Duration::from_millis(SCHEDULER_TICK_MS));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut backoff_secs = SCHEDULER_BACKOFF_BASE_SECS;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.fire_due(&mut heap, &mut inflight, &mut skipped, &done_tx) {
                        Ok(()) => backoff_secs = SCHEDULER_BACKOFF_BASE_SECS,
                        Err(e) => {
                            warn!(error = %e, backoff_secs, "scheduler tick failed; backing off");
                            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                            backoff_secs = (backoff_secs * 2).min(SCHEDULER_BACKOFF_CAP_SECS);
                        }
                    }
                }
                Some(cmd) = self.cmd_rx.recv() => self.on_command(cmd, &mut heap),
                Some(done) = done_rx.recv() => {
                    self.on_probe_done(done, &mut inflight, &mut skipped).await;
                }
                _ = self.shutdown.changed() => break,
            }
        }

        self.drain(&mut inflight, &mut skipped, &mut done_rx).await;
        info!("scheduler stopped");
    }

    /// Queue every active target, retrying with backoff while the store is
    /// unavailable. Returns false if shutdown arrived first.
    async fn load_initial(&mut self, heap: &mut BinaryHeap<Reverse<QueueEntry>>) -> bool {
        let mut backoff_secs = SCHEDULER_BACKOFF_BASE_SECS;
        loop {
            match self.targets.list_active_targets() {
                Ok(targets) => {
                    let now = Instant::now();
                    for target in targets {
                        heap.push(Reverse(QueueEntry {
                            due_at: now,
                            target_id: target.id,
                            version: target.version,
                        }));
                    }
                    return true;
                }
                Err(e) => {
                    warn!(error = %e, backoff_secs, "loading targets failed; backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
                        _ = self.shutdown.changed() => return false,
                    }
                    backoff_secs = (backoff_secs * 2).min(SCHEDULER_BACKOFF_CAP_SECS);
                }
            }
        }
    }

    fn on_command(&self, cmd: SchedulerCmd, heap: &mut BinaryHeap<Reverse<QueueEntry>>) {
        match cmd {
            SchedulerCmd::Reload(id) => match self.targets.get_target(&id) {
                Ok(Some(target)) if target.active => {
                    debug!(target = %id, version = target.version, "queueing target");
                    heap.push(Reverse(QueueEntry {
                        due_at: Instant::now(),
                        target_id: id,
                        version: target.version,
                    }));
                }
                Ok(_) => {}
                Err(e) => warn!(target = %id, error = %e, "reload failed"),
            },
            SchedulerCmd::Remove(id) => {
                heap.retain(|entry| entry.0.target_id != id);
                debug!(target = %id, "removed from schedule");
            }
        }
    }

    /// Pop everything due, fan probes out per region, reinsert.
    fn fire_due(
        &self,
        heap: &mut BinaryHeap<Reverse<QueueEntry>>,
        inflight: &mut HashSet<(TargetId, Region)>,
        skipped: &mut HashSet<(TargetId, Region)>,
        done_tx: &mpsc::Sender<ProbeDone>,
    ) -> Result<(), VigilError> {
        let now = Instant::now();
        while let Some(Reverse(head)) = heap.peek() {
            if head.due_at > now {
                break;
            }
            let entry = match heap.pop() {
                Some(Reverse(entry)) => entry,
                None => break,
            };

            let target = match self.targets.get_target(&entry.target_id) {
                Ok(target) => target,
                Err(e) => {
                    // Requeue before surfacing so the slot is not lost.
                    heap.push(Reverse(entry));
                    return Err(e);
                }
            };
            let target = match target {
                Some(target) if target.active && target.version == entry.version => target,
                // Deleted, deactivated, or edited (fresh entry already queued).
                _ => continue,
            };

            for region in &target.regions {
                let key = (target.id, region.clone());
                if inflight.contains(&key) {
                    debug!(target = %target.id, region = %region, "probe still in flight; skipping slot");
                    skipped.insert(key);
                    continue;
                }
                inflight.insert(key);
                self.spawn_probe(target.clone(), region.clone(), done_tx.clone());
            }

            let interval = Duration::from_secs(target.interval_secs as u64);
            heap.push(Reverse(QueueEntry {
                due_at: entry.due_at.max(now) + interval,
                target_id: target.id,
                version: target.version,
            }));
        }
        Ok(())
    }

    fn spawn_probe(&self, target: Target, region: Region, done_tx: mpsc::Sender<ProbeDone>) {
        let semaphore = Arc::clone(&self.semaphore);
        let runner = Arc::clone(&self.runner);
        let processor = self.processor.clone();
        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let timeout = Duration::from_millis(target.timeout_ms);
            let outcome = runner.run(&target, timeout).await;
            let failed = !outcome.success;

            let result = ProbeResult {
                target: target.clone(),
                region: region.clone(),
                actor: ProbeActor::system(),
                outcome,
                location: None,
                timestamp: now_ms(),
            };
            if let Err(e) = processor.submit(result).await {
                warn!(target = %target.id, error = %e, "failed to hand off probe result");
            }
            let _ = done_tx
                .send(ProbeDone {
                    target,
                    region,
                    failed,
                })
                .await;
        });
    }

    async fn on_probe_done(
        &self,
        done: ProbeDone,
        inflight: &mut HashSet<(TargetId, Region)>,
        skipped: &mut HashSet<(TargetId, Region)>,
    ) {
        let key = (done.target.id, done.region.clone());
        inflight.remove(&key);

        // The slot skipped while this probe was running only surfaces when
        // the probe also failed.
        if skipped.remove(&key) && done.failed {
            let result = ProbeResult {
                target: done.target.clone(),
                region: done.region,
                actor: ProbeActor::system(),
                outcome: CheckOutcome::fail(
                    ProbeErrorKind::Overrun,
                    "scheduled slot skipped while the previous probe overran and failed",
                    None,
                    0,
                ),
                location: None,
                timestamp: now_ms(),
            };
            if let Err(e) = self.processor.submit(result).await {
                warn!(target = %done.target.id, error = %e, "failed to record overrun check");
            }
        }
    }

    /// Give in-flight probes a grace period to land, dropping queued slots.
    async fn drain(
        &self,
        inflight: &mut HashSet<(TargetId, Region)>,
        skipped: &mut HashSet<(TargetId, Region)>,
        done_rx: &mut mpsc::Receiver<ProbeDone>,
    ) {
        if inflight.is_empty() {
            return;
        }
        info!(inflight = inflight.len(), "draining in-flight probes");
        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_grace_seconds);
        while !inflight.is_empty() {
            match tokio::time::timeout_at(deadline, done_rx.recv()).await {
                Ok(Some(done)) => self.on_probe_done(done, inflight, skipped).await,
                Ok(None) => break,
                Err(_) => {
                    warn!(abandoned = inflight.len(), "shutdown grace expired");
                    break;
                }
            }
        }
    }
}
