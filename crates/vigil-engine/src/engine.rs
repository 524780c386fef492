//! Engine facade: wiring, the operation surface, and graceful shutdown.
//!
//! [`Engine::start`] spawns the moving parts — processor shards, notifier,
//! payment dispatcher and scheduler — around one [`MonitorDb`] and exposes
//! the transport-agnostic operations a surrounding REST/RPC layer maps onto.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vigil_core::{
    now_ms, ActorKind, Check, EngineConfig, Incident, IncidentId, LedgerEntry,
    LocationDetails, OwnerId, ProbeActor, ProberId, ProberWallet, Region, Target, TargetId,
    TargetSpec, TargetUpdate, VigilError,
};
use vigil_probe::ProbeRunner;
use vigil_store::{
    CheckStore, CooldownStore, IncidentStore, MonitorDb, TargetStore, WalletStore,
};

use crate::email::EmailSender;
use crate::gateway::SubmissionGateway;
use crate::processor::{self, ProcessorDeps};
use crate::push::{PushChannel, PushHub, PushMessage};
use crate::scheduler::{self, SchedulerHandle};
use crate::stats::{StatsView, TargetStats};
use crate::{notifier, payment};

const MS_PER_DAY: i64 = 86_400_000;

pub struct Engine {
    config: EngineConfig,
    db: Arc<MonitorDb>,
    targets: Arc<dyn TargetStore>,
    incidents: Arc<dyn IncidentStore>,
    wallets: Arc<dyn WalletStore>,
    checks: Arc<dyn CheckStore>,
    gateway: SubmissionGateway,
    stats: StatsView,
    push: PushHub,
    scheduler: SchedulerHandle,
    shutdown_tx: watch::Sender<bool>,
    scheduler_task: JoinHandle<()>,
    shard_tasks: Vec<JoinHandle<()>>,
    notifier_task: JoinHandle<()>,
    payment_task: JoinHandle<()>,
}

impl Engine {
    /// Spawn all workers and return the running engine.
    pub fn start(
        config: EngineConfig,
        db: Arc<MonitorDb>,
        runner: Arc<dyn ProbeRunner>,
        email: Arc<dyn EmailSender>,
    ) -> Engine {
        let targets: Arc<dyn TargetStore> = db.clone();
        let checks: Arc<dyn CheckStore> = db.clone();
        let incidents: Arc<dyn IncidentStore> = db.clone();
        let wallets: Arc<dyn WalletStore> = db.clone();
        let cooldowns: Arc<dyn CooldownStore> = db.clone();

        let push = PushHub::new(1024);
        let push_port: Arc<dyn PushChannel> = Arc::new(push.clone());

        let (alert_tx, alert_rx) = mpsc::channel(256);
        let (credit_tx, credit_rx) = mpsc::channel(256);

        let (processor, shard_tasks) = processor::spawn(
            config.processor_shards,
            ProcessorDeps {
                checks: checks.clone(),
                incidents: incidents.clone(),
                alerts: alert_tx,
                credits: credit_tx,
                push: push_port.clone(),
            },
        );

        let notifier_task = notifier::spawn(
            alert_rx,
            db.clone(),
            email,
            push_port.clone(),
            config.email_enabled,
        );
        let payment_task = payment::spawn(
            credit_rx,
            wallets.clone(),
            checks.clone(),
            push_port,
            config.payment_per_check_minor_units,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (scheduler, scheduler_task) = scheduler::spawn(
            targets.clone(),
            runner.clone(),
            processor.clone(),
            config.clone(),
            shutdown_rx,
        );

        let gateway =
            SubmissionGateway::new(targets.clone(), cooldowns, runner, processor, &config);
        let stats = StatsView::new(checks.clone(), incidents.clone());

        info!(
            shards = config.processor_shards,
            executors = config.executor_concurrency,
            "engine started"
        );
        Engine {
            config,
            db,
            targets,
            incidents,
            wallets,
            checks,
            gateway,
            stats,
            push,
            scheduler,
            shutdown_tx,
            scheduler_task,
            shard_tasks,
            notifier_task,
            payment_task,
        }
    }

    // ── Target management (owner-scoped) ──────────────────────────────────

    pub async fn create_target(
        &self,
        actor: &ProbeActor,
        owner: OwnerId,
        mut spec: TargetSpec,
    ) -> Result<Target, VigilError> {
        self.authorize_owner(actor, &owner)?;
        // Zero means "use the configured default".
        if spec.alert_threshold == 0 {
            spec.alert_threshold = self.config.alert_threshold_default;
        }
        if spec.recovery_threshold == 0 {
            spec.recovery_threshold = self.config.recovery_threshold_default;
        }
        if spec.timeout_ms == 0 {
            spec.timeout_ms = self.config.probe_timeout_ms_default;
        }
        spec.validate(
            self.config.interval_floor_seconds,
            &self.config.known_regions,
        )?;
        let target = Target::new(owner, spec, now_ms());
        self.targets.put_target(&target)?;
        self.scheduler.reload(target.id).await;
        info!(target = %target.id, url = %target.url, "target created");
        Ok(target)
    }

    pub async fn update_target(
        &self,
        actor: &ProbeActor,
        id: &TargetId,
        update: TargetUpdate,
    ) -> Result<Target, VigilError> {
        let mut target = self.load_target(id)?;
        self.authorize_target(actor, &target)?;
        target.apply(update);
        spec_of(&target).validate(
            self.config.interval_floor_seconds,
            &self.config.known_regions,
        )?;
        self.targets.put_target(&target)?;
        self.scheduler.reload(*id).await;
        Ok(target)
    }

    pub async fn deactivate_target(
        &self,
        actor: &ProbeActor,
        id: &TargetId,
    ) -> Result<(), VigilError> {
        let mut target = self.load_target(id)?;
        self.authorize_target(actor, &target)?;
        if target.active {
            target.active = false;
            target.version += 1;
            self.targets.put_target(&target)?;
        }
        self.scheduler.remove(*id).await;
        info!(target = %id, "target deactivated");
        Ok(())
    }

    pub async fn delete_target(&self, actor: &ProbeActor, id: &TargetId) -> Result<(), VigilError> {
        let target = self.load_target(id)?;
        self.authorize_target(actor, &target)?;
        self.targets.delete_target(id)?;
        self.scheduler.remove(*id).await;
        info!(target = %id, "target deleted");
        Ok(())
    }

    pub fn list_targets(&self, actor: &ProbeActor) -> Result<Vec<Target>, VigilError> {
        match actor.kind {
            ActorKind::Admin => self.targets.list_targets(None),
            ActorKind::Owner => self
                .targets
                .list_targets(Some(&OwnerId(actor.id.clone()))),
            _ => Err(VigilError::Unauthorized(
                "only owners and admins list targets".into(),
            )),
        }
    }

    // ── Probing ───────────────────────────────────────────────────────────

    pub async fn submit_probe(
        &self,
        prober: &ProberId,
        target_id: &TargetId,
        location_tag: Region,
        location: Option<LocationDetails>,
    ) -> Result<Check, VigilError> {
        self.gateway
            .submit_probe(prober, target_id, location_tag, location)
            .await
    }

    pub async fn list_available_targets(
        &self,
        prober: &ProberId,
    ) -> Result<Vec<Target>, VigilError> {
        self.gateway.list_available(prober).await
    }

    pub async fn manual_probe(
        &self,
        target_id: &TargetId,
        actor: &ProbeActor,
    ) -> Result<Check, VigilError> {
        self.gateway.manual_probe(target_id, actor).await
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    pub fn target_stats(
        &self,
        target_id: &TargetId,
        window_days: u32,
    ) -> Result<TargetStats, VigilError> {
        // Existence check so an unknown id is NotFound, not empty stats.
        self.load_target(target_id)?;
        self.stats.target_stats(target_id, window_days, now_ms())
    }

    pub fn list_incidents(&self, target: Option<&TargetId>) -> Result<Vec<Incident>, VigilError> {
        self.incidents.list_incidents(target)
    }

    pub fn get_incident(&self, id: &IncidentId) -> Result<Incident, VigilError> {
        self.incidents
            .get_incident(id)?
            .ok_or_else(|| VigilError::not_found(format!("incident {id}")))
    }

    pub fn wallet(&self, prober: &ProberId) -> Result<(ProberWallet, Vec<LedgerEntry>), VigilError> {
        let wallet = self
            .wallets
            .get_wallet(prober)?
            .ok_or_else(|| VigilError::not_found(format!("wallet for prober {prober}")))?;
        let ledger = self.wallets.ledger(prober)?;
        Ok((wallet, ledger))
    }

    /// Subscribe to the push channel. Scope filtering happens at the
    /// transport handshake upstream.
    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.push.subscribe()
    }

    // ── Maintenance ───────────────────────────────────────────────────────

    /// Drop checks older than the configured retention window.
    pub fn prune_expired_checks(&self) -> Result<usize, VigilError> {
        let cutoff = now_ms() - self.config.retention_days as i64 * MS_PER_DAY;
        self.checks.prune_checks_before(cutoff)
    }

    /// Stop emitting probes, drain in-flight work within the grace period,
    /// flush queues and persist before returning.
    pub async fn shutdown(self) {
        info!("engine shutting down");
        let grace = Duration::from_secs(self.config.shutdown_grace_seconds);
        let _ = self.shutdown_tx.send(true);
        join_within(self.scheduler_task, grace + Duration::from_secs(1), "scheduler").await;

        // The gateway holds the last processor handle; dropping it lets the
        // shards drain their queues and exit, which closes the alert and
        // credit queues behind them.
        drop(self.gateway);
        for (index, task) in self.shard_tasks.into_iter().enumerate() {
            join_within(task, grace, &format!("processor shard {index}")).await;
        }
        join_within(self.notifier_task, grace, "notifier").await;
        join_within(self.payment_task, grace, "payment dispatcher").await;

        if let Err(e) = self.db.flush() {
            warn!(error = %e, "final flush failed");
        }
        info!("engine stopped");
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn load_target(&self, id: &TargetId) -> Result<Target, VigilError> {
        self.targets
            .get_target(id)?
            .ok_or_else(|| VigilError::not_found(format!("target {id}")))
    }

    fn authorize_owner(&self, actor: &ProbeActor, owner: &OwnerId) -> Result<(), VigilError> {
        if actor.is_admin() || (actor.kind == ActorKind::Owner && actor.id == owner.as_str()) {
            Ok(())
        } else {
            Err(VigilError::Unauthorized(format!(
                "actor {} may not act for owner {owner}",
                actor.id
            )))
        }
    }

    fn authorize_target(&self, actor: &ProbeActor, target: &Target) -> Result<(), VigilError> {
        self.authorize_owner(actor, &target.owner_id)
    }
}

fn spec_of(target: &Target) -> TargetSpec {
    TargetSpec {
        name: target.name.clone(),
        url: target.url.clone(),
        kind: target.kind,
        interval_secs: target.interval_secs,
        timeout_ms: target.timeout_ms,
        expected_status: target.expected_status,
        regions: target.regions.clone(),
        alert_threshold: target.alert_threshold,
        recovery_threshold: target.recovery_threshold,
        alert_contacts: target.alert_contacts.clone(),
        owner_email: target.owner_email.clone(),
    }
}

async fn join_within(mut task: JoinHandle<()>, grace: Duration, name: &str) {
    if tokio::time::timeout(grace, &mut task).await.is_err() {
        warn!(task = name, "did not stop within the grace period; aborting");
        task.abort();
    }
}
