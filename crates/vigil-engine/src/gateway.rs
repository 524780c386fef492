//! Ad-hoc probe submission gateway.
//!
//! Roaming probers ask to probe a target from wherever they are. The gateway
//! never trusts a client-reported outcome — it runs the probe itself through
//! the shared executors, feeds the result processor, and returns the
//! persisted check. A per (prober, target) cooldown bounds how often the same
//! prober can earn credits from one target.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use vigil_core::{
    now_ms, Check, EngineConfig, LocationDetails, ProbeActor, ProberId, Region, Target,
    TargetId, VigilError, LOCAL_REGION,
};
use vigil_probe::ProbeRunner;
use vigil_store::{CooldownStore, TargetStore};

use crate::processor::{ProbeResult, ProcessorHandle};

pub struct SubmissionGateway {
    targets: Arc<dyn TargetStore>,
    cooldowns: Arc<dyn CooldownStore>,
    runner: Arc<dyn ProbeRunner>,
    processor: ProcessorHandle,
    cooldown_secs: u64,
}

impl SubmissionGateway {
    pub fn new(
        targets: Arc<dyn TargetStore>,
        cooldowns: Arc<dyn CooldownStore>,
        runner: Arc<dyn ProbeRunner>,
        processor: ProcessorHandle,
        config: &EngineConfig,
    ) -> Self {
        Self {
            targets,
            cooldowns,
            runner,
            processor,
            cooldown_secs: config.cooldown_seconds,
        }
    }

    /// Perform and persist a probe on behalf of `prober`.
    pub async fn submit_probe(
        &self,
        prober: &ProberId,
        target_id: &TargetId,
        location_tag: Region,
        location: Option<LocationDetails>,
    ) -> Result<Check, VigilError> {
        let target = self.load_target(target_id).await?;
        if !target.active {
            return Err(VigilError::invalid(format!(
                "target {target_id} is not active"
            )));
        }

        let now = now_ms();
        if let Some(last) = retry_once(|| self.cooldowns.last_submission(prober, target_id)).await?
        {
            let elapsed_secs = ((now - last).max(0) / 1_000) as u64;
            if elapsed_secs < self.cooldown_secs {
                return Err(VigilError::Conflict {
                    retry_after_secs: self.cooldown_secs - elapsed_secs,
                });
            }
        }
        // Claim the slot before probing so a concurrent duplicate submission
        // conflicts instead of double-earning.
        retry_once(|| self.cooldowns.record_submission(prober, target_id, now)).await?;

        let outcome = self
            .runner
            .run(&target, Duration::from_millis(target.timeout_ms))
            .await;
        info!(
            prober = %prober,
            target = %target_id,
            region = %location_tag,
            success = outcome.success,
            "submitted probe executed"
        );

        self.processor
            .process(ProbeResult {
                target,
                region: location_tag,
                actor: ProbeActor::prober(prober.as_str()),
                outcome,
                location,
                timestamp: now_ms(),
            })
            .await
    }

    /// Active targets this prober may currently submit for.
    pub async fn list_available(&self, prober: &ProberId) -> Result<Vec<Target>, VigilError> {
        let targets = retry_once(|| self.targets.list_active_targets()).await?;
        let now = now_ms();
        let mut available = Vec::with_capacity(targets.len());
        for target in targets {
            let eligible = match self.cooldowns.last_submission(prober, &target.id)? {
                Some(last) => ((now - last).max(0) / 1_000) as u64 >= self.cooldown_secs,
                None => true,
            };
            if eligible {
                available.push(target);
            }
        }
        Ok(available)
    }

    /// Owner- or admin-triggered probe, run from the local region. Never paid.
    pub async fn manual_probe(
        &self,
        target_id: &TargetId,
        actor: &ProbeActor,
    ) -> Result<Check, VigilError> {
        let target = self.load_target(target_id).await?;
        let allowed = actor.is_admin()
            || (actor.kind == vigil_core::ActorKind::Owner && actor.id == target.owner_id.as_str());
        if !allowed {
            return Err(VigilError::Unauthorized(format!(
                "actor {} may not probe target {target_id}",
                actor.id
            )));
        }

        let outcome = self
            .runner
            .run(&target, Duration::from_millis(target.timeout_ms))
            .await;
        self.processor
            .process(ProbeResult {
                target,
                region: Region::from(LOCAL_REGION),
                actor: actor.clone(),
                outcome,
                location: None,
                timestamp: now_ms(),
            })
            .await
    }

    async fn load_target(&self, id: &TargetId) -> Result<Target, VigilError> {
        retry_once(|| self.targets.get_target(id))
            .await?
            .ok_or_else(|| VigilError::not_found(format!("target {id}")))
    }
}

/// One quick retry on retryable store trouble, then surface `Unavailable`.
async fn retry_once<T>(op: impl Fn() -> Result<T, VigilError>) -> Result<T, VigilError> {
    match op() {
        Err(e) if e.is_retryable() => {
            tokio::time::sleep(Duration::from_millis(100)).await;
            op()
        }
        result => result,
    }
}
