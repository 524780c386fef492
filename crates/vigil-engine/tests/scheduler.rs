//! Scheduler behavior under a paused clock: drift bounds, deactivation,
//! overrun slots.
//!
//! Run with: cargo test -p vigil-engine --test scheduler

mod common;

use std::time::Duration;

use common::{make_target, open_db, spawn_pipeline, ProbeScript, RecordingEmail, ScriptedRunner};
use tokio::sync::watch;
use vigil_core::{EngineConfig, ProbeErrorKind};
use vigil_engine::scheduler;
use vigil_store::{CheckStore, TargetStore};

fn scheduler_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.executor_concurrency = 8;
    config.processor_shards = 2;
    config.shutdown_grace_seconds = 1;
    config
}

#[tokio::test(start_paused = true)]
async fn each_interval_yields_one_check_per_region_within_drift_bounds() {
    let (db, _dir) = open_db();
    let email = RecordingEmail::new();
    let pipeline = spawn_pipeline(db.clone(), email, 5);

    let target = make_target(3, 1); // one region, 60s interval
    db.put_target(&target).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_handle, task) = scheduler::spawn(
        db.clone(),
        ScriptedRunner::always_ok(),
        pipeline.handle.clone(),
        scheduler_config(),
        shutdown_rx,
    );

    // Five full intervals on the virtual clock.
    let intervals = 5i64;
    tokio::time::sleep(Duration::from_secs(intervals as u64 * 60 + 5)).await;
    let _ = shutdown_tx.send(true);
    let _ = task.await;

    let count = db.checks_in_range(&target.id, 0, i64::MAX).unwrap().len() as i64;
    assert!(
        (intervals - 1..=intervals + 1).contains(&count),
        "expected {intervals}±1 checks, got {count}"
    );
}

#[tokio::test(start_paused = true)]
async fn deactivation_stops_scheduling_but_keeps_the_inflight_check() {
    let (db, _dir) = open_db();
    let email = RecordingEmail::new();
    let pipeline = spawn_pipeline(db.clone(), email, 5);

    let target = make_target(3, 1);
    db.put_target(&target).unwrap();

    // The first probe runs for 30 virtual seconds before succeeding.
    let runner = ScriptedRunner::new(vec![ProbeScript::HangThenSucceed(Duration::from_secs(30))]);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (handle, task) = scheduler::spawn(
        db.clone(),
        runner,
        pipeline.handle.clone(),
        scheduler_config(),
        shutdown_rx,
    );

    // Deactivate while the first probe is still in flight.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let mut updated = db.get_target(&target.id).unwrap().unwrap();
    updated.active = false;
    updated.version += 1;
    db.put_target(&updated).unwrap();
    handle.remove(target.id).await;

    // Three intervals later: the in-flight check landed, nothing else did.
    tokio::time::sleep(Duration::from_secs(3 * 60 + 10)).await;
    let _ = shutdown_tx.send(true);
    let _ = task.await;

    let checks = db.checks_in_range(&target.id, 0, i64::MAX).unwrap();
    assert_eq!(checks.len(), 1, "only the in-flight probe may persist");
    assert!(checks[0].success);
}

#[tokio::test(start_paused = true)]
async fn overrun_slot_is_recorded_when_the_slow_probe_fails() {
    let (db, _dir) = open_db();
    let email = RecordingEmail::new();
    let pipeline = spawn_pipeline(db.clone(), email, 5);

    let target = make_target(10, 1); // high threshold: no incident noise
    db.put_target(&target).unwrap();

    // First probe overruns its 60s interval by 30s and then fails; the
    // following probes are instant successes.
    let runner = ScriptedRunner::new(vec![ProbeScript::HangThenFail(Duration::from_secs(90))]);

    let (_handle, task) = {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let spawned = scheduler::spawn(
            db.clone(),
            runner,
            pipeline.handle.clone(),
            scheduler_config(),
            shutdown_rx,
        );
        // t0: slow probe starts. t60: slot skipped. t90: slow probe fails,
        // overrun recorded. t120: next slot succeeds.
        tokio::time::sleep(Duration::from_secs(130)).await;
        let _ = shutdown_tx.send(true);
        spawned
    };
    let _ = task.await;

    let checks = db.checks_in_range(&target.id, 0, i64::MAX).unwrap();
    let overruns: Vec<_> = checks
        .iter()
        .filter(|c| c.error_kind == Some(ProbeErrorKind::Overrun))
        .collect();
    assert_eq!(overruns.len(), 1, "exactly one overrun slot: {checks:?}");
    assert!(checks.iter().any(|c| c.error_kind == Some(ProbeErrorKind::Timeout)));
    assert!(checks.iter().any(|c| c.success));
}
