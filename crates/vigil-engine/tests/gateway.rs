//! Submission gateway behavior: cooldowns, eligibility, authorization.
//!
//! Run with: cargo test -p vigil-engine --test gateway

mod common;

use std::sync::Arc;

use common::{make_target, open_db, spawn_pipeline, wait_until, RecordingEmail, ScriptedRunner};
use vigil_core::{EngineConfig, LocationDetails, ProbeActor, ProberId, Region, VigilError};
use vigil_engine::SubmissionGateway;
use vigil_store::{CheckStore, TargetStore, WalletStore};

fn gateway(
    db: &Arc<vigil_store::MonitorDb>,
    runner: Arc<ScriptedRunner>,
    pipeline: &common::Pipeline,
) -> SubmissionGateway {
    let config = EngineConfig::default();
    SubmissionGateway::new(
        db.clone(),
        db.clone(),
        runner,
        pipeline.handle.clone(),
        &config,
    )
}

#[tokio::test]
async fn resubmission_within_cooldown_conflicts() {
    let (db, _dir) = open_db();
    let email = RecordingEmail::new();
    let pipeline = spawn_pipeline(db.clone(), email, 5);
    let gw = gateway(&db, ScriptedRunner::always_ok(), &pipeline);

    let target = make_target(3, 1);
    db.put_target(&target).unwrap();
    let prober = ProberId::from("prober-1");

    let check = gw
        .submit_probe(
            &prober,
            &target.id,
            Region::from("ap-south"),
            Some(LocationDetails {
                city: Some("Mumbai".into()),
                country: Some("IN".into()),
                coords: Some((19.07, 72.87)),
                ip: None,
            }),
        )
        .await
        .unwrap();
    assert!(check.success);
    assert_eq!(check.region, Region::from("ap-south"));
    assert_eq!(check.prober_id.as_ref(), Some(&prober));

    // Second submission inside the 300s window: Conflict with the remaining
    // cooldown, no second check, no second credit.
    match gw
        .submit_probe(&prober, &target.id, Region::from("ap-south"), None)
        .await
    {
        Err(VigilError::Conflict { retry_after_secs }) => {
            assert!(retry_after_secs > 0 && retry_after_secs <= 300);
        }
        other => panic!("expected Conflict, got {other:?}"),
    }

    assert_eq!(db.checks_in_range(&target.id, 0, i64::MAX).unwrap().len(), 1);
    wait_until("single credit", || {
        db.get_wallet(&prober).unwrap().map(|w| w.balance) == Some(5)
    })
    .await;
    assert_eq!(db.ledger(&prober).unwrap().len(), 1);
}

#[tokio::test]
async fn inactive_and_unknown_targets_are_rejected() {
    let (db, _dir) = open_db();
    let email = RecordingEmail::new();
    let pipeline = spawn_pipeline(db.clone(), email, 5);
    let gw = gateway(&db, ScriptedRunner::always_ok(), &pipeline);
    let prober = ProberId::from("prober-1");

    let mut target = make_target(3, 1);
    target.active = false;
    db.put_target(&target).unwrap();

    assert!(matches!(
        gw.submit_probe(&prober, &target.id, Region::from("eu-west"), None).await,
        Err(VigilError::Invalid(_))
    ));
    assert!(matches!(
        gw.submit_probe(&prober, &vigil_core::TargetId::random(), Region::from("eu-west"), None)
            .await,
        Err(VigilError::NotFound(_))
    ));
}

#[tokio::test]
async fn list_available_honors_cooldowns() {
    let (db, _dir) = open_db();
    let email = RecordingEmail::new();
    let pipeline = spawn_pipeline(db.clone(), email, 5);
    let gw = gateway(&db, ScriptedRunner::always_ok(), &pipeline);
    let prober = ProberId::from("prober-1");

    let first = make_target(3, 1);
    let second = make_target(3, 1);
    db.put_target(&first).unwrap();
    db.put_target(&second).unwrap();

    assert_eq!(gw.list_available(&prober).await.unwrap().len(), 2);

    gw.submit_probe(&prober, &first.id, Region::from("eu-west"), None)
        .await
        .unwrap();

    let available = gw.list_available(&prober).await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, second.id);

    // A different prober is unaffected.
    let other = ProberId::from("prober-2");
    assert_eq!(gw.list_available(&other).await.unwrap().len(), 2);
}

#[tokio::test]
async fn manual_probe_requires_owner_or_admin_and_is_unpaid() {
    let (db, _dir) = open_db();
    let email = RecordingEmail::new();
    let pipeline = spawn_pipeline(db.clone(), email, 5);
    let gw = gateway(&db, ScriptedRunner::always_ok(), &pipeline);

    let target = make_target(3, 1);
    db.put_target(&target).unwrap();

    assert!(matches!(
        gw.manual_probe(&target.id, &ProbeActor::owner("someone-else")).await,
        Err(VigilError::Unauthorized(_))
    ));

    let owned = gw
        .manual_probe(&target.id, &ProbeActor::owner("owner-1"))
        .await
        .unwrap();
    assert!(owned.success);
    assert_eq!(owned.region, Region::from("local"));
    assert!(owned.prober_id.is_none());

    let admin = gw
        .manual_probe(&target.id, &ProbeActor::admin("root"))
        .await
        .unwrap();
    assert!(admin.prober_id.is_none());

    // Manual probes never settle payments.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!db.get_check(&owned.id).unwrap().unwrap().payment_settled);
    assert!(!db.get_check(&admin.id).unwrap().unwrap().payment_settled);
}

#[tokio::test]
async fn failed_probe_outcomes_still_persist_as_checks() {
    let (db, _dir) = open_db();
    let email = RecordingEmail::new();
    let pipeline = spawn_pipeline(db.clone(), email, 5);
    let runner = ScriptedRunner::new(vec![common::ProbeScript::Fail(
        vigil_core::ProbeErrorKind::StatusMismatch,
    )]);
    let gw = gateway(&db, runner, &pipeline);

    let target = make_target(3, 1);
    db.put_target(&target).unwrap();
    let prober = ProberId::from("prober-1");

    let check = gw
        .submit_probe(&prober, &target.id, Region::from("eu-west"), None)
        .await
        .unwrap();
    assert!(!check.success);
    assert_eq!(check.error_kind, Some(vigil_core::ProbeErrorKind::StatusMismatch));

    // Failed checks from probers are still accepted and paid.
    wait_until("credit for failed check", || {
        db.get_wallet(&prober).unwrap().map(|w| w.balance) == Some(5)
    })
    .await;
}
