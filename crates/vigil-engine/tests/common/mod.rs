//! Shared harness for the engine integration tests: a scripted probe runner,
//! a recording email sender, and the processor/notifier/payment pipeline
//! wired against a scratch database.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use vigil_core::{
    CheckOutcome, OwnerId, ProbeErrorKind, ProbeKind, Region, Target, TargetSpec, VigilError,
};
use vigil_engine::notifier::AlertEvent;
use vigil_engine::payment::CreditTask;
use vigil_engine::processor::{self, ProcessorDeps, ProcessorHandle};
use vigil_engine::{notifier, payment, EmailSender, PushChannel, PushHub};
use vigil_probe::ProbeRunner;
use vigil_store::MonitorDb;

// ── Scripted probe runner ────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum ProbeScript {
    Succeed,
    Fail(ProbeErrorKind),
    HangThenFail(Duration),
    HangThenSucceed(Duration),
}

pub struct ScriptedRunner {
    script: Mutex<VecDeque<ProbeScript>>,
}

impl ScriptedRunner {
    pub fn new(steps: Vec<ProbeScript>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
        })
    }

    /// Empty script: every probe succeeds instantly.
    pub fn always_ok() -> Arc<Self> {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl ProbeRunner for ScriptedRunner {
    async fn run(&self, _target: &Target, _timeout: Duration) -> CheckOutcome {
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ProbeScript::Succeed);
        match step {
            ProbeScript::Succeed => CheckOutcome::pass(Some(200), 10),
            ProbeScript::Fail(kind) => CheckOutcome::fail(kind, "scripted failure", None, 10),
            ProbeScript::HangThenFail(delay) => {
                tokio::time::sleep(delay).await;
                CheckOutcome::fail(ProbeErrorKind::Timeout, "scripted slow failure", None, 10)
            }
            ProbeScript::HangThenSucceed(delay) => {
                tokio::time::sleep(delay).await;
                CheckOutcome::pass(Some(200), 10)
            }
        }
    }
}

// ── Recording email sender ───────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingEmail {
    pub sent: Mutex<Vec<(Vec<String>, String, String)>>,
    /// Number of sends to fail before succeeding (retry testing).
    pub fail_first: AtomicU32,
}

impl RecordingEmail {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, s, _)| s.clone()).collect()
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), VigilError> {
        if self.fail_first.load(Ordering::SeqCst) > 0 {
            self.fail_first.fetch_sub(1, Ordering::SeqCst);
            return Err(VigilError::Unavailable("scripted smtp outage".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_vec(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

// ── Pipeline wiring ──────────────────────────────────────────────────────────

pub struct Pipeline {
    pub handle: ProcessorHandle,
    pub push: PushHub,
    /// Direct injection for idempotency tests.
    pub alert_tx: mpsc::Sender<AlertEvent>,
    pub credit_tx: mpsc::Sender<CreditTask>,
    pub tasks: Vec<JoinHandle<()>>,
}

/// Processor shards + notifier + payment dispatcher around `db`.
pub fn spawn_pipeline(db: Arc<MonitorDb>, email: Arc<RecordingEmail>, amount: u64) -> Pipeline {
    let push = PushHub::new(256);
    let push_port: Arc<dyn PushChannel> = Arc::new(push.clone());

    let (alert_tx, alert_rx) = mpsc::channel(64);
    let (credit_tx, credit_rx) = mpsc::channel(64);

    let (handle, mut tasks) = processor::spawn(
        4,
        ProcessorDeps {
            checks: db.clone(),
            incidents: db.clone(),
            alerts: alert_tx.clone(),
            credits: credit_tx.clone(),
            push: push_port.clone(),
        },
    );
    tasks.push(notifier::spawn(
        alert_rx,
        db.clone(),
        email,
        push_port.clone(),
        true,
    ));
    tasks.push(payment::spawn(credit_rx, db.clone(), db, push_port, amount));

    Pipeline {
        handle,
        push,
        alert_tx,
        credit_tx,
        tasks,
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub fn open_db() -> (Arc<MonitorDb>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(MonitorDb::open(dir.path()).unwrap());
    (db, dir)
}

pub fn target_spec() -> TargetSpec {
    TargetSpec {
        name: "example".into(),
        url: "https://example.com/health".into(),
        kind: ProbeKind::Https,
        interval_secs: 60,
        timeout_ms: 5_000,
        expected_status: 200,
        regions: vec![Region::from("eu-west")],
        alert_threshold: 3,
        recovery_threshold: 1,
        alert_contacts: vec!["ops@example.com".into()],
        owner_email: Some("owner@example.com".into()),
    }
}

pub fn make_target(alert_threshold: u32, recovery_threshold: u32) -> Target {
    let mut spec = target_spec();
    spec.alert_threshold = alert_threshold;
    spec.recovery_threshold = recovery_threshold;
    Target::new(OwnerId::from("owner-1"), spec, 0)
}

/// Poll a condition until it holds, failing after ~2s of simulated patience.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {what}");
}
