//! Engine configuration.
//!
//! Every field carries a serde default so an empty JSON object (or a missing
//! file) yields a working configuration. The node binary loads this from
//! `vigil.json` and applies CLI overrides on top.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ALERT_THRESHOLD, DEFAULT_COOLDOWN_SECS, DEFAULT_INTERVAL_FLOOR_SECS,
    DEFAULT_PAYMENT_PER_CHECK, DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_PROCESSOR_SHARDS,
    DEFAULT_RECOVERY_THRESHOLD, DEFAULT_REGIONS, DEFAULT_RETENTION_DAYS,
    DEFAULT_SHUTDOWN_GRACE_SECS,
};

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_payment() -> u64 {
    DEFAULT_PAYMENT_PER_CHECK
}
fn default_cooldown() -> u64 {
    DEFAULT_COOLDOWN_SECS
}
fn default_alert_threshold() -> u32 {
    DEFAULT_ALERT_THRESHOLD
}
fn default_recovery_threshold() -> u32 {
    DEFAULT_RECOVERY_THRESHOLD
}
fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}
fn default_interval_floor() -> u32 {
    DEFAULT_INTERVAL_FLOOR_SECS
}
fn default_executor_concurrency() -> usize {
    64.max(2 * num_cpus::get())
}
fn default_processor_shards() -> usize {
    DEFAULT_PROCESSOR_SHARDS
}
fn default_true() -> bool {
    true
}
fn default_shutdown_grace() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}
fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}
fn default_regions() -> Vec<String> {
    DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect()
}

// ── SmtpConfig ───────────────────────────────────────────────────────────────

/// SMTP relay settings for the email alert path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay hostname, e.g. "smtp.example.com".
    pub relay: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// From address on outgoing alerts.
    pub from: String,
}

// ── EngineConfig ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Credit per accepted prober check, in minor currency units.
    #[serde(default = "default_payment")]
    pub payment_per_check_minor_units: u64,

    /// Per (prober, target) submission cooldown in seconds.
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,

    /// Default consecutive-failure threshold for new targets.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold_default: u32,

    /// Default consecutive-success threshold for closing incidents.
    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold_default: u32,

    /// Probe deadline when a target does not set one (milliseconds).
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms_default: u64,

    /// Minimum allowed probe interval (seconds).
    #[serde(default = "default_interval_floor")]
    pub interval_floor_seconds: u32,

    /// Bounded size of the probe executor pool.
    #[serde(default = "default_executor_concurrency")]
    pub executor_concurrency: usize,

    /// Result-processor shard count. Results are routed by target id hash so
    /// each target is always processed by the same single-writer worker.
    #[serde(default = "default_processor_shards")]
    pub processor_shards: usize,

    /// When false, alerts still reach the push channel but email is a no-op.
    #[serde(default = "default_true")]
    pub email_enabled: bool,

    /// SMTP settings; required only when `email_enabled` and a real sender
    /// is wired in.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,

    /// Grace period for in-flight probes on shutdown (seconds).
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,

    /// Checks older than this many days are pruned.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Region tags accepted on targets.
    #[serde(default = "default_regions")]
    pub known_regions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        // Round-trips through serde so the defaults live in one place.
        serde_json::from_str("{}").expect("empty config must deserialize")
    }
}
