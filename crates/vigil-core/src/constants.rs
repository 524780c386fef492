//! ─── Vigil Engine Constants ─────────────────────────────────────────────────
//!
//! Defaults for scheduling, alerting, payment and retention. Most of these
//! are the fallback values behind [`crate::config::EngineConfig`]; a few
//! (redirect limit, backoff bounds) are fixed engine policy.

// ── Payment ──────────────────────────────────────────────────────────────────

/// Credit per accepted prober check, in minor currency units.
pub const DEFAULT_PAYMENT_PER_CHECK: u64 = 5;

/// Wallet-credit attempts before a check is left permanently unsettled.
pub const PAYMENT_RETRY_ATTEMPTS: u32 = 3;

// ── Submission gateway ───────────────────────────────────────────────────────

/// Per (prober, target) re-submission cooldown (seconds).
pub const DEFAULT_COOLDOWN_SECS: u64 = 300;

// ── Incident state machine ───────────────────────────────────────────────────

/// Consecutive failures required to open an incident.
pub const DEFAULT_ALERT_THRESHOLD: u32 = 3;

/// Consecutive successes required to close an incident.
pub const DEFAULT_RECOVERY_THRESHOLD: u32 = 1;

// ── Scheduling ───────────────────────────────────────────────────────────────

/// Probe deadline when a target does not specify one (milliseconds).
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 30_000;

/// Minimum allowed probe interval (seconds).
pub const DEFAULT_INTERVAL_FLOOR_SECS: u32 = 60;

/// Scheduler driver tick (milliseconds). Due entries are popped at this
/// granularity, so drift per cycle is bounded by one tick.
pub const SCHEDULER_TICK_MS: u64 = 1_000;

/// Scheduler backoff on store failure: base and cap (seconds).
pub const SCHEDULER_BACKOFF_BASE_SECS: u64 = 1;
pub const SCHEDULER_BACKOFF_CAP_SECS: u64 = 60;

/// Result-processor shard count default.
pub const DEFAULT_PROCESSOR_SHARDS: usize = 16;

/// Region tag used for owner/admin manual probes run in-process.
pub const LOCAL_REGION: &str = "local";

// ── Probes ───────────────────────────────────────────────────────────────────

/// Maximum redirects followed by the HTTP probe; the final response decides
/// the observed status code.
pub const HTTP_REDIRECT_LIMIT: usize = 5;

// ── Notifier ─────────────────────────────────────────────────────────────────

/// Delivery retry schedule (seconds). Length bounds the attempt count.
pub const ALERT_RETRY_SCHEDULE_SECS: [u64; 4] = [1, 4, 16, 60];

// ── Shutdown & retention ─────────────────────────────────────────────────────

/// Grace period for in-flight probes on shutdown (seconds).
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Checks older than this are pruned (days).
pub const DEFAULT_RETENTION_DAYS: u32 = 90;

// ── Regions ──────────────────────────────────────────────────────────────────

/// Builtin region tags accepted on targets when the operator does not
/// configure their own set.
pub const DEFAULT_REGIONS: [&str; 8] = [
    "us-east",
    "us-west",
    "eu-west",
    "eu-central",
    "ap-south",
    "ap-southeast",
    "sa-east",
    "af-south",
];
