//! Monitored targets: what to probe, how often, from where, and when to alert.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::VigilError;
use crate::types::{OwnerId, Region, TargetId, TimestampMs};

// ── ProbeKind ────────────────────────────────────────────────────────────────

/// Protocol used to probe a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Http,
    Https,
    Dns,
    Ssl,
    Tcp,
    Ping,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Http => "http",
            ProbeKind::Https => "https",
            ProbeKind::Dns => "dns",
            ProbeKind::Ssl => "ssl",
            ProbeKind::Tcp => "tcp",
            ProbeKind::Ping => "ping",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProbeKind {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(ProbeKind::Http),
            "https" => Ok(ProbeKind::Https),
            "dns" => Ok(ProbeKind::Dns),
            "ssl" => Ok(ProbeKind::Ssl),
            "tcp" => Ok(ProbeKind::Tcp),
            "ping" => Ok(ProbeKind::Ping),
            other => Err(VigilError::invalid(format!("unknown probe kind: {other}"))),
        }
    }
}

// ── Target ───────────────────────────────────────────────────────────────────

/// A monitored endpoint as stored in the target tree.
///
/// No mutable "current status" lives here — status is always derived from the
/// latest check and the incident store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub owner_id: OwnerId,
    /// Human-readable name used in alerts.
    pub name: String,
    pub url: String,
    pub kind: ProbeKind,
    /// Seconds between scheduled probes per region.
    pub interval_secs: u32,
    /// Probe deadline in milliseconds. Must stay below the interval.
    pub timeout_ms: u64,
    /// HTTP status the http/https probe expects.
    pub expected_status: u16,
    pub active: bool,
    /// Regions the scheduler fans probes out to. Never empty.
    pub regions: Vec<Region>,
    /// Consecutive failures required to open an incident.
    pub alert_threshold: u32,
    /// Consecutive successes required to close one.
    pub recovery_threshold: u32,
    /// Extra alert recipients besides the owner.
    pub alert_contacts: Vec<String>,
    /// Owner's alert address, captured from the upstream account record.
    pub owner_email: Option<String>,
    pub created_at: TimestampMs,
    /// Bumped on every update; lets the scheduler detect stale queue entries.
    pub version: u64,
}

impl Target {
    pub fn new(owner_id: OwnerId, spec: TargetSpec, now: TimestampMs) -> Self {
        Self {
            id: TargetId::random(),
            owner_id,
            name: spec.name,
            url: spec.url,
            kind: spec.kind,
            interval_secs: spec.interval_secs,
            timeout_ms: spec.timeout_ms,
            expected_status: spec.expected_status,
            active: true,
            regions: spec.regions,
            alert_threshold: spec.alert_threshold,
            recovery_threshold: spec.recovery_threshold,
            alert_contacts: spec.alert_contacts,
            owner_email: spec.owner_email,
            created_at: now,
            version: 1,
        }
    }

    /// Parsed form of the target URL. Valid by construction — creation and
    /// update both run [`TargetSpec::validate`] first.
    pub fn parsed_url(&self) -> Result<Url, VigilError> {
        Url::parse(&self.url).map_err(|e| VigilError::invalid(format!("target url: {e}")))
    }

    /// Apply an update in place and bump the version.
    pub fn apply(&mut self, update: TargetUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(url) = update.url {
            self.url = url;
        }
        if let Some(interval) = update.interval_secs {
            self.interval_secs = interval;
        }
        if let Some(timeout) = update.timeout_ms {
            self.timeout_ms = timeout;
        }
        if let Some(status) = update.expected_status {
            self.expected_status = status;
        }
        if let Some(regions) = update.regions {
            self.regions = regions;
        }
        if let Some(threshold) = update.alert_threshold {
            self.alert_threshold = threshold;
        }
        if let Some(threshold) = update.recovery_threshold {
            self.recovery_threshold = threshold;
        }
        if let Some(contacts) = update.alert_contacts {
            self.alert_contacts = contacts;
        }
        self.version += 1;
    }
}

// ── TargetSpec ───────────────────────────────────────────────────────────────

/// Caller-supplied definition for a new target.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    pub url: String,
    pub kind: ProbeKind,
    pub interval_secs: u32,
    pub timeout_ms: u64,
    pub expected_status: u16,
    pub regions: Vec<Region>,
    pub alert_threshold: u32,
    pub recovery_threshold: u32,
    pub alert_contacts: Vec<String>,
    pub owner_email: Option<String>,
}

impl TargetSpec {
    /// Validate against engine policy. `known_regions` is the operator's
    /// configured region set.
    pub fn validate(&self, interval_floor_secs: u32, known_regions: &[String]) -> Result<(), VigilError> {
        let url = Url::parse(&self.url)
            .map_err(|e| VigilError::invalid(format!("unparseable url {:?}: {e}", self.url)))?;
        if url.host_str().is_none() {
            return Err(VigilError::invalid(format!("url {:?} has no host", self.url)));
        }
        if self.interval_secs < interval_floor_secs {
            return Err(VigilError::invalid(format!(
                "interval {}s below floor {}s",
                self.interval_secs, interval_floor_secs
            )));
        }
        if self.timeout_ms >= self.interval_secs as u64 * 1_000 {
            return Err(VigilError::invalid(format!(
                "timeout {}ms must be below interval {}s",
                self.timeout_ms, self.interval_secs
            )));
        }
        if self.regions.is_empty() {
            return Err(VigilError::invalid("at least one region required"));
        }
        for region in &self.regions {
            if !known_regions.iter().any(|r| r == region.as_str()) {
                return Err(VigilError::invalid(format!("unknown region: {region}")));
            }
        }
        if self.alert_threshold < 1 {
            return Err(VigilError::invalid("alert threshold must be at least 1"));
        }
        if self.recovery_threshold < 1 {
            return Err(VigilError::invalid("recovery threshold must be at least 1"));
        }
        Ok(())
    }
}

// ── TargetUpdate ─────────────────────────────────────────────────────────────

/// Partial update; `None` fields are left untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TargetUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub interval_secs: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub expected_status: Option<u16>,
    pub regions: Option<Vec<Region>>,
    pub alert_threshold: Option<u32>,
    pub recovery_threshold: Option<u32>,
    pub alert_contacts: Option<Vec<String>>,
}
