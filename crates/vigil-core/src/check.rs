//! Check records and probe outcomes.
//!
//! A [`CheckOutcome`] is what a probe executor returns — executors never fail,
//! they categorize. A [`Check`] is the immutable persisted record built from
//! an outcome by the result processor; only its `payment_settled` flag may
//! transition, false → true, exactly once.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{CheckId, OwnerId, ProberId, Region, TargetId, TimestampMs};

// ── ProbeErrorKind ───────────────────────────────────────────────────────────

/// Failure categories recorded on unsuccessful checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    /// HTTP responded, but not with the expected status.
    StatusMismatch,
    /// Connection-level failure (refused, reset, unreachable).
    Transport,
    /// TLS failure during an http/https probe.
    Tls,
    /// Probe deadline exceeded.
    Timeout,
    /// Hostname did not resolve during an http probe.
    Dns,
    /// DNS probe: name does not exist.
    Nxdomain,
    /// DNS probe: resolver failure other than nxdomain.
    Servfail,
    /// Certificate probe: peer certificate is past `not_after`.
    CertExpired,
    /// Certificate probe: chain does not validate to a trusted root.
    CertUntrusted,
    /// Certificate probe: bad or unsupported signature.
    CertSignature,
    /// Certificate probe: handshake did not finish within the deadline.
    HandshakeTimeout,
    /// Scheduled slot skipped because the previous probe was still running
    /// and then failed.
    Overrun,
}

impl ProbeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeErrorKind::StatusMismatch => "status_mismatch",
            ProbeErrorKind::Transport => "transport",
            ProbeErrorKind::Tls => "tls",
            ProbeErrorKind::Timeout => "timeout",
            ProbeErrorKind::Dns => "dns",
            ProbeErrorKind::Nxdomain => "nxdomain",
            ProbeErrorKind::Servfail => "servfail",
            ProbeErrorKind::CertExpired => "cert_expired",
            ProbeErrorKind::CertUntrusted => "cert_untrusted",
            ProbeErrorKind::CertSignature => "cert_signature",
            ProbeErrorKind::HandshakeTimeout => "handshake_timeout",
            ProbeErrorKind::Overrun => "overrun",
        }
    }
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── CheckOutcome ─────────────────────────────────────────────────────────────

/// Raw result of a single probe attempt. `response_time_ms` is wall-clock
/// from the call site and is populated on failures too.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub error_kind: Option<ProbeErrorKind>,
    pub error_message: Option<String>,
}

impl CheckOutcome {
    pub fn pass(status_code: Option<u16>, response_time_ms: u64) -> Self {
        Self {
            success: true,
            status_code,
            response_time_ms,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn fail(
        kind: ProbeErrorKind,
        message: impl Into<String>,
        status_code: Option<u16>,
        response_time_ms: u64,
    ) -> Self {
        Self {
            success: false,
            status_code,
            response_time_ms,
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }
}

// ── LocationDetails ──────────────────────────────────────────────────────────

/// Optional geographic enrichment supplied by a roaming prober, carried
/// end-to-end from submission to notification.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationDetails {
    pub city: Option<String>,
    pub country: Option<String>,
    /// (latitude, longitude)
    pub coords: Option<(f64, f64)>,
    pub ip: Option<String>,
}

impl LocationDetails {
    /// "City, Country" with absent fields rendered as "Unknown".
    pub fn label(&self) -> String {
        let city = self.city.as_deref().unwrap_or("Unknown");
        let country = self.country.as_deref().unwrap_or("Unknown");
        format!("{city}, {country}")
    }

    /// "lat, lon" or "Unknown".
    pub fn coords_label(&self) -> String {
        match self.coords {
            Some((lat, lon)) => format!("{lat}, {lon}"),
            None => "Unknown".to_string(),
        }
    }
}

// ── Check ────────────────────────────────────────────────────────────────────

/// Persisted record of one probe outcome. Immutable once written, apart from
/// the `payment_settled` flag.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Check {
    pub id: CheckId,
    pub target_id: TargetId,
    pub owner_id: OwnerId,
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub error_kind: Option<ProbeErrorKind>,
    pub error_message: Option<String>,
    pub region: Region,
    pub location: Option<LocationDetails>,
    /// Set only for gateway submissions — the identity that gets paid.
    pub prober_id: Option<ProberId>,
    pub timestamp: TimestampMs,
    pub payment_settled: bool,
}

impl Check {
    pub fn from_outcome(
        target_id: TargetId,
        owner_id: OwnerId,
        region: Region,
        outcome: &CheckOutcome,
        prober_id: Option<ProberId>,
        location: Option<LocationDetails>,
        timestamp: TimestampMs,
    ) -> Self {
        Self {
            id: CheckId::random(),
            target_id,
            owner_id,
            success: outcome.success,
            status_code: outcome.status_code,
            response_time_ms: outcome.response_time_ms,
            error_kind: outcome.error_kind,
            error_message: outcome.error_message.clone(),
            region,
            location,
            prober_id,
            timestamp,
            payment_settled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_strings_are_snake_case() {
        assert_eq!(ProbeErrorKind::StatusMismatch.as_str(), "status_mismatch");
        assert_eq!(ProbeErrorKind::CertExpired.as_str(), "cert_expired");
        assert_eq!(ProbeErrorKind::HandshakeTimeout.as_str(), "handshake_timeout");
    }

    #[test]
    fn location_label_renders_unknown_for_missing_fields() {
        let loc = LocationDetails {
            city: Some("Lagos".into()),
            ..Default::default()
        };
        assert_eq!(loc.label(), "Lagos, Unknown");
        assert_eq!(loc.coords_label(), "Unknown");
    }

    #[test]
    fn failed_outcome_always_carries_a_message() {
        let o = CheckOutcome::fail(ProbeErrorKind::Timeout, "deadline exceeded", None, 5_000);
        assert!(!o.success);
        assert!(o.error_message.is_some());
        assert_eq!(o.response_time_ms, 5_000);
    }
}
