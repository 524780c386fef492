//! HTTP, HTTPS and ping probes.
//!
//! The http/https probe issues a GET, follows at most
//! [`vigil_core::HTTP_REDIRECT_LIMIT`] redirects and compares the final
//! status against the target's `expected_status`; a non-matching status is a
//! failed check, never an error. The ping probe issues a HEAD and only asks
//! whether the endpoint answered at all.

use std::time::{Duration, Instant};

use vigil_core::{CheckOutcome, ProbeErrorKind, Target};

pub async fn probe_http(client: &reqwest::Client, target: &Target, timeout: Duration) -> CheckOutcome {
    let start = Instant::now();
    let result = client.get(&target.url).timeout(timeout).send().await;
    let elapsed = start.elapsed().as_millis() as u64;

    match result {
        Ok(response) => {
            let status = response.status().as_u16();
            if status == target.expected_status {
                CheckOutcome::pass(Some(status), elapsed)
            } else {
                CheckOutcome::fail(
                    ProbeErrorKind::StatusMismatch,
                    format!("expected status {}, got {status}", target.expected_status),
                    Some(status),
                    elapsed,
                )
            }
        }
        Err(e) => classify_http_error(&e, elapsed),
    }
}

/// Reachability probe: HEAD within the deadline, any response counts.
pub async fn probe_ping(client: &reqwest::Client, target: &Target, timeout: Duration) -> CheckOutcome {
    let start = Instant::now();
    let result = client.head(&target.url).timeout(timeout).send().await;
    let elapsed = start.elapsed().as_millis() as u64;

    match result {
        Ok(response) => CheckOutcome::pass(Some(response.status().as_u16()), elapsed),
        Err(e) => classify_http_error(&e, elapsed),
    }
}

/// Map a reqwest error onto the http probe taxonomy:
/// timeout, tls, dns or transport.
fn classify_http_error(e: &reqwest::Error, elapsed: u64) -> CheckOutcome {
    if e.is_timeout() {
        return CheckOutcome::fail(ProbeErrorKind::Timeout, "probe deadline exceeded", None, elapsed);
    }
    if e.is_redirect() {
        return CheckOutcome::fail(
            ProbeErrorKind::Transport,
            "redirect limit exceeded",
            None,
            elapsed,
        );
    }

    let message = root_cause(e);
    let kind = if chain_has_tls_error(e) || message.contains("certificate") {
        ProbeErrorKind::Tls
    } else if message.contains("dns error") || message.contains("failed to lookup address") {
        ProbeErrorKind::Dns
    } else {
        ProbeErrorKind::Transport
    };
    CheckOutcome::fail(kind, message, None, elapsed)
}

/// Walk the source chain looking for a rustls error.
fn chain_has_tls_error(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(inner) = source {
        if inner.downcast_ref::<rustls::Error>().is_some() {
            return true;
        }
        source = inner.source();
    }
    false
}

/// Innermost error message — the useful one for operators.
fn root_cause(e: &(dyn std::error::Error + 'static)) -> String {
    let mut current: &(dyn std::error::Error + 'static) = e;
    while let Some(inner) = current.source() {
        current = inner;
    }
    current.to_string()
}
