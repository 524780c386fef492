//! TCP connect probe.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use url::Url;

use vigil_core::{CheckOutcome, ProbeErrorKind, Target};

/// Hostname from the target URL, or a categorized failure outcome.
/// Targets are validated at creation so this only trips on corrupt records.
pub(crate) fn target_host(target: &Target) -> Result<String, CheckOutcome> {
    match Url::parse(&target.url) {
        Ok(url) => match url.host_str() {
            Some(host) => Ok(host.to_string()),
            None => Err(CheckOutcome::fail(
                ProbeErrorKind::Transport,
                format!("url {:?} has no host", target.url),
                None,
                0,
            )),
        },
        Err(e) => Err(CheckOutcome::fail(
            ProbeErrorKind::Transport,
            format!("unparseable url {:?}: {e}", target.url),
            None,
            0,
        )),
    }
}

/// Port from the URL, falling back to the scheme default (443 for https,
/// 80 otherwise).
pub(crate) fn target_port(target: &Target) -> u16 {
    Url::parse(&target.url)
        .ok()
        .and_then(|url| url.port_or_known_default())
        .unwrap_or(80)
}

pub async fn probe_tcp(target: &Target, timeout: Duration) -> CheckOutcome {
    let start = Instant::now();
    let host = match target_host(target) {
        Ok(host) => host,
        Err(outcome) => return outcome,
    };
    let port = target_port(target);

    match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await {
        Err(_) => CheckOutcome::fail(
            ProbeErrorKind::Timeout,
            format!("connect to {host}:{port} timed out"),
            None,
            start.elapsed().as_millis() as u64,
        ),
        Ok(Err(e)) => CheckOutcome::fail(
            ProbeErrorKind::Transport,
            format!("connect to {host}:{port} failed: {e}"),
            None,
            start.elapsed().as_millis() as u64,
        ),
        Ok(Ok(_stream)) => CheckOutcome::pass(None, start.elapsed().as_millis() as u64),
    }
}
