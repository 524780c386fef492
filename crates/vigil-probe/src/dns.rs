//! DNS probe: resolve the target hostname to any address record.

use std::time::{Duration, Instant};

use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;

use vigil_core::{CheckOutcome, ProbeErrorKind, Target};

pub async fn probe_dns(
    resolver: &TokioAsyncResolver,
    target: &Target,
    timeout: Duration,
) -> CheckOutcome {
    let start = Instant::now();
    let host = match super::tcp::target_host(target) {
        Ok(host) => host,
        Err(outcome) => return outcome,
    };

    match tokio::time::timeout(timeout, resolver.lookup_ip(host.as_str())).await {
        Err(_) => CheckOutcome::fail(
            ProbeErrorKind::Timeout,
            "resolver deadline exceeded",
            None,
            start.elapsed().as_millis() as u64,
        ),
        Ok(Ok(lookup)) => {
            let elapsed = start.elapsed().as_millis() as u64;
            if lookup.iter().next().is_some() {
                CheckOutcome::pass(None, elapsed)
            } else {
                CheckOutcome::fail(
                    ProbeErrorKind::Nxdomain,
                    format!("no address records for {host}"),
                    None,
                    elapsed,
                )
            }
        }
        Ok(Err(e)) => {
            let elapsed = start.elapsed().as_millis() as u64;
            let kind = match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => ProbeErrorKind::Nxdomain,
                ResolveErrorKind::Timeout => ProbeErrorKind::Timeout,
                _ => ProbeErrorKind::Servfail,
            };
            CheckOutcome::fail(kind, e.to_string(), None, elapsed)
        }
    }
}
