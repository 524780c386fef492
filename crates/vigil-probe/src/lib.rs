//! Probe executors, one per probe kind.
//!
//! An executor maps `(Target, deadline)` to a [`CheckOutcome`] and never
//! fails: every transport problem, timeout or protocol surprise is
//! categorized into a `ProbeErrorKind`. `response_time_ms` is wall-clock from
//! the call site, populated on failures too.

pub mod dns;
pub mod http;
pub mod tcp;
pub mod tls;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tokio_rustls::TlsConnector;
use tracing::trace;

use vigil_core::{CheckOutcome, ProbeKind, Target, VigilError, HTTP_REDIRECT_LIMIT};

/// The probing seam between the scheduler/gateway and the network.
/// Production uses [`ProbeExecutor`]; tests script outcomes.
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    async fn run(&self, target: &Target, timeout: Duration) -> CheckOutcome;
}

/// Production executor. Holds one HTTP client, one resolver and one TLS
/// connector shared across all probes.
pub struct ProbeExecutor {
    http: reqwest::Client,
    resolver: TokioAsyncResolver,
    tls: TlsConnector,
}

impl ProbeExecutor {
    pub fn new() -> Result<Self, VigilError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(HTTP_REDIRECT_LIMIT))
            .user_agent(concat!("vigil-probe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VigilError::Internal(format!("building http client: {e}")))?;

        let resolver =
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let tls = TlsConnector::from(Arc::new(tls_config));

        Ok(Self { http, resolver, tls })
    }
}

#[async_trait]
impl ProbeRunner for ProbeExecutor {
    async fn run(&self, target: &Target, timeout: Duration) -> CheckOutcome {
        let outcome = match target.kind {
            ProbeKind::Http | ProbeKind::Https => {
                http::probe_http(&self.http, target, timeout).await
            }
            ProbeKind::Ping => http::probe_ping(&self.http, target, timeout).await,
            ProbeKind::Dns => dns::probe_dns(&self.resolver, target, timeout).await,
            ProbeKind::Ssl => tls::probe_certificate(&self.tls, target, timeout).await,
            ProbeKind::Tcp => tcp::probe_tcp(target, timeout).await,
        };
        trace!(
            target = %target.id,
            kind = %target.kind,
            success = outcome.success,
            response_ms = outcome.response_time_ms,
            "probe finished"
        );
        outcome
    }
}
