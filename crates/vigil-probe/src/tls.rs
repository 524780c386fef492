//! TLS certificate probe.
//!
//! Performs a real handshake against `host:port` (port from the URL, 443 by
//! default). Success means the handshake completed, the chain validated
//! against the webpki root store, and the leaf certificate's `not_after` lies
//! in the future. Failures are split into the certificate categories the
//! incident reason field exposes to owners.

use std::time::{Duration, Instant};

use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use vigil_core::{CheckOutcome, ProbeErrorKind, Target};

pub async fn probe_certificate(
    connector: &TlsConnector,
    target: &Target,
    timeout: Duration,
) -> CheckOutcome {
    let start = Instant::now();
    let host = match super::tcp::target_host(target) {
        Ok(host) => host,
        Err(outcome) => return outcome,
    };
    let port = match url::Url::parse(&target.url).ok().and_then(|u| u.port()) {
        Some(port) => port,
        None => 443,
    };

    let tcp = match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await
    {
        Err(_) => {
            return CheckOutcome::fail(
                ProbeErrorKind::HandshakeTimeout,
                format!("connect to {host}:{port} timed out"),
                None,
                start.elapsed().as_millis() as u64,
            )
        }
        Ok(Err(e)) => {
            return CheckOutcome::fail(
                ProbeErrorKind::Transport,
                format!("connect to {host}:{port} failed: {e}"),
                None,
                start.elapsed().as_millis() as u64,
            )
        }
        Ok(Ok(stream)) => stream,
    };

    let server_name = match ServerName::try_from(host.clone()) {
        Ok(name) => name,
        Err(e) => {
            return CheckOutcome::fail(
                ProbeErrorKind::Transport,
                format!("invalid server name {host:?}: {e}"),
                None,
                start.elapsed().as_millis() as u64,
            )
        }
    };

    let remaining = timeout.saturating_sub(start.elapsed());
    match tokio::time::timeout(remaining, connector.connect(server_name, tcp)).await {
        Err(_) => CheckOutcome::fail(
            ProbeErrorKind::HandshakeTimeout,
            "tls handshake did not finish within the deadline",
            None,
            start.elapsed().as_millis() as u64,
        ),
        Ok(Err(io_err)) => {
            let elapsed = start.elapsed().as_millis() as u64;
            let (kind, message) = match io_err
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<rustls::Error>())
            {
                Some(tls_err) => classify_handshake_error(tls_err),
                None => (
                    ProbeErrorKind::Transport,
                    format!("handshake failed: {io_err}"),
                ),
            };
            CheckOutcome::fail(kind, message, None, elapsed)
        }
        Ok(Ok(stream)) => {
            let elapsed = start.elapsed().as_millis() as u64;
            // rustls already enforced validity, but read the leaf's not_after
            // so an expired-but-accepted edge (skewed clocks, custom roots)
            // still fails the probe.
            let (_, session) = stream.get_ref();
            if let Some(certs) = session.peer_certificates() {
                if let Some(leaf) = certs.first() {
                    if let Some(not_after) = leaf_not_after(leaf.as_ref()) {
                        let now = chrono::Utc::now().timestamp();
                        if not_after <= now {
                            return CheckOutcome::fail(
                                ProbeErrorKind::CertExpired,
                                format!("certificate expired at unix {not_after}"),
                                None,
                                elapsed,
                            );
                        }
                    }
                }
            }
            CheckOutcome::pass(None, elapsed)
        }
    }
}

/// Map a rustls handshake error onto the certificate probe taxonomy.
pub fn classify_handshake_error(e: &rustls::Error) -> (ProbeErrorKind, String) {
    use rustls::CertificateError;

    match e {
        rustls::Error::InvalidCertificate(cert_err) => {
            let kind = match cert_err {
                CertificateError::Expired => ProbeErrorKind::CertExpired,
                CertificateError::BadSignature => ProbeErrorKind::CertSignature,
                // UnknownIssuer, NotValidForName, Revoked, NotValidYet, …
                _ => ProbeErrorKind::CertUntrusted,
            };
            (kind, format!("invalid certificate: {cert_err:?}"))
        }
        other => (ProbeErrorKind::Transport, format!("handshake failed: {other}")),
    }
}

/// `not_after` of a DER certificate as unix seconds, if it parses.
fn leaf_not_after(der: &[u8]) -> Option<i64> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;
    Some(cert.validity().not_after.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::CertificateError;

    #[test]
    fn expired_certificates_map_to_cert_expired() {
        let (kind, _) =
            classify_handshake_error(&rustls::Error::InvalidCertificate(CertificateError::Expired));
        assert_eq!(kind, ProbeErrorKind::CertExpired);
    }

    #[test]
    fn unknown_issuer_maps_to_cert_untrusted() {
        let (kind, _) = classify_handshake_error(&rustls::Error::InvalidCertificate(
            CertificateError::UnknownIssuer,
        ));
        assert_eq!(kind, ProbeErrorKind::CertUntrusted);
    }

    #[test]
    fn bad_signature_maps_to_cert_signature() {
        let (kind, _) = classify_handshake_error(&rustls::Error::InvalidCertificate(
            CertificateError::BadSignature,
        ));
        assert_eq!(kind, ProbeErrorKind::CertSignature);
    }

    #[test]
    fn non_certificate_errors_map_to_transport() {
        let (kind, _) = classify_handshake_error(&rustls::Error::HandshakeNotComplete);
        assert_eq!(kind, ProbeErrorKind::Transport);
    }
}
