use thiserror::Error;

/// Error taxonomy surfaced at the engine boundary.
///
/// Probe-level failures are never errors here — they become persisted checks
/// with `success = false`. These variants cover the operations a caller can
/// invoke: target management, submissions, stats and incident reads.
#[derive(Debug, Error)]
pub enum VigilError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("submission within cooldown; retry in {retry_after_secs}s")]
    Conflict { retry_after_secs: u64 },

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl VigilError {
    /// True for outages a caller may retry (store or transport trouble).
    pub fn is_retryable(&self) -> bool {
        matches!(self, VigilError::Unavailable(_))
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        VigilError::NotFound(what.to_string())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        VigilError::Invalid(msg.into())
    }
}
