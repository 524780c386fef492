use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Unix timestamp in milliseconds, UTC. The engine's canonical clock unit:
/// check timestamps, incident bounds and cooldown marks all use it.
pub type TimestampMs = i64;

/// Wallet amounts in minor currency units (e.g. cents).
pub type MinorUnits = u64;

// ── Entity identifiers ───────────────────────────────────────────────────────

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn random() -> Self {
                let mut bytes = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut bytes);
                Self(bytes)
            }

            pub fn from_bytes(b: [u8; 16]) -> Self {
                Self(b)
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                if bytes.len() != 16 {
                    return Err(hex::FromHexError::InvalidStringLength);
                }
                let mut arr = [0u8; 16];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "({}…)"), &self.to_hex()[..8])
            }
        }
    };
}

entity_id!(
    /// 16-byte random identifier for a monitored target.
    TargetId,
    "TargetId"
);

entity_id!(
    /// 16-byte random identifier for a persisted check record.
    CheckId,
    "CheckId"
);

entity_id!(
    /// 16-byte random identifier for an outage incident.
    IncidentId,
    "IncidentId"
);

// ── Upstream principals ──────────────────────────────────────────────────────

/// Opaque owner identity issued by the upstream auth layer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Debug)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque prober identity issued by the upstream auth layer.
/// Wallets and cooldowns are keyed by it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Debug)]
pub struct ProberId(pub String);

impl ProberId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Region ───────────────────────────────────────────────────────────────────

/// Location tag describing where a probe was initiated (e.g. "eu-west").
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Debug)]
pub struct Region(pub String);

impl Region {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Region {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

static LAST_MS: AtomicI64 = AtomicI64::new(0);

/// Current wall-clock time in milliseconds since the Unix epoch, made
/// strictly monotonic across calls: rapid successive events in one process
/// never share or regress a timestamp, which the per-(target, region)
/// ordering of checks relies on.
pub fn now_ms() -> TimestampMs {
    let wall = chrono::Utc::now().timestamp_millis();
    let mut last = LAST_MS.load(Ordering::Relaxed);
    loop {
        let next = wall.max(last + 1);
        match LAST_MS.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}
