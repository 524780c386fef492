use serde::{Deserialize, Serialize};

/// Who initiated a probe. Replaces role-string dispatch with a typed value
/// checked at the engine boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    /// The scheduler itself.
    System,
    /// A roaming prober submitting through the gateway.
    Prober,
    /// The target's owner.
    Owner,
    /// Platform administrator.
    Admin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeActor {
    pub kind: ActorKind,
    /// Upstream identity; meaning depends on `kind` (prober id, owner id, …).
    pub id: String,
}

impl ProbeActor {
    pub fn system() -> Self {
        Self {
            kind: ActorKind::System,
            id: "system".to_string(),
        }
    }

    pub fn prober(id: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::Prober,
            id: id.into(),
        }
    }

    pub fn owner(id: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::Owner,
            id: id.into(),
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::Admin,
            id: id.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.kind == ActorKind::Admin
    }

    /// Only gateway submissions from real probers earn wallet credits.
    /// Scheduled system probes and owner/admin manual probes never do.
    pub fn is_payable(&self) -> bool {
        self.kind == ActorKind::Prober
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_probers_are_payable() {
        assert!(ProbeActor::prober("p1").is_payable());
        assert!(!ProbeActor::system().is_payable());
        assert!(!ProbeActor::owner("o1").is_payable());
        assert!(!ProbeActor::admin("a1").is_payable());
    }
}
