use serde::{Deserialize, Serialize};

use crate::types::{CheckId, MinorUnits, ProberId, TimestampMs};

/// One append-only wallet credit, keyed by the check it pays for.
/// A check id appears in a prober's ledger at most once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub check_id: CheckId,
    pub amount: MinorUnits,
    pub credited_at: TimestampMs,
}

/// A prober's wallet. `balance` always equals the sum of ledger amounts —
/// the store updates both inside one transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProberWallet {
    pub prober_id: ProberId,
    pub balance: MinorUnits,
    pub created_at: TimestampMs,
}

impl ProberWallet {
    pub fn new(prober_id: ProberId, now: TimestampMs) -> Self {
        Self {
            prober_id,
            balance: 0,
            created_at: now,
        }
    }
}

/// Result of a credit attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreditResult {
    /// The ledger entry was written and the balance increased.
    Applied,
    /// The check id was already in the ledger; nothing changed.
    Duplicate,
}
