//! Per-check micro-payment dispatcher.
//!
//! Consumes credit tasks emitted by the result processor for gateway
//! submissions. Crediting is idempotent — the check id keys the ledger entry,
//! so a redelivered task is a no-op. Wallet trouble is retried a bounded
//! number of times; after that the check stays `payment_settled = false`
//! permanently and an operator alert goes out. Payment failures never fail
//! the probe pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use vigil_core::{now_ms, CheckId, MinorUnits, ProberId, VigilError, PAYMENT_RETRY_ATTEMPTS};
use vigil_store::{CheckStore, WalletStore};

use crate::push::{PushChannel, PushMessage, PushPayload, TOPIC_OPERATOR_ALERT};

#[derive(Clone, Debug)]
pub struct CreditTask {
    pub check_id: CheckId,
    pub prober_id: ProberId,
}

pub fn spawn(
    mut rx: mpsc::Receiver<CreditTask>,
    wallets: Arc<dyn WalletStore>,
    checks: Arc<dyn CheckStore>,
    push: Arc<dyn PushChannel>,
    amount: MinorUnits,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(task) = rx.recv().await {
            if let Err(e) = credit(&task, &*wallets, &*checks, amount).await {
                error!(
                    check = %task.check_id,
                    prober = %task.prober_id,
                    error = %e,
                    "wallet credit exhausted retries; check left unsettled"
                );
                push.publish(PushMessage {
                    topic: TOPIC_OPERATOR_ALERT.into(),
                    payload: PushPayload {
                        target_id: String::new(),
                        status: "payment_failed".into(),
                        response_time_ms: None,
                        region: String::new(),
                        timestamp: now_ms(),
                        reason: Some(format!(
                            "check {} for prober {}: {e}",
                            task.check_id, task.prober_id
                        )),
                    },
                });
            }
        }
        info!("payment dispatcher stopped");
    })
}

async fn credit(
    task: &CreditTask,
    wallets: &dyn WalletStore,
    checks: &dyn CheckStore,
    amount: MinorUnits,
) -> Result<(), VigilError> {
    let mut last_err = None;
    for attempt in 0..PAYMENT_RETRY_ATTEMPTS {
        match wallets.credit(&task.prober_id, &task.check_id, amount, now_ms()) {
            Ok(result) => {
                debug!(
                    check = %task.check_id,
                    prober = %task.prober_id,
                    ?result,
                    "wallet credit"
                );
                // Settle the flag after the ledger write; `settle_payment`
                // returning false just means a redelivery already did it.
                if let Err(e) = checks.settle_payment(&task.check_id) {
                    warn!(check = %task.check_id, error = %e, "failed to settle payment flag");
                }
                return Ok(());
            }
            Err(e) if e.is_retryable() && attempt + 1 < PAYMENT_RETRY_ATTEMPTS => {
                warn!(
                    check = %task.check_id,
                    attempt = attempt + 1,
                    error = %e,
                    "wallet credit failed; retrying"
                );
                tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| VigilError::Internal("credit loop did not run".into())))
}
