//! Bounded resubmission of ledger transactions

use std::future::Future;

use agora_ledger::TxReceipt;
use tracing::warn;

use crate::{OrchestratorConfig, OrderError, Result, Step};

/// Submit a transaction, resubmitting it unchanged on transport errors.
///
/// At most `config.max_attempts` submissions are made. A mined receipt is
/// returned as-is whatever its status; rejections are never retried.
pub async fn submit_with_retry<F, Fut>(step: Step, config: &OrchestratorConfig, mut submit: F) -> Result<TxReceipt>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = agora_ledger::Result<TxReceipt>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match submit().await {
            Ok(receipt) => return Ok(receipt),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                warn!(%step, attempt, max_attempts, error = %err, "Ledger submission failed, retrying");
                tokio::time::sleep(config.retry_delay()).await;
            }
            Err(err) => {
                return Err(OrderError::Ledger {
                    step,
                    attempts: attempt,
                    source: err,
                })
            }
        }
    }
}
