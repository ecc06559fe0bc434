use alloy::primitives::TxHash;
use batch_submitter_contract_interface::L1Client;
use batch_submitter_types::{SignedTx, TxReceipt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::{TxManagerConfig, TxManagerError};

/// Produces a signed transaction paying `gas_price`. Called once per broadcast attempt; every call
/// must reuse the same nonce.
#[async_trait::async_trait]
pub trait TxFactory: Send + Sync {
    async fn build_tx(&self, gas_price: u128) -> anyhow::Result<SignedTx>;
}

#[async_trait::async_trait]
impl<F, Fut> TxFactory for F
where
    F: Fn(u128) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<SignedTx>> + Send,
{
    async fn build_tx(&self, gas_price: u128) -> anyhow::Result<SignedTx> {
        self(gas_price).await
    }
}

/// Outcome of a successful [`TxManager::send()`] call.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub receipt: TxReceipt,
    /// Gas price of the attempt that got mined.
    pub gas_price: u128,
    /// Number of broadcast attempts, including failed ones.
    pub attempts: usize,
    /// Time from the first successful broadcast to confirmation.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    hash: TxHash,
    gas_price: u128,
}

/// State owned by a single `send` call.
#[derive(Debug)]
struct PendingSubmission {
    nonce: Option<u64>,
    gas_price: u128,
    /// Every successfully broadcast attempt, oldest first.
    submitted: Vec<Attempt>,
    broadcasts: usize,
    first_broadcast: Option<Instant>,
    deadline: Instant,
}

impl PendingSubmission {
    fn new(deadline: Instant) -> Self {
        Self {
            nonce: None,
            gas_price: 0,
            submitted: Vec::new(),
            broadcasts: 0,
            first_broadcast: None,
            deadline,
        }
    }

    fn finish(self, receipt: TxReceipt) -> Result<Confirmation, TxManagerError> {
        if !receipt.success {
            return Err(TxManagerError::Reverted(receipt.tx_hash));
        }
        let gas_price = self
            .submitted
            .iter()
            .find(|attempt| attempt.hash == receipt.tx_hash)
            .map_or(self.gas_price, |attempt| attempt.gas_price);
        Ok(Confirmation {
            receipt,
            gas_price,
            attempts: self.broadcasts,
            elapsed: self
                .first_broadcast
                .map_or(Duration::ZERO, |first| first.elapsed()),
        })
    }
}

#[derive(Debug)]
enum SendState {
    /// Picking the starting gas price.
    Init,
    /// Building and broadcasting an attempt at the current gas price.
    Broadcasting,
    /// Polling receipts of every attempt so far.
    Waiting { resubmit_at: Instant },
    Confirmed(TxReceipt),
}

/// Sends a transaction and keeps replacing it with higher priced copies until one of them is
/// confirmed.
#[derive(Debug)]
pub struct TxManager {
    config: TxManagerConfig,
    l1: Arc<dyn L1Client>,
}

impl TxManager {
    pub fn new(config: TxManagerConfig, l1: Arc<dyn L1Client>) -> Self {
        Self { config, l1 }
    }

    pub fn config(&self) -> &TxManagerConfig {
        &self.config
    }

    /// Returns as soon as any broadcast attempt is confirmed. On timeout or cancellation attempts
    /// already broadcast stay in the L1 mempool.
    pub async fn send(
        &self,
        factory: &dyn TxFactory,
        stop_receiver: &mut watch::Receiver<bool>,
    ) -> Result<Confirmation, TxManagerError> {
        let mut pending =
            PendingSubmission::new(Instant::now() + self.config.confirmation_timeout);
        let mut state = SendState::Init;
        loop {
            state = match state {
                SendState::Init => self.init(&mut pending, stop_receiver).await?,
                SendState::Broadcasting => {
                    self.broadcast(factory, &mut pending, stop_receiver).await?
                }
                SendState::Waiting { resubmit_at } => {
                    self.wait(&mut pending, resubmit_at, stop_receiver).await?
                }
                SendState::Confirmed(receipt) => return pending.finish(receipt),
            };
        }
    }

    async fn init(
        &self,
        pending: &mut PendingSubmission,
        stop_receiver: &mut watch::Receiver<bool>,
    ) -> Result<SendState, TxManagerError> {
        let floor = self.config.min_gas_price();
        let ceiling = self.config.max_gas_price();
        let suggested = match or_cancelled(stop_receiver, self.l1.suggest_gas_price()).await? {
            Ok(gas_price) => gas_price,
            Err(err) => {
                tracing::warn!(floor, "failed to fetch gas price suggestion: {err:#}");
                floor
            }
        };
        pending.gas_price = suggested.max(floor).min(ceiling);
        tracing::debug!(suggested, gas_price = pending.gas_price, "picked starting gas price");
        Ok(SendState::Broadcasting)
    }

    async fn broadcast(
        &self,
        factory: &dyn TxFactory,
        pending: &mut PendingSubmission,
        stop_receiver: &mut watch::Receiver<bool>,
    ) -> Result<SendState, TxManagerError> {
        let gas_price = pending.gas_price;
        let tx = match or_cancelled(stop_receiver, factory.build_tx(gas_price)).await? {
            Ok(tx) => tx,
            Err(err) if pending.submitted.is_empty() => return Err(TxManagerError::Build(err)),
            // Earlier attempts can still be mined, so keep polling them until the deadline.
            Err(err) => {
                tracing::warn!(
                    gas_price,
                    attempts = pending.submitted.len(),
                    "failed to build replacement transaction: {err:#}"
                );
                return Ok(SendState::Waiting {
                    resubmit_at: Instant::now() + self.config.resubmission_timeout,
                });
            }
        };
        pending.broadcasts += 1;
        match pending.nonce {
            None => pending.nonce = Some(tx.nonce),
            Some(nonce) if nonce != tx.nonce => {
                tracing::warn!(nonce, new_nonce = tx.nonce, "attempt uses a different nonce");
            }
            Some(_) => {}
        }

        match or_cancelled(stop_receiver, self.l1.send_signed_transaction(&tx)).await? {
            Ok(hash) => {
                tracing::info!(
                    %hash,
                    nonce = tx.nonce,
                    gas_price,
                    attempt = pending.broadcasts,
                    "broadcast transaction"
                );
                pending.first_broadcast.get_or_insert_with(Instant::now);
                pending.submitted.push(Attempt { hash, gas_price });
            }
            Err(err) => {
                tracing::warn!(
                    nonce = tx.nonce,
                    gas_price,
                    attempt = pending.broadcasts,
                    "failed to broadcast transaction: {err:#}"
                );
            }
        }
        Ok(SendState::Waiting {
            resubmit_at: Instant::now() + self.config.resubmission_timeout,
        })
    }

    async fn wait(
        &self,
        pending: &mut PendingSubmission,
        resubmit_at: Instant,
        stop_receiver: &mut watch::Receiver<bool>,
    ) -> Result<SendState, TxManagerError> {
        loop {
            if let Some(receipt) = or_cancelled(stop_receiver, self.find_receipt(pending)).await? {
                return Ok(SendState::Confirmed(receipt));
            }

            let now = Instant::now();
            if now >= pending.deadline {
                return Err(TxManagerError::Timeout {
                    timeout: self.config.confirmation_timeout,
                    attempts: pending.broadcasts,
                });
            }
            if now >= resubmit_at {
                return Ok(self.escalate(pending));
            }

            let next_poll = (now + self.config.receipt_query_interval)
                .min(resubmit_at)
                .min(pending.deadline);
            or_cancelled(stop_receiver, tokio::time::sleep_until(next_poll)).await?;
        }
    }

    fn escalate(&self, pending: &mut PendingSubmission) -> SendState {
        let ceiling = self.config.max_gas_price();
        if pending.gas_price >= ceiling {
            tracing::warn!(
                gas_price = pending.gas_price,
                "gas price is at the ceiling, waiting without resubmission"
            );
            return SendState::Waiting {
                resubmit_at: Instant::now() + self.config.resubmission_timeout,
            };
        }

        let bumped = (pending.gas_price as f64 * self.config.gas_price_multiplier) as u128;
        let gas_price = bumped.max(pending.gas_price + 1).min(ceiling);
        tracing::info!(
            old_gas_price = pending.gas_price,
            new_gas_price = gas_price,
            "no confirmation in time, escalating gas price"
        );
        pending.gas_price = gas_price;
        SendState::Broadcasting
    }

    /// Checks attempts newest first. Only one of them can be mined since they share a nonce.
    async fn find_receipt(&self, pending: &PendingSubmission) -> Option<TxReceipt> {
        for attempt in pending.submitted.iter().rev() {
            match self.l1.transaction_receipt(attempt.hash).await {
                Ok(Some(receipt)) => {
                    if self.has_enough_confirmations(&receipt).await {
                        return Some(receipt);
                    }
                    tracing::debug!(
                        hash = %attempt.hash,
                        block_number = receipt.block_number,
                        "transaction mined, awaiting confirmations"
                    );
                    return None;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(hash = %attempt.hash, "failed to query receipt: {err:#}");
                }
            }
        }
        None
    }

    async fn has_enough_confirmations(&self, receipt: &TxReceipt) -> bool {
        if self.config.num_confirmations <= 1 {
            return true;
        }
        match self.l1.latest_block_number().await {
            Ok(latest) => latest + 1 >= receipt.block_number + self.config.num_confirmations,
            Err(err) => {
                tracing::warn!("failed to fetch latest L1 block: {err:#}");
                false
            }
        }
    }
}

/// Runs an L1 call unless the stop signal arrives first. A dropped sender counts as a stop.
async fn or_cancelled<T>(
    stop_receiver: &mut watch::Receiver<bool>,
    call: impl Future<Output = T>,
) -> Result<T, TxManagerError> {
    tokio::select! {
        biased;
        _ = stop_receiver.wait_for(|&stop| stop) => Err(TxManagerError::Cancelled),
        output = call => Ok(output),
    }
}
