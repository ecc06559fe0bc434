use alloy::primitives::Address;
use batch_submitter_contract_interface::L1Client;
use batch_submitter_tx_manager::{Confirmation, TxFactory, TxManager, TxManagerError};
use batch_submitter_types::{SignedTx, SubmissionRange};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::Instrument;

use crate::{Driver, DriverError, FailureKind, PreparedBatch, SubmitterTelemetry};

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("failed to read nonce of {0}")]
    Nonce(Address, #[source] anyhow::Error),
    #[error(transparent)]
    Submission(#[from] TxManagerError),
}

impl CycleError {
    /// Metric label of the failure; `None` for cancellation, which is not a failure.
    pub fn kind(&self) -> Option<FailureKind> {
        Some(match self {
            Self::Driver(DriverError::Range(_)) => FailureKind::Range,
            Self::Driver(DriverError::Encoding(_)) => FailureKind::Encoding,
            Self::Driver(DriverError::Read(_)) | Self::Nonce(..) => FailureKind::Read,
            Self::Submission(TxManagerError::Timeout { .. }) => FailureKind::Timeout,
            Self::Submission(TxManagerError::Reverted(_)) => FailureKind::Reverted,
            Self::Submission(TxManagerError::Build(_)) => FailureKind::Build,
            Self::Submission(TxManagerError::Cancelled) => return None,
        })
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    NoUpdates,
    Submitted {
        range: SubmissionRange,
        confirmation: Confirmation,
    },
}

/// Signs the prepared batch at whatever gas price the transaction manager asks for.
struct BatchTxFactory<'a, D> {
    driver: &'a D,
    batch: &'a PreparedBatch,
    telemetry: &'a dyn SubmitterTelemetry,
}

#[async_trait::async_trait]
impl<D: Driver> TxFactory for BatchTxFactory<'_, D> {
    async fn build_tx(&self, gas_price: u128) -> anyhow::Result<SignedTx> {
        let tx = self.driver.sign_batch_tx(self.batch, gas_price).await?;
        self.telemetry.record_batch_size(tx.size());
        Ok(tx)
    }
}

/// Polling loop submitting one batch at a time.
#[derive(Debug)]
pub struct BatchSubmitter<D> {
    driver: D,
    l1: Arc<dyn L1Client>,
    tx_manager: TxManager,
    telemetry: Arc<dyn SubmitterTelemetry>,
    poll_interval: Duration,
}

impl<D: Driver> BatchSubmitter<D> {
    pub fn new(
        driver: D,
        l1: Arc<dyn L1Client>,
        tx_manager: TxManager,
        telemetry: Arc<dyn SubmitterTelemetry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            driver,
            l1,
            tx_manager,
            telemetry,
            poll_interval,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Runs cycles until the stop signal is received or its sender is dropped.
    pub async fn run(self, mut stop_receiver: watch::Receiver<bool>) -> anyhow::Result<()> {
        let name = self.driver.name().to_owned();
        tracing::info!(%name, poll_interval = ?self.poll_interval, "starting batch submitter");

        loop {
            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {}
                _ = stop_receiver.wait_for(|&stop| stop) => break,
            }

            let mut cycle_stop_receiver = stop_receiver.clone();
            let cycle = self
                .run_cycle(&mut cycle_stop_receiver)
                .instrument(tracing::info_span!("submission_cycle", %name));
            let result = tokio::select! {
                result = cycle => result,
                _ = stop_receiver.wait_for(|&stop| stop) => {
                    tracing::info!(%name, "stop signal received, abandoning in-flight cycle");
                    break;
                }
            };

            match result {
                Ok(CycleOutcome::NoUpdates) => {}
                Ok(CycleOutcome::Submitted {
                    range,
                    confirmation,
                }) => {
                    tracing::info!(
                        %name,
                        %range,
                        tx_hash = %confirmation.receipt.tx_hash,
                        attempts = confirmation.attempts,
                        elapsed = ?confirmation.elapsed,
                        "batch confirmed"
                    );
                }
                Err(err) => {
                    let Some(kind) = err.kind() else {
                        break;
                    };
                    self.telemetry.record_failure(kind);
                    let err = anyhow::Error::from(err);
                    tracing::error!(%name, ?kind, "batch submission cycle failed: {err:#}");
                }
            }
        }

        tracing::info!(%name, "batch submitter stopped");
        Ok(())
    }

    /// Single iteration: resolve, encode, submit.
    pub async fn run_cycle(
        &self,
        stop_receiver: &mut watch::Receiver<bool>,
    ) -> Result<CycleOutcome, CycleError> {
        let wallet = self.driver.wallet_address();
        match self.l1.balance_at(wallet).await {
            Ok(balance) => self.telemetry.record_balance(balance),
            Err(err) => tracing::warn!(%wallet, "unable to get current balance: {err:#}"),
        }

        let range = self.driver.get_batch_block_range().await?;
        if range.is_empty() {
            tracing::info!(%range, "no updates");
            return Ok(CycleOutcome::NoUpdates);
        }

        let nonce = self
            .l1
            .nonce_at(wallet)
            .await
            .map_err(|err| CycleError::Nonce(wallet, err))?;
        tracing::info!(%range, nonce, "building batch");

        let build_started = Instant::now();
        let batch = self.driver.craft_batch_tx(range, nonce).await?;
        self.telemetry
            .record_batch_built(&batch.encoded, build_started.elapsed());

        let factory = BatchTxFactory {
            driver: &self.driver,
            batch: &batch,
            telemetry: &*self.telemetry,
        };
        let confirmation = self.tx_manager.send(&factory, stop_receiver).await?;
        self.telemetry
            .record_confirmation(&batch.encoded, &confirmation);

        Ok(CycleOutcome::Submitted {
            range: batch.encoded.range,
            confirmation,
        })
    }
}
