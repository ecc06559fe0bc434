use alloy::primitives::Address;
use batch_submitter_batch_encoder::{BuildError, EncodedBatch, EncodingError};
use batch_submitter_types::{RangeError, SignedTx, SubmissionRange};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("failed to read ledger state")]
    Read(#[source] anyhow::Error),
}

impl From<BuildError> for DriverError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Fetch(err) => Self::Read(err),
            BuildError::Encoding(err) => Self::Encoding(err),
        }
    }
}

/// Batch calldata bound to a nonce, ready to be signed at any gas price.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub encoded: EncodedBatch,
    pub nonce: u64,
    pub gas_limit: u64,
}

/// Chain-specific part of batch submission.
#[async_trait::async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn wallet_address(&self) -> Address;

    /// L2 blocks not yet committed to L1. An empty range means there is nothing to submit.
    async fn get_batch_block_range(&self) -> Result<SubmissionRange, DriverError>;

    /// Encodes as much of `range` as fits into one transaction.
    async fn craft_batch_tx(
        &self,
        range: SubmissionRange,
        nonce: u64,
    ) -> Result<PreparedBatch, DriverError>;

    async fn sign_batch_tx(
        &self,
        batch: &PreparedBatch,
        gas_price: u128,
    ) -> anyhow::Result<SignedTx>;
}
