use alloy::eips::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::Address;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Context;
use batch_submitter_batch_encoder::{BatchBuilder, BatchBuilderConfig};
use batch_submitter_contract_interface::{CommittedElements, L1Client, L2BlockSource};
use batch_submitter_types::{SignedTx, SubmissionRange};
use std::sync::Arc;

use crate::{Driver, DriverError, PreparedBatch, RangeResolver};

#[derive(Debug, Clone)]
pub struct SequencerDriverConfig {
    pub name: String,
    pub ctc_address: Address,
    pub l1_chain_id: u64,
    /// Difference between L2 block heights and CTC element indices.
    pub block_offset: u64,
    /// Upper bound on the batch calldata size.
    pub max_tx_size: usize,
    /// Share of elements dropped per pruning pass.
    pub prune_percent: u8,
    /// Extra gas (in percent) added on top of the `eth_estimateGas` result.
    pub gas_limit_buffer_percent: u64,
}

/// Submits L2 sequencer blocks to the canonical transaction chain.
#[derive(Debug)]
pub struct SequencerDriver {
    config: SequencerDriverConfig,
    address: Address,
    wallet: EthereumWallet,
    range_resolver: RangeResolver,
    builder: BatchBuilder,
    l1: Arc<dyn L1Client>,
}

impl SequencerDriver {
    pub fn new(
        config: SequencerDriverConfig,
        signer: PrivateKeySigner,
        ctc: Arc<dyn CommittedElements>,
        l2: Arc<dyn L2BlockSource>,
        l1: Arc<dyn L1Client>,
    ) -> Self {
        let range_resolver = RangeResolver::new(ctc, l2.clone(), config.block_offset);
        let builder = BatchBuilder::new(
            BatchBuilderConfig {
                block_offset: config.block_offset,
                max_tx_size: config.max_tx_size,
                prune_percent: config.prune_percent,
            },
            l2,
        );
        Self {
            address: signer.address(),
            wallet: EthereumWallet::from(signer),
            config,
            range_resolver,
            builder,
            l1,
        }
    }

    async fn estimate_gas_limit(&self, request: TransactionRequest) -> Result<u64, DriverError> {
        let estimate = self
            .l1
            .estimate_gas_limit(request)
            .await
            .map_err(DriverError::Read)?;
        Ok(estimate.saturating_mul(100 + self.config.gas_limit_buffer_percent) / 100)
    }
}

#[async_trait::async_trait]
impl Driver for SequencerDriver {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn wallet_address(&self) -> Address {
        self.address
    }

    async fn get_batch_block_range(&self) -> Result<SubmissionRange, DriverError> {
        self.range_resolver.resolve().await
    }

    async fn craft_batch_tx(
        &self,
        range: SubmissionRange,
        nonce: u64,
    ) -> Result<PreparedBatch, DriverError> {
        let encoded = self.builder.build(range).await?;
        let request = TransactionRequest::default()
            .with_from(self.address)
            .with_to(self.config.ctc_address)
            .with_nonce(nonce)
            .with_input(encoded.calldata.clone());
        let gas_limit = self.estimate_gas_limit(request).await?;
        tracing::debug!(
            name = %self.config.name,
            nonce,
            gas_limit,
            range = %encoded.range,
            "prepared batch transaction"
        );
        Ok(PreparedBatch {
            encoded,
            nonce,
            gas_limit,
        })
    }

    async fn sign_batch_tx(
        &self,
        batch: &PreparedBatch,
        gas_price: u128,
    ) -> anyhow::Result<SignedTx> {
        let envelope = TransactionRequest::default()
            .with_from(self.address)
            .with_to(self.config.ctc_address)
            .with_chain_id(self.config.l1_chain_id)
            .with_nonce(batch.nonce)
            .with_gas_price(gas_price)
            .with_gas_limit(batch.gas_limit)
            .with_input(batch.encoded.calldata.clone())
            .build(&self.wallet)
            .await
            .context("failed to sign batch transaction")?;
        Ok(SignedTx {
            hash: *envelope.tx_hash(),
            nonce: batch.nonce,
            gas_price,
            raw: envelope.encoded_2718().into(),
        })
    }
}
