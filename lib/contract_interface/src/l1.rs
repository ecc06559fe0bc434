use alloy::eips::BlockId;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::TransactionRequest;
use anyhow::Context;
use batch_submitter_types::{SignedTx, TxReceipt};
use std::fmt::Debug;

/// L1 node operations used while preparing and confirming batch transactions.
#[async_trait::async_trait]
pub trait L1Client: Send + Sync + Debug {
    async fn balance_at(&self, address: Address) -> anyhow::Result<U256>;

    /// Nonce of `address` as of the latest block.
    async fn nonce_at(&self, address: Address) -> anyhow::Result<u64>;

    async fn suggest_gas_price(&self) -> anyhow::Result<u128>;

    async fn estimate_gas_limit(&self, request: TransactionRequest) -> anyhow::Result<u64>;

    async fn send_signed_transaction(&self, tx: &SignedTx) -> anyhow::Result<TxHash>;

    /// Returns `None` while the transaction is not included in a block.
    async fn transaction_receipt(&self, hash: TxHash) -> anyhow::Result<Option<TxReceipt>>;

    async fn latest_block_number(&self) -> anyhow::Result<u64>;
}

#[async_trait::async_trait]
impl L1Client for DynProvider {
    async fn balance_at(&self, address: Address) -> anyhow::Result<U256> {
        Ok(self.get_balance(address).block_id(BlockId::latest()).await?)
    }

    async fn nonce_at(&self, address: Address) -> anyhow::Result<u64> {
        Ok(self
            .get_transaction_count(address)
            .block_id(BlockId::latest())
            .await?)
    }

    async fn suggest_gas_price(&self) -> anyhow::Result<u128> {
        Ok(self.get_gas_price().await?)
    }

    async fn estimate_gas_limit(&self, request: TransactionRequest) -> anyhow::Result<u64> {
        self.estimate_gas(request)
            .await
            .context("eth_estimateGas failed")
    }

    async fn send_signed_transaction(&self, tx: &SignedTx) -> anyhow::Result<TxHash> {
        let pending = self.send_raw_transaction(&tx.raw).await?;
        let hash = *pending.tx_hash();
        if hash != tx.hash {
            tracing::warn!(
                expected = %tx.hash,
                returned = %hash,
                "L1 node returned unexpected hash for broadcast transaction"
            );
        }
        Ok(tx.hash)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> anyhow::Result<Option<TxReceipt>> {
        let Some(receipt) = self.get_transaction_receipt(hash).await? else {
            return Ok(None);
        };
        // Some nodes return receipts for pending transactions without a block number.
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };
        Ok(Some(TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number,
            gas_used: receipt.gas_used,
            success: receipt.status(),
        }))
    }

    async fn latest_block_number(&self) -> anyhow::Result<u64> {
        Ok(self.get_block_number().await?)
    }
}
