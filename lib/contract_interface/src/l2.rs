use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Bytes, U64};
use alloy::providers::{DynProvider, Provider};
use anyhow::Context;
use batch_submitter_types::{L2Block, L2Transaction, QueueOrigin};
use serde::Deserialize;
use std::fmt::Debug;

/// Read access to the L2 chain that produces the batch contents.
#[async_trait::async_trait]
pub trait L2BlockSource: Send + Sync + Debug {
    async fn head_block_number(&self) -> anyhow::Result<u64>;

    /// Fetches the block at `number` together with its full transactions.
    async fn block_by_number(&self, number: u64) -> anyhow::Result<L2Block>;
}

/// Block as returned by l2geth's `eth_getBlockByNumber`, restricted to the fields batching needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcL2Block {
    pub number: U64,
    pub timestamp: U64,
    pub transactions: Vec<RpcL2Transaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcL2Transaction {
    pub queue_origin: QueueOrigin,
    pub l1_block_number: U64,
    pub raw_transaction: Bytes,
}

impl From<RpcL2Block> for L2Block {
    fn from(block: RpcL2Block) -> Self {
        Self {
            number: block.number.to(),
            timestamp: block.timestamp.to(),
            transactions: block
                .transactions
                .into_iter()
                .map(|tx| L2Transaction {
                    queue_origin: tx.queue_origin,
                    l1_block_number: tx.l1_block_number.to(),
                    raw: tx.raw_transaction,
                })
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl L2BlockSource for DynProvider {
    async fn head_block_number(&self) -> anyhow::Result<u64> {
        self.get_block_number()
            .await
            .context("failed to fetch L2 head")
    }

    async fn block_by_number(&self, number: u64) -> anyhow::Result<L2Block> {
        let block: Option<RpcL2Block> = self
            .raw_request(
                "eth_getBlockByNumber".into(),
                (BlockNumberOrTag::Number(number), true),
            )
            .await
            .with_context(|| format!("failed to fetch L2 block #{number}"))?;
        let block = block.with_context(|| format!("L2 block #{number} is missing"))?;
        Ok(block.into())
    }
}
