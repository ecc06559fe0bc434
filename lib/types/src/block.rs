use alloy::primitives::Bytes;
use serde::{Deserialize, Serialize};

/// Where an L2 transaction entered the rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrigin {
    /// Accepted by the sequencer directly. Its bytes have to be posted to L1.
    Sequencer,
    /// Enqueued through the L1 queue. L1 already holds its data.
    L1,
}

/// The single transaction carried by an L2 block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Transaction {
    pub queue_origin: QueueOrigin,
    /// L1 block number the transaction was sequenced against.
    pub l1_block_number: u64,
    /// Signed transaction as it was received by the sequencer.
    pub raw: Bytes,
}

impl L2Transaction {
    pub fn is_sequenced(&self) -> bool {
        self.queue_origin == QueueOrigin::Sequencer
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Block {
    pub number: u64,
    pub timestamp: u64,
    pub transactions: Vec<L2Transaction>,
}
