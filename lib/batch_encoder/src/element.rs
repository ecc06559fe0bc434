use alloy::primitives::Bytes;
use batch_submitter_types::{L2Block, QueueOrigin};

use crate::EncodingError;

/// Width of the length prefix in front of every sequencer transaction.
pub const TX_LEN_SIZE: usize = 3;

/// Single CTC element derived from an L2 block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchElement {
    pub timestamp: u64,
    /// L1 block number the transaction was sequenced against.
    pub block_number: u64,
    /// Raw transaction, present only for sequencer transactions.
    pub tx: Option<Bytes>,
}

impl BatchElement {
    pub fn from_block(block: &L2Block) -> Result<Self, EncodingError> {
        let [tx] = block.transactions.as_slice() else {
            return Err(EncodingError::UnexpectedTxCount {
                block: block.number,
                count: block.transactions.len(),
            });
        };
        Ok(Self {
            timestamp: block.timestamp,
            block_number: tx.l1_block_number,
            tx: match tx.queue_origin {
                QueueOrigin::Sequencer => Some(tx.raw.clone()),
                QueueOrigin::L1 => None,
            },
        })
    }

    pub fn is_sequencer_tx(&self) -> bool {
        self.tx.is_some()
    }

    /// Bytes the element contributes to the transaction section of the payload.
    pub fn tx_section_size(&self) -> usize {
        self.tx.as_ref().map_or(0, |tx| TX_LEN_SIZE + tx.len())
    }
}
