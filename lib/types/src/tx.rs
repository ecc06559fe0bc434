use alloy::primitives::{Bytes, TxHash};

/// Signed L1 transaction ready to be broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub hash: TxHash,
    pub nonce: u64,
    pub gas_price: u128,
    /// EIP-2718 encoding of the transaction.
    pub raw: Bytes,
}

impl SignedTx {
    pub fn size(&self) -> usize {
        self.raw.len()
    }
}

/// Subset of an L1 receipt that the submitter acts upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
    pub success: bool,
}
