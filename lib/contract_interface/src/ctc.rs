use alloy::primitives::Address;
use alloy::providers::DynProvider;
use alloy::sol;
use alloy::sol_types::SolCall;
use anyhow::Context;
use std::fmt::Debug;

sol! {
    #[sol(rpc)]
    contract CanonicalTransactionChain {
        function getTotalElements() external view returns (uint256 _totalElements);

        // Arguments are packed by hand after the selector.
        function appendSequencerBatch() external;
    }
}

/// Four-byte selector that prefixes every batch submission.
pub const APPEND_SEQUENCER_BATCH_SELECTOR: [u8; 4] =
    <CanonicalTransactionChain::appendSequencerBatchCall as SolCall>::SELECTOR;

/// Read access to the number of elements the L1 ledger has already committed.
#[async_trait::async_trait]
pub trait CommittedElements: Send + Sync + Debug {
    async fn total_elements(&self) -> anyhow::Result<u64>;
}

#[derive(Debug, Clone)]
pub struct CtcReader {
    instance: CanonicalTransactionChain::CanonicalTransactionChainInstance<DynProvider>,
}

impl CtcReader {
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self {
            instance: CanonicalTransactionChain::new(address, provider),
        }
    }

    pub fn address(&self) -> Address {
        *self.instance.address()
    }
}

#[async_trait::async_trait]
impl CommittedElements for CtcReader {
    async fn total_elements(&self) -> anyhow::Result<u64> {
        let total = self
            .instance
            .getTotalElements()
            .call()
            .await
            .with_context(|| format!("getTotalElements() failed on {}", self.address()))?;
        u64::try_from(total)
            .map_err(|_| anyhow::anyhow!("CTC reported {total} total elements, overflows u64"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matches_abi() {
        // keccak256("appendSequencerBatch()")[..4]
        assert_eq!(APPEND_SEQUENCER_BATCH_SELECTOR, [0xd0, 0xf8, 0x93, 0x44]);
    }
}
