//! L1 and L2 surfaces the batch submitter talks to.
//!
//! Every capability is a trait so that the submission logic can run against in-memory chains in
//! tests. Production implementations live on alloy's [`DynProvider`](alloy::providers::DynProvider).

mod ctc;
mod l1;
mod l2;

pub use ctc::{
    APPEND_SEQUENCER_BATCH_SELECTOR, CanonicalTransactionChain, CommittedElements, CtcReader,
};
pub use l1::L1Client;
pub use l2::{L2BlockSource, RpcL2Block, RpcL2Transaction};
