//! Encoding of L2 blocks into `appendSequencerBatch` calldata.
//!
//! Encoding happens in three stages, each usable on its own:
//!
//! 1. [`BatchElement::from_block`] classifies fetched L2 blocks;
//! 2. [`SizeAccumulator`] stops the fetch once sequencer transactions alone would overflow the
//!    payload limit;
//! 3. [`encode_batch`] groups elements into contexts, serializes them and prunes trailing elements
//!    until the calldata fits.

mod builder;
mod element;
mod error;
mod params;

pub use builder::{
    BatchBuilder, BatchBuilderConfig, EncodedBatch, SizeAccumulator, collect_elements,
    encode_batch, pruned_len,
};
pub use element::{BatchElement, TX_LEN_SIZE};
pub use error::{BuildError, DecodingError, EncodingError};
pub use params::{AppendSequencerBatchParams, BatchContext, CONTEXT_SIZE};
