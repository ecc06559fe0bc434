use alloy::primitives::Bytes;
use batch_submitter_contract_interface::L2BlockSource;
use batch_submitter_types::SubmissionRange;
use std::sync::Arc;

use crate::element::BatchElement;
use crate::error::{BuildError, EncodingError};
use crate::params::AppendSequencerBatchParams;

/// Running estimate of the sequencer transaction bytes included so far.
///
/// The estimate ignores header and contexts, so a batch that passes it can still be too large;
/// [`encode_batch`] trims the remainder.
#[derive(Debug)]
pub struct SizeAccumulator {
    max_size: usize,
    total: usize,
}

impl SizeAccumulator {
    pub fn new(max_size: usize) -> Self {
        Self { max_size, total: 0 }
    }

    /// Accounts for `element` unless doing so would exceed the limit.
    pub fn try_add(&mut self, element: &BatchElement) -> bool {
        let size = element.tx_section_size();
        if self.total + size > self.max_size {
            return false;
        }
        self.total += size;
        true
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// Fetches blocks of `range` in order until the size estimate is exhausted.
pub async fn collect_elements(
    source: &dyn L2BlockSource,
    range: SubmissionRange,
    max_size: usize,
) -> Result<Vec<BatchElement>, BuildError> {
    let mut accumulator = SizeAccumulator::new(max_size);
    let mut elements = Vec::new();
    for height in range.heights() {
        let block = source
            .block_by_number(height)
            .await
            .map_err(BuildError::Fetch)?;
        let element = BatchElement::from_block(&block)?;
        if !accumulator.try_add(&element) {
            tracing::debug!(
                height,
                estimated_size = accumulator.total(),
                max_size,
                "size estimate exhausted, capping batch"
            );
            break;
        }
        elements.push(element);
    }
    Ok(elements)
}

/// Number of elements kept by one pruning pass. Always strictly less than `len` for `len > 0`.
pub fn pruned_len(len: usize, prune_percent: u8) -> usize {
    let keep_percent = 100 - usize::from(prune_percent.min(100));
    (len * keep_percent / 100).min(len.saturating_sub(1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    /// `appendSequencerBatch` calldata, selector included.
    pub calldata: Bytes,
    /// L2 blocks actually covered by the calldata.
    pub range: SubmissionRange,
    pub num_contexts: usize,
    pub num_sequencer_txs: usize,
    pub prune_iterations: usize,
}

impl EncodedBatch {
    pub fn num_elements(&self) -> u64 {
        self.range.len()
    }
}

/// Serializes `elements` collected for `range`, pruning trailing elements until the calldata is
/// at most `max_size` bytes.
pub fn encode_batch(
    range: SubmissionRange,
    block_offset: u64,
    mut elements: Vec<BatchElement>,
    max_size: usize,
    prune_percent: u8,
) -> Result<EncodedBatch, EncodingError> {
    let mut prune_iterations = 0;
    loop {
        if elements.is_empty() {
            return Err(EncodingError::NothingFits { max_size });
        }
        let params =
            AppendSequencerBatchParams::from_elements(range.start(), block_offset, &elements)?;
        let calldata = params.to_calldata()?;
        if calldata.len() <= max_size {
            return Ok(EncodedBatch {
                calldata,
                range: range.truncated(elements.len() as u64),
                num_contexts: params.contexts.len(),
                num_sequencer_txs: params.txs.len(),
                prune_iterations,
            });
        }
        if elements.len() == 1 {
            return Err(EncodingError::PayloadTooLarge {
                size: calldata.len(),
                max_size,
            });
        }

        let old_num_txs = elements.len();
        elements.truncate(pruned_len(old_num_txs, prune_percent));
        prune_iterations += 1;
        tracing::info!(
            old_num_txs,
            new_num_txs = elements.len(),
            length = calldata.len(),
            max_size,
            "pruned batch"
        );
    }
}

#[derive(Debug, Clone)]
pub struct BatchBuilderConfig {
    /// Difference between L2 block heights and CTC element indices.
    pub block_offset: u64,
    /// Upper bound on the calldata size, selector included.
    pub max_tx_size: usize,
    /// Share of elements dropped on each pruning pass.
    pub prune_percent: u8,
}

/// Builds batch calldata out of L2 blocks.
#[derive(Debug)]
pub struct BatchBuilder {
    config: BatchBuilderConfig,
    source: Arc<dyn L2BlockSource>,
}

impl BatchBuilder {
    pub fn new(config: BatchBuilderConfig, source: Arc<dyn L2BlockSource>) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> &BatchBuilderConfig {
        &self.config
    }

    pub async fn build(&self, range: SubmissionRange) -> Result<EncodedBatch, BuildError> {
        let elements = collect_elements(&*self.source, range, self.config.max_tx_size).await?;
        let batch = encode_batch(
            range,
            self.config.block_offset,
            elements,
            self.config.max_tx_size,
            self.config.prune_percent,
        )?;
        tracing::info!(
            requested = %range,
            covered = %batch.range,
            num_contexts = batch.num_contexts,
            num_sequencer_txs = batch.num_sequencer_txs,
            length = batch.calldata.len(),
            "batch constructed"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            match AppendSequencerBatchParams::decode_calldata(&batch.calldata) {
                Ok(params) => tracing::debug!(
                    should_start_at_element = params.should_start_at_element,
                    total_elements_to_append = params.total_elements_to_append,
                    first_context = ?params.contexts.first(),
                    last_context = ?params.contexts.last(),
                    "decoded batch"
                ),
                Err(err) => tracing::warn!("built batch does not decode back: {err}"),
            }
        }
        Ok(batch)
    }
}
