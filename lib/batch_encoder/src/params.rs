use alloy::primitives::Bytes;
use batch_submitter_contract_interface::APPEND_SEQUENCER_BATCH_SELECTOR;

use crate::element::{BatchElement, TX_LEN_SIZE};
use crate::error::{DecodingError, EncodingError};

const SHOULD_START_AT_ELEMENT_SIZE: usize = 5;
const TOTAL_ELEMENTS_SIZE: usize = 3;
const NUM_CONTEXTS_SIZE: usize = 3;
const HEADER_SIZE: usize = SHOULD_START_AT_ELEMENT_SIZE + TOTAL_ELEMENTS_SIZE + NUM_CONTEXTS_SIZE;

const NUM_SEQUENCED_SIZE: usize = 3;
const NUM_QUEUED_SIZE: usize = 3;
const TIMESTAMP_SIZE: usize = 5;
const BLOCK_NUMBER_SIZE: usize = 5;
/// Encoded size of a single [`BatchContext`].
pub const CONTEXT_SIZE: usize =
    NUM_SEQUENCED_SIZE + NUM_QUEUED_SIZE + TIMESTAMP_SIZE + BLOCK_NUMBER_SIZE;

/// Run of sequencer transactions followed by queue transactions that share a timestamp and
/// L1 block number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchContext {
    pub num_sequenced_txs: u64,
    pub num_subsequent_queue_txs: u64,
    pub timestamp: u64,
    pub block_number: u64,
}

impl BatchContext {
    fn opened_by(element: &BatchElement) -> Self {
        let mut context = Self {
            num_sequenced_txs: 0,
            num_subsequent_queue_txs: 0,
            timestamp: element.timestamp,
            block_number: element.block_number,
        };
        context.push(element);
        context
    }

    fn push(&mut self, element: &BatchElement) {
        if element.is_sequencer_tx() {
            self.num_sequenced_txs += 1;
        } else {
            self.num_subsequent_queue_txs += 1;
        }
    }

    fn num_elements(&self) -> u64 {
        self.num_sequenced_txs + self.num_subsequent_queue_txs
    }
}

/// Arguments of `appendSequencerBatch`, packed by hand after the selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendSequencerBatchParams {
    /// Index of the first element in the CTC, i.e. not counting the block offset.
    pub should_start_at_element: u64,
    pub total_elements_to_append: u64,
    pub contexts: Vec<BatchContext>,
    /// Raw sequencer transactions in submission order.
    pub txs: Vec<Bytes>,
}

/// Whether `element` must open a new context given the element before it.
fn starts_context(previous: Option<&BatchElement>, element: &BatchElement) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    if previous.timestamp != element.timestamp {
        return true;
    }
    element.is_sequencer_tx()
        && (!previous.is_sequencer_tx() || previous.block_number != element.block_number)
}

impl AppendSequencerBatchParams {
    /// Groups `elements` into contexts.
    ///
    /// A sequencer element following a queue element always opens a new context, so every context
    /// is a run of sequencer elements followed by queue elements and its first element defines
    /// the context's timestamp and block number.
    pub fn from_elements(
        should_start_at: u64,
        block_offset: u64,
        elements: &[BatchElement],
    ) -> Result<Self, EncodingError> {
        let should_start_at_element = should_start_at.checked_sub(block_offset).ok_or(
            EncodingError::StartBelowOffset {
                start: should_start_at,
                block_offset,
            },
        )?;

        let mut contexts: Vec<BatchContext> = Vec::new();
        let mut txs = Vec::new();
        let mut previous = None;
        for element in elements {
            match contexts.last_mut() {
                Some(context) if !starts_context(previous, element) => context.push(element),
                _ => contexts.push(BatchContext::opened_by(element)),
            }
            if let Some(tx) = &element.tx {
                txs.push(tx.clone());
            }
            previous = Some(element);
        }

        Ok(Self {
            should_start_at_element,
            total_elements_to_append: elements.len() as u64,
            contexts,
            txs,
        })
    }

    /// Length of [`Self::serialize()`] output.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE
            + self.contexts.len() * CONTEXT_SIZE
            + self
                .txs
                .iter()
                .map(|tx| TX_LEN_SIZE + tx.len())
                .sum::<usize>()
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), EncodingError> {
        out.reserve(self.encoded_len());
        put_uint(
            out,
            "shouldStartAtElement",
            self.should_start_at_element,
            SHOULD_START_AT_ELEMENT_SIZE,
        )?;
        put_uint(
            out,
            "totalElementsToAppend",
            self.total_elements_to_append,
            TOTAL_ELEMENTS_SIZE,
        )?;
        put_uint(
            out,
            "numContexts",
            self.contexts.len() as u64,
            NUM_CONTEXTS_SIZE,
        )?;
        for context in &self.contexts {
            put_uint(
                out,
                "numSequencedTransactions",
                context.num_sequenced_txs,
                NUM_SEQUENCED_SIZE,
            )?;
            put_uint(
                out,
                "numSubsequentQueueTransactions",
                context.num_subsequent_queue_txs,
                NUM_QUEUED_SIZE,
            )?;
            put_uint(out, "timestamp", context.timestamp, TIMESTAMP_SIZE)?;
            put_uint(out, "blockNumber", context.block_number, BLOCK_NUMBER_SIZE)?;
        }
        for tx in &self.txs {
            put_uint(out, "txLength", tx.len() as u64, TX_LEN_SIZE)?;
            out.extend_from_slice(tx);
        }
        Ok(())
    }

    pub fn serialize(&self) -> Result<Vec<u8>, EncodingError> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }

    /// Full `appendSequencerBatch` calldata: selector followed by the packed arguments.
    pub fn to_calldata(&self) -> Result<Bytes, EncodingError> {
        let mut out = Vec::with_capacity(APPEND_SEQUENCER_BATCH_SELECTOR.len() + self.encoded_len());
        out.extend_from_slice(&APPEND_SEQUENCER_BATCH_SELECTOR);
        self.write(&mut out)?;
        Ok(out.into())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodingError> {
        let mut reader = Reader { data: bytes, offset: 0 };
        let should_start_at_element =
            reader.read_uint("shouldStartAtElement", SHOULD_START_AT_ELEMENT_SIZE)?;
        let total_elements_to_append =
            reader.read_uint("totalElementsToAppend", TOTAL_ELEMENTS_SIZE)?;
        let num_contexts = reader.read_uint("numContexts", NUM_CONTEXTS_SIZE)?;

        // Counts come from untrusted input, so preallocation is bounded by the remaining bytes.
        let mut contexts =
            Vec::with_capacity((num_contexts as usize).min(reader.remaining() / CONTEXT_SIZE));
        for _ in 0..num_contexts {
            contexts.push(BatchContext {
                num_sequenced_txs: reader
                    .read_uint("numSequencedTransactions", NUM_SEQUENCED_SIZE)?,
                num_subsequent_queue_txs: reader
                    .read_uint("numSubsequentQueueTransactions", NUM_QUEUED_SIZE)?,
                timestamp: reader.read_uint("timestamp", TIMESTAMP_SIZE)?,
                block_number: reader.read_uint("blockNumber", BLOCK_NUMBER_SIZE)?,
            });
        }

        let actual: u64 = contexts.iter().map(BatchContext::num_elements).sum();
        if actual != total_elements_to_append {
            return Err(DecodingError::ElementCountMismatch {
                declared: total_elements_to_append,
                actual,
            });
        }

        let num_txs: u64 = contexts.iter().map(|context| context.num_sequenced_txs).sum();
        let mut txs = Vec::with_capacity((num_txs as usize).min(reader.remaining() / TX_LEN_SIZE));
        for _ in 0..num_txs {
            let len = reader.read_uint("txLength", TX_LEN_SIZE)? as usize;
            txs.push(Bytes::copy_from_slice(reader.read_bytes("tx", len)?));
        }
        if reader.remaining() > 0 {
            return Err(DecodingError::TrailingBytes(reader.remaining()));
        }

        Ok(Self {
            should_start_at_element,
            total_elements_to_append,
            contexts,
            txs,
        })
    }

    /// Decodes full calldata produced by [`Self::to_calldata()`].
    pub fn decode_calldata(calldata: &[u8]) -> Result<Self, DecodingError> {
        let args = calldata
            .strip_prefix(APPEND_SEQUENCER_BATCH_SELECTOR.as_slice())
            .ok_or(DecodingError::UnknownSelector)?;
        Self::decode(args)
    }

    /// Expands contexts back into elements in submission order.
    ///
    /// Queue elements carry the metadata of their context; their own L1 block number is not part
    /// of the encoding.
    pub fn elements(&self) -> Vec<BatchElement> {
        let mut txs = self.txs.iter();
        let mut elements = Vec::with_capacity(self.total_elements_to_append as usize);
        for context in &self.contexts {
            let sequenced = txs
                .by_ref()
                .take(context.num_sequenced_txs as usize)
                .map(|tx| BatchElement {
                    timestamp: context.timestamp,
                    block_number: context.block_number,
                    tx: Some(tx.clone()),
                });
            elements.extend(sequenced);
            let queued = (0..context.num_subsequent_queue_txs).map(|_| BatchElement {
                timestamp: context.timestamp,
                block_number: context.block_number,
                tx: None,
            });
            elements.extend(queued);
        }
        elements
    }
}

fn put_uint(
    out: &mut Vec<u8>,
    field: &'static str,
    value: u64,
    width: usize,
) -> Result<(), EncodingError> {
    if width < 8 && value >> (width * 8) != 0 {
        return Err(EncodingError::FieldOverflow {
            field,
            value,
            width,
        });
    }
    out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn read_bytes(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], DecodingError> {
        let bytes = self
            .data
            .get(self.offset..self.offset + len)
            .ok_or(DecodingError::UnexpectedEof {
                field,
                offset: self.offset,
            })?;
        self.offset += len;
        Ok(bytes)
    }

    fn read_uint(&mut self, field: &'static str, width: usize) -> Result<u64, DecodingError> {
        let bytes = self.read_bytes(field, width)?;
        let mut buf = [0_u8; 8];
        buf[8 - width..].copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buf))
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn seq(timestamp: u64, block_number: u64, tx: &'static [u8]) -> BatchElement {
        BatchElement {
            timestamp,
            block_number,
            tx: Some(Bytes::from_static(tx)),
        }
    }

    fn queue(timestamp: u64, block_number: u64) -> BatchElement {
        BatchElement {
            timestamp,
            block_number,
            tx: None,
        }
    }

    fn context(seq: u64, queued: u64, timestamp: u64, block_number: u64) -> BatchContext {
        BatchContext {
            num_sequenced_txs: seq,
            num_subsequent_queue_txs: queued,
            timestamp,
            block_number,
        }
    }

    #[test]
    fn groups_elements_into_contexts() {
        let elements = [
            seq(10, 1, b"a"),
            seq(10, 1, b"b"),
            queue(10, 1),
            // Sequencer tx after a queue tx opens a new context.
            seq(10, 1, b"c"),
            // Same timestamp, different L1 block.
            seq(10, 2, b"d"),
            queue(10, 3),
            queue(10, 4),
            // Timestamp change.
            queue(11, 4),
        ];
        let params = AppendSequencerBatchParams::from_elements(105, 5, &elements).unwrap();
        assert_eq!(params.should_start_at_element, 100);
        assert_eq!(params.total_elements_to_append, 8);
        assert_eq!(
            params.contexts,
            [
                context(2, 1, 10, 1),
                context(1, 0, 10, 1),
                context(1, 2, 10, 2),
                context(0, 1, 11, 4),
            ]
        );
        let txs: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|tx| Bytes::from_static(tx.as_bytes()))
            .collect();
        assert_eq!(params.txs, txs);
    }

    #[test]
    fn queue_only_batch_keeps_ordering_metadata() {
        let elements = [queue(10, 1), queue(10, 2), queue(12, 2)];
        let params = AppendSequencerBatchParams::from_elements(0, 0, &elements).unwrap();
        assert_eq!(
            params.contexts,
            [context(0, 2, 10, 1), context(0, 1, 12, 2)]
        );
        assert!(params.txs.is_empty());

        let encoded = params.serialize().unwrap();
        assert_eq!(encoded.len(), HEADER_SIZE + 2 * CONTEXT_SIZE);
        assert_eq!(AppendSequencerBatchParams::decode(&encoded).unwrap(), params);
    }

    #[test]
    fn serializes_big_endian_layout() {
        let elements = [seq(0x0102, 0x0304, &[0xaa, 0xbb]), queue(0x0102, 0x0304)];
        let params = AppendSequencerBatchParams::from_elements(0x0a, 0, &elements).unwrap();
        let encoded = params.serialize().unwrap();
        #[rustfmt::skip]
        let expected = [
            // shouldStartAtElement, totalElementsToAppend, numContexts
            0, 0, 0, 0, 0x0a,  0, 0, 2,  0, 0, 1,
            // context: numSequenced, numSubsequentQueue, timestamp, blockNumber
            0, 0, 1,  0, 0, 1,  0, 0, 0, 0x01, 0x02,  0, 0, 0, 0x03, 0x04,
            // tx length and bytes
            0, 0, 2,  0xaa, 0xbb,
        ];
        assert_eq!(encoded, expected);
        assert_eq!(encoded.len(), params.encoded_len());

        let calldata = params.to_calldata().unwrap();
        assert_eq!(calldata[..4], APPEND_SEQUENCER_BATCH_SELECTOR);
        assert_eq!(calldata[4..], expected);
    }

    #[test]
    fn decoding_restores_element_order() {
        let elements = [
            seq(10, 1, b"first"),
            queue(10, 1),
            seq(10, 1, b"second"),
            seq(11, 1, b"third"),
            queue(11, 1),
            queue(11, 1),
        ];
        let params = AppendSequencerBatchParams::from_elements(3, 0, &elements).unwrap();
        let calldata = params.to_calldata().unwrap();
        let decoded = AppendSequencerBatchParams::decode_calldata(&calldata).unwrap();
        assert_eq!(decoded, params);
        assert_eq!(decoded.elements(), elements);
    }

    #[test]
    fn rejects_overflowing_fields() {
        let params = AppendSequencerBatchParams::from_elements(1 << 40, 0, &[queue(1, 1)]).unwrap();
        assert_matches!(
            params.serialize(),
            Err(EncodingError::FieldOverflow {
                field: "shouldStartAtElement",
                width: 5,
                ..
            })
        );

        let params = AppendSequencerBatchParams::from_elements(0, 0, &[queue(1 << 40, 1)]).unwrap();
        assert_matches!(
            params.serialize(),
            Err(EncodingError::FieldOverflow {
                field: "timestamp",
                ..
            })
        );
    }

    #[test]
    fn rejects_start_below_offset() {
        assert_matches!(
            AppendSequencerBatchParams::from_elements(3, 5, &[queue(1, 1)]),
            Err(EncodingError::StartBelowOffset {
                start: 3,
                block_offset: 5
            })
        );
    }

    #[test]
    fn decoding_errors() {
        let params = AppendSequencerBatchParams::from_elements(0, 0, &[seq(1, 1, b"tx")]).unwrap();
        let mut encoded = params.serialize().unwrap();

        assert_matches!(
            AppendSequencerBatchParams::decode(&encoded[..encoded.len() - 1]),
            Err(DecodingError::UnexpectedEof { field: "tx", .. })
        );
        assert_matches!(
            AppendSequencerBatchParams::decode_calldata(&encoded),
            Err(DecodingError::UnknownSelector)
        );

        encoded.push(0);
        assert_matches!(
            AppendSequencerBatchParams::decode(&encoded),
            Err(DecodingError::TrailingBytes(1))
        );

        // Declare two elements while the only context holds one.
        encoded.pop();
        encoded[7] = 2;
        assert_matches!(
            AppendSequencerBatchParams::decode(&encoded),
            Err(DecodingError::ElementCountMismatch {
                declared: 2,
                actual: 1
            })
        );
    }
}
