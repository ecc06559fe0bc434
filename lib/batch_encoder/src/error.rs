#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("L2 block #{block} has {count} transactions, expected exactly one")]
    UnexpectedTxCount { block: u64, count: usize },
    #[error("`{field}` value {value} does not fit into {width} bytes")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        width: usize,
    },
    #[error("batch start {start} is below block offset {block_offset}")]
    StartBelowOffset { start: u64, block_offset: u64 },
    #[error("no elements fit into {max_size} bytes")]
    NothingFits { max_size: usize },
    #[error("single element batch is {size} bytes, exceeds limit of {max_size} bytes")]
    PayloadTooLarge { size: usize, max_size: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodingError {
    #[error("calldata does not start with the `appendSequencerBatch` selector")]
    UnknownSelector,
    #[error("unexpected end of input while reading `{field}` at offset {offset}")]
    UnexpectedEof { field: &'static str, offset: usize },
    #[error("{0} trailing bytes after the last transaction")]
    TrailingBytes(usize),
    #[error("header declares {declared} elements, contexts account for {actual}")]
    ElementCountMismatch { declared: u64, actual: u64 },
}

/// Failure of a full build: fetching blocks and encoding them.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to read L2 blocks")]
    Fetch(#[source] anyhow::Error),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}
