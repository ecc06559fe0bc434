use std::fmt;
use std::ops::Range;

/// Returned when the committed position on L1 is ahead of the local chain tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid range, end({end}) < start({start})")]
pub struct RangeError {
    pub start: u64,
    pub end: u64,
}

/// Half-open range `[start, end)` of L2 block heights that still have to be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionRange {
    start: u64,
    end: u64,
}

impl SubmissionRange {
    pub fn new(start: u64, end: u64) -> Result<Self, RangeError> {
        if end < start {
            return Err(RangeError { start, end });
        }
        Ok(Self { start, end })
    }

    pub const fn start(&self) -> u64 {
        self.start
    }

    pub const fn end(&self) -> u64 {
        self.end
    }

    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Keeps the first `len` heights of the range.
    pub fn truncated(self, len: u64) -> Self {
        Self {
            start: self.start,
            end: self.start + len.min(self.len()),
        }
    }

    pub fn heights(&self) -> Range<u64> {
        self.start..self.end
    }
}

impl fmt::Display for SubmissionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
