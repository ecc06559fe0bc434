use batch_submitter_contract_interface::{CommittedElements, L2BlockSource};
use batch_submitter_types::SubmissionRange;
use std::sync::Arc;

use crate::DriverError;

/// Computes the L2 blocks that are not yet committed to the CTC.
#[derive(Debug, Clone)]
pub struct RangeResolver {
    ctc: Arc<dyn CommittedElements>,
    l2: Arc<dyn L2BlockSource>,
    block_offset: u64,
}

impl RangeResolver {
    pub fn new(
        ctc: Arc<dyn CommittedElements>,
        l2: Arc<dyn L2BlockSource>,
        block_offset: u64,
    ) -> Self {
        Self {
            ctc,
            l2,
            block_offset,
        }
    }

    pub async fn resolve(&self) -> Result<SubmissionRange, DriverError> {
        let committed = self.ctc.total_elements().await.map_err(DriverError::Read)?;
        let head = self
            .l2
            .head_block_number()
            .await
            .map_err(DriverError::Read)?;
        let start = committed.checked_add(self.block_offset).ok_or_else(|| {
            DriverError::Read(anyhow::anyhow!(
                "CTC reports {committed} elements, overflowing with block offset {}",
                self.block_offset
            ))
        })?;
        // `end` is exclusive.
        let end = head
            .checked_add(1)
            .ok_or_else(|| DriverError::Read(anyhow::anyhow!("L2 head {head} is out of range")))?;
        Ok(SubmissionRange::new(start, end)?)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use batch_submitter_types::L2Block;

    use super::*;

    #[derive(Debug)]
    struct FixedLedgers {
        committed: u64,
        head: u64,
    }

    #[async_trait::async_trait]
    impl CommittedElements for FixedLedgers {
        async fn total_elements(&self) -> anyhow::Result<u64> {
            Ok(self.committed)
        }
    }

    #[async_trait::async_trait]
    impl L2BlockSource for FixedLedgers {
        async fn head_block_number(&self) -> anyhow::Result<u64> {
            Ok(self.head)
        }

        async fn block_by_number(&self, number: u64) -> anyhow::Result<L2Block> {
            anyhow::bail!("block {number} is not served")
        }
    }

    fn resolver(committed: u64, head: u64, block_offset: u64) -> RangeResolver {
        let ledgers = Arc::new(FixedLedgers { committed, head });
        RangeResolver::new(ledgers.clone(), ledgers, block_offset)
    }

    #[tokio::test]
    async fn range_starts_after_committed_elements() {
        let range = resolver(99, 104, 1).resolve().await.unwrap();
        assert_eq!(range, SubmissionRange::new(100, 105).unwrap());
    }

    #[tokio::test]
    async fn committed_ahead_of_head_is_range_error() {
        let err = resolver(200, 104, 1).resolve().await.unwrap_err();
        assert_matches!(err, DriverError::Range(_));
    }

    #[tokio::test]
    async fn overflowing_heights_are_read_errors() {
        let err = resolver(u64::MAX, 104, 1).resolve().await.unwrap_err();
        assert_matches!(err, DriverError::Read(_));

        let err = resolver(0, u64::MAX, 1).resolve().await.unwrap_err();
        assert_matches!(err, DriverError::Read(_));
    }
}
