use std::fmt;
use std::time::Duration;

use alloy::consensus::constants::GWEI_TO_WEI;
use alloy::primitives::U256;
use batch_submitter_batch_encoder::EncodedBatch;
use batch_submitter_tx_manager::Confirmation;
use vise::{
    Buckets, Counter, EncodeLabelSet, EncodeLabelValue, Family, Gauge, Histogram, Metrics, Unit,
};

const BATCH_SIZE_BUCKETS: Buckets = Buckets::exponential(1_024.0..=1_048_576.0, 2.0);
const ELEMENT_COUNT_BUCKETS: Buckets = Buckets::exponential(1.0..=8_192.0, 2.0);
const ATTEMPT_BUCKETS: Buckets = Buckets::linear(1.0..=16.0, 1.0);
const CONFIRMATION_BUCKETS: Buckets = Buckets::exponential(1.0..=4_096.0, 2.0);

/// Reason a submission cycle was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue, EncodeLabelSet)]
#[metrics(label = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    Range,
    Encoding,
    Read,
    Timeout,
    Reverted,
    Build,
}

#[derive(Debug, Metrics)]
#[metrics(prefix = "batch_submitter")]
pub struct BatchSubmitterMetrics {
    /// Balance of the submitting wallet, in ETH.
    pub eth_balance: Gauge<f64>,
    /// Size of every signed batch transaction, one sample per broadcast attempt.
    #[metrics(buckets = BATCH_SIZE_BUCKETS)]
    pub batch_size_bytes: Histogram<usize>,
    #[metrics(buckets = ELEMENT_COUNT_BUCKETS)]
    pub num_elements_per_batch: Histogram<u64>,
    #[metrics(unit = Unit::Seconds, buckets = Buckets::LATENCIES)]
    pub batch_tx_build_time: Histogram<Duration>,
    /// Time from the first broadcast to confirmation.
    #[metrics(unit = Unit::Seconds, buckets = CONFIRMATION_BUCKETS)]
    pub batch_confirmation_time: Histogram<Duration>,
    pub batches_submitted: Counter,
    pub failed_submissions: Family<FailureKind, Counter>,
    pub submission_gas_used: Gauge<u64>,
    /// Unix timestamp of the last confirmed submission.
    pub submission_timestamp_ms: Gauge<u64>,
    #[metrics(buckets = ATTEMPT_BUCKETS)]
    pub tx_attempts_per_batch: Histogram<usize>,
    /// Exclusive end (L2 height) of the last confirmed batch.
    pub last_committed_element: Gauge<u64>,
}

#[vise::register]
pub(crate) static METRICS: vise::Global<BatchSubmitterMetrics> = vise::Global::new();

/// Sink for submission outcomes.
pub trait SubmitterTelemetry: Send + Sync + fmt::Debug {
    fn record_balance(&self, balance: U256);

    fn record_batch_built(&self, batch: &EncodedBatch, build_time: Duration);

    /// Called for every signed attempt.
    fn record_batch_size(&self, size: usize);

    fn record_confirmation(&self, batch: &EncodedBatch, confirmation: &Confirmation);

    fn record_failure(&self, kind: FailureKind);
}

/// Reports to the global `vise` registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsTelemetry;

fn wei_to_eth(balance: U256) -> f64 {
    let gwei = balance / U256::from(GWEI_TO_WEI);
    u128::try_from(gwei).map_or(f64::MAX, |gwei| gwei as f64 / GWEI_TO_WEI as f64)
}

impl SubmitterTelemetry for MetricsTelemetry {
    fn record_balance(&self, balance: U256) {
        METRICS.eth_balance.set(wei_to_eth(balance));
    }

    fn record_batch_built(&self, batch: &EncodedBatch, build_time: Duration) {
        METRICS.batch_tx_build_time.observe(build_time);
        METRICS.num_elements_per_batch.observe(batch.num_elements());
    }

    fn record_batch_size(&self, size: usize) {
        METRICS.batch_size_bytes.observe(size);
    }

    fn record_confirmation(&self, batch: &EncodedBatch, confirmation: &Confirmation) {
        METRICS.batch_confirmation_time.observe(confirmation.elapsed);
        METRICS.batches_submitted.inc();
        METRICS
            .submission_gas_used
            .set(confirmation.receipt.gas_used);
        let now_ms = chrono::Utc::now().timestamp_millis();
        METRICS
            .submission_timestamp_ms
            .set(u64::try_from(now_ms).unwrap_or_default());
        METRICS
            .tx_attempts_per_batch
            .observe(confirmation.attempts);
        METRICS.last_committed_element.set(batch.range.end());
    }

    fn record_failure(&self, kind: FailureKind) {
        METRICS.failed_submissions[&kind].inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_is_reported_in_eth() {
        let wei = U256::from(1_500_000_000_000_000_000_u128);
        assert_eq!(wei_to_eth(wei), 1.5);
        assert_eq!(wei_to_eth(U256::ZERO), 0.0);
        assert_eq!(wei_to_eth(U256::MAX), f64::MAX);
    }

    #[test]
    fn failures_are_counted_per_kind() {
        let before = METRICS.failed_submissions[&FailureKind::Timeout].get();
        MetricsTelemetry.record_failure(FailureKind::Timeout);
        assert_eq!(
            METRICS.failed_submissions[&FailureKind::Timeout].get(),
            before + 1
        );
    }
}
