//! Batch submission service: resolves the L2 blocks owed to L1, encodes them and drives the
//! resulting transaction to confirmation, once per poll interval.

mod driver;
mod metrics;
mod range;
mod sequencer;
mod service;

pub use driver::{Driver, DriverError, PreparedBatch};
pub use metrics::{FailureKind, MetricsTelemetry, SubmitterTelemetry};
pub use range::RangeResolver;
pub use sequencer::{SequencerDriver, SequencerDriverConfig};
pub use service::{BatchSubmitter, CycleError, CycleOutcome};
