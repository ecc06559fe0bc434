use alloy::primitives::TxHash;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TxManagerError {
    /// None of the attempts got confirmed before the deadline. Some of them may still be mined.
    #[error("no confirmation within {timeout:?} after {attempts} broadcast attempts")]
    Timeout { timeout: Duration, attempts: usize },
    #[error("transaction {0} was mined but reverted")]
    Reverted(TxHash),
    #[error("failed to build transaction")]
    Build(#[source] anyhow::Error),
    #[error("stop signal received while waiting for confirmation")]
    Cancelled,
}
