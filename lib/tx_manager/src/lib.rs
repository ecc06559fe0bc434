//! Drives a batch transaction to confirmation on L1, escalating the gas price while it stays
//! unconfirmed.

mod config;
mod error;
mod manager;

pub use config::TxManagerConfig;
pub use error::TxManagerError;
pub use manager::{Confirmation, TxFactory, TxManager};
