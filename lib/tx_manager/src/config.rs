use alloy::consensus::constants::GWEI_TO_WEI;
use std::time::Duration;

/// Configuration of the transaction manager.
#[derive(Clone, Debug)]
pub struct TxManagerConfig {
    /// Gas price floor (in gwei). The network suggestion is raised to at least this value.
    pub min_gas_price_gwei: u64,

    /// Gas price ceiling (in gwei). Escalation never goes above it.
    pub max_gas_price_gwei: u64,

    /// Factor applied to the gas price every time an attempt is not confirmed in time.
    pub gas_price_multiplier: f64,

    /// How long to wait for a confirmation before escalating the gas price.
    pub resubmission_timeout: Duration,

    /// How often to poll L1 for receipts of broadcast attempts.
    pub receipt_query_interval: Duration,

    /// Overall deadline of a single `send` call.
    pub confirmation_timeout: Duration,

    /// Number of blocks (including the inclusion block) a receipt must have before it counts.
    pub num_confirmations: u64,
}

impl TxManagerConfig {
    /// Gas price floor (in wei).
    pub fn min_gas_price(&self) -> u128 {
        self.min_gas_price_gwei as u128 * (GWEI_TO_WEI as u128)
    }

    /// Gas price ceiling (in wei).
    pub fn max_gas_price(&self) -> u128 {
        self.max_gas_price_gwei as u128 * (GWEI_TO_WEI as u128)
    }
}
