use std::{fs, io, path::Path, time::Duration};

use alloy::primitives::Address;
use anyhow::Context;
use batch_submitter_observability::LogFormat;
use batch_submitter_service::SequencerDriverConfig;
use batch_submitter_tx_manager::TxManagerConfig;
use smart_config::{
    ConfigRepository, ConfigSchema, ConfigSources, DescribeConfig, DeserializeConfig, Environment,
    ParseErrors, Yaml,
    de::Serde,
    value::{ExposeSecret, SecretString},
};

/// Prefix of environment variables overriding config values, e.g.
/// `BATCH_SUBMITTER_GENERAL_POLL_INTERVAL=30s`.
pub const ENV_PREFIX: &str = "BATCH_SUBMITTER_";

#[derive(Debug, Clone, DescribeConfig, DeserializeConfig)]
pub struct Config {
    #[config(nest)]
    pub general: GeneralConfig,
    #[config(nest)]
    pub sequencer: SequencerConfig,
    #[config(nest)]
    pub tx_manager: TxManagerSection,
    #[config(nest)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, DescribeConfig, DeserializeConfig)]
pub struct GeneralConfig {
    /// Name attached to logs of every submission cycle.
    #[config(default_t = "sequencer".into())]
    pub name: String,
    /// Delay between two submission cycles.
    #[config(default_t = Duration::from_secs(15))]
    pub poll_interval: Duration,
    /// JSON-RPC endpoint of the L1 node.
    pub l1_rpc_url: String,
    /// JSON-RPC endpoint of the L2 node.
    pub l2_rpc_url: String,
    /// Chain id the L1 endpoint must report.
    pub l1_chain_id: u64,
    /// Port of the Prometheus scrape endpoint. Metrics are not exported when unset.
    pub prometheus_port: Option<u16>,
}

#[derive(Debug, Clone, DescribeConfig, DeserializeConfig)]
pub struct SequencerConfig {
    /// Address of the canonical transaction chain contract on L1.
    #[config(with = Serde![str])]
    pub ctc_address: Address,
    /// Number of L2 blocks preceding the first element of the chain.
    #[config(default_t = 1)]
    pub block_offset: u64,
    /// Upper bound on the calldata size of a batch transaction (in bytes).
    #[config(default_t = 90_000)]
    pub max_tx_size: usize,
    /// Share of elements (in percent) dropped on every pruning pass.
    #[config(default_t = 10)]
    pub prune_percent: u8,
    /// Private key of the operator submitting batches.
    pub operator_private_key: SecretString,
    /// Extra gas (in percent) added on top of the estimated gas limit.
    #[config(default_t = 20)]
    pub gas_limit_buffer_percent: u64,
}

#[derive(Debug, Clone, DescribeConfig, DeserializeConfig)]
pub struct TxManagerSection {
    /// Gas price floor (in gwei).
    #[config(default_t = 1)]
    pub min_gas_price_gwei: u64,
    /// Gas price ceiling (in gwei).
    #[config(default_t = 200)]
    pub max_gas_price_gwei: u64,
    /// Factor applied to the gas price on each resubmission.
    #[config(default_t = 1.5)]
    pub gas_price_multiplier: f64,
    #[config(default_t = Duration::from_secs(60))]
    pub resubmission_timeout: Duration,
    #[config(default_t = Duration::from_secs(5))]
    pub receipt_query_interval: Duration,
    /// Overall deadline for a batch transaction to get confirmed.
    #[config(default_t = Duration::from_secs(600))]
    pub confirmation_timeout: Duration,
    #[config(default_t = 1)]
    pub num_confirmations: u64,
}

#[derive(Debug, Clone, DescribeConfig, DeserializeConfig)]
pub struct ObservabilityConfig {
    /// `plain`, `json` or `logfmt`.
    #[config(default_t = "plain".into())]
    pub log_format: String,
    /// Directives in the `RUST_LOG` format. Falls back to `RUST_LOG` when not set.
    pub log_directives: Option<String>,
    pub sentry_url: Option<String>,
    pub sentry_environment: Option<String>,
}

impl ObservabilityConfig {
    pub fn log_format(&self) -> anyhow::Result<LogFormat> {
        self.log_format
            .parse()
            .with_context(|| format!("invalid observability.log_format `{}`", self.log_format))
    }
}

impl SequencerConfig {
    pub fn driver_config(&self, general: &GeneralConfig) -> SequencerDriverConfig {
        SequencerDriverConfig {
            name: general.name.clone(),
            ctc_address: self.ctc_address,
            l1_chain_id: general.l1_chain_id,
            block_offset: self.block_offset,
            max_tx_size: self.max_tx_size,
            prune_percent: self.prune_percent,
            gas_limit_buffer_percent: self.gas_limit_buffer_percent,
        }
    }

    pub fn operator_private_key(&self) -> &str {
        self.operator_private_key.expose_secret()
    }
}

impl From<TxManagerSection> for TxManagerConfig {
    fn from(section: TxManagerSection) -> Self {
        Self {
            min_gas_price_gwei: section.min_gas_price_gwei,
            max_gas_price_gwei: section.max_gas_price_gwei,
            gas_price_multiplier: section.gas_price_multiplier,
            resubmission_timeout: section.resubmission_timeout,
            receipt_query_interval: section.receipt_query_interval,
            confirmation_timeout: section.confirmation_timeout,
            num_confirmations: section.num_confirmations,
        }
    }
}

impl Config {
    /// Loads the config from an optional YAML file, overridden by `BATCH_SUBMITTER_*` env vars.
    ///
    /// This method is blocking.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut sources = ConfigSources::default();
        if let Some(path) = path {
            sources.push(read_yaml(path)?);
        }
        let mut environment = Environment::prefixed(ENV_PREFIX);
        environment
            .coerce_json()
            .context("failed coercing JSON values in environment variables")?;
        sources.push(environment);
        Self::from_sources(sources)
    }

    fn from_sources(sources: ConfigSources) -> anyhow::Result<Self> {
        let schema = ConfigSchema::new(&Self::DESCRIPTION, "");
        let repo = ConfigRepository::new(&schema).with_all(sources);
        let config = repo.single::<Self>()?.parse().map_err(summarize_errors)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let tx_manager = &self.tx_manager;
        anyhow::ensure!(
            tx_manager.min_gas_price_gwei <= tx_manager.max_gas_price_gwei,
            "tx_manager.min_gas_price_gwei ({}) exceeds tx_manager.max_gas_price_gwei ({})",
            tx_manager.min_gas_price_gwei,
            tx_manager.max_gas_price_gwei
        );
        anyhow::ensure!(
            tx_manager.gas_price_multiplier >= 1.0,
            "tx_manager.gas_price_multiplier must be at least 1, got {}",
            tx_manager.gas_price_multiplier
        );
        anyhow::ensure!(
            self.sequencer.prune_percent > 0 && self.sequencer.prune_percent < 100,
            "sequencer.prune_percent must be in 1..100, got {}",
            self.sequencer.prune_percent
        );
        Ok(())
    }
}

fn read_yaml(path: &Path) -> anyhow::Result<Yaml> {
    let file =
        fs::File::open(path).with_context(|| format!("failed opening config file {path:?}"))?;
    let raw: serde_yaml::Mapping = serde_yaml::from_reader(io::BufReader::new(file))
        .with_context(|| format!("failed reading YAML map from {path:?}"))?;
    let filename = path.as_os_str().to_string_lossy();
    Yaml::new(&filename, raw).with_context(|| format!("failed digesting YAML map from {path:?}"))
}

/// Logging is not installed while the config is parsed, so every error goes into the message.
fn summarize_errors(errors: ParseErrors) -> anyhow::Error {
    let lines: Vec<_> = errors
        .iter()
        .enumerate()
        .map(|(i, err)| format!("{}. {err} (at `{}`)", i + 1, err.path()))
        .collect();
    anyhow::anyhow!("failed parsing config:\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;
    use smart_config::testing::test_complete;

    use super::*;

    const PRIVATE_KEY: &str = "0x7726827caac94a7f9e1b160f7ea819f172f7b6f9d2a97f992c38edeab82d4110";

    fn yaml(raw: &str) -> Yaml {
        Yaml::new("test.yml", serde_yaml::from_str(raw).unwrap()).unwrap()
    }

    #[test]
    fn parsing_sequencer_from_yaml() {
        let yaml = yaml(&format!(
            r#"
              ctc_address: "0x4BF681894abEc828B212C906082B444Ceb2f6cf6"
              block_offset: 0
              max_tx_size: 120000
              prune_percent: 20
              operator_private_key: "{PRIVATE_KEY}"
              gas_limit_buffer_percent: 10
            "#
        ));
        let config: SequencerConfig = test_complete(yaml).unwrap();
        assert_eq!(
            config.ctc_address,
            address!("0x4BF681894abEc828B212C906082B444Ceb2f6cf6")
        );
        assert_eq!(config.block_offset, 0);
        assert_eq!(config.max_tx_size, 120_000);
        assert_eq!(config.prune_percent, 20);
        assert_eq!(config.operator_private_key(), PRIVATE_KEY);
        assert_eq!(config.gas_limit_buffer_percent, 10);
    }

    #[test]
    fn parsing_tx_manager_from_env() {
        let env = r#"
            TX_MANAGER_MIN_GAS_PRICE_GWEI=2
            TX_MANAGER_MAX_GAS_PRICE_GWEI=500
            TX_MANAGER_GAS_PRICE_MULTIPLIER=1.25
            TX_MANAGER_RESUBMISSION_TIMEOUT=90s
            TX_MANAGER_RECEIPT_QUERY_INTERVAL=500ms
            TX_MANAGER_CONFIRMATION_TIMEOUT="20 min"
            TX_MANAGER_NUM_CONFIRMATIONS=3
        "#;
        let env = Environment::from_dotenv("test.env", env)
            .unwrap()
            .strip_prefix("TX_MANAGER_");
        let section: TxManagerSection = test_complete(env).unwrap();
        let config = TxManagerConfig::from(section);
        assert_eq!(config.min_gas_price(), 2_000_000_000);
        assert_eq!(config.max_gas_price(), 500_000_000_000);
        assert_eq!(config.gas_price_multiplier, 1.25);
        assert_eq!(config.resubmission_timeout, Duration::from_secs(90));
        assert_eq!(config.receipt_query_interval, Duration::from_millis(500));
        assert_eq!(config.confirmation_timeout, Duration::from_secs(1_200));
        assert_eq!(config.num_confirmations, 3);
    }

    fn full_yaml(tx_manager: &str) -> Yaml {
        yaml(&format!(
            r#"
              general:
                name: sequencer
                poll_interval: 30s
                l1_rpc_url: http://localhost:8545
                l2_rpc_url: http://localhost:8546
                l1_chain_id: 31337
                prometheus_port: 3312
              sequencer:
                ctc_address: "0x4BF681894abEc828B212C906082B444Ceb2f6cf6"
                operator_private_key: "{PRIVATE_KEY}"
              tx_manager:
                {tx_manager}
              observability:
                log_format: logfmt
                log_directives: batch_submitter=debug
            "#
        ))
    }

    #[test]
    fn full_config_with_defaults() {
        let mut sources = ConfigSources::default();
        sources.push(full_yaml("num_confirmations: 2"));
        let config = Config::from_sources(sources).unwrap();

        assert_eq!(config.general.poll_interval, Duration::from_secs(30));
        assert_eq!(config.general.l1_chain_id, 31_337);
        assert_eq!(config.general.prometheus_port, Some(3312));
        assert_eq!(config.sequencer.block_offset, 1);
        assert_eq!(config.sequencer.prune_percent, 10);
        assert_eq!(config.tx_manager.num_confirmations, 2);
        assert_eq!(config.tx_manager.max_gas_price_gwei, 200);
        assert_eq!(config.observability.log_format().unwrap(), LogFormat::Logfmt);
        assert_eq!(
            config.observability.log_directives.as_deref(),
            Some("batch_submitter=debug")
        );
        assert_eq!(config.observability.sentry_url, None);

        let driver = config.sequencer.driver_config(&config.general);
        assert_eq!(driver.name, "sequencer");
        assert_eq!(driver.l1_chain_id, 31_337);
        assert_eq!(driver.max_tx_size, 90_000);
    }

    #[test]
    fn inverted_gas_price_bounds_are_rejected() {
        let mut sources = ConfigSources::default();
        sources.push(full_yaml("min_gas_price_gwei: 300"));
        let err = Config::from_sources(sources).unwrap_err();
        assert!(err.to_string().contains("min_gas_price_gwei"), "{err}");
    }

    #[test]
    fn missing_private_key_is_reported() {
        let mut sources = ConfigSources::default();
        sources.push(yaml(
            r#"
              general:
                l1_rpc_url: http://localhost:8545
                l2_rpc_url: http://localhost:8546
                l1_chain_id: 1
              sequencer:
                ctc_address: "0x4BF681894abEc828B212C906082B444Ceb2f6cf6"
            "#,
        ));
        let err = Config::from_sources(sources).unwrap_err();
        assert!(err.to_string().contains("operator_private_key"), "{err}");
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let config = ObservabilityConfig {
            log_format: "xml".into(),
            log_directives: None,
            sentry_url: None,
            sentry_environment: None,
        };
        assert!(config.log_format().is_err());
    }
}
