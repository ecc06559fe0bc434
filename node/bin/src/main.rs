use std::{net::Ipv4Addr, path::PathBuf, sync::Arc, time::Duration};

use alloy::{
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use anyhow::Context;
use backon::{ExponentialBuilder, Retryable};
use batch_submitter_contract_interface::{CtcReader, L1Client};
use batch_submitter_observability::{Logs, ObservabilityBuilder, Sentry};
use batch_submitter_service::{BatchSubmitter, MetricsTelemetry, SequencerDriver};
use batch_submitter_tx_manager::TxManager;
use clap::Parser;
use tokio::sync::watch;
use vise::MetricsCollection;
use vise_exporter::MetricsExporter;

use crate::config::{Config, ObservabilityConfig};

mod config;

#[derive(Debug, Parser)]
#[command(version, about = "Submits L2 sequencer blocks to the canonical transaction chain on L1")]
struct Cli {
    /// Path to a YAML config file. Every value can be overridden with `BATCH_SUBMITTER_*` env vars.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let _observability_guard = install_observability(&config.observability)?;

    tracing::info!(
        name = %config.general.name,
        ctc_address = %config.sequencer.ctc_address,
        l1_chain_id = config.general.l1_chain_id,
        "starting batch submitter"
    );

    let l1_provider = connect(&config.general.l1_rpc_url).context("L1 provider")?;
    let l2_provider = connect(&config.general.l2_rpc_url).context("L2 provider")?;
    check_l1_chain_id(&l1_provider, config.general.l1_chain_id).await?;

    let signer: PrivateKeySigner = config
        .sequencer
        .operator_private_key()
        .parse()
        .context("invalid sequencer.operator_private_key")?;
    tracing::info!(operator = %signer.address(), "loaded operator key");

    let l1: Arc<dyn L1Client> = Arc::new(l1_provider.clone());
    let ctc = Arc::new(CtcReader::new(config.sequencer.ctc_address, l1_provider));
    let driver = SequencerDriver::new(
        config.sequencer.driver_config(&config.general),
        signer,
        ctc,
        Arc::new(l2_provider),
        l1.clone(),
    );
    let tx_manager = TxManager::new(config.tx_manager.into(), l1.clone());
    let submitter = BatchSubmitter::new(
        driver,
        l1,
        tx_manager,
        Arc::new(MetricsTelemetry),
        config.general.poll_interval,
    );

    let (stop_sender, stop_receiver) = watch::channel(false);
    if let Some(port) = config.general.prometheus_port {
        tokio::spawn(run_metrics_exporter(port, stop_receiver.clone()));
    }
    let mut service = tokio::spawn(submitter.run(stop_receiver));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed listening for Ctrl+C")?;
            tracing::info!("received stop signal, shutting down");
        }
        result = &mut service => {
            return result.context("batch submitter task panicked")?;
        }
    }

    stop_sender.send_replace(true);
    service.await.context("batch submitter task panicked")?
}

fn install_observability(
    config: &ObservabilityConfig,
) -> anyhow::Result<batch_submitter_observability::ObservabilityGuard> {
    let logs = Logs::new(config.log_format()?).with_log_directives(config.log_directives.clone());
    let sentry = config
        .sentry_url
        .as_deref()
        .map(Sentry::new)
        .transpose()
        .context("invalid observability.sentry_url")?
        .map(|sentry| {
            sentry
                .with_environment(config.sentry_environment.clone())
                .with_release(Some(env!("CARGO_PKG_VERSION").to_owned()))
        });
    ObservabilityBuilder::new()
        .with_logs(Some(logs))
        .with_sentry(sentry)
        .try_build()
}

async fn run_metrics_exporter(port: u16, mut stop_receiver: watch::Receiver<bool>) {
    let registry = MetricsCollection::lazy().collect();
    let exporter = MetricsExporter::new(registry.into()).with_graceful_shutdown(async move {
        stop_receiver.changed().await.ok();
    });
    let bind_address = (Ipv4Addr::UNSPECIFIED, port).into();
    if let Err(err) = exporter.start(bind_address).await {
        tracing::error!(port, "metrics exporter failed: {err:#}");
    }
}

fn connect(url: &str) -> anyhow::Result<DynProvider> {
    let url: Url = url.parse().with_context(|| format!("invalid RPC URL `{url}`"))?;
    Ok(ProviderBuilder::new().connect_http(url).erased())
}

/// Waits for the L1 node to come up and makes sure it serves the configured chain.
async fn check_l1_chain_id(provider: &DynProvider, expected: u64) -> anyhow::Result<()> {
    let chain_id = (|| async { provider.get_chain_id().await })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(20))
                .with_max_times(10),
        )
        .notify(|err, dur| {
            tracing::warn!(%err, ?dur, "L1 node is not reachable, retrying");
        })
        .await
        .context("failed fetching L1 chain id")?;
    anyhow::ensure!(
        chain_id == expected,
        "L1 node serves chain {chain_id}, expected {expected}"
    );
    Ok(())
}
