//! Logging and error reporting setup shared by the batch submitter binaries.

use std::time::Duration;

use anyhow::Context as _;
use ::sentry::ClientInitGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use crate::{
    logs::{LogFormat, LogFormatError, Logs},
    sentry::Sentry,
};

mod logs;
mod sentry;

/// Builder for the observability subsystem.
#[derive(Debug, Default)]
pub struct ObservabilityBuilder {
    logs: Option<Logs>,
    sentry: Option<Sentry>,
}

/// Flushes and closes configured integrations when dropped.
pub struct ObservabilityGuard {
    sentry_guard: Option<ClientInitGuard>,
}

impl ObservabilityGuard {
    const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn shutdown(&mut self) {
        if let Some(sentry_guard) = self.sentry_guard.take() {
            sentry_guard.flush(Some(Self::FLUSH_TIMEOUT));
            sentry_guard.close(Some(Self::FLUSH_TIMEOUT));
            tracing::info!("Sentry client is shut down");
        }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ObservabilityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilityGuard")
            .field("sentry", &self.sentry_guard.is_some())
            .finish()
    }
}

impl ObservabilityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logs(mut self, logs: Option<Logs>) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_sentry(mut self, sentry: Option<Sentry>) -> Self {
        self.sentry = sentry;
        self
    }

    /// Installs the global subscriber. Fails if one is already installed.
    pub fn try_build(self) -> anyhow::Result<ObservabilityGuard> {
        let logs = self.logs.unwrap_or_default();
        logs.install_panic_hook();

        let filter = logs.build_filter();
        let sentry_layer = self.sentry.as_ref().map(|sentry| sentry.layer());
        tracing_subscriber::registry()
            .with(filter)
            .with(logs.into_layer())
            .with(sentry_layer)
            .try_init()
            .context("failed installing global tracing subscriber")?;

        Ok(ObservabilityGuard {
            sentry_guard: self.sentry.map(Sentry::install),
        })
    }
}
