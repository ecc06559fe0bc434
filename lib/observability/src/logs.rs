use std::{backtrace::Backtrace, fmt, panic::PanicHookInfo, str::FromStr};

use serde::Deserialize;
use tracing::{Subscriber, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, Layer, fmt as tracing_fmt, registry::LookupSpan};

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Plain,
    /// One JSON object per event.
    Json,
    /// `key=value` pairs.
    Logfmt,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Json => "json",
            Self::Logfmt => "logfmt",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown log format `{0}`, expected one of `plain`, `json` or `logfmt`")]
pub struct LogFormatError(String);

impl FromStr for LogFormat {
    type Err = LogFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            "logfmt" => Ok(Self::Logfmt),
            _ => Err(LogFormatError(s.to_owned())),
        }
    }
}

#[derive(Debug, Default)]
pub struct Logs {
    format: LogFormat,
    /// `EnvFilter` directives. When absent, `RUST_LOG` is used.
    log_directives: Option<String>,
}

impl Logs {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            log_directives: None,
        }
    }

    pub fn with_log_directives(mut self, log_directives: Option<String>) -> Self {
        self.log_directives = log_directives;
        self
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn build_filter(&self) -> EnvFilter {
        let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());
        match &self.log_directives {
            Some(directives) => builder.parse_lossy(directives),
            None => builder.from_env_lossy(),
        }
    }

    pub fn into_layer<S>(self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
    {
        match self.format {
            LogFormat::Plain => tracing_fmt::layer().with_target(true).boxed(),
            LogFormat::Json => tracing_fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .boxed(),
            LogFormat::Logfmt => tracing_logfmt::layer().boxed(),
        }
    }

    /// Routes panics through `tracing` so that they end up in the configured output and in Sentry.
    pub fn install_panic_hook(&self) {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
            let backtrace = Backtrace::capture();
            let location = info
                .location()
                .map(ToString::to_string)
                .unwrap_or_default();
            tracing::error!(
                %location,
                %backtrace,
                "panic: {}",
                panic_message(info)
            );
            default_hook(info);
        }));
    }
}

fn panic_message<'a>(info: &'a PanicHookInfo<'_>) -> &'a str {
    if let Some(message) = info.payload().downcast_ref::<&str>() {
        message
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message
    } else {
        "Box<dyn Any>"
    }
}
