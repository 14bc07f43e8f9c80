use serde::{Deserialize, Serialize};
use std::env;
use std::io;
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    #[default]
    Pretty,
    /// Compact text format
    Compact,
    /// JSON format for log aggregation systems
    Json,
}

impl LogFormat {
    /// Parse a format name, falling back to `Pretty`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Configuration for structured logging
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log output format (pretty/compact/json)
    pub format: LogFormat,
    /// Service name attached to the startup record
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (dev/staging/production)
    pub environment: String,
    /// Enable span events (new/close)
    pub enable_span_events: bool,
    /// Daily rolling log directory; stdout only when unset
    pub log_dir: Option<String>,
}

impl LogConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self::from_lookup(service_name, |key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(service_name: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key)
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(false)
        };

        let log_dir = if flag("LOG_TO_FILE") {
            lookup("LOG_DIR")
        } else {
            None
        };

        Self {
            format: LogFormat::parse(&lookup("LOG_FORMAT").unwrap_or_default()),
            service_name: service_name.into(),
            service_version: lookup("SERVICE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            enable_span_events: flag("LOG_SPAN_EVENTS"),
            log_dir,
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.enable_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

fn env_filter() -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Inference runtime and HTTP internals are noisy at info
    ["hyper=warn", "tokio=warn", "ort=warn"]
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(filter, |f, directive| f.add_directive(directive))
}

/// Initialize structured logging with the given configuration.
///
/// Returns the file writer guard when file logging is enabled; it must be
/// held for the lifetime of the process or buffered lines are lost.
pub fn init_structured_logging(
    config: LogConfig,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // File output is always JSON, whatever the console format
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let file_name = format!("{}.log", config.service_name);
            let file_appender = tracing_appender::rolling::daily(dir, file_name);
            let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .json()
                .with_span_events(config.span_events())
                .with_writer(non_blocking);
            (Some(layer), Some(file_guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer);
    let span_events = config.span_events();

    match config.format {
        LogFormat::Json => {
            let json_layer = fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_current_span(true)
                .with_target(true)
                .with_thread_names(true)
                .with_writer(io::stdout);

            registry.with(json_layer).init();
        }
        LogFormat::Compact => {
            let compact_layer = fmt::layer()
                .compact()
                .with_span_events(span_events)
                .with_target(true);

            registry.with(compact_layer).init();
        }
        LogFormat::Pretty => {
            let pretty_layer = fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_target(true)
                .with_line_number(true);

            registry.with(pretty_layer).init();
        }
    }

    tracing::info!(
        service.name = %config.service_name,
        service.version = %config.service_version,
        environment = %config.environment,
        format = ?config.format,
        file_logging = config.log_dir.is_some(),
        "structured logging initialized"
    );

    guard
}

/// Initialize logging with service name
pub fn init_with_service(
    service_name: impl Into<String>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    init_structured_logging(LogConfig::new(service_name))
}
