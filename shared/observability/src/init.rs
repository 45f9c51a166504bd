//! Tracing initialization for the helpdesk RAG services.
//!
//! Sets up an env-filtered console layer and a daily-rotating file layer so
//! each service writes one log file per day under `logs/`.

use std::env;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Configuration for tracing initialization.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name, used as the log file stem.
    pub service_name: String,
    /// Log level filter (e.g. "info", "rag_api=debug,info").
    pub level: String,
    /// Directory for daily log files; `None` disables the file layer.
    pub log_dir: Option<String>,
    /// Whether to include file/line in logs.
    pub include_location: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "helpdesk".to_string(),
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_dir: Some(env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string())),
            include_location: false,
        }
    }
}

impl TracingConfig {
    /// Create config for a specific service.
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set log level.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Override the log directory.
    pub fn with_log_dir(mut self, dir: impl Into<String>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Disable the daily file layer (console only).
    pub fn console_only(mut self) -> Self {
        self.log_dir = None;
        self
    }
}

/// Initialize tracing with the given configuration.
///
/// Returns the file writer guard; hold it for the lifetime of the process so
/// buffered log lines are flushed on shutdown.
pub fn init_tracing(config: TracingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(
                dir,
                format!("{}.log", config.service_name),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .init();

            tracing::info!(
                service = %config.service_name,
                log_dir = %dir,
                "Tracing initialized"
            );
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .init();

            tracing::info!(service = %config.service_name, "Tracing initialized");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::for_service("rag-api")
            .with_level("debug")
            .with_log_dir("logs/test");

        assert_eq!(config.service_name, "rag-api");
        assert_eq!(config.level, "debug");
        assert_eq!(config.log_dir.as_deref(), Some("logs/test"));

        let console = TracingConfig::for_service("sync").console_only();
        assert!(console.log_dir.is_none());
    }
}
