//! Tracing subscriber bootstrap shared by every service binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppConfig, LogFormat};

/// Installs the global subscriber.
///
/// Level filtering comes from `RUST_LOG` (default `info`); the formatter from
/// [`AppConfig::log_format`]. Log shipping to the configured sink is handled
/// by the collector tailing stdout, so the sink URI is only reported.
pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    if let Some(uri) = &config.log_sink_uri {
        tracing::info!(service = %config.service_name, sink = %uri, "log sink configured");
    }
}
