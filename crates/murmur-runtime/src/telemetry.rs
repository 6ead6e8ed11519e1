//! Logging and metrics bootstrap.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use murmur_config::ObservabilityConfig;
use murmur_core::{MurmurError, MurmurResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FALLBACK_FILTER: &str = "info";

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Returns `false` when a
/// subscriber was already installed, which leaves the existing one in place.
pub fn init_tracing(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };

    if installed.is_ok() {
        tracing::info!(
            log_level = %config.log_level,
            json = config.json_logs,
            "Logging initialized"
        );
    }
    installed.is_ok()
}

/// Installs the Prometheus recorder and registers every metric description.
///
/// Returns the handle used to render the exposition text, or `None` when
/// metrics are disabled.
pub fn init_metrics(config: &ObservabilityConfig) -> MurmurResult<Option<PrometheusHandle>> {
    if !config.metrics_enabled {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MurmurError::Internal(format!("Failed to install metrics recorder: {e}")))?;

    murmur_jobs::register_metrics();
    murmur_feed::register_metrics();

    tracing::info!("Prometheus metrics recorder installed");
    Ok(Some(handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        let config = ObservabilityConfig::default();
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }

    #[test]
    fn test_metrics_disabled() {
        let config = ObservabilityConfig {
            metrics_enabled: false,
            ..ObservabilityConfig::default()
        };
        assert!(init_metrics(&config).unwrap().is_none());
    }

    #[test]
    fn test_metrics_recorder_installs_once() {
        let config = ObservabilityConfig::default();
        let handle = init_metrics(&config).unwrap().unwrap();

        murmur_feed::metrics::CacheMetrics::miss("explore");
        assert!(handle.render().contains("murmur_feed_cache_misses_total"));

        assert!(init_metrics(&config).is_err());
    }
}
