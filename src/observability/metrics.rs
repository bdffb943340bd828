//! Prometheus metrics.
//!
//! # Recorded metrics
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `webhook_triggers_total` | counter | |
//! | `webhook_not_eligible_total` | counter | |
//! | `webhook_deliveries_total` | counter | `webhook` |
//! | `webhook_deliveries_success_total` | counter | `webhook` |
//! | `webhook_deliveries_failed_total` | counter | `webhook` |
//! | `webhook_delivery_duration_ms` | histogram | `webhook` |

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;

/// Default exporter port.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Address to bind the metrics exporter.
    pub listen_addr: SocketAddr,
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        let enabled = settings.and_then(|config| config.enabled).unwrap_or(false);
        let port = settings
            .and_then(|config| config.port)
            .unwrap_or(DEFAULT_METRICS_PORT);

        Self {
            enabled,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        }
    }
}

/// Installs the Prometheus metrics recorder and, if `expose`, its HTTP listener.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed or the
/// listener cannot be started.
pub fn install_prometheus(
    config: &MetricsConfig,
    expose: bool,
) -> Result<Option<PrometheusHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new();
    let handle = if expose {
        install_listener(builder.with_http_listener(config.listen_addr))?
    } else {
        builder
            .install_recorder()
            .map_err(|e| Error::OperationFailed {
                operation: "metrics_recorder_install".to_string(),
                cause: e.to_string(),
            })?
    };

    tracing::debug!(listen_addr = %config.listen_addr, expose, "Prometheus recorder installed");
    Ok(Some(handle))
}

fn install_listener(builder: PrometheusBuilder) -> Result<PrometheusHandle> {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        return install_with_runtime(builder, &handle);
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_init".to_string(),
            cause: e.to_string(),
        })?;
    let handle = runtime.handle().clone();
    let prometheus = install_with_runtime(builder, &handle)?;
    thread::Builder::new()
        .name("metrics-exporter-prometheus-http".to_string())
        .spawn(move || runtime.block_on(std::future::pending::<()>()))
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_thread".to_string(),
            cause: e.to_string(),
        })?;
    Ok(prometheus)
}

fn install_with_runtime(
    builder: PrometheusBuilder,
    runtime_handle: &tokio::runtime::Handle,
) -> Result<PrometheusHandle> {
    let (recorder, exporter) = {
        let _guard = runtime_handle.enter();
        builder.build().map_err(|e| Error::OperationFailed {
            operation: "metrics_exporter_build".to_string(),
            cause: e.to_string(),
        })?
    };
    let handle = recorder.handle();
    set_global_recorder(recorder)?;
    runtime_handle.spawn(exporter);
    Ok(handle)
}

fn set_global_recorder(recorder: PrometheusRecorder) -> Result<()> {
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        let config = MetricsConfig::from_settings(None);
        assert!(!config.enabled);
        assert_eq!(config.listen_addr.port(), DEFAULT_METRICS_PORT);
        assert!(install_prometheus(&config, false).expect("noop").is_none());
    }

    #[test]
    fn test_settings_port() {
        let settings = MetricsSettings {
            enabled: Some(true),
            port: Some(9191),
        };
        let config = MetricsConfig::from_settings(Some(&settings));
        assert!(config.enabled);
        assert_eq!(config.listen_addr.port(), 9191);
    }

    #[test]
    fn test_dispatch_metrics_are_recorded() {
        use crate::webhooks::{
            DeliveryFailure, MemoryWebhookStore, MockDeliveryBackend, WebhookConfigStore,
            WebhookDispatcher, WebhookMessage, validate_webhook_config,
        };
        use std::sync::Arc;

        let store = Arc::new(MemoryWebhookStore::new());
        let created = store
            .create(
                validate_webhook_config(&serde_json::json!({
                    "workspaceId": "ws_1",
                    "name": "crm",
                    "url": "https://crm.example.com/hook"
                }))
                .expect("valid"),
            )
            .expect("create");
        let delivery = Arc::new(MockDeliveryBackend::always(Err(DeliveryFailure::Timeout)));
        let dispatcher = WebhookDispatcher::new(store, delivery);

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            dispatcher
                .trigger_webhook(
                    &created.id,
                    &WebhookMessage::new(serde_json::json!({ "event": "call.scheduled" })),
                )
                .expect("dispatch");
        });

        let rendered = handle.render();
        assert!(rendered.contains("webhook_triggers_total"));
        assert!(rendered.contains("webhook_deliveries_failed_total"));
        assert!(rendered.contains("webhook_delivery_duration_ms"));
        assert!(!rendered.contains("webhook_deliveries_success_total"));
    }
}
