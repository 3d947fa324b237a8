use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_stdout::SpanExporter;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const OTEL_STDOUT_ENV: &str = "PEPPER_RELAY_OTEL_STDOUT";
pub const SERVICE_NAME: &str = "pepper-relay";
const DEFAULT_FILTER: &str = "info";

/// Knobs read from the environment before anything is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `RUST_LOG` when set, otherwise `info`.
    pub filter: String,
    pub otel_stdout: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup(EnvFilter::DEFAULT_ENV)
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let otel_stdout = lookup(OTEL_STDOUT_ENV).is_some_and(|raw| is_truthy(&raw));
        Self {
            filter,
            otel_stdout,
        }
    }
}

/// Process-wide Prometheus recorder and tracing subscriber for the relay.
pub struct Telemetry {
    metrics_handle: PrometheusHandle,
    tracer_provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    pub fn init() -> Result<Self> {
        Self::init_with(TelemetryConfig::from_env())
    }

    pub fn init_with(config: TelemetryConfig) -> Result<Self> {
        let metrics_handle = PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install Prometheus metrics recorder")?;
        describe_relay_metrics();

        let filter = EnvFilter::try_new(&config.filter)
            .with_context(|| format!("invalid log filter: {}", config.filter))?;
        let tracer_provider = config.otel_stdout.then(stdout_tracer_provider);
        let otel_layer = tracer_provider.as_ref().map(|provider| {
            global::set_tracer_provider(provider.clone());
            tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME))
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(otel_layer)
            .try_init()
            .context("failed to initialise tracing subscriber")?;
        if tracer_provider.is_some() {
            info!("OpenTelemetry stdout exporter enabled ({OTEL_STDOUT_ENV}=1)");
        }

        Ok(Self {
            metrics_handle,
            tracer_provider,
        })
    }

    pub fn metrics_handle(&self) -> PrometheusHandle {
        self.metrics_handle.clone()
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(provider) = &self.tracer_provider {
            if let Err(err) = provider.shutdown() {
                warn!(error = %err, "failed to shutdown OpenTelemetry tracer provider");
            }
        }
    }
}

fn stdout_tracer_provider() -> SdkTracerProvider {
    SdkTracerProvider::builder()
        .with_simple_exporter(SpanExporter::default())
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(
            Resource::builder()
                .with_attributes(vec![KeyValue::new("service.name", SERVICE_NAME)])
                .build(),
        )
        .build()
}

/// HELP text for everything the registry and connection handler emit.
fn describe_relay_metrics() {
    describe_counter!(
        "pepper_relay_connections_total",
        "Relay clients accepted since start"
    );
    describe_counter!(
        "pepper_relay_connections_closed_total",
        "Relay client sockets that have finished"
    );
    describe_gauge!(
        "pepper_relay_connections_active",
        "Relay clients currently registered"
    );
    describe_counter!(
        "pepper_relay_evictions_total",
        "Clients removed because their queue was closed during a broadcast"
    );
    describe_counter!(
        "pepper_relay_messages_forwarded_total",
        "Frames queued for delivery to other clients"
    );
    describe_counter!(
        "pepper_relay_bytes_forwarded_total",
        Unit::Bytes,
        "Payload bytes queued for delivery to other clients"
    );
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn truthy_values() {
        for value in ["1", "true", "YES", " on "] {
            assert!(is_truthy(value), "{value}");
        }
        for value in ["", "0", "off", "nope"] {
            assert!(!is_truthy(value), "{value}");
        }
    }

    #[test]
    fn config_defaults_to_info_without_otel() {
        let config = TelemetryConfig::from_lookup(lookup(&[("RUST_LOG", "  ")]));
        assert_eq!(
            config,
            TelemetryConfig {
                filter: "info".to_string(),
                otel_stdout: false,
            }
        );
    }

    #[test]
    fn config_reads_filter_and_otel_flag() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            ("RUST_LOG", "pepper_relay=debug,tower_http=info"),
            (OTEL_STDOUT_ENV, "true"),
        ]));
        assert_eq!(config.filter, "pepper_relay=debug,tower_http=info");
        assert!(config.otel_stdout);
    }
}
