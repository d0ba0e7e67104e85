//! # Logging, tracing and metrics setup
//!
//! Every binary in the workspace calls [init_opentelemetry] once at startup.
//! Logs always go to stdout. Traces and metrics are exported over OTLP only when
//! `OTEL_SDK_DISABLED=false`.

use std::borrow::Cow;
use std::time::Duration;

use error_stack::{Result, ResultExt};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, InstrumentationScope};
use opentelemetry_otlp::{MetricExporter, SpanExporter};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::resource::{ResourceDetector, SdkProvidedResourceDetector};
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use tracing::Subscriber;
use tracing_opentelemetry::MetricsLayer;
use tracing_subscriber::{prelude::*, registry::LookupSpan, EnvFilter, Layer};

pub use opentelemetry::metrics::{Counter, Gauge, Meter};
pub use opentelemetry::KeyValue;

const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";
const OTEL_METRIC_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";
const RUST_LOG_FORMAT: &str = "RUST_LOG_FORMAT";

const DEFAULT_METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_LOG_DIRECTIVE: &str = "info";

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug)]
pub struct OpenTelemetryInitError;
impl error_stack::Context for OpenTelemetryInitError {}

impl std::fmt::Display for OpenTelemetryInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("failed to initialize opentelemetry")
    }
}

/// Telemetry settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Export traces and metrics over OTLP.
    pub export: bool,
    /// Print logs as JSON lines instead of the compact format.
    pub json_logs: bool,
    /// How often metrics are pushed to the collector.
    pub metric_export_interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            export: false,
            json_logs: false,
            metric_export_interval: DEFAULT_METRIC_EXPORT_INTERVAL,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, which returns the value of an
    /// environment variable if it's set.
    ///
    /// Exports are opt-in: they stay disabled unless `OTEL_SDK_DISABLED` is `false`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let export = lookup(OTEL_SDK_DISABLED)
            .map(|value| value.eq_ignore_ascii_case("false"))
            .unwrap_or(false);
        let json_logs = lookup(RUST_LOG_FORMAT)
            .map(|value| value == "json")
            .unwrap_or(false);
        let metric_export_interval = lookup(OTEL_METRIC_EXPORT_INTERVAL)
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_METRIC_EXPORT_INTERVAL);

        Self {
            export,
            json_logs,
            metric_export_interval,
        }
    }
}

/// Returns the named meter from the global meter provider.
///
/// Until [init_opentelemetry] installs an exporter, the returned meter is a no-op.
pub fn meter(name: &'static str) -> Meter {
    global::meter(name)
}

/// Initialize logging and, if enabled, OpenTelemetry exporters.
///
/// ```rs
/// use ledger_observability::init_opentelemetry;
///
/// init_opentelemetry(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")).unwrap();
/// ```
pub fn init_opentelemetry(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
) -> Result<(), OpenTelemetryInitError> {
    let config = TelemetryConfig::from_env();

    let mut layers = vec![stdout(&config)];

    if config.export {
        let resource = SdkProvidedResourceDetector.detect(Duration::from_secs(1));
        let scope = InstrumentationScope::builder(package_name.into())
            .with_version(package_version.into())
            .build();

        let meter_provider = meter_provider(&config, resource.clone())?;
        global::set_meter_provider(meter_provider.clone());

        layers.push(export_layer(resource, scope, meter_provider)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .change_context(OpenTelemetryInitError)
        .attach_printable("failed to install global tracing subscriber")?;

    Ok(())
}

/// Pushes the engine and request metrics to the OTLP collector.
fn meter_provider(
    config: &TelemetryConfig,
    resource: Resource,
) -> Result<SdkMeterProvider, OpenTelemetryInitError> {
    let exporter = MetricExporter::builder()
        .with_tonic()
        .build()
        .change_context(OpenTelemetryInitError)
        .attach_printable("failed to create metrics exporter")?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(config.metric_export_interval)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

/// Sends spans to the OTLP collector and turns `monotonic_counter.*` style
/// tracing fields into metrics.
fn export_layer<S>(
    resource: Resource,
    scope: InstrumentationScope,
    meter_provider: SdkMeterProvider,
) -> Result<BoxedLayer<S>, OpenTelemetryInitError>
where
    S: Subscriber + Send + Sync,
    for<'a> S: LookupSpan<'a>,
{
    let exporter = SpanExporter::builder()
        .with_tonic()
        .build()
        .change_context(OpenTelemetryInitError)
        .attach_printable("failed to create span exporter")?;

    let tracer = TracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter, runtime::Tokio)
        .build()
        .tracer_with_scope(scope);

    Ok(tracing_opentelemetry::layer()
        .with_tracer(tracer)
        .and_then(MetricsLayer::new(meter_provider))
        .and_then(env_filter())
        .boxed())
}

fn stdout<S>(config: &TelemetryConfig) -> BoxedLayer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    if config.json_logs {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .json()
            .with_filter(env_filter())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .compact()
            .with_filter(env_filter())
            .boxed()
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> TelemetryConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        TelemetryConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_exports_are_opt_in() {
        assert_eq!(config(&[]), TelemetryConfig::default());
        assert!(!config(&[("OTEL_SDK_DISABLED", "true")]).export);
        assert!(!config(&[("OTEL_SDK_DISABLED", "")]).export);
        assert!(config(&[("OTEL_SDK_DISABLED", "false")]).export);
    }

    #[test]
    fn test_log_format() {
        assert!(config(&[("RUST_LOG_FORMAT", "json")]).json_logs);
        assert!(!config(&[("RUST_LOG_FORMAT", "compact")]).json_logs);
    }

    #[test]
    fn test_metric_export_interval() {
        let interval = |value: &str| {
            config(&[("OTEL_METRIC_EXPORT_INTERVAL", value)]).metric_export_interval
        };
        assert_eq!(interval("2500"), Duration::from_millis(2500));
        assert_eq!(interval("0"), DEFAULT_METRIC_EXPORT_INTERVAL);
        assert_eq!(interval("soon"), DEFAULT_METRIC_EXPORT_INTERVAL);
    }
}
