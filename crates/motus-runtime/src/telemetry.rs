//! Tracing pipeline set-up for Motus processes.
//!
//! [`init_tracing`] installs the global `tracing` subscriber once at startup.
//! Console output is always on; spans are additionally exported over OTLP/HTTP
//! when a collector endpoint is configured.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter, `info` when unset. |
//! | `MOTUS_LOG_FORMAT=json` | Newline-delimited JSON instead of compact text. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | Collector base URL (e.g. `http://localhost:4318`). Enables span export. |
//!
//! # Example
//!
//! ```rust,no_run
//! let _guard = motus_runtime::telemetry::init_tracing("motus");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the console log format.
pub const LOG_FORMAT_VAR: &str = "MOTUS_LOG_FORMAT";

const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Install the global subscriber for `service_name`.
///
/// Keep the returned [`TracerProviderGuard`] alive until the process exits;
/// dropping it flushes any spans still buffered for export.  Calling this
/// twice in one process is a no-op the second time.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_VAR).as_deref() == Ok("json");

    let console: Box<dyn Layer<Registry> + Send + Sync> = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().compact().boxed()
    };

    let provider = build_provider(service_name);
    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("motus")));

    // `try_init` so a second call (tests, embedding) does not panic.
    let _ = tracing_subscriber::registry()
        .with(console)
        .with(otel)
        .with(filter)
        .try_init();

    TracerProviderGuard(provider)
}

/// Shuts the OTLP tracer provider down when dropped.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[motus] tracer provider shutdown failed: {e}");
            }
        }
    }
}

/// `None` unless an OTLP endpoint is configured and the exporter builds.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var(OTLP_ENDPOINT_VAR).ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[motus] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // Simple exporter: the CLI initialises tracing before its Tokio runtime
    // exists, and the batch exporter would need one.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}
