use std::time::Duration;

use anyhow::Result;
use opentelemetry::trace::TracerProvider;
use opentelemetry::{global, metrics::Counter, metrics::Histogram, metrics::Meter, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
	metrics::SdkMeterProvider,
	runtime,
	trace::{Config, RandomIdGenerator, Sampler},
	Resource,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Counters and histograms for the gateway's connection lifecycle. Kept
/// small and session-shaped rather than mirroring every internal stage —
/// per-worker utilization is already exported separately by the dispatcher's
/// own prometheus registry.
#[derive(Clone)]
pub struct GatewayMetrics {
	pub sessions_opened: Counter<u64>,
	pub sessions_closed: Counter<u64>,
	pub audio_chunks_received: Counter<u64>,
	pub audio_bytes_received: Counter<u64>,
	pub session_lifetime: Histogram<f64>,
}

impl GatewayMetrics {
	pub fn new(meter: &Meter) -> Self {
		Self {
			sessions_opened: meter.u64_counter("gateway.sessions.opened").with_description("Total websocket sessions that reached ACTIVE").init(),
			sessions_closed: meter.u64_counter("gateway.sessions.closed").with_description("Total websocket sessions closed, any reason").init(),
			audio_chunks_received: meter.u64_counter("gateway.audio.chunks_received").with_description("Total binary audio frames received").init(),
			audio_bytes_received: meter.u64_counter("gateway.audio.bytes_received").with_description("Total bytes of audio received").init(),
			session_lifetime: meter.f64_histogram("gateway.sessions.lifetime").with_description("Seconds a session stayed open").init(),
		}
	}
}

/// Initializes OpenTelemetry tracing and metrics export over OTLP, and
/// installs the global tracing subscriber. `dev` switches the fmt layer
/// from structured JSON to a pretty human-readable form.
pub fn init_observability(service_name: &str, log_level: &str, dev: bool) -> Result<(SdkMeterProvider, GatewayMetrics)> {
	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| "http://localhost:4317".to_string());

	info!(service = service_name, endpoint = %otlp_endpoint, "initializing opentelemetry");

	let resource = Resource::new(vec![
		KeyValue::new("service.name", service_name.to_string()),
		KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
	]);

	let tracer = opentelemetry_otlp::new_pipeline()
		.tracing()
		.with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(&otlp_endpoint))
		.with_trace_config(Config::default().with_sampler(Sampler::AlwaysOn).with_id_generator(RandomIdGenerator::default()).with_resource(resource.clone()))
		.install_batch(runtime::Tokio)
		.map_err(|e| anyhow::anyhow!("failed to initialize tracer: {e}"))?;
	let tracer = tracer.tracer("stt-gateway");

	let meter_provider = opentelemetry_otlp::new_pipeline()
		.metrics(runtime::Tokio)
		.with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(&otlp_endpoint))
		.with_resource(resource)
		.with_period(Duration::from_secs(10))
		.build()
		.map_err(|e| anyhow::anyhow!("failed to initialize metrics: {e}"))?;
	global::set_meter_provider(meter_provider.clone());

	let meter = global::meter(service_name.to_owned());
	let metrics = GatewayMetrics::new(&meter);

	let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

	let registry = tracing_subscriber::registry().with(env_filter).with(telemetry_layer);
	if dev {
		registry.with(tracing_subscriber::fmt::layer().pretty()).init();
	} else {
		registry.with(tracing_subscriber::fmt::layer().json()).init();
	}

	info!("opentelemetry initialized");
	Ok((meter_provider, metrics))
}

/// Tracing without an OTLP export, for when the collector is unreachable.
/// The service keeps running; it just loses traces and metrics.
pub fn init_local_only(log_level: &str, dev: bool) -> GatewayMetrics {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
	let registry = tracing_subscriber::registry().with(env_filter);
	if dev {
		registry.with(tracing_subscriber::fmt::layer().pretty()).init();
	} else {
		registry.with(tracing_subscriber::fmt::layer().json()).init();
	}

	let meter = global::meter("stt-gateway-local");
	GatewayMetrics::new(&meter)
}
