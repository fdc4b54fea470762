mod observability;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use observability::GatewayMetrics;
use stt_session::{AuthService, GatewayConfig, ProviderConfigFile, ProviderRegistry};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Clone)]
struct AppState {
	auth: Arc<AuthService>,
	providers: Arc<ProviderRegistry>,
	metrics: GatewayMetrics,
	ws_init_timeout_sec: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config = GatewayConfig::load();

	let provider_config = ProviderConfigFile::load(&config.provider_config_path).map_err(|e| anyhow::anyhow!("failed to load provider config: {e}"))?;

	let metrics = match observability::init_observability("stt-gateway", &config.log_level, config.dev) {
		Ok((_meter_provider, metrics)) => {
			info!("observability initialized with otlp export");
			metrics
		}
		Err(e) => {
			warn!(error = %e, "otlp export unavailable, continuing with local metrics only");
			observability::init_local_only(&config.log_level, config.dev)
		}
	};

	info!(port = config.port, host = %config.host, "starting stt-gateway");

	let auth = Arc::new(AuthService::new(config.api_key.clone()));
	let providers = Arc::new(ProviderRegistry::new(provider_config).map_err(|e| anyhow::anyhow!("failed to build provider registry: {e}"))?);

	let state = AppState {
		auth,
		providers: providers.clone(),
		metrics,
		ws_init_timeout_sec: config.ws_init_timeout_sec,
	};

	let app = Router::new()
		.route("/healthcheck", get(healthcheck))
		.route("/transcription_stream/:provider_key", get(ws::upgrade))
		.layer(tower_http::trace::TraceLayer::new_for_http())
		.with_state(state);

	let addr = SocketAddr::new(config.host, config.port);
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!(%addr, "listening");

	if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown_signal()).await {
		error!(error = %e, "server exited with an error");
	}

	info!("shutdown signal handled, draining workers");
	providers.shutdown().await;
	info!("shut down cleanly");
	Ok(())
}

async fn healthcheck() -> &'static str {
	"ok"
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c().await.expect("failed to install ctrl-c handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate()).expect("failed to install sigterm handler").recv().await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}
}
