use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use stt_types::JobContextSpec;
use thiserror::Error;

/// Everything the process needs from its environment. Mirrors the source's
/// `EnvSchema`: a handful of required variables plus a path to a second,
/// larger JSON document (the provider-config file) that's too structured
/// to carry comfortably as individual environment variables.
#[derive(Parser, Debug, Clone)]
#[command(name = "stt-gateway", about = "Streaming speech-to-text gateway", long_about = None)]
pub struct GatewayConfig {
	#[arg(long, env = "LOG_LEVEL", default_value = "info")]
	pub log_level: String,

	#[arg(long, env = "PORT")]
	pub port: u16,

	#[arg(long, env = "HOST")]
	pub host: IpAddr,

	#[arg(long, env = "API_KEY")]
	pub api_key: String,

	#[arg(long, env = "WS_INIT_TIMEOUT_SEC")]
	pub ws_init_timeout_sec: f64,

	#[arg(long, env = "PROVIDER_CONFIG_PATH")]
	pub provider_config_path: PathBuf,

	/// Switches log output to the pretty human-readable format instead of JSON.
	#[arg(long)]
	pub dev: bool,
}

impl GatewayConfig {
	/// Loads `.env` (if present), then parses CLI/environment arguments.
	/// Does not read the provider-config file; call [`ProviderConfigFile::load`]
	/// separately with `provider_config_path`.
	pub fn load() -> Self {
		dotenvy::dotenv().ok();
		Self::parse()
	}
}

/// One configured job context: a heavy resource (a speech model, a VAD
/// model) a worker may lazily create. `uid` is an operator-chosen
/// identifier, unique within the document; `tags` double as the selector
/// the registry uses to pick which kind of context factory to build for it
/// (see `crate::registry::build_factories`), since the context spec itself
/// carries no separate backend-kind field.
pub type JobContextConfig = JobContextSpec;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderUid {
	Debug,
	WhisperStreaming,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfigEntry {
	pub provider_key: String,
	pub provider_uid: ProviderUid,
	pub provider_config: serde_json::Value,
}

/// The document at `PROVIDER_CONFIG_PATH`: worker fleet sizing plus every
/// job context and transcription provider the fleet should serve.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfigFile {
	pub num_workers: usize,
	pub rolling_utilization_window_sec: f64,
	pub contexts: Vec<JobContextConfig>,
	pub providers: Vec<ProviderConfigEntry>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read provider config file {path}: {source}")]
	Io { path: PathBuf, #[source] source: std::io::Error },
	#[error("failed to parse provider config file {path}: {source}")]
	Parse { path: PathBuf, #[source] source: serde_json::Error },
}

impl ProviderConfigFile {
	pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
		let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
		serde_json::from_str(&contents).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn provider_config_file_parses_minimal_document() {
		let json = r#"{
			"num_workers": 2,
			"rolling_utilization_window_sec": 60.0,
			"contexts": [
				{"uid": "asr-0", "max_instances": -1, "tags": ["asr"], "negative_affinity": null, "creation_cost": 1.0, "context_config": null}
			],
			"providers": [
				{"provider_key": "debug", "provider_uid": "debug", "provider_config": {"sample_rate": 16000, "num_channels": 1}}
			]
		}"#;
		let parsed: ProviderConfigFile = serde_json::from_str(json).unwrap();
		assert_eq!(parsed.num_workers, 2);
		assert_eq!(parsed.contexts.len(), 1);
		assert_eq!(parsed.providers.len(), 1);
	}

	#[test]
	fn unreadable_path_is_an_io_error() {
		let err = ProviderConfigFile::load(std::path::Path::new("/nonexistent/provider-config.json")).unwrap_err();
		assert!(matches!(err, ConfigError::Io { .. }));
	}
}
