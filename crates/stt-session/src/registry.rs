use std::collections::HashMap;
use std::sync::Arc;

use stt_dispatch::{ContextRegistry, Dispatcher};
use stt_types::JobContextFactory;

use crate::config::{ProviderConfigFile, ProviderUid};
use crate::contexts::{DecoderContextFactory, VadContextFactory};
use crate::error::SessionError;
use crate::provider::{TranscriptionProvider, TranscriptionSession};
use crate::providers::debug::DebugProvider;
use crate::providers::whisper_streaming::WhisperStreamingProvider;

/// Picks a context factory kind by tag: a context tagged `"vad"` gets a VAD
/// backend, everything else gets a decoder backend. `JobContextSpec` has no
/// dedicated backend-kind field, so tags double as the selector here the
/// same way they already double as the dispatcher's placement key.
const VAD_TAG: &str = "vad";

fn build_factories(specs: &[stt_types::JobContextSpec]) -> HashMap<String, Arc<dyn JobContextFactory>> {
	let mut factories: HashMap<String, Arc<dyn JobContextFactory>> = HashMap::new();
	for spec in specs {
		let factory: Arc<dyn JobContextFactory> = if spec.tags.contains(VAD_TAG) {
			Arc::new(VadContextFactory::energy_default())
		} else {
			Arc::new(DecoderContextFactory::placeholder())
		};
		factories.insert(spec.uid.clone(), factory);
	}
	factories
}

/// Owns the dispatcher and every configured provider, and resolves a
/// connection's `provider_key` (carried in the websocket URL path) into a
/// fresh session.
pub struct ProviderRegistry {
	dispatcher: Arc<Dispatcher>,
	providers: HashMap<String, Box<dyn TranscriptionProvider>>,
}

impl ProviderRegistry {
	pub fn new(config: ProviderConfigFile) -> Result<Self, SessionError> {
		let factories = build_factories(&config.contexts);
		let context_registry = ContextRegistry::new(config.contexts, factories);
		let dispatcher = Arc::new(Dispatcher::new(config.num_workers, context_registry, config.rolling_utilization_window_sec)?);

		let mut providers: HashMap<String, Box<dyn TranscriptionProvider>> = HashMap::new();
		for entry in config.providers {
			let provider: Box<dyn TranscriptionProvider> = match entry.provider_uid {
				ProviderUid::Debug => Box::new(DebugProvider::from_config(dispatcher.clone(), entry.provider_config)?),
				ProviderUid::WhisperStreaming => Box::new(WhisperStreamingProvider::from_config(dispatcher.clone(), entry.provider_config)?),
			};
			providers.insert(entry.provider_key, provider);
		}

		Ok(Self { dispatcher, providers })
	}

	pub fn create_session(&self, provider_key: &str, session_config: serde_json::Value) -> Result<TranscriptionSession, SessionError> {
		let provider = self.providers.get(provider_key).ok_or_else(|| SessionError::UnknownProvider(provider_key.to_string()))?;
		Ok(provider.create_session(session_config)?)
	}

	pub async fn shutdown(&self) {
		self.dispatcher.shutdown().await;
	}
}
