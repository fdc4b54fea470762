use std::any::Any;
use std::sync::Arc;

use serde::Deserialize;
use stt_dispatch::Dispatcher;
use stt_types::{AudioChunk, CoreError, JobImpl, TranscriptionResult, TranscriptionSequence};

use crate::contexts::RawPcmDecoder;
use crate::provider::{ProviderError, TranscriptionEvent, TranscriptionProvider, TranscriptionSession};

const DEBUG_JOB_PERIOD_MS: u64 = 1_000;

/// Per-session configuration a client supplies for the debug provider: the
/// raw PCM shape of the audio it's about to send.
#[derive(Debug, Clone, Deserialize)]
pub struct DebugSessionConfig {
	#[serde(default = "default_sample_rate")]
	pub sample_rate: u32,
	#[serde(default = "default_num_channels")]
	pub num_channels: u16,
}

fn default_sample_rate() -> u32 {
	16_000
}

fn default_num_channels() -> u16 {
	1
}

/// Echoes back how much audio it decoded, with no transcription model
/// involved at all. Useful for exercising the wire protocol, session
/// lifecycle, and dispatcher placement without a real speech backend.
struct DebugProviderJob {
	decoder: RawPcmDecoder,
}

impl JobImpl for DebugProviderJob {
	fn process_batch(&mut self, _contexts: &mut [Box<dyn Any + Send>], batch: Vec<AudioChunk>) -> Result<Box<dyn Any + Send>, CoreError> {
		let mut total_samples = 0_usize;
		for chunk in &batch {
			total_samples += self.decoder.decode(&chunk.bytes)?.len();
		}
		Ok(Box::new(total_samples as f64 / 16_000.0))
	}
}

/// No context requirements and no real model: registers a job directly on
/// whichever worker is least utilized.
pub struct DebugProvider {
	dispatcher: Arc<Dispatcher>,
}

impl DebugProvider {
	pub fn from_config(dispatcher: Arc<Dispatcher>, _provider_config: serde_json::Value) -> Result<Self, ProviderError> {
		Ok(Self { dispatcher })
	}
}

impl TranscriptionProvider for DebugProvider {
	fn create_session(&self, session_config: serde_json::Value) -> Result<TranscriptionSession, ProviderError> {
		let config: DebugSessionConfig = serde_json::from_value(session_config).map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;

		let job = self.dispatcher.register_job(
			vec![],
			DEBUG_JOB_PERIOD_MS,
			Box::new(DebugProviderJob {
				decoder: RawPcmDecoder::new(config.num_channels),
			}),
		)?;

		let mut session = TranscriptionSession::new(job, |value| {
			let seconds = *value.downcast::<f64>().ok()?;
			if seconds <= 0.0 {
				return None;
			}
			Some(TranscriptionResult {
				in_progress: Some(TranscriptionSequence {
					text: vec![format!("processed {seconds:.2}s of audio")],
					starts: vec![0.0],
					ends: vec![seconds],
				}),
				r#final: None,
			})
		});

		session.push_pending(TranscriptionEvent::Result(TranscriptionResult {
			in_progress: Some(TranscriptionSequence {
				text: vec![format!("debug session ready: {} Hz, {} channel(s)", config.sample_rate, config.num_channels)],
				starts: vec![0.0],
				ends: vec![0.0],
			}),
			r#final: None,
		}));

		Ok(session)
	}
}
