use std::sync::Arc;

use serde::Deserialize;
use stt_dispatch::Dispatcher;
use stt_pipeline::{StreamingJob, StreamingJobConfig};
use stt_types::TranscriptionResult;

use crate::contexts::RawPcmDecoder;
use crate::provider::{ProviderError, TranscriptionProvider, TranscriptionSession};

fn default_vad_context_tag() -> String {
	"vad".to_string()
}

fn default_vad_detector() -> bool {
	true
}

fn default_vad_threshold() -> f64 {
	0.5
}

fn default_silence_threshold() -> f64 {
	0.01
}

/// Static, per-provider tuning loaded once from the provider-config file:
/// which context tag selects the decoder instance, the job's scheduling
/// period, and the `StreamingJob` buffering/VAD defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct WhisperStreamingProviderConfig {
	pub context_tag: String,
	#[serde(default = "default_vad_context_tag")]
	pub vad_context_tag: String,
	pub job_period_ms: u64,
	pub max_buffer_len_sec: f64,
	pub local_agree_dim: usize,
	#[serde(default = "default_vad_detector")]
	pub vad_detector: bool,
	#[serde(default = "default_vad_threshold")]
	pub vad_threshold: f64,
	pub vad_neg_threshold: Option<f64>,
	#[serde(default = "default_silence_threshold")]
	pub silence_threshold: f64,
}

fn default_session_num_channels() -> u16 {
	1
}

/// Per-session configuration: only the wire shape of the audio a particular
/// client is about to send varies; everything else comes from the provider
/// config above.
#[derive(Debug, Clone, Deserialize)]
pub struct WhisperStreamingSessionConfig {
	#[serde(default = "default_session_num_channels")]
	pub num_channels: u16,
}

pub struct WhisperStreamingProvider {
	dispatcher: Arc<Dispatcher>,
	config: WhisperStreamingProviderConfig,
}

impl WhisperStreamingProvider {
	pub fn from_config(dispatcher: Arc<Dispatcher>, provider_config: serde_json::Value) -> Result<Self, ProviderError> {
		let config: WhisperStreamingProviderConfig = serde_json::from_value(provider_config).map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;
		Ok(Self { dispatcher, config })
	}
}

impl TranscriptionProvider for WhisperStreamingProvider {
	fn create_session(&self, session_config: serde_json::Value) -> Result<TranscriptionSession, ProviderError> {
		let session_config: WhisperStreamingSessionConfig = serde_json::from_value(session_config).map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;

		let job_config = StreamingJobConfig {
			max_buffer_len_sec: self.config.max_buffer_len_sec,
			local_agree_dim: self.config.local_agree_dim,
			vad_detector: self.config.vad_detector,
			vad_threshold: self.config.vad_threshold,
			vad_neg_threshold: self.config.vad_neg_threshold,
			silence_threshold: self.config.silence_threshold,
		};
		let decoder = Arc::new(RawPcmDecoder::new(session_config.num_channels));
		let job_impl = StreamingJob::new(job_config, decoder).map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;

		let mut required_tags = vec![self.config.context_tag.clone()];
		if self.config.vad_detector {
			required_tags.push(self.config.vad_context_tag.clone());
		}

		let job = self.dispatcher.register_job(required_tags, self.config.job_period_ms, Box::new(job_impl))?;

		// `StreamingJob::process_batch` already produces a boxed
		// `TranscriptionResult`, so the decode step is a plain downcast.
		let session = TranscriptionSession::new(job, |value| value.downcast::<TranscriptionResult>().ok().map(|boxed| *boxed));

		Ok(session)
	}
}
