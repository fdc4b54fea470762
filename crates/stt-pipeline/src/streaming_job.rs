use std::any::Any;
use std::sync::Arc;

use stt_buffer::{CircularSampleBuffer, SilenceGate};
use stt_stabilizer::LocalAgree;
use stt_types::{AudioChunk, ClientTranscriptionError, CoreError, JobImpl, TranscriptionResult, TranscriptionSegment, TranscriptionSequence};
use tracing::info;

use crate::decoder::{AudioDecoder, DecoderContext};
use crate::vad::VadContext;

/// All audio in this fabric is decoded to this rate before anything else
/// touches it; contexts are created to match.
const SAMPLE_RATE: f64 = 16_000.0;

/// Smallest gap kept between a configured VAD threshold and its negative
/// counterpart, so the two never collide at the boundary.
const VAD_THRESHOLD_EPSILON: f64 = 0.001;

/// Tuning for one [`StreamingJob`]. One of these is built per session from
/// the provider configuration the client's `config` message selects.
#[derive(Clone, Debug)]
pub struct StreamingJobConfig {
	/// Upper bound on how much unconfirmed audio a session may accumulate
	/// before local agreement is overridden and the oldest audio is forced
	/// final.
	pub max_buffer_len_sec: f64,
	/// `d` in "local agreement with dimension d".
	pub local_agree_dim: usize,
	/// Whether a `VadContext` is required at context position 1.
	pub vad_detector: bool,
	pub vad_threshold: f64,
	/// Defaults to `max(0.01, vad_threshold - 0.15)` when unset.
	pub vad_neg_threshold: Option<f64>,
	pub silence_threshold: f64,
}

/// The periodic job behind every live transcription session: decode audio,
/// gate out silence, segment (via VAD or whole-buffer), transcribe through
/// the speech model, and stabilize the hypotheses into a committed word
/// timeline.
///
/// Resolves its contexts from `process_batch`'s `contexts` slice by
/// position: index 0 is always a `Box<dyn DecoderContext>`, index 1 is a
/// `Box<dyn VadContext>` when `config.vad_detector` is set. Both are
/// double-boxed (`Box<dyn Any + Send>` wrapping the trait object box) because
/// `Any` cannot be implemented for an unsized trait object directly.
pub struct StreamingJob {
	config: StreamingJobConfig,
	decoder: Arc<dyn AudioDecoder>,
	buffer: CircularSampleBuffer,
	max_buffer_samples: usize,
	local_agree: LocalAgree,
	silence_gate: SilenceGate,
	last_finalized: String,
}

impl StreamingJob {
	pub fn new(config: StreamingJobConfig, decoder: Arc<dyn AudioDecoder>) -> Result<Self, stt_stabilizer::LocalAgreeError> {
		let max_buffer_samples = (config.max_buffer_len_sec * SAMPLE_RATE).round() as usize;
		let local_agree = LocalAgree::new(config.local_agree_dim)?;
		Ok(Self {
			buffer: CircularSampleBuffer::new(max_buffer_samples * 2),
			max_buffer_samples,
			local_agree,
			silence_gate: SilenceGate::new(),
			last_finalized: String::new(),
			decoder,
			config,
		})
	}

	/// Decodes each chunk and appends it to the buffer unless the gate deems
	/// it silence. A decoder failure or a buffer that can't absorb what was
	/// decoded both surface as client-fault errors.
	fn decode_and_append(&mut self, batch: &[AudioChunk]) -> Result<(), CoreError> {
		for chunk in batch {
			let samples = self.decoder.decode(&chunk.bytes)?;
			if self.silence_gate.is_silent(&samples, self.config.silence_threshold) {
				continue;
			}
			let overflow = self.buffer.append(&samples);
			if !overflow.is_empty() {
				return Err(ClientTranscriptionError::Overrun(format!("{} samples exceed buffer capacity", overflow.len())).into());
			}
		}
		Ok(())
	}

	/// Forces finalization of the oldest unconfirmed audio when the buffer
	/// has grown past its configured bound, and purges exactly that much.
	/// Returns `None` if the buffer is within bounds or nothing was pending.
	fn force_finalize_overflow(&mut self) -> Option<TranscriptionSequence> {
		if self.buffer.len() <= self.max_buffer_samples {
			return None;
		}
		let to_purge = self.buffer.len() - self.max_buffer_samples;
		let forced_end = (self.buffer.offset_samples() + to_purge as u64) as f64 / SAMPLE_RATE;
		info!(forced_end, to_purge, "buffer overflow, forcing finalization");
		let forced = self.local_agree.force_finalized(forced_end);
		self.buffer.purge(to_purge);
		forced
	}

	/// Transcribes each sample range through the decoder context and
	/// re-bases word timestamps onto stream time.
	fn transcribe_ranges(&self, decoder_ctx: &mut dyn DecoderContext, ranges: &[(usize, usize)]) -> Result<Vec<TranscriptionSegment>, CoreError> {
		let view = self.buffer.view();
		let len = view.len();
		let offset_sec = self.buffer.offset_samples() as f64 / SAMPLE_RATE;

		let mut segments = Vec::new();
		for &(start, end) in ranges {
			let start = start.min(len);
			let end = end.min(len);
			if end <= start {
				continue;
			}
			let words = decoder_ctx.transcribe(&view[start..end], &self.last_finalized)?;
			let range_start_sec = offset_sec + start as f64 / SAMPLE_RATE;
			segments.extend(words.into_iter().map(|word| TranscriptionSegment::new(word.text, range_start_sec + word.start_sec, range_start_sec + word.end_sec)));
		}
		Ok(segments)
	}

	fn speech_ranges(&mut self, vad_ctx: Option<&mut dyn VadContext>) -> Vec<(usize, usize)> {
		match vad_ctx {
			Some(vad) => {
				let neg_threshold = resolve_neg_threshold(self.config.vad_threshold, self.config.vad_neg_threshold);
				vad.detect_speech_ranges(self.buffer.view(), self.config.vad_threshold, neg_threshold)
			}
			None => vec![(0, self.buffer.len())],
		}
	}
}

/// `vad_neg_threshold` defaults to `max(0.01, threshold - 0.15)` and is
/// always clamped strictly below `threshold`, regardless of configuration.
fn resolve_neg_threshold(threshold: f64, configured: Option<f64>) -> f64 {
	let candidate = configured.unwrap_or_else(|| (threshold - 0.15).max(0.01));
	candidate.min(threshold - VAD_THRESHOLD_EPSILON)
}

fn downcast_decoder_context(context: &mut Box<dyn Any + Send>) -> Result<&mut dyn DecoderContext, CoreError> {
	context
		.downcast_mut::<Box<dyn DecoderContext>>()
		.map(|boxed| boxed.as_mut())
		.ok_or_else(|| CoreError::Internal("expected decoder context at position 0".to_string()))
}

fn downcast_vad_context(context: &mut Box<dyn Any + Send>) -> Result<&mut dyn VadContext, CoreError> {
	context
		.downcast_mut::<Box<dyn VadContext>>()
		.map(|boxed| boxed.as_mut())
		.ok_or_else(|| CoreError::Internal("expected vad context at position 1".to_string()))
}

impl JobImpl for StreamingJob {
	fn process_batch(&mut self, contexts: &mut [Box<dyn Any + Send>], batch: Vec<AudioChunk>) -> Result<Box<dyn Any + Send>, CoreError> {
		self.decode_and_append(&batch)?;

		let forced_final = self.force_finalize_overflow();

		let decoder_ctx = downcast_decoder_context(contexts.get_mut(0).ok_or_else(|| CoreError::Internal("missing decoder context".to_string()))?)?;

		let ranges = if self.config.vad_detector {
			let vad_ctx = downcast_vad_context(contexts.get_mut(1).ok_or_else(|| CoreError::Internal("missing vad context".to_string()))?)?;
			self.speech_ranges(Some(vad_ctx))
		} else {
			self.speech_ranges(None)
		};

		let segments = self.transcribe_ranges(decoder_ctx, &ranges)?;

		let (in_progress, final_seq) = if segments.is_empty() {
			(None, forced_final)
		} else {
			self.local_agree.append_transcription(segments);
			let mut agreed_final = self.local_agree.pop_finalized();
			let in_progress = self.local_agree.get_in_progress();

			if let Some(agreed) = &agreed_final {
				if let Some(&last_end) = agreed.ends.last() {
					let end_samples = (last_end * SAMPLE_RATE).round() as u64;
					let to_purge = end_samples.saturating_sub(self.buffer.offset_samples());
					self.buffer.purge(to_purge as usize);
					self.last_finalized = agreed.joined_text();
				}
			}

			let merged = match (forced_final, agreed_final.take()) {
				(Some(forced), Some(agreed)) => {
					let mut merged = forced;
					merged.append(agreed);
					self.last_finalized = merged.joined_text();
					Some(merged)
				}
				(Some(forced), None) => Some(forced),
				(None, agreed) => agreed,
			};

			(in_progress, merged)
		};

		Ok(Box::new(TranscriptionResult { in_progress, r#final: final_seq }))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct FixedDecoder;

	impl AudioDecoder for FixedDecoder {
		fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, ClientTranscriptionError> {
			Ok(bytes.iter().map(|&b| f32::from(b) / 255.0).collect())
		}
	}

	struct SilentDecoder;

	impl AudioDecoder for SilentDecoder {
		fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, ClientTranscriptionError> {
			Ok(vec![0.0_f32; bytes.len()])
		}
	}

	struct ScriptedDecoderContext {
		words: Vec<crate::decoder::TranscribedWord>,
	}

	impl DecoderContext for ScriptedDecoderContext {
		fn transcribe(&mut self, _samples: &[f32], _initial_prompt: &str) -> Result<Vec<crate::decoder::TranscribedWord>, CoreError> {
			Ok(std::mem::take(&mut self.words))
		}
	}

	fn chunk(len: usize) -> AudioChunk {
		AudioChunk::new(vec![200_u8; len])
	}

	fn base_config() -> StreamingJobConfig {
		StreamingJobConfig {
			max_buffer_len_sec: 30.0,
			local_agree_dim: 1,
			vad_detector: false,
			vad_threshold: 0.5,
			vad_neg_threshold: None,
			silence_threshold: 0.01,
		}
	}

	fn contexts_with(words: Vec<crate::decoder::TranscribedWord>) -> Vec<Box<dyn Any + Send>> {
		let ctx: Box<dyn DecoderContext> = Box::new(ScriptedDecoderContext { words });
		vec![Box::new(ctx)]
	}

	#[test]
	fn silent_audio_never_advances_state() {
		let mut job = StreamingJob::new(base_config(), Arc::new(SilentDecoder)).unwrap();
		let mut contexts = contexts_with(vec![]);
		let result = job.process_batch(&mut contexts, vec![chunk(1600)]).unwrap();
		let result = result.downcast::<TranscriptionResult>().unwrap();
		assert!(result.in_progress.is_none());
		assert!(result.r#final.is_none());
		assert!(job.buffer.is_empty());
	}

	#[test]
	fn committed_words_become_in_progress_then_final_on_sentence_end() {
		let mut job = StreamingJob::new(base_config(), Arc::new(FixedDecoder)).unwrap();
		let words = vec![
			crate::decoder::TranscribedWord {
				text: "hello".to_string(),
				start_sec: 0.0,
				end_sec: 0.5,
			},
			crate::decoder::TranscribedWord {
				text: "world.".to_string(),
				start_sec: 0.5,
				end_sec: 1.0,
			},
		];
		let mut contexts = contexts_with(words);
		let result = job.process_batch(&mut contexts, vec![chunk(1600)]).unwrap();
		let result = result.downcast::<TranscriptionResult>().unwrap();
		let finalized = result.r#final.expect("sentence-ending words must finalize");
		assert_eq!(finalized.text, vec!["hello", "world."]);
	}

	#[test]
	fn overflow_forces_finalization_even_without_sentence_end() {
		let mut config = base_config();
		config.max_buffer_len_sec = 0.0001;
		let mut job = StreamingJob::new(config, Arc::new(FixedDecoder)).unwrap();

		let words = vec![crate::decoder::TranscribedWord {
			text: "partial".to_string(),
			start_sec: 0.0,
			end_sec: 0.1,
		}];
		let mut contexts = contexts_with(words);
		let result = job.process_batch(&mut contexts, vec![chunk(16_000)]).unwrap();
		let result = result.downcast::<TranscriptionResult>().unwrap();
		assert!(result.r#final.is_some(), "overflow must force a final even with no agreement");
	}

	#[test]
	fn neg_threshold_defaults_below_threshold_and_respects_floor() {
		assert!((resolve_neg_threshold(0.5, None) - 0.35).abs() < 1e-9);
		assert!((resolve_neg_threshold(0.1, None) - 0.01).abs() < 1e-9);
		assert!(resolve_neg_threshold(0.2, Some(0.2)) < 0.2);
	}
}
