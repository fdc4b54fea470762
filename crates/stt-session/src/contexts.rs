use std::any::Any;
use std::sync::Arc;

use stt_buffer::mixdown_to_mono;
use stt_pipeline::{AudioDecoder, DecoderContext, TranscribedWord, VadContext};
use stt_types::{ClientTranscriptionError, CoreError, JobContextFactory};

/// Decodes little-endian 16-bit PCM, the wire format this fabric expects
/// clients to send (`SPEC_FULL.md` §6 frames container decoding as an
/// external dependency; this fabric only speaks raw samples). Mixes down to
/// mono when `num_channels > 1`.
pub struct RawPcmDecoder {
	num_channels: u16,
}

impl RawPcmDecoder {
	pub fn new(num_channels: u16) -> Self {
		Self { num_channels: num_channels.max(1) }
	}
}

impl AudioDecoder for RawPcmDecoder {
	fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, ClientTranscriptionError> {
		let frame_bytes = 2 * usize::from(self.num_channels);
		if bytes.len() % frame_bytes != 0 {
			return Err(ClientTranscriptionError::BadAudio(format!(
				"{} bytes is not a whole number of {}-channel 16-bit PCM frames",
				bytes.len(),
				self.num_channels
			)));
		}
		let interleaved: Vec<f32> = bytes.chunks_exact(2).map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / f32::from(i16::MAX)).collect();
		Ok(mixdown_to_mono(&interleaved, usize::from(self.num_channels)))
	}
}

/// Stand-in for a production speech model. The decoder the pipeline calls
/// into is an external dependency (`SPEC_FULL.md` §6), not something this
/// fabric ships; this emits one placeholder, never-sentence-ending word per
/// call so the surrounding buffering, backpressure, and stabilization logic
/// can be exercised end to end without a real backend. Swap in a real one
/// by building a different `DecoderContextFactory`.
#[derive(Default)]
pub struct PlaceholderDecoderContext;

impl DecoderContext for PlaceholderDecoderContext {
	fn transcribe(&mut self, samples: &[f32], _initial_prompt: &str) -> Result<Vec<TranscribedWord>, CoreError> {
		if samples.is_empty() {
			return Ok(Vec::new());
		}
		Ok(vec![TranscribedWord {
			text: "...".to_string(),
			start_sec: 0.0,
			end_sec: samples.len() as f64 / 16_000.0,
		}])
	}
}

/// Simple hysteresis energy detector: a frame-by-frame RMS scan that opens a
/// speech range once energy exceeds `threshold` and closes it once energy
/// falls below `neg_threshold`. A real deployment would swap this for a
/// trained VAD model (again, an external dependency per §6); this gives the
/// segmentation path something real to drive against in tests.
pub struct EnergyVadContext {
	frame_len: usize,
}

impl EnergyVadContext {
	pub fn new(frame_len: usize) -> Self {
		Self { frame_len: frame_len.max(1) }
	}
}

impl VadContext for EnergyVadContext {
	fn detect_speech_ranges(&mut self, samples: &[f32], threshold: f64, neg_threshold: f64) -> Vec<(usize, usize)> {
		let mut ranges = Vec::new();
		let mut speech_start: Option<usize> = None;

		for (frame_idx, frame) in samples.chunks(self.frame_len).enumerate() {
			let frame_start = frame_idx * self.frame_len;
			let energy = rms(frame);
			match speech_start {
				None if energy > threshold => speech_start = Some(frame_start),
				Some(start) if energy < neg_threshold => {
					ranges.push((start, frame_start));
					speech_start = None;
				}
				_ => {}
			}
		}

		if let Some(start) = speech_start {
			ranges.push((start, samples.len()));
		}
		ranges
	}
}

fn rms(samples: &[f32]) -> f64 {
	if samples.is_empty() {
		return 0.0;
	}
	let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
	(sum_sq / samples.len() as f64).sqrt()
}

/// A [`JobContextFactory`] built from a closure, so concrete decoder/VAD
/// backends can be swapped in at the gateway binary without this crate
/// depending on any particular model library.
pub struct DecoderContextFactory {
	build: Arc<dyn Fn() -> Box<dyn DecoderContext> + Send + Sync>,
}

impl DecoderContextFactory {
	pub fn new(build: impl Fn() -> Box<dyn DecoderContext> + Send + Sync + 'static) -> Self {
		Self { build: Arc::new(build) }
	}

	pub fn placeholder() -> Self {
		Self::new(|| Box::<PlaceholderDecoderContext>::default())
	}
}

impl JobContextFactory for DecoderContextFactory {
	fn create(&self) -> Result<Box<dyn Any + Send>, CoreError> {
		Ok(Box::new((self.build)()))
	}

	fn destroy(&self, _instance: Box<dyn Any + Send>) -> Result<(), CoreError> {
		Ok(())
	}
}

pub struct VadContextFactory {
	build: Arc<dyn Fn() -> Box<dyn VadContext> + Send + Sync>,
}

impl VadContextFactory {
	pub fn new(build: impl Fn() -> Box<dyn VadContext> + Send + Sync + 'static) -> Self {
		Self { build: Arc::new(build) }
	}

	pub fn energy_default() -> Self {
		const FRAME_LEN: usize = 400; // 25ms at 16kHz
		Self::new(|| Box::new(EnergyVadContext::new(FRAME_LEN)))
	}
}

impl JobContextFactory for VadContextFactory {
	fn create(&self) -> Result<Box<dyn Any + Send>, CoreError> {
		Ok(Box::new((self.build)()))
	}

	fn destroy(&self, _instance: Box<dyn Any + Send>) -> Result<(), CoreError> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn raw_pcm_decoder_converts_little_endian_samples() {
		let decoder = RawPcmDecoder::new(1);
		let bytes = i16::MAX.to_le_bytes();
		let samples = decoder.decode(&bytes).unwrap();
		assert_eq!(samples.len(), 1);
		assert!((samples[0] - 1.0).abs() < 1e-6);
	}

	#[test]
	fn raw_pcm_decoder_rejects_partial_frames() {
		let decoder = RawPcmDecoder::new(2);
		assert!(decoder.decode(&[0, 0, 0]).is_err());
	}

	#[test]
	fn placeholder_decoder_never_ends_a_sentence() {
		let mut ctx = PlaceholderDecoderContext;
		let words = ctx.transcribe(&[0.0; 1600], "").unwrap();
		assert_eq!(words.len(), 1);
		assert!(words[0].text.ends_with("..."));
	}

	#[test]
	fn energy_vad_opens_and_closes_a_range() {
		let mut ctx = EnergyVadContext::new(4);
		let mut samples = vec![0.0_f32; 16];
		for s in &mut samples[4..8] {
			*s = 1.0;
		}
		let ranges = ctx.detect_speech_ranges(&samples, 0.1, 0.01);
		assert_eq!(ranges, vec![(4, 12)]);
	}
}
