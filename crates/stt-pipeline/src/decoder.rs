use stt_types::{ClientTranscriptionError, CoreError};

/// External collaborator: decodes opaque container bytes into contiguous
/// mono float32 PCM at a fixed sample rate. Fails with a client error if the
/// source audio's sample rate or channel count does not match what this
/// pipeline is configured for. Implementations wrap whatever audio codec
/// library the deployment ships with (`SPEC_FULL.md` §6); this crate never
/// depends on one directly.
pub trait AudioDecoder: Send + Sync {
	fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, ClientTranscriptionError>;
}

/// One transcribed word, in seconds relative to the buffer handed to
/// `DecoderContext::transcribe` (the pipeline re-bases these onto stream
/// time using the buffer's sample offset).
#[derive(Clone, Debug, PartialEq)]
pub struct TranscribedWord {
	pub text: String,
	pub start_sec: f64,
	pub end_sec: f64,
}

/// External collaborator: the speech model itself. Resolved by the worker
/// from the job context table and handed to `StreamingJob::process_batch`
/// as the first context. The absence of word-level timestamps from a real
/// implementation is a fatal logic error, not a recoverable one — callers
/// should return `CoreError::Internal` rather than an empty `Vec` if a
/// backend cannot produce them.
pub trait DecoderContext: Send {
	fn transcribe(&mut self, samples: &[f32], initial_prompt: &str) -> Result<Vec<TranscribedWord>, CoreError>;
}
