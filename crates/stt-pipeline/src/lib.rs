//! The audio -> transcript pipeline: decode, silence-gate, segment, decode
//! through the speech model, and stabilize into a committed word stream.
//!
//! Everything the pipeline calls out to but does not own — the container
//! codec, the decoder model, the VAD model — is expressed as a trait here
//! per `SPEC_FULL.md` §6; concrete implementations are wired in by the
//! provider layer in `stt-session`.

mod decoder;
mod streaming_job;
mod vad;

pub use decoder::{AudioDecoder, DecoderContext, TranscribedWord};
pub use streaming_job::{StreamingJob, StreamingJobConfig};
pub use vad::VadContext;
