//! Shared data model for the worker-pool / streaming-transcription fabric.
//!
//! Every other crate in the workspace depends on this one for the types that
//! cross a boundary: worker ↔ manager, dispatcher ↔ worker, pipeline ↔
//! stabilizer, session ↔ provider. Nothing in here owns behavior beyond small
//! constructors and derived accessors.

mod audio;
mod context;
mod error;
mod job;
mod result;
mod transcript;
mod worker_state;

pub use audio::AudioChunk;
pub use context::{JobContextSpec, TagSet};
pub use error::{ClientTranscriptionError, CoreError};
pub use job::{JobId, JobSpec};
pub use result::{JobResult, JobStatistics};
pub use transcript::{TranscriptionResult, TranscriptionSegment, TranscriptionSequence};
pub use worker_state::WorkerState;
