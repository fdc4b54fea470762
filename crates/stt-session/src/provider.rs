use std::any::Any;
use std::collections::VecDeque;

use stt_dispatch::{DispatchError, JobHandle};
use stt_types::{AudioChunk, CoreError, TranscriptionResult};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
	#[error(transparent)]
	Dispatch(#[from] DispatchError),
	#[error("invalid session configuration: {0}")]
	InvalidConfig(String),
}

/// An item surfaced to the connection layer as a session runs: either a
/// transcription to forward to the client, or a terminal job failure that
/// should close the connection.
#[derive(Debug)]
pub enum TranscriptionEvent {
	Result(TranscriptionResult),
	Error(CoreError),
}

/// A running provider session: one registered job plus whatever is needed
/// to turn its boxed results back into a [`TranscriptionResult`]. Wraps a
/// [`JobHandle`] directly rather than introducing a second channel layer,
/// since the handle already generalizes the source's synchronous
/// event-emitter callback into an async result stream.
pub struct TranscriptionSession {
	job: JobHandle,
	decode: Box<dyn Fn(Box<dyn Any + Send>) -> Option<TranscriptionResult> + Send>,
	pending: VecDeque<TranscriptionEvent>,
}

impl TranscriptionSession {
	pub fn new(job: JobHandle, decode: impl Fn(Box<dyn Any + Send>) -> Option<TranscriptionResult> + Send + 'static) -> Self {
		Self { job, decode: Box::new(decode), pending: VecDeque::new() }
	}

	/// Seeds an event to be delivered on the next [`Self::next_event`] call
	/// before any job result, for providers (such as the debug provider)
	/// that emit an immediate reply on session start.
	pub fn push_pending(&mut self, event: TranscriptionEvent) {
		self.pending.push_back(event);
	}

	pub fn handle_audio_chunk(&self, chunk: AudioChunk) {
		self.job.queue_data(vec![chunk]);
	}

	pub async fn next_event(&mut self) -> Option<TranscriptionEvent> {
		if let Some(event) = self.pending.pop_front() {
			return Some(event);
		}
		match self.job.next_result().await? {
			stt_types::JobResult::Success { value, .. } => (self.decode)(value).map(TranscriptionEvent::Result),
			stt_types::JobResult::Failure { error, .. } => Some(TranscriptionEvent::Error(error)),
		}
	}
}

/// A kind of transcription backend, selected by `provider_uid` in the
/// provider-config file. Session creation is synchronous: it only needs to
/// register a job with the dispatcher, never waits on I/O.
pub trait TranscriptionProvider: Send + Sync {
	fn create_session(&self, session_config: serde_json::Value) -> Result<TranscriptionSession, ProviderError>;
}
