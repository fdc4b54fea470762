use thiserror::Error;

/// A transcription error caused by the client, not the server: malformed
/// audio, or audio arriving faster than the buffer can absorb it. Carried
/// through the same `Failure` channel as any other job error, but the
/// session maps it to close code 1007 with the error's own message instead
/// of treating it as an internal failure.
#[derive(Error, Debug, Clone)]
pub enum ClientTranscriptionError {
	#[error("invalid audio: {0}")]
	BadAudio(String),
	#[error("audio too fast: {0}")]
	Overrun(String),
}

/// Errors that can arise while a job context is resolved or a job executes
/// inside a worker. These are the errors a `JobResult::Failure` carries;
/// dispatcher-level placement errors and session-level protocol/config
/// errors are distinct kinds that never reach this far down and live in
/// `stt-dispatch`/`stt-session` instead.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
	#[error("context creation failed: {0}")]
	ContextCreation(String),
	#[error("job execution failed: {0}")]
	JobExecution(String),
	#[error(transparent)]
	ClientTranscription(#[from] ClientTranscriptionError),
	#[error("internal error: {0}")]
	Internal(String),
}

impl CoreError {
	/// Whether the client caused this, as opposed to a server-side bug.
	pub fn is_client_fault(&self) -> bool {
		matches!(self, Self::ClientTranscription(_))
	}
}
