use std::collections::BTreeMap;

use stt_types::{AudioChunk, JobId, JobResult, JobSpec, WorkerState};

/// A log line produced inside a worker. Workers never write logs directly
/// (`SPEC_FULL.md` §6); they forward records like this one to the main
/// process, which re-emits them through its own `tracing` subscriber.
#[derive(Clone, Debug)]
pub struct LogRecord {
	pub level: tracing::Level,
	pub message: String,
	pub fields: BTreeMap<String, String>,
}

impl LogRecord {
	pub fn new(level: tracing::Level, message: impl Into<String>) -> Self {
		Self {
			level,
			message: message.into(),
			fields: BTreeMap::new(),
		}
	}
}

/// Task queue entries a `WorkerManager` sends into a worker.
pub enum WorkerTask {
	RegisterJob { job_id: JobId, spec: JobSpec, context_ids: Vec<String> },
	DeregisterJob { job_id: JobId },
	QueueData { job_id: JobId, batch: Vec<AudioChunk> },
	Terminate,
}

impl std::fmt::Debug for WorkerTask {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::RegisterJob { job_id, context_ids, .. } => f.debug_struct("RegisterJob").field("job_id", job_id).field("context_ids", context_ids).finish(),
			Self::DeregisterJob { job_id } => f.debug_struct("DeregisterJob").field("job_id", job_id).finish(),
			Self::QueueData { job_id, batch } => f.debug_struct("QueueData").field("job_id", job_id).field("batch_len", &batch.len()).finish(),
			Self::Terminate => f.write_str("Terminate"),
		}
	}
}

/// Result queue entries a worker sends back to its `WorkerManager`.
#[derive(Debug)]
pub enum WorkerResult {
	Initialized,
	Logging(LogRecord),
	StateChange { prev_state: WorkerState, elapsed_ns: u64 },
	JobExecution { job_id: JobId, result: JobResult },
}
