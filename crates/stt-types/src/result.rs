use std::any::Any;

use crate::error::CoreError;

/// Four monotonic-clock timestamps (nanoseconds) bracketing one job
/// execution, from which scheduling delay, context-init time, execution
/// time, and total time are all derivable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobStatistics {
	pub period_start_ns: u64,
	pub scheduled_ns: u64,
	pub execute_start_ns: u64,
	pub complete_ns: u64,
}

impl JobStatistics {
	/// Time between when the period opened and when the scheduler actually
	/// picked this entry.
	pub fn scheduling_delay_ns(&self) -> u64 {
		self.scheduled_ns.saturating_sub(self.period_start_ns)
	}

	/// Time spent resolving job contexts before execution began.
	pub fn context_init_ns(&self) -> u64 {
		self.execute_start_ns.saturating_sub(self.scheduled_ns)
	}

	/// Time spent inside `job_impl.process_batch`.
	pub fn execution_ns(&self) -> u64 {
		self.complete_ns.saturating_sub(self.execute_start_ns)
	}

	/// End to end, from period open to result emission.
	pub fn total_ns(&self) -> u64 {
		self.complete_ns.saturating_sub(self.period_start_ns)
	}
}

/// The outcome of one job execution, as emitted by a worker and eventually
/// surfaced to whoever holds the matching `JobHandle`.
pub enum JobResult {
	Success { value: Box<dyn Any + Send>, stats: JobStatistics },
	Failure { error: CoreError, stats: JobStatistics },
}

impl JobResult {
	pub fn stats(&self) -> JobStatistics {
		match self {
			Self::Success { stats, .. } | Self::Failure { stats, .. } => *stats,
		}
	}

	pub fn is_failure(&self) -> bool {
		matches!(self, Self::Failure { .. })
	}
}

impl std::fmt::Debug for JobResult {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Success { stats, .. } => f.debug_struct("JobResult::Success").field("stats", stats).finish_non_exhaustive(),
			Self::Failure { error, stats } => f.debug_struct("JobResult::Failure").field("error", error).field("stats", stats).finish(),
		}
	}
}
