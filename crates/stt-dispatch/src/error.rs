use thiserror::Error;

/// Errors raised while placing a job, as opposed to errors raised while
/// running one (those travel through `JobResult::Failure` instead).
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
	#[error("required tag {0:?} matched no context definitions")]
	UnknownTag(String),
	#[error("no placement satisfies the requested context tags")]
	NoPlacement,
	#[error("worker {0} is no longer reachable")]
	WorkerGone(usize),
	#[error("invalid worker pool configuration: num_workers must be at least 1, got {0}")]
	InvalidWorkerCount(usize),
}
