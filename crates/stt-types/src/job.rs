use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::AudioChunk;
use crate::error::CoreError;

/// Monotonically increasing identifier, also the EDF tie-break key (lowest
/// wins). Allocated by whichever side registers the job — the dispatcher
/// when placement succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl JobId {
	/// Worker-local counters, one per worker, so ids stay dense and the
	/// tie-break stays meaningful within a single EDF scan.
	pub fn next(counter: &AtomicU64) -> Self {
		Self(counter.fetch_add(1, Ordering::Relaxed))
	}

	pub fn as_u64(self) -> u64 {
		self.0
	}
}

/// The behavior a worker drives once a job is placed: decode/gate/segment/
/// transcribe/stabilize for a `StreamingJob`, or anything else that fits the
/// same periodic-batch shape. Contexts are resolved by the worker in
/// `required_tags` order and handed in as opaque boxes; `job_impl` downcasts
/// the ones it recognizes. The output value is likewise opaque to everything
/// above the job — only the registrar (the session, in this fabric) knows
/// what to downcast it to.
pub trait JobImpl: Send {
	fn process_batch(&mut self, contexts: &mut [Box<dyn Any + Send>], batch: Vec<AudioChunk>) -> Result<Box<dyn Any + Send>, CoreError>;
}

/// Knows how to create and destroy instances of exactly one context uid.
/// Stored by the `JobContextTable`, looked up by `JobContextSpec::uid`.
pub trait JobContextFactory: Send + Sync {
	fn create(&self) -> Result<Box<dyn Any + Send>, CoreError>;
	/// May fail; a failure here is logged by the caller and does not stop
	/// eviction of other unused contexts in the same pass.
	fn destroy(&self, instance: Box<dyn Any + Send>) -> Result<(), CoreError>;
}

/// A request to register a periodic job. `required_tags` is an ordered list;
/// the order determines the order contexts are handed to `job_impl`.
pub struct JobSpec {
	pub period_ms: u64,
	pub required_tags: Vec<String>,
	pub job_impl: Box<dyn JobImpl>,
}

impl JobSpec {
	pub fn new(period_ms: u64, required_tags: Vec<String>, job_impl: Box<dyn JobImpl>) -> Self {
		Self {
			period_ms,
			required_tags,
			job_impl,
		}
	}
}

impl std::fmt::Debug for JobSpec {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("JobSpec")
			.field("period_ms", &self.period_ms)
			.field("required_tags", &self.required_tags)
			.finish_non_exhaustive()
	}
}
