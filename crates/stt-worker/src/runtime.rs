use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use stt_types::{AudioChunk, CoreError, JobContextFactory, JobId, JobResult, JobSpec, JobStatistics, WorkerState};
use tracing::{debug, error};

use crate::context_table::JobContextTable;
use crate::ipc::{LogRecord, WorkerResult, WorkerTask};
use crate::NS_PER_MS;

#[derive(Clone, Copy, PartialEq, Eq)]
enum JobState {
	Sleeping,
	Ready,
	Errored,
}

struct JobEntry {
	job_id: JobId,
	state: JobState,
	period_ms: u64,
	period_start_ns: u64,
	context_ids: Vec<String>,
	pending_batch: VecDeque<AudioChunk>,
	job_impl: Box<dyn stt_types::JobImpl>,
}

impl JobEntry {
	fn deadline_ns(&self) -> u64 {
		self.period_start_ns + self.period_ms * NS_PER_MS
	}
}

/// Main-side grip on a spawned worker: the task/result channel pair plus the
/// thread handle. Owned by a `WorkerManager` in `stt-dispatch`.
pub struct WorkerHandle {
	pub worker_id: usize,
	pub task_tx: mpsc::Sender<WorkerTask>,
	pub result_rx: mpsc::Receiver<WorkerResult>,
	pub join_handle: JoinHandle<()>,
}

/// Spawns a worker thread. `context_factories` is the process-wide registry
/// of how to build each known context uid; every worker gets the same
/// registry but never shares created instances with another worker.
pub fn spawn_worker(worker_id: usize, context_factories: Arc<HashMap<String, Arc<dyn JobContextFactory>>>) -> WorkerHandle {
	let (task_tx, task_rx) = mpsc::channel();
	let (result_tx, result_rx) = mpsc::channel();

	let join_handle = std::thread::Builder::new()
		.name(format!("stt-worker-{worker_id}"))
		.spawn(move || {
			let runtime = WorkerRuntime::new(worker_id, task_rx, result_tx, context_factories);
			runtime.run();
		})
		.expect("failed to spawn worker thread");

	WorkerHandle {
		worker_id,
		task_tx,
		result_rx,
		join_handle,
	}
}

struct WorkerRuntime {
	worker_id: usize,
	start: Instant,
	task_rx: mpsc::Receiver<WorkerTask>,
	result_tx: mpsc::Sender<WorkerResult>,
	context_table: JobContextTable,
	entries: HashMap<JobId, JobEntry>,
	state: WorkerState,
	state_entered_ns: u64,
	terminating: bool,
}

impl WorkerRuntime {
	fn new(worker_id: usize, task_rx: mpsc::Receiver<WorkerTask>, result_tx: mpsc::Sender<WorkerResult>, context_factories: Arc<HashMap<String, Arc<dyn JobContextFactory>>>) -> Self {
		Self {
			worker_id,
			start: Instant::now(),
			task_rx,
			result_tx,
			context_table: JobContextTable::new(context_factories),
			entries: HashMap::new(),
			state: WorkerState::Admin,
			state_entered_ns: 0,
			terminating: false,
		}
	}

	fn now_ns(&self) -> u64 {
		self.start.elapsed().as_nanos() as u64
	}

	fn log(&self, level: tracing::Level, message: impl Into<String>) {
		let _ = self.result_tx.send(WorkerResult::Logging(LogRecord::new(level, message)));
	}

	/// Emits a `StateChange` only when the state actually changes, so the
	/// elapsed time reported is the full contiguous run spent in the prior
	/// state — never a fragment of it.
	fn set_state(&mut self, new_state: WorkerState, now_ns: u64) {
		if new_state == self.state {
			return;
		}
		let elapsed_ns = now_ns.saturating_sub(self.state_entered_ns);
		let prev_state = self.state;
		self.state = new_state;
		self.state_entered_ns = now_ns;
		let _ = self.result_tx.send(WorkerResult::StateChange { prev_state, elapsed_ns });
	}

	fn run(mut self) {
		let _ = self.result_tx.send(WorkerResult::Initialized);

		loop {
			let now = self.now_ns();
			self.set_state(WorkerState::Admin, now);

			loop {
				match self.task_rx.try_recv() {
					Ok(task) => self.apply_task(task),
					Err(TryRecvError::Empty) => break,
					Err(TryRecvError::Disconnected) => {
						self.terminating = true;
						break;
					}
				}
			}
			if self.terminating {
				break;
			}

			let active_ids: HashSet<String> = self.entries.values().flat_map(|e| e.context_ids.iter().cloned()).collect();
			self.context_table.destroy_unused(&active_ids);

			let now = self.now_ns();
			for entry in self.entries.values_mut() {
				if entry.state == JobState::Sleeping && entry.period_start_ns < now {
					entry.state = JobState::Ready;
				}
			}

			let picked = self
				.entries
				.values()
				.filter(|e| e.state == JobState::Ready)
				.min_by_key(|e| (e.deadline_ns(), e.job_id))
				.map(|e| e.job_id);

			if let Some(job_id) = picked {
				self.set_state(WorkerState::Busy, self.now_ns());
				self.execute_job(job_id);
				continue;
			}

			let wake_at_ns = self.entries.values().filter(|e| e.state == JobState::Sleeping).map(|e| e.period_start_ns).min();
			let timeout = match wake_at_ns {
				Some(wake_ns) => {
					let now = self.now_ns();
					Duration::from_nanos(wake_ns.saturating_sub(now))
				}
				None => Duration::from_secs(3600),
			};

			self.set_state(WorkerState::Idle, self.now_ns());
			match self.task_rx.recv_timeout(timeout) {
				Ok(task) => {
					// Still ADMIN: a task that arrives during the idle wait must
					// not be lost to the next iteration's drain.
					self.set_state(WorkerState::Admin, self.now_ns());
					self.apply_task(task);
				}
				Err(RecvTimeoutError::Timeout) => {}
				Err(RecvTimeoutError::Disconnected) => break,
			}
		}

		self.shutdown();
	}

	fn apply_task(&mut self, task: WorkerTask) {
		match task {
			WorkerTask::RegisterJob { job_id, spec, context_ids } => {
				let now = self.now_ns();
				self.entries.insert(
					job_id,
					JobEntry {
						job_id,
						state: JobState::Sleeping,
						period_ms: spec.period_ms,
						period_start_ns: now + spec.period_ms * NS_PER_MS,
						context_ids,
						pending_batch: VecDeque::new(),
						job_impl: spec.job_impl,
					},
				);
			}
			WorkerTask::DeregisterJob { job_id } => {
				self.entries.remove(&job_id);
			}
			WorkerTask::QueueData { job_id, batch } => {
				if let Some(entry) = self.entries.get_mut(&job_id) {
					entry.pending_batch.extend(batch);
				}
			}
			WorkerTask::Terminate => {
				self.terminating = true;
			}
		}
	}

	fn execute_job(&mut self, job_id: JobId) {
		let period_start_ns = self.entries[&job_id].period_start_ns;
		let scheduled_ns = self.now_ns();

		let context_ids = self.entries[&job_id].context_ids.clone();
		let mut resolved: Vec<Box<dyn Any + Send>> = Vec::with_capacity(context_ids.len());
		for context_id in &context_ids {
			match self.context_table.take(context_id) {
				Ok(instance) => resolved.push(instance),
				Err(error) => {
					// Return whatever was already checked out before bailing.
					for (id, instance) in context_ids.iter().zip(resolved) {
						self.context_table.put_back(id, instance);
					}
					let now = self.now_ns();
					let stats = JobStatistics {
						period_start_ns,
						scheduled_ns,
						execute_start_ns: now,
						complete_ns: now,
					};
					self.fail_job(job_id, error, stats);
					return;
				}
			}
		}

		let execute_start_ns = self.now_ns();
		let entry = self.entries.get_mut(&job_id).expect("entry present while executing");
		let batch: Vec<AudioChunk> = std::mem::take(&mut entry.pending_batch).into_iter().collect();

		let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| entry.job_impl.process_batch(&mut resolved, batch)));

		for (id, instance) in context_ids.iter().zip(resolved) {
			self.context_table.put_back(id, instance);
		}

		let complete_ns = self.now_ns();
		let stats = JobStatistics {
			period_start_ns,
			scheduled_ns,
			execute_start_ns,
			complete_ns,
		};

		match outcome {
			Ok(Ok(value)) => {
				let entry = self.entries.get_mut(&job_id).expect("entry present after execution");
				entry.state = JobState::Sleeping;
				let mut next_start = entry.period_start_ns + entry.period_ms * NS_PER_MS;
				while next_start <= complete_ns {
					next_start += entry.period_ms * NS_PER_MS;
				}
				entry.period_start_ns = next_start;
				let _ = self.result_tx.send(WorkerResult::JobExecution { job_id, result: JobResult::Success { value, stats } });
			}
			Ok(Err(error)) => self.fail_job(job_id, error, stats),
			Err(panic) => {
				let message = panic
					.downcast_ref::<&str>()
					.map(|s| (*s).to_string())
					.or_else(|| panic.downcast_ref::<String>().cloned())
					.unwrap_or_else(|| "job panicked".to_string());
				self.fail_job(job_id, CoreError::Internal(message), stats)
			}
		}
	}

	fn fail_job(&mut self, job_id: JobId, error: CoreError, stats: JobStatistics) {
		if let Some(entry) = self.entries.get_mut(&job_id) {
			entry.state = JobState::Errored;
		}
		error!(worker_id = self.worker_id, job_id = job_id.as_u64(), %error, "job errored");
		let _ = self.result_tx.send(WorkerResult::JobExecution { job_id, result: JobResult::Failure { error, stats } });
	}

	fn shutdown(mut self) {
		debug!(worker_id = self.worker_id, "worker terminating, destroying remaining contexts");
		self.context_table.destroy_unused(&HashSet::new());
		self.log(tracing::Level::DEBUG, "worker shut down");
	}
}
