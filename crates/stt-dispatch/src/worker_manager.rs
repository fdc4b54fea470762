use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use stt_buffer::RollingUtilization;
use stt_types::{AudioChunk, JobContextFactory, JobId, JobResult, JobSpec, WorkerState};
use stt_worker::{spawn_worker, WorkerHandle, WorkerResult, WorkerTask};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct JobRegistration {
	context_ids: Vec<String>,
	result_tx: mpsc::UnboundedSender<JobResult>,
}

/// Handle to one job registered on a worker. Queuing data and deregistering
/// are both idempotent after the job has been deregistered (either by the
/// caller or automatically, after a `Failure` result). Results arrive as a
/// stream rather than a registered callback — the async equivalent of the
/// single-listener event emitter the source uses, since nothing here runs
/// on a shared single-threaded loop the way the source's asyncio task does.
pub struct JobHandle {
	worker_id: usize,
	job_id: JobId,
	task_tx: std::sync::mpsc::Sender<WorkerTask>,
	result_rx: mpsc::UnboundedReceiver<JobResult>,
	registrations: Arc<Mutex<HashMap<JobId, JobRegistration>>>,
	deregistered: AtomicBool,
}

impl JobHandle {
	pub fn worker_id(&self) -> usize {
		self.worker_id
	}

	pub fn job_id(&self) -> JobId {
		self.job_id
	}

	/// Queues audio chunks for this job's next batch. A no-op once
	/// deregistered, and a no-op for an empty batch.
	pub fn queue_data(&self, batch: Vec<AudioChunk>) {
		if batch.is_empty() || self.deregistered.load(Ordering::Acquire) {
			return;
		}
		let _ = self.task_tx.send(WorkerTask::QueueData { job_id: self.job_id, batch });
	}

	/// Waits for the next result produced by this job. `None` once the
	/// worker side has gone away (e.g. the worker was terminated).
	pub async fn next_result(&mut self) -> Option<JobResult> {
		self.result_rx.recv().await
	}

	/// Removes the job from its worker. Safe to call more than once.
	pub fn deregister(&self) {
		if self.deregistered.swap(true, Ordering::AcqRel) {
			return;
		}
		self.registrations.lock().expect("registrations mutex poisoned").remove(&self.job_id);
		let _ = self.task_tx.send(WorkerTask::DeregisterJob { job_id: self.job_id });
	}
}

impl Drop for JobHandle {
	fn drop(&mut self) {
		self.deregister();
	}
}

/// Main-side lifecycle owner for one worker thread: spawns it, blocks until
/// it reports ready, then runs an async pump that demultiplexes its result
/// stream into `RollingUtilization` updates, forwarded log records, and
/// per-job `JobResult` deliveries.
pub struct WorkerManager {
	worker_id: usize,
	task_tx: std::sync::mpsc::Sender<WorkerTask>,
	join_handle: Mutex<Option<std::thread::JoinHandle<()>>>,
	pump_cancel: CancellationToken,
	pump_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
	utilization: Arc<Mutex<RollingUtilization>>,
	registrations: Arc<Mutex<HashMap<JobId, JobRegistration>>>,
	next_job_id: std::sync::atomic::AtomicU64,
}

impl WorkerManager {
	/// Spawns the worker thread and blocks until its `Initialized` result
	/// arrives (or the worker dies before sending one).
	pub fn spawn(worker_id: usize, context_factories: Arc<HashMap<String, Arc<dyn JobContextFactory>>>, rolling_utilization_window_ns: u64) -> Result<Self, crate::DispatchError> {
		let WorkerHandle { task_tx, result_rx, join_handle, .. } = spawn_worker(worker_id, context_factories);

		match result_rx.recv() {
			Ok(WorkerResult::Initialized) => {}
			_ => return Err(crate::DispatchError::WorkerGone(worker_id)),
		}

		let utilization = Arc::new(Mutex::new(RollingUtilization::new(rolling_utilization_window_ns)));
		let registrations: Arc<Mutex<HashMap<JobId, JobRegistration>>> = Arc::new(Mutex::new(HashMap::new()));

		let (bridge_tx, bridge_rx) = mpsc::unbounded_channel::<WorkerResult>();
		// Blocking IPC reads happen on a dedicated thread so the async pump
		// below never stalls waiting on the worker's std::sync::mpsc queue.
		std::thread::Builder::new()
			.name(format!("stt-worker-{worker_id}-bridge"))
			.spawn(move || {
				while let Ok(result) = result_rx.recv() {
					if bridge_tx.send(result).is_err() {
						break;
					}
				}
			})
			.expect("failed to spawn worker result bridge thread");

		let pump_cancel = CancellationToken::new();
		let pump_handle = tokio::spawn(Self::pump(worker_id, bridge_rx, utilization.clone(), registrations.clone(), pump_cancel.clone()));

		Ok(Self {
			worker_id,
			task_tx,
			join_handle: Mutex::new(Some(join_handle)),
			pump_cancel,
			pump_handle: Mutex::new(Some(pump_handle)),
			utilization,
			registrations,
			next_job_id: std::sync::atomic::AtomicU64::new(0),
		})
	}

	/// Dispatches every inbound `WorkerResult` synchronously, in arrival
	/// order, onto this task.
	async fn pump(worker_id: usize, mut bridge_rx: mpsc::UnboundedReceiver<WorkerResult>, utilization: Arc<Mutex<RollingUtilization>>, registrations: Arc<Mutex<HashMap<JobId, JobRegistration>>>, cancel: CancellationToken) {
		loop {
			let result = tokio::select! {
				biased;
				() = cancel.cancelled() => break,
				result = bridge_rx.recv() => result,
			};
			let Some(result) = result else { break };

			match result {
				WorkerResult::Initialized => {}
				WorkerResult::Logging(record) => forward_log(worker_id, &record),
				WorkerResult::StateChange { prev_state, elapsed_ns } => {
					utilization.lock().expect("utilization mutex poisoned").increment(prev_state, elapsed_ns);
				}
				WorkerResult::JobExecution { job_id, result } => {
					let is_failure = result.is_failure();
					let mut registry = registrations.lock().expect("registrations mutex poisoned");
					let Some(registration) = registry.get(&job_id) else { continue };
					let _ = registration.result_tx.send(result);
					if is_failure {
						registry.remove(&job_id);
					}
				}
			}
		}
	}

	pub fn worker_id(&self) -> usize {
		self.worker_id
	}

	/// Current rolling utilization, `0.0..=1.0`.
	pub fn utilization(&self) -> f64 {
		self.utilization.lock().expect("utilization mutex poisoned").utilization()
	}

	/// The union of `context_ids` across every job currently registered on
	/// this worker.
	pub fn active_context_ids(&self) -> HashSet<String> {
		self.registrations
			.lock()
			.expect("registrations mutex poisoned")
			.values()
			.flat_map(|r| r.context_ids.iter().cloned())
			.collect()
	}

	pub fn register_job(&self, context_ids: Vec<String>, spec: JobSpec) -> JobHandle {
		let job_id = JobId::next(&self.next_job_id);
		let (result_tx, result_rx) = mpsc::unbounded_channel();

		self.registrations.lock().expect("registrations mutex poisoned").insert(
			job_id,
			JobRegistration {
				context_ids: context_ids.clone(),
				result_tx,
			},
		);

		let _ = self.task_tx.send(WorkerTask::RegisterJob { job_id, spec, context_ids });

		JobHandle {
			worker_id: self.worker_id,
			job_id,
			task_tx: self.task_tx.clone(),
			result_rx,
			registrations: self.registrations.clone(),
			deregistered: AtomicBool::new(false),
		}
	}

	/// Sends `TERMINATE` and stops the result pump. Does not block; call
	/// `wait_shutdown` afterward to join the worker thread.
	pub fn send_terminate(&self) {
		let _ = self.task_tx.send(WorkerTask::Terminate);
		self.pump_cancel.cancel();
	}

	/// Blocks until the worker thread has exited and joins the pump task.
	pub async fn wait_shutdown(&self) {
		if let Some(handle) = self.pump_handle.lock().expect("pump handle mutex poisoned").take() {
			let _ = handle.await;
		}
		if let Some(handle) = self.join_handle.lock().expect("join handle mutex poisoned").take() {
			let _ = tokio::task::spawn_blocking(move || handle.join()).await;
		}
	}
}

fn forward_log(worker_id: usize, record: &stt_worker::LogRecord) {
	match record.level {
		tracing::Level::ERROR => tracing::error!(worker_id, fields = ?record.fields, "{}", record.message),
		tracing::Level::WARN => warn!(worker_id, fields = ?record.fields, "{}", record.message),
		tracing::Level::INFO => tracing::info!(worker_id, fields = ?record.fields, "{}", record.message),
		tracing::Level::DEBUG => debug!(worker_id, fields = ?record.fields, "{}", record.message),
		tracing::Level::TRACE => tracing::trace!(worker_id, fields = ?record.fields, "{}", record.message),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::any::Any;
	use stt_types::CoreError;

	struct EchoJob;

	impl stt_types::JobImpl for EchoJob {
		fn process_batch(&mut self, _contexts: &mut [Box<dyn Any + Send>], batch: Vec<AudioChunk>) -> Result<Box<dyn Any + Send>, CoreError> {
			Ok(Box::new(batch.len()))
		}
	}

	#[tokio::test]
	async fn register_job_delivers_a_result() {
		let manager = WorkerManager::spawn(0, Arc::new(HashMap::new()), 60_000_000_000).unwrap();
		let mut handle = manager.register_job(vec![], JobSpec::new(10, vec![], Box::new(EchoJob)));

		handle.queue_data(vec![AudioChunk::new(vec![1, 2, 3])]);

		let result = tokio::time::timeout(std::time::Duration::from_secs(2), handle.next_result()).await.expect("timed out waiting for a result").expect("channel closed");
		assert!(!result.is_failure());

		manager.send_terminate();
		manager.wait_shutdown().await;
	}

	#[tokio::test]
	async fn deregister_is_idempotent() {
		let manager = WorkerManager::spawn(0, Arc::new(HashMap::new()), 60_000_000_000).unwrap();
		let handle = manager.register_job(vec![], JobSpec::new(1000, vec![], Box::new(EchoJob)));
		handle.deregister();
		handle.deregister();
		assert!(manager.active_context_ids().is_empty());

		manager.send_terminate();
		manager.wait_shutdown().await;
	}
}
