/// The three mutually exclusive states a worker can be in. Transitions emit
/// `(prev_state, elapsed_ns)` to the manager, which feeds `RollingUtilization`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkerState {
	/// Draining the task queue, running scheduling and context-eviction passes.
	Admin,
	/// Blocked on the task queue with a timeout, nothing ready to run.
	Idle,
	/// Executing exactly one job.
	Busy,
}

impl WorkerState {
	pub const ALL: [WorkerState; 3] = [WorkerState::Admin, WorkerState::Idle, WorkerState::Busy];
}

impl std::fmt::Display for WorkerState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			Self::Admin => "ADMIN",
			Self::Idle => "IDLE",
			Self::Busy => "BUSY",
		};
		f.write_str(s)
	}
}
