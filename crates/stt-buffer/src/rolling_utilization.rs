use std::collections::VecDeque;

use stt_types::WorkerState;

fn state_index(state: WorkerState) -> usize {
	match state {
		WorkerState::Admin => 0,
		WorkerState::Idle => 1,
		WorkerState::Busy => 2,
	}
}

/// Sliding-window accounting of how long a worker has spent in each
/// `WorkerState`. Reads are O(1); the window is a *soft* lower bound — an
/// entry straddling the window edge is kept whole rather than split, so the
/// retained history is never shorter than `window_ns` once any has
/// accumulated.
pub struct RollingUtilization {
	window_ns: u64,
	entries: VecDeque<(WorkerState, u64)>,
	totals_ns: [u64; 3],
	total_ns: u64,
}

impl RollingUtilization {
	pub fn new(window_ns: u64) -> Self {
		Self {
			window_ns,
			entries: VecDeque::new(),
			totals_ns: [0; 3],
			total_ns: 0,
		}
	}

	/// Records that the worker spent `ns` nanoseconds in `state`, then evicts
	/// from the front for as long as doing so would still leave at least
	/// `window_ns` of retained history.
	pub fn increment(&mut self, state: WorkerState, ns: u64) {
		self.entries.push_back((state, ns));
		self.totals_ns[state_index(state)] += ns;
		self.total_ns += ns;

		while let Some(&(front_state, front_ns)) = self.entries.front() {
			if self.total_ns.saturating_sub(front_ns) < self.window_ns {
				break;
			}
			self.entries.pop_front();
			self.totals_ns[state_index(front_state)] -= front_ns;
			self.total_ns -= front_ns;
		}
	}

	/// `1 - idle_ns / total_ns` over the retained window; `0.0` if empty.
	pub fn utilization(&self) -> f64 {
		if self.total_ns == 0 {
			return 0.0;
		}
		let idle_ns = self.totals_ns[state_index(WorkerState::Idle)];
		1.0 - (idle_ns as f64 / self.total_ns as f64)
	}

	pub fn total_ns(&self) -> u64 {
		self.total_ns
	}
}

#[cfg(test)]
mod tests {
	use approx::assert_relative_eq;

	use super::*;

	#[test]
	fn empty_utilization_is_zero() {
		let ru = RollingUtilization::new(1_000_000_000);
		assert_eq!(ru.utilization(), 0.0);
	}

	#[test]
	fn zero_length_increments_do_not_change_utilization() {
		let mut ru = RollingUtilization::new(1_000_000_000);
		ru.increment(WorkerState::Busy, 1_000_000);
		let before = ru.utilization();
		ru.increment(WorkerState::Idle, 0);
		assert_eq!(ru.utilization(), before);
	}

	#[test]
	fn all_idle_is_zero_utilization() {
		let mut ru = RollingUtilization::new(1_000_000_000);
		ru.increment(WorkerState::Idle, 500_000_000);
		assert_eq!(ru.utilization(), 0.0);
	}

	#[test]
	fn all_busy_is_full_utilization() {
		let mut ru = RollingUtilization::new(1_000_000_000);
		ru.increment(WorkerState::Busy, 500_000_000);
		assert_eq!(ru.utilization(), 1.0);
	}

	#[test]
	fn utilization_stays_within_bounds() {
		let mut ru = RollingUtilization::new(1_000_000_000);
		ru.increment(WorkerState::Busy, 300_000_000);
		ru.increment(WorkerState::Idle, 700_000_000);
		let u = ru.utilization();
		assert!((0.0..=1.0).contains(&u));
		assert_relative_eq!(u, 0.3, epsilon = 1e-9);
	}

	#[test]
	fn eviction_never_splits_an_entry_and_keeps_at_least_window() {
		let mut ru = RollingUtilization::new(100);
		ru.increment(WorkerState::Busy, 60);
		ru.increment(WorkerState::Idle, 60);
		// total is 120 >= window(100); removing the front (60) would leave 60 < 100, so it must stay.
		assert_eq!(ru.total_ns(), 120);
		ru.increment(WorkerState::Busy, 50);
		// total now 170; removing the oldest (60) leaves 110 >= 100, so it is evicted.
		assert_eq!(ru.total_ns(), 110);
	}
}
