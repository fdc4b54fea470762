/// Fixed-capacity append-only window of PCM samples. `offset_samples`
/// increases monotonically as prefixes are purged, so the buffer's view
/// always corresponds to `[offset_samples, offset_samples + len())` of the
/// total decoded-and-admitted stream. Not thread-safe; owned by exactly one
/// job.
pub struct CircularSampleBuffer {
	capacity: usize,
	data: Vec<f32>,
	offset_samples: u64,
}

impl CircularSampleBuffer {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			data: Vec::with_capacity(capacity),
			offset_samples: 0,
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	pub fn offset_samples(&self) -> u64 {
		self.offset_samples
	}

	pub fn view(&self) -> &[f32] {
		&self.data
	}

	/// Copies as many samples as fit and returns the suffix that did not.
	pub fn append<'a>(&mut self, samples: &'a [f32]) -> &'a [f32] {
		let space = self.capacity.saturating_sub(self.data.len());
		let take = space.min(samples.len());
		self.data.extend_from_slice(&samples[..take]);
		&samples[take..]
	}

	/// Drops the leading `min(n, len())` samples and advances `offset_samples`
	/// by the same amount.
	pub fn purge(&mut self, n: usize) {
		let n = n.min(self.data.len());
		if n == 0 {
			return;
		}
		self.data.drain(0..n);
		self.offset_samples += n as u64;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn append_returns_overflow_suffix() {
		let mut buf = CircularSampleBuffer::new(4);
		let overflow = buf.append(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
		assert_eq!(overflow, &[5.0, 6.0]);
		assert_eq!(buf.view(), &[1.0, 2.0, 3.0, 4.0]);
		assert_eq!(buf.len(), 4);
	}

	#[test]
	fn purge_advances_offset_and_shifts_view() {
		let mut buf = CircularSampleBuffer::new(8);
		assert!(buf.append(&[1.0, 2.0, 3.0, 4.0]).is_empty());
		buf.purge(2);
		assert_eq!(buf.offset_samples(), 2);
		assert_eq!(buf.view(), &[3.0, 4.0]);
		assert_eq!(buf.len(), 2);
	}

	#[test]
	fn purge_clamps_to_len() {
		let mut buf = CircularSampleBuffer::new(4);
		buf.append(&[1.0, 2.0]);
		buf.purge(100);
		assert_eq!(buf.len(), 0);
		assert_eq!(buf.offset_samples(), 2);
	}

	#[test]
	fn invariant_len_within_capacity_after_append_purge_sequence() {
		let mut buf = CircularSampleBuffer::new(5);
		for _ in 0..20 {
			buf.append(&[1.0, 1.0, 1.0]);
			assert!(buf.len() <= buf.capacity());
			buf.purge(1);
			assert!(buf.len() <= buf.capacity());
		}
	}
}
