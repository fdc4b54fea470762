use std::collections::VecDeque;

use stt_types::{TranscriptionSegment, TranscriptionSequence};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalAgreeError {
	#[error("local agreement dimension must be >= 1, got {0}")]
	InvalidDimension(usize),
}

/// "Local agreement with dimension d": a segment is committed once the
/// leading segment of the `d` most recent hypotheses agree on text.
pub struct LocalAgree {
	d: usize,
	committed: VecDeque<TranscriptionSegment>,
	/// The last `d` hypotheses, oldest first, newest last.
	hypotheses: VecDeque<VecDeque<TranscriptionSegment>>,
	committed_time: f64,
}

impl LocalAgree {
	pub fn new(d: usize) -> Result<Self, LocalAgreeError> {
		if d < 1 {
			return Err(LocalAgreeError::InvalidDimension(d));
		}
		Ok(Self {
			d,
			committed: VecDeque::new(),
			hypotheses: VecDeque::new(),
			committed_time: 0.0,
		})
	}

	pub fn committed_time(&self) -> f64 {
		self.committed_time
	}

	/// Admits one fresh hypothesis (a complete transcript for the current
	/// buffer contents) and advances the committed prefix as far as the `d`
	/// most recent hypotheses agree.
	pub fn append_transcription(&mut self, segments: Vec<TranscriptionSegment>) {
		let committed_time = self.committed_time;
		let filtered: VecDeque<TranscriptionSegment> = segments.into_iter().skip_while(|s| s.start_sec < committed_time).collect();

		self.hypotheses.push_back(filtered);
		if self.hypotheses.len() > self.d {
			self.hypotheses.pop_front();
		}
		if self.hypotheses.len() < self.d {
			return;
		}

		loop {
			if self.hypotheses.iter().any(VecDeque::is_empty) {
				break;
			}
			let leading_text = self.hypotheses.front().expect("checked non-empty above").front().expect("checked non-empty above").text.clone();
			let all_agree = self.hypotheses.iter().all(|h| h.front().expect("checked non-empty above").text == leading_text);
			if !all_agree {
				break;
			}
			let mut committed_segment = None;
			for hypothesis in &mut self.hypotheses {
				committed_segment = hypothesis.pop_front();
			}
			let segment = committed_segment.expect("loop guard ensures every hypothesis has a front element");
			self.committed_time = segment.end_sec;
			self.committed.push_back(segment);
		}
	}

	/// Walks the committed prefix and, if a sentence-ending segment exists,
	/// removes and returns the run up to and including it.
	pub fn pop_finalized(&mut self) -> Option<TranscriptionSequence> {
		let end_idx = self.committed.iter().position(TranscriptionSegment::is_sentence_end)?;
		let run: Vec<_> = self.committed.drain(0..=end_idx).collect();
		Some(TranscriptionSequence::from_segments(run))
	}

	/// The committed prefix concatenated with the newest hypothesis. `None`
	/// if both are empty.
	pub fn get_in_progress(&self) -> Option<TranscriptionSequence> {
		let newest_is_empty = self.hypotheses.back().map_or(true, VecDeque::is_empty);
		if self.committed.is_empty() && newest_is_empty {
			return None;
		}
		let mut seq = TranscriptionSequence::from_segments(self.committed.iter().cloned());
		if let Some(newest) = self.hypotheses.back() {
			seq.append(TranscriptionSequence::from_segments(newest.iter().cloned()));
		}
		Some(seq)
	}

	/// Commits regardless of agreement, triggered by buffer overflow: pops
	/// everything with `start < end_time` from the committed prefix and from
	/// the newest hypothesis (merging both into the result), then silently
	/// drops matching segments from every older hypothesis so they don't
	/// resurface once superseded.
	pub fn force_finalized(&mut self, end_time: f64) -> Option<TranscriptionSequence> {
		let mut popped = Vec::new();

		while self.committed.front().is_some_and(|s| s.start_sec < end_time) {
			popped.push(self.committed.pop_front().expect("checked Some above"));
		}

		if let Some(newest) = self.hypotheses.back_mut() {
			while newest.front().is_some_and(|s| s.start_sec < end_time) {
				popped.push(newest.pop_front().expect("checked Some above"));
			}
		}

		let newest_idx = self.hypotheses.len().saturating_sub(1);
		for (i, hypothesis) in self.hypotheses.iter_mut().enumerate() {
			if i == newest_idx {
				continue;
			}
			while hypothesis.front().is_some_and(|s| s.start_sec < end_time) {
				hypothesis.pop_front();
			}
		}

		if popped.is_empty() {
			return None;
		}
		Some(TranscriptionSequence::from_segments(popped))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn seg(text: &str, start: f64, end: f64) -> TranscriptionSegment {
		TranscriptionSegment::new(text, start, end)
	}

	#[test]
	fn rejects_dimension_below_one() {
		assert!(LocalAgree::new(0).is_err());
		assert!(LocalAgree::new(1).is_ok());
	}

	#[test]
	fn commit_without_sentence_end_stays_in_progress() {
		let mut la = LocalAgree::new(2).unwrap();
		la.append_transcription(vec![seg("Single", 0.0, 1.0), seg("sequence", 1.0, 2.0), seg("text", 2.0, 3.0)]);
		la.append_transcription(vec![
			seg("Single", 0.0, 1.0),
			seg("sequence", 1.0, 2.0),
			seg("text", 2.0, 3.0),
			seg("example", 3.0, 4.0),
		]);

		assert!(la.pop_finalized().is_none());
		let ip = la.get_in_progress().unwrap();
		assert_eq!(ip.text, vec!["Single", "sequence", "text", "example"]);
	}

	#[test]
	fn sentence_end_finalizes_committed_run() {
		let mut la = LocalAgree::new(2).unwrap();
		la.append_transcription(vec![seg("Single", 0.0, 1.0), seg("sequence", 1.0, 2.0), seg("text.", 2.0, 3.0)]);
		la.append_transcription(vec![
			seg("Single", 0.0, 1.0),
			seg("sequence", 1.0, 2.0),
			seg("text.", 2.0, 3.0),
			seg("Next", 3.0, 4.0),
			seg("sentence", 4.0, 5.0),
		]);

		let finalized = la.pop_finalized().unwrap();
		assert_eq!(finalized.text, vec!["Single", "sequence", "text."]);

		let ip = la.get_in_progress().unwrap();
		assert_eq!(ip.text, vec!["Next", "sentence"]);
		assert_eq!(ip.starts, vec![3.0, 4.0]);
	}

	#[test]
	fn force_finalized_merges_committed_and_newest_then_drops_older() {
		let mut la = LocalAgree::new(2).unwrap();
		la.append_transcription(vec![seg("a", 0.0, 1.0), seg("b", 1.0, 2.0)]);
		la.append_transcription(vec![seg("a", 0.0, 1.0), seg("b", 1.0, 2.0), seg("c", 2.0, 3.0)]);
		// committed now ["a", "b"], newest hypothesis remaining ["c"].

		let forced = la.force_finalized(2.5).unwrap();
		assert_eq!(forced.text, vec!["a", "b", "c"]);
		assert!(la.get_in_progress().is_none());
	}

	#[test]
	fn force_finalized_twice_with_same_time_is_idempotent() {
		let mut la = LocalAgree::new(1).unwrap();
		la.append_transcription(vec![seg("a", 0.0, 1.0)]);
		let first = la.force_finalized(1.0);
		assert!(first.is_some());
		let second = la.force_finalized(1.0);
		assert!(second.is_none());
	}

	#[test]
	fn sentence_end_whitelist_checked_before_suffix() {
		let mut la = LocalAgree::new(1).unwrap();
		la.append_transcription(vec![seg("wait...", 0.0, 1.0), seg("next", 1.0, 2.0)]);
		assert!(la.pop_finalized().is_none());
	}
}
