/// A single word or run of text with a time span, measured in seconds from
/// stream start.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TranscriptionSegment {
	pub text: String,
	pub start_sec: f64,
	pub end_sec: f64,
}

impl TranscriptionSegment {
	pub fn new(text: impl Into<String>, start_sec: f64, end_sec: f64) -> Self {
		Self {
			text: text.into(),
			start_sec,
			end_sec,
		}
	}

	/// A segment ends a sentence if it ends with `.`, `?`, or `!` but is not
	/// the `...` ellipsis. The whitelist must be checked first.
	pub fn is_sentence_end(&self) -> bool {
		if self.text.ends_with("...") {
			return false;
		}
		self.text.ends_with('.') || self.text.ends_with('?') || self.text.ends_with('!')
	}
}

/// Parallel arrays of text/start/end, the wire-level shape of a committed or
/// in-progress transcript.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TranscriptionSequence {
	pub text: Vec<String>,
	pub starts: Vec<f64>,
	pub ends: Vec<f64>,
}

impl TranscriptionSequence {
	pub fn is_empty(&self) -> bool {
		self.text.is_empty()
	}

	pub fn from_segments(segments: impl IntoIterator<Item = TranscriptionSegment>) -> Self {
		let mut seq = Self::default();
		for seg in segments {
			seq.text.push(seg.text);
			seq.starts.push(seg.start_sec);
			seq.ends.push(seg.end_sec);
		}
		seq
	}

	/// Concatenate `self` followed by `other`, in that order.
	pub fn append(&mut self, other: Self) {
		self.text.extend(other.text);
		self.starts.extend(other.starts);
		self.ends.extend(other.ends);
	}

	pub fn joined_text(&self) -> String {
		self.text.join("")
	}
}

/// The output of one `StreamingJob::process_batch` invocation. In-progress
/// replaces the prior in-progress tier on the client; final is append-only.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TranscriptionResult {
	pub in_progress: Option<TranscriptionSequence>,
	pub r#final: Option<TranscriptionSequence>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sentence_end_excludes_ellipsis() {
		assert!(TranscriptionSegment::new("text.", 0.0, 1.0).is_sentence_end());
		assert!(TranscriptionSegment::new("really?", 0.0, 1.0).is_sentence_end());
		assert!(!TranscriptionSegment::new("wait...", 0.0, 1.0).is_sentence_end());
		assert!(!TranscriptionSegment::new("word", 0.0, 1.0).is_sentence_end());
	}

	#[test]
	fn sequence_append_preserves_order() {
		let mut a = TranscriptionSequence::from_segments([TranscriptionSegment::new("hi", 0.0, 1.0)]);
		let b = TranscriptionSequence::from_segments([TranscriptionSegment::new("there", 1.0, 2.0)]);
		a.append(b);
		assert_eq!(a.text, vec!["hi", "there"]);
		assert_eq!(a.joined_text(), "hithere");
	}
}
