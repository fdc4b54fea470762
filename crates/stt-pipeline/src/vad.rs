/// External collaborator: voice-activity detection over the live buffer
/// view. Returns inclusive-exclusive sample-index ranges believed to
/// contain speech; an empty result (including on internal driver failure)
/// means "transcribe nothing this pass," not an error.
pub trait VadContext: Send {
	fn detect_speech_ranges(&mut self, samples: &[f32], threshold: f64, neg_threshold: f64) -> Vec<(usize, usize)>;
}
