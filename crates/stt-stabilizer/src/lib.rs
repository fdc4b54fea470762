//! `LocalAgree`: the "local agreement with dimension d" heuristic that turns
//! a stream of unstable, overlapping decoder hypotheses into a committed
//! word timeline with timestamps.

mod local_agree;

pub use local_agree::{LocalAgree, LocalAgreeError};
