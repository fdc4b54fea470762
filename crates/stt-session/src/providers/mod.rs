pub mod debug;
pub mod whisper_streaming;
