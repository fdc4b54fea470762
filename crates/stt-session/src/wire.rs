use serde::{Deserialize, Serialize};
use stt_types::TranscriptionResult;

/// Messages a client sends over the transcription-stream websocket as JSON
/// text frames. Binary frames are always raw audio chunk bytes and never
/// pass through this type.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
	Auth { api_key: String },
	Config { config: serde_json::Value },
}

/// Messages the server sends back, serialized to a JSON text frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
	IpTranscript {
		text: Vec<String>,
		starts: Option<Vec<f64>>,
		ends: Option<Vec<f64>>,
	},
	FinalTranscript {
		text: Vec<String>,
		starts: Option<Vec<f64>>,
		ends: Option<Vec<f64>>,
	},
}

impl ServerMessage {
	pub fn to_json(&self) -> String {
		serde_json::to_string(self).expect("ServerMessage fields are always representable as JSON")
	}

	/// Final is sent before in-progress, matching the order the controller
	/// emits them in: a result can finalize and start a new in-progress
	/// hypothesis in the same batch.
	pub fn from_transcription_result(result: &TranscriptionResult) -> Vec<Self> {
		let mut messages = Vec::with_capacity(2);
		if let Some(final_seq) = &result.r#final {
			messages.push(Self::FinalTranscript {
				text: final_seq.text.clone(),
				starts: Some(final_seq.starts.clone()),
				ends: Some(final_seq.ends.clone()),
			});
		}
		if let Some(in_progress) = &result.in_progress {
			messages.push(Self::IpTranscript {
				text: in_progress.text.clone(),
				starts: Some(in_progress.starts.clone()),
				ends: Some(in_progress.ends.clone()),
			});
		}
		messages
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn client_message_tags_are_snake_case() {
		let auth: ClientMessage = serde_json::from_str(r#"{"type":"auth","api_key":"k"}"#).unwrap();
		assert!(matches!(auth, ClientMessage::Auth { api_key } if api_key == "k"));

		let config: ClientMessage = serde_json::from_str(r#"{"type":"config","config":{"a":1}}"#).unwrap();
		assert!(matches!(config, ClientMessage::Config { .. }));
	}

	#[test]
	fn server_message_serializes_with_expected_tag() {
		let msg = ServerMessage::IpTranscript {
			text: vec!["hi".to_string()],
			starts: Some(vec![0.0]),
			ends: Some(vec![1.0]),
		};
		assert_eq!(msg.to_json(), r#"{"type":"ip_transcript","text":["hi"],"starts":[0.0],"ends":[1.0]}"#);
	}

	#[test]
	fn transcription_result_orders_final_before_in_progress() {
		let result = TranscriptionResult {
			in_progress: Some(stt_types::TranscriptionSequence::from_segments([stt_types::TranscriptionSegment::new("ip", 1.0, 2.0)])),
			r#final: Some(stt_types::TranscriptionSequence::from_segments([stt_types::TranscriptionSegment::new("done.", 0.0, 1.0)])),
		};
		let messages = ServerMessage::from_transcription_result(&result);
		assert_eq!(messages.len(), 2);
		assert!(matches!(messages[0], ServerMessage::FinalTranscript { .. }));
		assert!(matches!(messages[1], ServerMessage::IpTranscript { .. }));
	}
}
