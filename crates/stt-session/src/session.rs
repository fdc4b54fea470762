use std::sync::Arc;

use stt_types::{AudioChunk, CoreError};

use crate::auth::AuthService;
use crate::error::SessionError;
use crate::provider::{TranscriptionEvent, TranscriptionSession};
use crate::registry::ProviderRegistry;
use crate::wire::ClientMessage;

/// Websocket close codes this fabric actually uses. `1000`/`1007`/`1008`/`1011`
/// are the standard RFC 6455 codes for normal closure, unsupported payload,
/// policy violation, and unexpected condition respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
	Normal,
	InvalidMessage,
	PolicyViolation,
	InternalError,
}

impl CloseCode {
	pub fn as_u16(self) -> u16 {
		match self {
			Self::Normal => 1000,
			Self::InvalidMessage => 1007,
			Self::PolicyViolation => 1008,
			Self::InternalError => 1011,
		}
	}
}

/// What to tell the client before dropping the connection.
#[derive(Debug, Clone)]
pub struct CloseOutcome {
	pub code: CloseCode,
	pub reason: String,
}

impl CloseOutcome {
	pub fn normal(reason: impl Into<String>) -> Self {
		Self { code: CloseCode::Normal, reason: reason.into() }
	}

	fn invalid(reason: impl Into<String>) -> Self {
		Self { code: CloseCode::InvalidMessage, reason: reason.into() }
	}

	fn policy(reason: impl Into<String>) -> Self {
		Self { code: CloseCode::PolicyViolation, reason: reason.into() }
	}

	fn internal(reason: impl Into<String>) -> Self {
		Self { code: CloseCode::InternalError, reason: reason.into() }
	}
}

/// Maps a job failure to the close outcome the session reports: a
/// client-transcription error closes with 1007 and its own message,
/// anything else is an internal error.
pub fn core_error_to_close(error: &CoreError) -> CloseOutcome {
	if error.is_client_fault() {
		CloseOutcome::invalid(error.to_string())
	} else {
		CloseOutcome::internal(error.to_string())
	}
}

fn session_error_to_close(error: SessionError) -> CloseOutcome {
	match error {
		SessionError::UnknownProvider(_) | SessionError::InvalidSessionConfig(_) => CloseOutcome::invalid(error.to_string()),
		SessionError::Dispatch(_) => CloseOutcome::internal(error.to_string()),
	}
}

enum ConnectionState {
	AwaitingAuth,
	AwaitingConfig,
	Active(TranscriptionSession),
	Closed,
}

/// One websocket connection's lifecycle: `AWAITING_AUTH → AWAITING_CONFIG →
/// ACTIVE → CLOSED`. `provider_key` is fixed for the lifetime of the
/// connection (it's the URL path segment the client connected on), so it's
/// supplied once at construction rather than per message.
pub struct ConnectionSession {
	state: ConnectionState,
	provider_key: String,
	auth: Arc<AuthService>,
	providers: Arc<ProviderRegistry>,
}

impl ConnectionSession {
	pub fn new(provider_key: impl Into<String>, auth: Arc<AuthService>, providers: Arc<ProviderRegistry>) -> Self {
		Self {
			state: ConnectionState::AwaitingAuth,
			provider_key: provider_key.into(),
			auth,
			providers,
		}
	}

	/// Parses and applies one JSON text frame. Only the message the current
	/// state expects advances it; anything else closes the connection.
	pub fn handle_text_message(&mut self, raw: &str) -> Result<(), CloseOutcome> {
		let message: ClientMessage = serde_json::from_str(raw).map_err(|e| CloseOutcome::invalid(format!("invalid message: {e}")))?;

		match (&mut self.state, message) {
			(ConnectionState::AwaitingAuth, ClientMessage::Auth { api_key }) => {
				if self.auth.is_authenticated(&api_key) {
					self.state = ConnectionState::AwaitingConfig;
					Ok(())
				} else {
					Err(CloseOutcome::policy("invalid api key"))
				}
			}
			(ConnectionState::AwaitingConfig, ClientMessage::Config { config }) => {
				let session = self.providers.create_session(&self.provider_key, config).map_err(session_error_to_close)?;
				self.state = ConnectionState::Active(session);
				Ok(())
			}
			(ConnectionState::Closed, _) => Err(CloseOutcome::internal("session already closed")),
			_ => Err(CloseOutcome::policy("message out of order for the current session state")),
		}
	}

	/// Queues a binary frame as an audio chunk. Only valid once active.
	pub fn handle_audio_chunk(&self, bytes: Vec<u8>) -> Result<(), CloseOutcome> {
		match &self.state {
			ConnectionState::Active(session) => {
				session.handle_audio_chunk(AudioChunk::new(bytes));
				Ok(())
			}
			_ => Err(CloseOutcome::policy("audio received before the session was configured")),
		}
	}

	/// What to close with if `ws_init_timeout_sec` elapses without the
	/// expected progress. `None` once the session is active or closed,
	/// since only init has a timeout (see concurrency model: audio itself
	/// never times out).
	pub fn timeout_close_reason(&self) -> Option<CloseOutcome> {
		match self.state {
			ConnectionState::AwaitingAuth => Some(CloseOutcome::policy("Auth Timeout")),
			ConnectionState::AwaitingConfig => Some(CloseOutcome::policy("Config Timeout")),
			ConnectionState::Active(_) | ConnectionState::Closed => None,
		}
	}

	/// Waits for the next transcription event from the active session.
	/// Never resolves outside the active state, so it composes cleanly
	/// inside a `tokio::select!` alongside the timeout and the incoming
	/// websocket stream.
	pub async fn next_transcription_event(&mut self) -> Option<TranscriptionEvent> {
		match &mut self.state {
			ConnectionState::Active(session) => session.next_event().await,
			ConnectionState::AwaitingAuth | ConnectionState::AwaitingConfig | ConnectionState::Closed => std::future::pending().await,
		}
	}

	pub fn close(&mut self) {
		self.state = ConnectionState::Closed;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn close_codes_match_the_wire_protocol() {
		assert_eq!(CloseCode::Normal.as_u16(), 1000);
		assert_eq!(CloseCode::InvalidMessage.as_u16(), 1007);
		assert_eq!(CloseCode::PolicyViolation.as_u16(), 1008);
		assert_eq!(CloseCode::InternalError.as_u16(), 1011);
	}

	#[test]
	fn client_fault_closes_as_invalid_message() {
		let error = CoreError::ClientTranscription(stt_types::ClientTranscriptionError::BadAudio("bad".to_string()));
		assert_eq!(core_error_to_close(&error).code, CloseCode::InvalidMessage);
	}

	#[test]
	fn non_client_fault_closes_as_internal() {
		let error = CoreError::Internal("boom".to_string());
		assert_eq!(core_error_to_close(&error).code, CloseCode::InternalError);
	}

	fn debug_provider_registry() -> Arc<ProviderRegistry> {
		let json = r#"{
			"num_workers": 1,
			"rolling_utilization_window_sec": 60.0,
			"contexts": [],
			"providers": [
				{"provider_key": "debug", "provider_uid": "debug", "provider_config": {"sample_rate": 16000, "num_channels": 1}}
			]
		}"#;
		let config: crate::config::ProviderConfigFile = serde_json::from_str(json).unwrap();
		Arc::new(ProviderRegistry::new(config).unwrap())
	}

	#[tokio::test]
	async fn timeout_close_reason_tracks_awaiting_states() {
		let auth = Arc::new(AuthService::new("secret"));
		let providers = debug_provider_registry();
		let mut session = ConnectionSession::new("debug", auth, providers.clone());

		assert_eq!(session.timeout_close_reason().unwrap().reason, "Auth Timeout");

		session.handle_text_message(r#"{"type":"auth","api_key":"secret"}"#).unwrap();
		assert_eq!(session.timeout_close_reason().unwrap().reason, "Config Timeout");

		session.handle_text_message(r#"{"type":"config","config":{"sample_rate":16000,"num_channels":1}}"#).unwrap();
		assert!(session.timeout_close_reason().is_none());

		providers.shutdown().await;
	}

	#[tokio::test]
	async fn bad_api_key_closes_with_policy_violation() {
		let auth = Arc::new(AuthService::new("secret"));
		let providers = debug_provider_registry();
		let mut session = ConnectionSession::new("debug", auth, providers.clone());

		let outcome = session.handle_text_message(r#"{"type":"auth","api_key":"wrong"}"#).unwrap_err();
		assert_eq!(outcome.code, CloseCode::PolicyViolation);

		providers.shutdown().await;
	}

	#[tokio::test]
	async fn audio_before_active_is_rejected() {
		let auth = Arc::new(AuthService::new("secret"));
		let providers = debug_provider_registry();
		let session = ConnectionSession::new("debug", auth, providers.clone());

		let outcome = session.handle_audio_chunk(vec![0, 0]).unwrap_err();
		assert_eq!(outcome.code, CloseCode::PolicyViolation);

		providers.shutdown().await;
	}

	#[tokio::test]
	async fn unknown_provider_key_is_invalid_message() {
		let auth = Arc::new(AuthService::new("secret"));
		let providers = debug_provider_registry();
		let mut session = ConnectionSession::new("does-not-exist", auth, providers.clone());

		session.handle_text_message(r#"{"type":"auth","api_key":"secret"}"#).unwrap();
		let outcome = session.handle_text_message(r#"{"type":"config","config":{}}"#).unwrap_err();
		assert_eq!(outcome.code, CloseCode::InvalidMessage);

		providers.shutdown().await;
	}
}
