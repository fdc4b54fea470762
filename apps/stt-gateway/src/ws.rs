use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use stt_session::{core_error_to_close, CloseOutcome, ConnectionSession, ServerMessage, TranscriptionEvent};
use tracing::{info, warn};

use crate::AppState;

pub async fn upgrade(State(state): State<AppState>, Path(provider_key): Path<String>, ws: WebSocketUpgrade) -> impl IntoResponse {
	ws.on_upgrade(move |socket| run_connection(socket, provider_key, state))
}

async fn run_connection(socket: WebSocket, provider_key: String, state: AppState) {
	let mut session = ConnectionSession::new(provider_key.clone(), state.auth.clone(), state.providers.clone());
	state.metrics.sessions_opened.add(1, &[]);
	let started_at = std::time::Instant::now();

	let outcome = drive_connection(socket, &mut session, &state).await;
	session.close();

	state.metrics.sessions_closed.add(1, &[]);
	state.metrics.session_lifetime.record(started_at.elapsed().as_secs_f64(), &[]);
	info!(provider_key, code = outcome.code.as_u16(), reason = %outcome.reason, "session closed");
}

/// Runs one connection to completion: drains incoming frames, forwards
/// transcription events, and enforces the init timeout. Returns the close
/// outcome that was (or would have been) sent to the client.
async fn drive_connection(mut socket: WebSocket, session: &mut ConnectionSession, state: &AppState) -> CloseOutcome {
	let init_deadline = tokio::time::Instant::now() + Duration::from_secs_f64(state.ws_init_timeout_sec);

	loop {
		let timeout_fut = async {
			if let Some(reason) = session.timeout_close_reason() {
				tokio::time::sleep_until(init_deadline).await;
				Some(reason)
			} else {
				std::future::pending().await
			}
		};

		tokio::select! {
			biased;

			timed_out = timeout_fut => {
				if let Some(outcome) = timed_out {
					send_close(&mut socket, &outcome).await;
					return outcome;
				}
			}

			event = session.next_transcription_event() => {
				match event {
					Some(TranscriptionEvent::Result(result)) => {
						for message in ServerMessage::from_transcription_result(&result) {
							if send_text(&mut socket, &message.to_json()).await.is_err() {
								let outcome = CloseOutcome::normal("client disconnected");
								return outcome;
							}
						}
					}
					Some(TranscriptionEvent::Error(error)) => {
						let outcome = core_error_to_close(&error);
						send_close(&mut socket, &outcome).await;
						return outcome;
					}
					None => {
						let outcome = CloseOutcome::normal("job ended");
						send_close(&mut socket, &outcome).await;
						return outcome;
					}
				}
			}

			frame = socket.recv() => {
				let Some(frame) = frame else {
					return CloseOutcome::normal("client disconnected");
				};
				let frame = match frame {
					Ok(frame) => frame,
					Err(err) => {
						warn!(error = %err, "websocket receive error");
						return CloseOutcome::normal("transport error");
					}
				};

				match frame {
					Message::Text(text) => {
						if let Err(outcome) = session.handle_text_message(&text) {
							send_close(&mut socket, &outcome).await;
							return outcome;
						}
					}
					Message::Binary(bytes) => {
						state.metrics.audio_chunks_received.add(1, &[]);
						state.metrics.audio_bytes_received.add(bytes.len() as u64, &[]);
						if let Err(outcome) = session.handle_audio_chunk(bytes) {
							send_close(&mut socket, &outcome).await;
							return outcome;
						}
					}
					Message::Close(_) => {
						return CloseOutcome::normal("client closed");
					}
					Message::Ping(_) | Message::Pong(_) => {}
				}
			}
		}
	}
}

async fn send_text(socket: &mut WebSocket, text: &str) -> Result<(), axum::Error> {
	socket.send(Message::Text(text.to_string())).await
}

async fn send_close(socket: &mut WebSocket, outcome: &CloseOutcome) {
	let frame = CloseFrame {
		code: outcome.code.as_u16(),
		reason: outcome.reason.clone().into(),
	};
	let _ = socket.send(Message::Close(Some(frame))).await;
}
