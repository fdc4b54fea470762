mod auth;
mod config;
mod contexts;
mod error;
mod provider;
mod providers;
mod registry;
mod session;
mod wire;

pub use auth::AuthService;
pub use config::{ConfigError, GatewayConfig, JobContextConfig, ProviderConfigEntry, ProviderConfigFile, ProviderUid};
pub use error::SessionError;
pub use provider::{ProviderError, TranscriptionEvent, TranscriptionProvider, TranscriptionSession};
pub use registry::ProviderRegistry;
pub use session::{core_error_to_close, CloseCode, CloseOutcome, ConnectionSession};
pub use wire::{ClientMessage, ServerMessage};
