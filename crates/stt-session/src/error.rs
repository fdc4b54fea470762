use thiserror::Error;

/// Errors raised while resolving a provider key or building a session from
/// it. Config-loading errors are distinct (see [`crate::config::ConfigError`])
/// since they're fatal at startup rather than per-connection.
#[derive(Error, Debug)]
pub enum SessionError {
	#[error("unknown provider key: {0}")]
	UnknownProvider(String),
	#[error(transparent)]
	Dispatch(#[from] stt_dispatch::DispatchError),
	#[error("invalid session configuration: {0}")]
	InvalidSessionConfig(String),
}

impl From<crate::provider::ProviderError> for SessionError {
	fn from(err: crate::provider::ProviderError) -> Self {
		match err {
			crate::provider::ProviderError::Dispatch(e) => Self::Dispatch(e),
			crate::provider::ProviderError::InvalidConfig(msg) => Self::InvalidSessionConfig(msg),
		}
	}
}
