/// Checks a client-supplied API key against the single configured secret.
pub struct AuthService {
	api_key: String,
}

impl AuthService {
	pub fn new(api_key: impl Into<String>) -> Self {
		Self { api_key: api_key.into() }
	}

	pub fn is_authenticated(&self, candidate: &str) -> bool {
		self.api_key == candidate
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn matching_key_authenticates() {
		let auth = AuthService::new("secret");
		assert!(auth.is_authenticated("secret"));
		assert!(!auth.is_authenticated("wrong"));
	}
}
