use uuid::Uuid;

/// Opaque encoded audio bytes as received from a client, plus the bookkeeping
/// needed for latency attribution further down the pipeline.
#[derive(Clone, Debug)]
pub struct AudioChunk {
	pub chunk_id: Uuid,
	pub received_at: chrono::DateTime<chrono::Utc>,
	pub bytes: Vec<u8>,
}

impl AudioChunk {
	pub fn new(bytes: Vec<u8>) -> Self {
		Self {
			chunk_id: Uuid::new_v4(),
			received_at: chrono::Utc::now(),
			bytes,
		}
	}
}
