use std::collections::BTreeSet;

pub type TagSet = BTreeSet<String>;

/// Immutable description of a job context (a heavy pre-loaded resource, e.g.
/// a speech model) a worker may lazily instantiate. Loaded once from the
/// provider-config document and never mutated afterward.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct JobContextSpec {
	pub uid: String,
	/// `-1` means unlimited cluster-wide active instances.
	pub max_instances: i64,
	pub tags: TagSet,
	pub negative_affinity: Option<String>,
	pub creation_cost: f64,
	pub context_config: serde_json::Value,
}

impl JobContextSpec {
	pub fn has_unlimited_instances(&self) -> bool {
		self.max_instances < 0
	}
}
