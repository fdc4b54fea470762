use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use stt_types::{JobContextFactory, JobContextSpec};

/// Immutable, process-wide registry of every configured job context: its
/// spec (tags, affinity, instance cap) and the factory a worker uses to
/// actually build/tear down an instance. Shared by every `WorkerManager` —
/// specs never cross the worker boundary, only the factory's `create`/
/// `destroy` calls run inside a worker thread.
pub struct ContextRegistry {
	specs: HashMap<String, JobContextSpec>,
	factories: Arc<HashMap<String, Arc<dyn JobContextFactory>>>,
}

impl ContextRegistry {
	pub fn new(specs: Vec<JobContextSpec>, factories: HashMap<String, Arc<dyn JobContextFactory>>) -> Self {
		Self {
			specs: specs.into_iter().map(|spec| (spec.uid.clone(), spec)).collect(),
			factories: Arc::new(factories),
		}
	}

	pub fn factories(&self) -> Arc<HashMap<String, Arc<dyn JobContextFactory>>> {
		self.factories.clone()
	}

	pub fn spec(&self, context_id: &str) -> Option<&JobContextSpec> {
		self.specs.get(context_id)
	}

	/// Every context id carrying `tag`.
	pub fn ids_by_tag(&self, tag: &str) -> HashSet<String> {
		self.specs.values().filter(|spec| spec.tags.contains(tag)).map(|spec| spec.uid.clone()).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::BTreeSet;

	fn spec(uid: &str, tags: &[&str]) -> JobContextSpec {
		JobContextSpec {
			uid: uid.to_string(),
			max_instances: -1,
			tags: tags.iter().map(|t| (*t).to_string()).collect::<BTreeSet<_>>(),
			negative_affinity: None,
			creation_cost: 0.0,
			context_config: serde_json::Value::Null,
		}
	}

	#[test]
	fn ids_by_tag_matches_configured_contexts() {
		let registry = ContextRegistry::new(vec![spec("whisper", &["asr"]), spec("vad", &["vad"]), spec("whisper-large", &["asr", "large"])], HashMap::new());
		let asr_ids = registry.ids_by_tag("asr");
		assert_eq!(asr_ids.len(), 2);
		assert!(asr_ids.contains("whisper"));
		assert!(asr_ids.contains("whisper-large"));
		assert!(registry.ids_by_tag("missing").is_empty());
	}
}
