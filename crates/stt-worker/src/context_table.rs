use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use stt_types::{CoreError, JobContextFactory};
use tracing::warn;

/// Lazy per-worker factory/cache for job context instances. `get` creates on
/// miss; `destroy_unused` evicts anything not referenced by a live job.
/// Contexts are temporarily checked out of the table for the duration of a
/// job's execution (see [`JobContextTable::take`] / [`JobContextTable::put_back`])
/// so two distinct context ids can be handed to `job_impl` as owned values
/// without fighting the borrow checker over one shared map.
pub struct JobContextTable {
	factories: Arc<HashMap<String, Arc<dyn JobContextFactory>>>,
	instances: HashMap<String, Box<dyn Any + Send>>,
}

impl JobContextTable {
	pub fn new(factories: Arc<HashMap<String, Arc<dyn JobContextFactory>>>) -> Self {
		Self {
			factories,
			instances: HashMap::new(),
		}
	}

	/// Creates the instance on first use, then hands it out by value,
	/// removing it from the table. Pair with [`Self::put_back`] once the
	/// caller is done with it.
	pub fn take(&mut self, context_id: &str) -> Result<Box<dyn Any + Send>, CoreError> {
		if let Some(instance) = self.instances.remove(context_id) {
			return Ok(instance);
		}
		let factory = self
			.factories
			.get(context_id)
			.ok_or_else(|| CoreError::ContextCreation(format!("no factory registered for context id {context_id}")))?;
		factory.create()
	}

	pub fn put_back(&mut self, context_id: &str, instance: Box<dyn Any + Send>) {
		self.instances.insert(context_id.to_string(), instance);
	}

	/// Destroys every stored instance whose id is not in `active_ids`.
	/// Destruction failures are logged and do not stop eviction of the rest.
	pub fn destroy_unused(&mut self, active_ids: &HashSet<String>) {
		let stale: Vec<String> = self.instances.keys().filter(|id| !active_ids.contains(id.as_str())).cloned().collect();
		for id in stale {
			let Some(instance) = self.instances.remove(&id) else { continue };
			let Some(factory) = self.factories.get(&id) else { continue };
			if let Err(error) = factory.destroy(instance) {
				warn!(context_id = %id, %error, "context destruction failed");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct CountingFactory {
		created: AtomicUsize,
		destroyed: AtomicUsize,
	}

	impl JobContextFactory for CountingFactory {
		fn create(&self) -> Result<Box<dyn Any + Send>, CoreError> {
			self.created.fetch_add(1, Ordering::SeqCst);
			Ok(Box::new(42_u32))
		}

		fn destroy(&self, _instance: Box<dyn Any + Send>) -> Result<(), CoreError> {
			self.destroyed.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	#[test]
	fn creates_on_miss_then_reuses() {
		let factory = Arc::new(CountingFactory {
			created: AtomicUsize::new(0),
			destroyed: AtomicUsize::new(0),
		});
		let mut factories: HashMap<String, Arc<dyn JobContextFactory>> = HashMap::new();
		factories.insert("whisper".to_string(), factory.clone());
		let mut table = JobContextTable::new(Arc::new(factories));

		let instance = table.take("whisper").unwrap();
		table.put_back("whisper", instance);
		let _instance = table.take("whisper").unwrap();

		assert_eq!(factory.created.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn destroy_unused_evicts_and_survives_missing_factory() {
		let factory = Arc::new(CountingFactory {
			created: AtomicUsize::new(0),
			destroyed: AtomicUsize::new(0),
		});
		let mut factories: HashMap<String, Arc<dyn JobContextFactory>> = HashMap::new();
		factories.insert("whisper".to_string(), factory.clone());
		let mut table = JobContextTable::new(Arc::new(factories));

		let instance = table.take("whisper").unwrap();
		table.put_back("whisper", instance);

		table.destroy_unused(&HashSet::new());
		assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);

		// second pass with nothing stored: no-op, does not panic.
		table.destroy_unused(&HashSet::new());
	}
}
