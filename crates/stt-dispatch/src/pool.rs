use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use prometheus::{GaugeVec, Opts, Registry};
use stt_types::JobSpec;
use tracing::{info, warn};

use crate::context_registry::ContextRegistry;
use crate::error::DispatchError;
use crate::worker_manager::{JobHandle, WorkerManager};

const NS_PER_SEC: u64 = 1_000_000_000;

/// Placement across a fleet of workers: affinity, capacity, and
/// utilization-aware scoring of where a job's required context tags can
/// live. Generalizes the source's single-tag `WorkerPool._assign_worker`
/// to the multi-tag, Cartesian-product variant named authoritative in
/// `SPEC_FULL.md` §4.9.
pub struct Dispatcher {
	workers: Vec<WorkerManager>,
	contexts: ContextRegistry,
	registry: Registry,
	utilization_gauge: GaugeVec,
}

/// One internally-compatible assignment of context ids to `required_tags`
/// positions, in the same order as `required_tags`.
type ContextTuple = Vec<String>;

impl Dispatcher {
	pub fn new(num_workers: usize, contexts: ContextRegistry, rolling_utilization_window_sec: f64) -> Result<Self, DispatchError> {
		if num_workers == 0 {
			return Err(DispatchError::InvalidWorkerCount(num_workers));
		}

		let registry = Registry::new();
		let utilization_gauge = GaugeVec::new(Opts::new("stt_worker_utilization", "Rolling utilization per worker, 0..1"), &["worker_id"]).expect("static metric definition is valid");
		registry.register(Box::new(utilization_gauge.clone())).expect("metric only registered once");

		let window_ns = (rolling_utilization_window_sec * NS_PER_SEC as f64) as u64;
		let factories = contexts.factories();

		let mut workers = Vec::with_capacity(num_workers);
		for worker_id in 0..num_workers {
			workers.push(WorkerManager::spawn(worker_id, factories.clone(), window_ns)?);
		}

		Ok(Self {
			workers,
			contexts,
			registry,
			utilization_gauge,
		})
	}

	/// The shared registry every worker's utilization gauge is registered
	/// against, for a caller to expose over a `/metrics` endpoint.
	pub fn metrics_registry(&self) -> &Registry {
		self.refresh_utilization_metrics();
		&self.registry
	}

	fn refresh_utilization_metrics(&self) {
		for worker in &self.workers {
			self.utilization_gauge.with_label_values(&[&worker.worker_id().to_string()]).set(worker.utilization());
		}
	}

	/// Cluster-wide count of workers on which `context_id` is currently active.
	fn active_instance_count(&self, context_id: &str) -> usize {
		self.workers.iter().filter(|w| w.active_context_ids().contains(context_id)).count()
	}

	fn context_max_reached(&self, context_id: &str) -> bool {
		let Some(spec) = self.contexts.spec(context_id) else { return true };
		if spec.has_unlimited_instances() {
			return false;
		}
		self.active_instance_count(context_id) >= spec.max_instances as usize
	}

	/// A tuple is internally compatible iff no element's negative affinity
	/// is in the union of tags of the *other* elements in the tuple.
	fn tuple_is_compatible(&self, tuple: &ContextTuple) -> bool {
		for (i, id) in tuple.iter().enumerate() {
			let Some(spec) = self.contexts.spec(id) else { return false };
			let Some(negative_affinity) = &spec.negative_affinity else { continue };

			let other_tags_contain_affinity = tuple
				.iter()
				.enumerate()
				.filter(|(j, _)| *j != i)
				.filter_map(|(_, other_id)| self.contexts.spec(other_id))
				.any(|other_spec| other_spec.tags.contains(negative_affinity));

			if other_tags_contain_affinity {
				return false;
			}
		}
		true
	}

	/// A compatible tuple is placeable on `worker` iff every element either
	/// is already active there or has spare cluster-wide capacity, and
	/// neither the element nor any currently-active context on that worker
	/// vetoes the other via negative affinity.
	fn tuple_is_placeable(&self, tuple: &ContextTuple, worker: &WorkerManager) -> bool {
		let active_on_worker = worker.active_context_ids();

		for id in tuple {
			let Some(spec) = self.contexts.spec(id) else { return false };

			if !active_on_worker.contains(id) && self.context_max_reached(id) {
				return false;
			}

			let active_tags: HashSet<&str> = active_on_worker.iter().filter_map(|active_id| self.contexts.spec(active_id)).flat_map(|s| s.tags.iter().map(String::as_str)).collect();
			if let Some(neg) = &spec.negative_affinity {
				if active_tags.contains(neg.as_str()) {
					return false;
				}
			}

			let active_negative_affinities: HashSet<&str> = active_on_worker
				.iter()
				.filter_map(|active_id| self.contexts.spec(active_id))
				.filter_map(|s| s.negative_affinity.as_deref())
				.collect();
			if spec.tags.iter().any(|tag| active_negative_affinities.contains(tag.as_str())) {
				return false;
			}
		}
		true
	}

	/// Sum of `creation_cost` over distinct ids in `tuple` not already
	/// active on `worker`.
	fn creation_cost(&self, tuple: &ContextTuple, worker: &WorkerManager) -> f64 {
		let active_on_worker = worker.active_context_ids();
		let distinct: HashSet<&str> = tuple.iter().map(String::as_str).collect();
		distinct
			.into_iter()
			.filter(|id| !active_on_worker.contains(*id))
			.filter_map(|id| self.contexts.spec(id))
			.map(|spec| spec.creation_cost)
			.sum()
	}

	fn best_placement(&self, required_tags: &[String]) -> Result<(usize, ContextTuple), DispatchError> {
		let mut candidate_sets: Vec<Vec<String>> = Vec::with_capacity(required_tags.len());
		for tag in required_tags {
			let ids = self.contexts.ids_by_tag(tag);
			if ids.is_empty() {
				return Err(DispatchError::UnknownTag(tag.clone()));
			}
			candidate_sets.push(ids.into_iter().collect());
		}

		let tuples: Vec<ContextTuple> = cartesian_product(&candidate_sets).into_iter().filter(|tuple| self.tuple_is_compatible(tuple)).collect();

		let mut best: Option<(f64, usize, ContextTuple)> = None;
		for tuple in &tuples {
			for worker in &self.workers {
				if !self.tuple_is_placeable(tuple, worker) {
					continue;
				}
				let score = 1.0 - worker.utilization() - self.creation_cost(tuple, worker);
				let better = match &best {
					None => true,
					Some((best_score, best_worker_id, _)) => score > *best_score || ((score - *best_score).abs() < f64::EPSILON && worker.worker_id() < *best_worker_id),
				};
				if better {
					best = Some((score, worker.worker_id(), tuple.clone()));
				}
			}
		}

		best.map(|(_, worker_id, tuple)| (worker_id, tuple)).ok_or(DispatchError::NoPlacement)
	}

	/// Places a job and forwards registration to the chosen worker. Empty
	/// `required_tags` means "no context needed" — the worker with the
	/// lowest utilization is picked directly.
	pub fn register_job(&self, required_tags: Vec<String>, period_ms: u64, job_impl: Box<dyn stt_types::JobImpl>) -> Result<JobHandle, DispatchError> {
		self.refresh_utilization_metrics();

		let (worker_id, context_ids) = if required_tags.is_empty() {
			let worker_id = self
				.workers
				.iter()
				.min_by(|a, b| a.utilization().partial_cmp(&b.utilization()).unwrap_or(std::cmp::Ordering::Equal))
				.map(WorkerManager::worker_id)
				.expect("at least one worker configured");
			(worker_id, Vec::new())
		} else {
			self.best_placement(&required_tags)?
		};

		let worker = self.workers.iter().find(|w| w.worker_id() == worker_id).ok_or(DispatchError::WorkerGone(worker_id))?;
		info!(worker_id, ?context_ids, period_ms, "placed job");
		Ok(worker.register_job(context_ids, JobSpec::new(period_ms, required_tags, job_impl)))
	}

	/// Sends `TERMINATE` to every worker, then waits for all to join.
	pub async fn shutdown(&self) {
		for worker in &self.workers {
			worker.send_terminate();
		}
		for worker in &self.workers {
			worker.wait_shutdown().await;
		}
		info!("dispatcher shut down");
	}
}

/// Naive k-ary Cartesian product: every combination that picks exactly one
/// element from each input set, in set order.
fn cartesian_product(sets: &[Vec<String>]) -> Vec<Vec<String>> {
	let mut result: Vec<Vec<String>> = vec![Vec::new()];
	for set in sets {
		if set.is_empty() {
			warn!("cartesian product received an empty candidate set");
			return Vec::new();
		}
		let mut next = Vec::with_capacity(result.len() * set.len());
		for prefix in &result {
			for item in set {
				let mut tuple = prefix.clone();
				tuple.push(item.clone());
				next.push(tuple);
			}
		}
		result = next;
	}
	result
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::any::Any;
	use std::collections::BTreeSet;
	use stt_types::{CoreError, JobContextFactory, JobContextSpec};

	struct NoopFactory;
	impl JobContextFactory for NoopFactory {
		fn create(&self) -> Result<Box<dyn Any + Send>, CoreError> {
			Ok(Box::new(()))
		}
		fn destroy(&self, _instance: Box<dyn Any + Send>) -> Result<(), CoreError> {
			Ok(())
		}
	}

	struct NoopJob;
	impl stt_types::JobImpl for NoopJob {
		fn process_batch(&mut self, _contexts: &mut [Box<dyn Any + Send>], _batch: Vec<stt_types::AudioChunk>) -> Result<Box<dyn Any + Send>, CoreError> {
			Ok(Box::new(()))
		}
	}

	fn spec(uid: &str, tags: &[&str], max_instances: i64, negative_affinity: Option<&str>) -> JobContextSpec {
		JobContextSpec {
			uid: uid.to_string(),
			max_instances,
			tags: tags.iter().map(|t| (*t).to_string()).collect::<BTreeSet<_>>(),
			negative_affinity: negative_affinity.map(String::from),
			creation_cost: 0.1,
			context_config: serde_json::Value::Null,
		}
	}

	fn registry(specs: Vec<JobContextSpec>) -> ContextRegistry {
		let mut factories: HashMap<String, Arc<dyn JobContextFactory>> = HashMap::new();
		for s in &specs {
			factories.insert(s.uid.clone(), Arc::new(NoopFactory));
		}
		ContextRegistry::new(specs, factories)
	}

	#[test]
	fn cartesian_product_covers_every_combination() {
		let sets = vec![vec!["a".to_string(), "b".to_string()], vec!["x".to_string()]];
		let product = cartesian_product(&sets);
		assert_eq!(product.len(), 2);
		assert!(product.contains(&vec!["a".to_string(), "x".to_string()]));
		assert!(product.contains(&vec!["b".to_string(), "x".to_string()]));
	}

	#[test]
	fn cartesian_product_empty_set_yields_no_tuples() {
		let sets = vec![vec!["a".to_string()], vec![]];
		assert!(cartesian_product(&sets).is_empty());
	}

	#[test]
	fn zero_workers_is_a_clean_config_error_not_a_panic() {
		let err = Dispatcher::new(0, registry(vec![]), 60.0).unwrap_err();
		assert!(matches!(err, DispatchError::InvalidWorkerCount(0)));
	}

	#[tokio::test]
	async fn unknown_tag_fails_fast() {
		let dispatcher = Dispatcher::new(1, registry(vec![spec("whisper", &["asr"], -1, None)]), 60.0).unwrap();
		let err = dispatcher.register_job(vec!["missing-tag".to_string()], 100, Box::new(NoopJob)).unwrap_err();
		assert!(matches!(err, DispatchError::UnknownTag(_)));
		dispatcher.shutdown().await;
	}

	#[tokio::test]
	async fn no_context_required_picks_least_utilized_worker() {
		let dispatcher = Dispatcher::new(2, registry(vec![]), 60.0).unwrap();
		let handle = dispatcher.register_job(vec![], 100, Box::new(NoopJob)).unwrap();
		assert!(handle.worker_id() < 2);
		dispatcher.shutdown().await;
	}

	#[tokio::test]
	async fn max_instances_limits_cluster_wide_placement() {
		// X has a cluster-wide cap of 1. Two workers, both asking for X:
		// the second registration must land on the same worker as the first.
		let dispatcher = Dispatcher::new(2, registry(vec![spec("x", &["asr"], 1, None)]), 60.0).unwrap();
		let first = dispatcher.register_job(vec!["asr".to_string()], 1_000_000, Box::new(NoopJob)).unwrap();
		let second = dispatcher.register_job(vec!["asr".to_string()], 1_000_000, Box::new(NoopJob)).unwrap();
		assert_eq!(first.worker_id(), second.worker_id());
		dispatcher.shutdown().await;
	}
}
