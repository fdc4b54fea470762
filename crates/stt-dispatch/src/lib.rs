//! Placement of periodic jobs onto a fleet of workers, and the main-side
//! lifecycle/IPC bridge for each one.
//!
//! `stt-worker` only knows how to run jobs once they're assigned to it; this
//! crate is what decides *which* worker, spawns and tears down the worker
//! threads, and fans worker results back out to whoever registered the job.

mod context_registry;
mod error;
mod pool;
mod worker_manager;

pub use context_registry::ContextRegistry;
pub use error::DispatchError;
pub use pool::Dispatcher;
pub use worker_manager::{JobHandle, WorkerManager};
