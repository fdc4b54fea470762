//! A worker: one isolated unit of compute hosting a lazily-populated table
//! of job contexts and an Earliest-Deadline-First scheduler running many
//! periodic jobs on a single execution thread.
//!
//! A worker is realized as a dedicated OS thread rather than a separate
//! process — see `DESIGN.md`'s Open Question resolution #1. Everything the
//! fabric above this crate cares about (no shared context instances, one
//! job executing at a time, ordered per-job result delivery) holds
//! identically either way.

mod context_table;
mod ipc;
mod runtime;

pub use context_table::JobContextTable;
pub use ipc::{LogRecord, WorkerResult, WorkerTask};
pub use runtime::{spawn_worker, WorkerHandle};

pub const NS_PER_MS: u64 = 1_000_000;
