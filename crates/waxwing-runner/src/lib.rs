//! Version-gated, run-once migrations.
//!
//! A [`MigrationGate`] pairs a [`CompletionStore`] holding the last migrated
//! version with a [`PackagingInfo`] reporting the running version. A step runs
//! only when its target is above the marker and not above the running version.
//!
//! ```no_run
//! use waxwing_runner::{crate_version, MigrationGate, TaskGraph};
//! use waxwing_store_sqlite::SqliteStore;
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = SqliteStore::open(std::path::Path::new("state/waxwing.db"))?;
//! let gate = MigrationGate::new(store, crate_version!());
//!
//! gate.migrate("0.9", || {
//!     // rewrite settings
//!     Ok(())
//! })?;
//!
//! let mut graph = TaskGraph::new();
//! let copy = graph.add_fn("copy-cache", || Ok(()));
//! let index = graph.add_fn("reindex", || Ok(()));
//! graph.add_dependency(index, copy)?;
//! gate.migrate_tasks("1.0", graph)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod gate;
pub mod packaging;

pub use config::*;
pub use gate::*;
pub use packaging::*;

pub use waxwing_core::{compare, MigrationError, ProgressHandle, ProgressSnapshot, TaskId, Version, VersionError};
pub use waxwing_queue::{MigrationTask, TaskGraph, TaskRunner};
pub use waxwing_store::{CompletionStore, InMemoryStore, DEFAULT_MARKER_KEY};
