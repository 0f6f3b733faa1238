use anyhow::Context;
use tracing::{debug, info, info_span};
use waxwing_core::{MigrationError, ProgressHandle, ProgressTracker, RunId, Version};
use waxwing_queue::{TaskGraph, TaskRunner};
use waxwing_store::CompletionStore;

use crate::packaging::PackagingInfo;

/// Task name reported when a single-block migration fails.
pub const BLOCK_TASK: &str = "block";

/// Result of the eligibility check for one target version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// The marker is already at or past the target.
    AlreadyApplied { last: Version },
    /// The target belongs to a newer build than the one running.
    AheadOfApp { app: Version },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyApplied,
    AheadOfApp,
    NoTasks,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    Applied,
    Skipped(SkipReason),
}

impl MigrationOutcome {
    pub fn was_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Runs a migration step at most once per target version.
///
/// A step runs only if the recorded marker is below the target and the
/// running application is at or past it. On success the target becomes the
/// new marker. Calls on one gate must not overlap; the marker read and the
/// final write are not atomic across calls.
pub struct MigrationGate<S, P> {
    store: S,
    packaging: P,
    progress: ProgressTracker,
    workers: usize,
}

impl<S: CompletionStore, P: PackagingInfo> MigrationGate<S, P> {
    pub fn new(store: S, packaging: P) -> Self {
        Self { store, packaging, progress: ProgressTracker::new(), workers: 0 }
    }

    /// Worker pool size for task graphs; 0 means one per CPU.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn packaging(&self) -> &P {
        &self.packaging
    }

    /// Progress of the latest eligible migration.
    pub fn progress(&self) -> ProgressHandle {
        self.progress.handle()
    }

    pub fn last_migrated(&self) -> Result<Option<Version>, MigrationError> {
        let marker = self.store.get_marker().map_err(MigrationError::Store)?;
        Ok(marker.map(|s| Version::parse(&s)).transpose()?)
    }

    pub fn check(&self, target: &str) -> Result<Eligibility, MigrationError> {
        self.eligibility(&Version::parse(target)?)
    }

    pub fn can_apply(&self, target: &str) -> Result<bool, MigrationError> {
        Ok(self.check(target)? == Eligibility::Eligible)
    }

    /// Run `block` on the calling thread if `target` is eligible.
    pub fn migrate<F>(&self, target: &str, block: F) -> Result<MigrationOutcome, MigrationError>
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        let target = Version::parse(target)?;
        if let Some(reason) = self.skip_reason(&target)? {
            return Ok(MigrationOutcome::Skipped(reason));
        }

        let run_id = RunId::new();
        let span = info_span!("migration", %run_id, version = %target);
        let _entered = span.enter();
        info!("running migration block");

        self.progress.observe(1);
        block().map_err(|source| MigrationError::TaskFailed { task: BLOCK_TASK.to_string(), source })?;
        self.record(&target).map_err(MigrationError::Store)?;
        self.progress.complete_one();

        info!("migration recorded");
        Ok(MigrationOutcome::Applied)
    }

    /// Run every task of `graph` on a worker pool if `target` is eligible.
    ///
    /// The marker is written by a final task that depends on all others.
    /// The graph must be acyclic.
    pub fn migrate_tasks(&self, target: &str, graph: TaskGraph<'_>) -> Result<MigrationOutcome, MigrationError> {
        let target = Version::parse(target)?;
        if let Some(reason) = self.skip_reason(&target)? {
            return Ok(MigrationOutcome::Skipped(reason));
        }
        if graph.is_empty() {
            debug!(version = %target, "no migration tasks given");
            return Ok(MigrationOutcome::Skipped(SkipReason::NoTasks));
        }

        let run_id = RunId::new();
        let span = info_span!("migration", %run_id, version = %target);
        let _entered = span.enter();
        info!(tasks = graph.len(), "running migration tasks");

        let runner = TaskRunner::new(self.workers)?;
        self.progress.observe(graph.len() as u64);
        let target = &target;
        runner.run(graph, &self.progress, move || self.record(target))?;

        info!("migration recorded");
        Ok(MigrationOutcome::Applied)
    }

    fn skip_reason(&self, target: &Version) -> Result<Option<SkipReason>, MigrationError> {
        let reason = match self.eligibility(target)? {
            Eligibility::Eligible => return Ok(None),
            Eligibility::AlreadyApplied { last } => {
                debug!(version = %target, last = %last, "migration already applied");
                SkipReason::AlreadyApplied
            }
            Eligibility::AheadOfApp { app } => {
                debug!(version = %target, app = %app, "migration targets a newer build");
                SkipReason::AheadOfApp
            }
        };
        Ok(Some(reason))
    }

    fn eligibility(&self, target: &Version) -> Result<Eligibility, MigrationError> {
        if let Some(last) = self.last_migrated()? {
            if *target <= last {
                return Ok(Eligibility::AlreadyApplied { last });
            }
        }

        let app = self.packaging.current_version().map_err(MigrationError::Packaging)?;
        let app = Version::parse(&app)?;
        if *target > app {
            return Ok(Eligibility::AheadOfApp { app });
        }
        Ok(Eligibility::Eligible)
    }

    fn record(&self, target: &Version) -> anyhow::Result<()> {
        self.store
            .set_marker(target.as_str())
            .with_context(|| format!("record migration to {target}"))
    }
}
