use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn, Span};
use waxwing_core::{MigrationError, ProgressTracker};

use crate::graph::{MigrationTask, TaskGraph};

/// Name of the node appended after every caller task.
pub const COMPLETION_TASK: &str = "mark-complete";

/// Runs a [`TaskGraph`] on a fixed-size worker pool.
///
/// Every node keeps a count of unfinished dependencies and is handed to the
/// pool once that count reaches zero. A completion node is appended that
/// depends on the last task and on every terminal task, so it only runs once
/// all caller work is done.
pub struct TaskRunner {
    pool: ThreadPool,
}

impl TaskRunner {
    /// `workers == 0` sizes the pool to the number of CPUs.
    pub fn new(workers: usize) -> Result<Self, MigrationError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("waxwing-worker-{i}"))
            .build()
            .map_err(|e| MigrationError::WorkerPool(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Execute `graph`, then `on_complete`, blocking until both are done.
    ///
    /// Each caller task that succeeds counts one unit on `progress`, except that
    /// the last unit waits for `on_complete` to succeed. After the
    /// first failure nothing new is started and `on_complete` never runs;
    /// tasks already running are allowed to finish. An empty graph runs nothing.
    pub fn run<'a, F>(&self, graph: TaskGraph<'a>, progress: &ProgressTracker, on_complete: F) -> Result<(), MigrationError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'a,
    {
        if graph.is_empty() {
            debug!("empty task graph, nothing to run");
            return Ok(());
        }

        let schedule = Schedule::build(graph, progress, on_complete);
        let roots: Vec<usize> = schedule
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.pending.load(Ordering::SeqCst) == 0)
            .map(|(i, _)| i)
            .collect();
        debug!(tasks = schedule.slots.len() - 1, roots = roots.len(), workers = self.workers(), "running task graph");

        self.pool.scope(|scope| {
            for &root in &roots {
                release(scope, &schedule, root);
            }
        });

        schedule.finish()
    }
}

fn release<'scope>(scope: &Scope<'scope>, schedule: &'scope Schedule<'_, '_>, index: usize) {
    scope.spawn(move |scope| {
        if !schedule.execute(index) {
            return;
        }
        for &next in &schedule.slots[index].dependents {
            if schedule.slots[next].pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                release(scope, schedule, next);
            }
        }
    });
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Task,
    Completion,
}

struct Slot<'a> {
    name: String,
    kind: SlotKind,
    task: Mutex<Option<Box<dyn MigrationTask + 'a>>>,
    pending: AtomicUsize,
    dependents: Vec<usize>,
}

impl<'a> Slot<'a> {
    fn take_task(&self) -> Option<Box<dyn MigrationTask + 'a>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn has_run(&self) -> bool {
        self.task.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

struct Schedule<'r, 'a> {
    slots: Vec<Slot<'a>>,
    progress: &'r ProgressTracker,
    failed: AtomicBool,
    failure: Mutex<Option<MigrationError>>,
    span: Span,
}

impl<'r, 'a> Schedule<'r, 'a> {
    fn build<F>(graph: TaskGraph<'a>, progress: &'r ProgressTracker, on_complete: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'a,
    {
        let mut completion_deps = graph.terminals();
        if let Some(last) = graph.last() {
            if !completion_deps.contains(&last) {
                completion_deps.push(last);
            }
        }

        let nodes = graph.into_nodes();
        let completion = nodes.len();
        let mut dependents = vec![Vec::new(); completion + 1];
        let mut pending = vec![0usize; completion + 1];
        for (i, node) in nodes.iter().enumerate() {
            for dep in &node.dependencies {
                dependents[dep.index()].push(i);
                pending[i] += 1;
            }
        }
        for dep in &completion_deps {
            dependents[dep.index()].push(completion);
            pending[completion] += 1;
        }

        let mut on_complete = Some(on_complete);
        let mark_complete: Box<dyn MigrationTask + 'a> = Box::new(move || match on_complete.take() {
            Some(f) => f(),
            None => Ok(()),
        });

        let mut tasks: Vec<(String, SlotKind, Box<dyn MigrationTask + 'a>)> = nodes
            .into_iter()
            .map(|node| (node.name, SlotKind::Task, node.task))
            .collect();
        tasks.push((COMPLETION_TASK.to_string(), SlotKind::Completion, mark_complete));

        let slots = tasks
            .into_iter()
            .zip(dependents.into_iter().zip(pending))
            .map(|((name, kind, task), (dependents, pending))| Slot {
                name,
                kind,
                task: Mutex::new(Some(task)),
                pending: AtomicUsize::new(pending),
                dependents,
            })
            .collect();

        Self {
            slots,
            progress,
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
            span: Span::current(),
        }
    }

    /// Run one node on the current worker. True when its dependents may be released.
    fn execute(&self, index: usize) -> bool {
        let _entered = self.span.enter();
        if self.failed.load(Ordering::SeqCst) {
            return false;
        }
        let slot = &self.slots[index];
        let Some(mut task) = slot.take_task() else {
            return false;
        };

        debug!(task = %slot.name, "task started");
        match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
            Ok(Ok(())) => {
                // The final unit is only counted once the marker is written.
                match slot.kind {
                    SlotKind::Task => self.progress.complete_one_before_last(),
                    SlotKind::Completion => self.progress.complete_one(),
                };
                debug!(task = %slot.name, "task finished");
                true
            }
            Ok(Err(source)) => {
                warn!(task = %slot.name, error = %format!("{source:#}"), "task failed");
                self.fail(match slot.kind {
                    SlotKind::Task => MigrationError::TaskFailed { task: slot.name.clone(), source },
                    SlotKind::Completion => MigrationError::Store(source),
                });
                false
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(task = %slot.name, %message, "task panicked");
                self.fail(MigrationError::TaskPanicked { task: slot.name.clone(), message });
                false
            }
        }
    }

    fn fail(&self, err: MigrationError) {
        self.failed.store(true, Ordering::SeqCst);
        let mut first = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
            *first = Some(err);
        }
    }

    fn finish(self) -> Result<(), MigrationError> {
        let failure = self.failure.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Some(err) = failure {
            return Err(err);
        }

        // Only nodes on a dependency cycle are never released.
        let stuck: Vec<String> = self
            .slots
            .iter()
            .filter(|slot| slot.kind == SlotKind::Task && !slot.has_run())
            .map(|slot| slot.name.clone())
            .collect();
        if !stuck.is_empty() {
            warn!(tasks = ?stuck, "task graph drained with unreleased tasks");
            return Err(MigrationError::Unscheduled { tasks: stuck });
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
