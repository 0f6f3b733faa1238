use std::fmt;

use waxwing_core::{MigrationError, TaskId};

/// Opaque unit of migration work.
///
/// Any `FnMut() -> anyhow::Result<()> + Send` closure is a task. Returning an
/// error (or panicking) fails the whole migration.
pub trait MigrationTask: Send {
    fn run(&mut self) -> anyhow::Result<()>;
}

impl<F> MigrationTask for F
where
    F: FnMut() -> anyhow::Result<()> + Send,
{
    fn run(&mut self) -> anyhow::Result<()> {
        self()
    }
}

pub(crate) struct TaskNode<'a> {
    pub(crate) name: String,
    pub(crate) task: Box<dyn MigrationTask + 'a>,
    pub(crate) dependencies: Vec<TaskId>,
}

/// Tasks plus dependency edges for a single migrate call.
///
/// The graph must be acyclic. Tasks may borrow from the caller because the
/// runner does not return before every task finished.
#[derive(Default)]
pub struct TaskGraph<'a> {
    nodes: Vec<TaskNode<'a>>,
}

impl<'a> TaskGraph<'a> {
    pub fn new() -> Self {
        Self { nodes: vec![] }
    }

    pub fn add_task(&mut self, name: impl Into<String>, task: impl MigrationTask + 'a) -> TaskId {
        let id = TaskId(self.nodes.len());
        self.nodes.push(TaskNode { name: name.into(), task: Box::new(task), dependencies: vec![] });
        id
    }

    /// Same as [`TaskGraph::add_task`], but lets closures infer their error type.
    pub fn add_fn<F>(&mut self, name: impl Into<String>, f: F) -> TaskId
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'a,
    {
        self.add_task(name, f)
    }

    /// `task` will not start before `depends_on` finished.
    pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) -> Result<(), MigrationError> {
        self.check(depends_on)?;
        self.check(task)?;
        let deps = &mut self.nodes[task.index()].dependencies;
        if !deps.contains(&depends_on) {
            deps.push(depends_on);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The designated final task: the one added last.
    pub fn last(&self) -> Option<TaskId> {
        self.nodes.len().checked_sub(1).map(TaskId)
    }

    pub fn name(&self, id: TaskId) -> Option<&str> {
        self.nodes.get(id.index()).map(|n| n.name.as_str())
    }

    pub fn dependencies(&self, id: TaskId) -> &[TaskId] {
        self.nodes.get(id.index()).map(|n| n.dependencies.as_slice()).unwrap_or(&[])
    }

    /// Tasks nothing else depends on.
    pub fn terminals(&self) -> Vec<TaskId> {
        let mut has_dependents = vec![false; self.nodes.len()];
        for node in &self.nodes {
            for dep in &node.dependencies {
                has_dependents[dep.index()] = true;
            }
        }
        has_dependents
            .iter()
            .enumerate()
            .filter(|(_, has)| !**has)
            .map(|(i, _)| TaskId(i))
            .collect()
    }

    pub(crate) fn into_nodes(self) -> Vec<TaskNode<'a>> {
        self.nodes
    }

    fn check(&self, id: TaskId) -> Result<(), MigrationError> {
        if id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(MigrationError::UnknownTask(id))
        }
    }
}

impl fmt::Debug for TaskGraph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for node in &self.nodes {
            list.entry(&(&node.name, &node.dependencies));
        }
        list.finish()
    }
}
