use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use tracing::trace;

use crate::traits::CompletionStore;

/// In-memory completion store for tests. Not durable, but records every write
/// so tests can assert a marker was written exactly once.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    marker: Option<String>,
    writes: Vec<String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already recorded `version`, as if a previous run migrated to it.
    pub fn with_marker(version: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Inner { marker: Some(version.into()), writes: vec![] }),
        }
    }

    /// Every `set_marker` call since construction, oldest first. Still readable
    /// after a writer panicked.
    pub fn writes(&self) -> Vec<String> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).writes.clone()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl CompletionStore for InMemoryStore {
    fn get_marker(&self) -> anyhow::Result<Option<String>> {
        Ok(self.lock()?.marker.clone())
    }

    fn set_marker(&self, version: &str) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        trace!(version, "in-memory marker set");
        inner.marker = Some(version.to_string());
        inner.writes.push(version.to_string());
        Ok(())
    }
}
