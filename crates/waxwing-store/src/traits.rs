use std::sync::Arc;

/// Key the marker lives under when the caller does not pick one.
pub const DEFAULT_MARKER_KEY: &str = "waxwing.migrated_to";

/// Durable home of the "last migrated version" marker.
///
/// Implementations must survive process restarts. The gate reads the marker
/// before running any work and writes it once, after all work finished.
pub trait CompletionStore: Send + Sync {
    /// `None` when no migration has ever been recorded.
    fn get_marker(&self) -> anyhow::Result<Option<String>>;
    fn set_marker(&self, version: &str) -> anyhow::Result<()>;
}

impl<T: CompletionStore + ?Sized> CompletionStore for &T {
    fn get_marker(&self) -> anyhow::Result<Option<String>> {
        (**self).get_marker()
    }

    fn set_marker(&self, version: &str) -> anyhow::Result<()> {
        (**self).set_marker(version)
    }
}

impl<T: CompletionStore + ?Sized> CompletionStore for Box<T> {
    fn get_marker(&self) -> anyhow::Result<Option<String>> {
        (**self).get_marker()
    }

    fn set_marker(&self, version: &str) -> anyhow::Result<()> {
        (**self).set_marker(version)
    }
}

impl<T: CompletionStore + ?Sized> CompletionStore for Arc<T> {
    fn get_marker(&self) -> anyhow::Result<Option<String>> {
        (**self).get_marker()
    }

    fn set_marker(&self, version: &str) -> anyhow::Result<()> {
        (**self).set_marker(version)
    }
}
