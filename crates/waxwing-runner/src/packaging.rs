use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

/// Source of the running application's version.
pub trait PackagingInfo: Send + Sync {
    fn current_version(&self) -> Result<String>;
}

impl<T: PackagingInfo + ?Sized> PackagingInfo for &T {
    fn current_version(&self) -> Result<String> {
        (**self).current_version()
    }
}

impl<T: PackagingInfo + ?Sized> PackagingInfo for Box<T> {
    fn current_version(&self) -> Result<String> {
        (**self).current_version()
    }
}

impl<T: PackagingInfo + ?Sized> PackagingInfo for Arc<T> {
    fn current_version(&self) -> Result<String> {
        (**self).current_version()
    }
}

/// A version fixed at construction, usually baked in at compile time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticVersion(String);

impl StaticVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }
}

impl PackagingInfo for StaticVersion {
    fn current_version(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// [`StaticVersion`] holding the invoking crate's `CARGO_PKG_VERSION`.
#[macro_export]
macro_rules! crate_version {
    () => {
        $crate::StaticVersion::new(env!("CARGO_PKG_VERSION"))
    };
}

/// Reads `package.version` from a `Cargo.toml`, falling back to
/// `workspace.package.version`. The file is read on every call.
#[derive(Clone, Debug)]
pub struct CargoManifest {
    path: PathBuf,
}

impl CargoManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PackagingInfo for CargoManifest {
    fn current_version(&self) -> Result<String> {
        let s = std::fs::read_to_string(&self.path).with_context(|| format!("read {}", self.path.display()))?;
        let manifest: toml::Table = toml::from_str(&s).with_context(|| format!("parse {}", self.path.display()))?;

        // `version.workspace = true` is a table, so only string values count.
        let package = manifest.get("package").and_then(|p| p.get("version")).and_then(|v| v.as_str());
        let workspace = manifest
            .get("workspace")
            .and_then(|w| w.get("package"))
            .and_then(|p| p.get("version"))
            .and_then(|v| v.as_str());

        package
            .or(workspace)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("no version string in {}", self.path.display()))
    }
}
