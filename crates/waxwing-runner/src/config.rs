use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use waxwing_store::DEFAULT_MARKER_KEY;
use waxwing_store_sqlite::SqliteStore;

use crate::packaging::{CargoManifest, PackagingInfo, StaticVersion};
use crate::MigrationGate;

/// Gate built from a config file: sqlite marker, boxed packaging source.
pub type ConfiguredGate = MigrationGate<SqliteStore, Box<dyn PackagingInfo>>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WaxwingConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub app: AppConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_key")]
    pub key: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// 0 = one worker per CPU
    #[serde(default)]
    pub workers: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub manifest: Option<String>,
}

fn default_path() -> String {
    "~/.waxwing/waxwing.db".to_string()
}

fn default_key() -> String {
    DEFAULT_MARKER_KEY.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_path(), key: default_key() }
    }
}

impl WaxwingConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: WaxwingConfig = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Database path with `~` expanded; relative paths resolve against `base_dir`.
    pub fn store_path(&self, base_dir: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&self.store.path).to_string());
        if expanded.is_absolute() {
            expanded
        } else {
            base_dir.join(expanded)
        }
    }

    /// A fixed `app.version` wins over `app.manifest`; with neither set the
    /// manifest is `base_dir/Cargo.toml`.
    pub fn packaging(&self, base_dir: &Path) -> Box<dyn PackagingInfo> {
        if let Some(version) = &self.app.version {
            return Box::new(StaticVersion::new(version.clone()));
        }
        let manifest = self.app.manifest.as_deref().unwrap_or("Cargo.toml");
        Box::new(CargoManifest::new(base_dir.join(manifest)))
    }

    pub fn open_gate(&self, base_dir: &Path) -> Result<ConfiguredGate> {
        let store = SqliteStore::open_with_key(&self.store_path(base_dir), self.store.key.clone())?;
        Ok(MigrationGate::new(store, self.packaging(base_dir)).with_workers(self.runner.workers))
    }
}
