// src/config.rs

//! Configuration and host directory layout

use crate::activation::ActivationEngine;
use crate::cache::{CACHE_FILENAME, PreviewStore};
use crate::error::{Error, Result};
use crate::packages::scanner::{ScanMode, ScanOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Package directory below the host root
pub const ADDON_DIR: &str = "AddonPackages";

/// Loose scene directory below the host root
pub const SAVES_SCENE_DIR: &str = "Saves/scene";

/// Manifest file at the host root
pub const MANIFEST_FILENAME: &str = "_vam_temp_manifest.json";

const JOURNAL_FILENAME: &str = "_vam_temp_manifest.journal";
const LOCK_FILENAME: &str = "_vam_temp_manifest.lock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host root used when `--root` is not given
    pub vam_dir: Option<PathBuf>,
    /// Where the scan cache and previews live
    pub cache_dir: PathBuf,
    pub scan: ScanConfig,
    pub resolve: ResolveConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub include_hidden: bool,
    /// Extract preview images while scanning
    pub previews: bool,
    pub max_threads: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Name fragments (case-insensitive) of packages that are never disabled
    pub protected_markers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vam_dir: None,
            cache_dir: default_cache_dir(),
            scan: ScanConfig::default(),
            resolve: ResolveConfig::default(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_hidden: false,
            previews: true,
            max_threads: 8,
        }
    }
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            protected_markers: ["[asset]", "[assets]", ".asset", "[plugin]"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .unwrap_or_else(std::env::temp_dir)
        .join("varkeep")
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("varkeep").join("config.toml"))
    }

    /// Load from `path`, or from the default location
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Ok(Self::default());
        };

        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scan.max_threads == 0 {
            return Err(Error::ConfigError(
                "scan.max_threads must be at least 1".to_string(),
            ));
        }
        if self.resolve.protected_markers.iter().any(|m| m.is_empty()) {
            return Err(Error::ConfigError(
                "resolve.protected_markers may not contain empty strings".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            mode: if self.scan.previews {
                ScanMode::Full
            } else {
                ScanMode::Fast
            },
            include_hidden: self.scan.include_hidden,
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILENAME)
    }

    pub fn preview_store(&self) -> PreviewStore {
        PreviewStore::new(&self.cache_dir)
    }
}

/// Paths derived from a host install root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VamLayout {
    pub root: PathBuf,
    pub addon_dir: PathBuf,
    pub saves_scene_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub journal_path: PathBuf,
    pub lock_path: PathBuf,
}

impl VamLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            addon_dir: root.join(ADDON_DIR),
            saves_scene_dir: root.join(SAVES_SCENE_DIR),
            manifest_path: root.join(MANIFEST_FILENAME),
            journal_path: root.join(JOURNAL_FILENAME),
            lock_path: root.join(LOCK_FILENAME),
            root,
        }
    }

    /// Check the root looks like a host install
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(Error::InvalidLayout(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        if !self.addon_dir.is_dir() {
            return Err(Error::InvalidLayout(format!(
                "{} has no {} directory",
                self.root.display(),
                ADDON_DIR
            )));
        }
        Ok(())
    }

    /// Loose scene directory, if the install has one
    pub fn saves_scene_dir(&self) -> Option<&Path> {
        self.saves_scene_dir
            .is_dir()
            .then_some(self.saves_scene_dir.as_path())
    }

    pub fn engine(&self) -> ActivationEngine {
        ActivationEngine::new(&self.addon_dir, &self.manifest_path, &self.journal_path)
    }
}
