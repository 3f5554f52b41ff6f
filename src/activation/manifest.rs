// src/activation/manifest.rs

//! Activation manifest
//!
//! The durable record of which packages this tool has renamed out of the
//! host's view. Its existence alone marks an active session.

use crate::error::{Error, Result};
use crate::packages::name::{DISABLED_SUFFIX, disabled_filename};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Activation method recorded in the manifest
pub const RENAME_METHOD: &str = "rename_disabled";

/// One rename performed by the engine, as paths relative to the package directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameEntry {
    /// Canonical filename
    pub from: String,
    /// Disabled filename
    pub to: String,
}

impl RenameEntry {
    pub fn for_package(name: &str) -> Self {
        Self {
            from: name.to_string(),
            to: disabled_filename(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationManifest {
    pub addon_dir: PathBuf,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_suffix")]
    pub disabled_suffix: String,
    #[serde(default)]
    pub renamed: Vec<RenameEntry>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

fn default_method() -> String {
    RENAME_METHOD.to_string()
}

fn default_suffix() -> String {
    DISABLED_SUFFIX.to_string()
}

impl ActivationManifest {
    pub fn new(addon_dir: &Path) -> Self {
        Self {
            addon_dir: addon_dir.to_path_buf(),
            method: default_method(),
            disabled_suffix: default_suffix(),
            renamed: Vec::new(),
            saved_at: None,
        }
    }

    /// Load the manifest; `Ok(None)` when there is no active session
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let manifest: Self = serde_json::from_slice(&raw).map_err(|e| {
            Error::ManifestError(format!("{}: {}", path.display(), e))
        })?;

        if manifest.method != RENAME_METHOD {
            return Err(Error::ManifestError(format!(
                "{}: unsupported method '{}'",
                path.display(),
                manifest.method
            )));
        }

        Ok(Some(manifest))
    }

    /// Load the manifest written for `addon_dir`
    ///
    /// A manifest recorded against another package directory is an error.
    pub fn load_for(path: &Path, addon_dir: &Path) -> Result<Option<Self>> {
        let Some(manifest) = Self::load(path)? else {
            return Ok(None);
        };

        if manifest.addon_dir != addon_dir {
            return Err(Error::ManifestError(format!(
                "{} belongs to {}, not {}",
                path.display(),
                manifest.addon_dir.display(),
                addon_dir.display()
            )));
        }
        Ok(Some(manifest))
    }

    /// Persist with an atomic replace
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.saved_at = Some(Utc::now());

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, &*self)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        debug!("Saved manifest with {} entries", self.renamed.len());
        Ok(())
    }

    /// Remove the manifest file, ending the session
    pub fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.renamed.iter().any(|entry| entry.from == name)
    }

    /// Track a rename; a package is tracked at most once
    pub fn track(&mut self, name: &str) {
        if !self.is_tracked(name) {
            self.renamed.push(RenameEntry::for_package(name));
        }
    }

    pub fn untrack(&mut self, name: &str) {
        self.renamed.retain(|entry| entry.from != name);
    }

    pub fn len(&self) -> usize {
        self.renamed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renamed.is_empty()
    }
}
