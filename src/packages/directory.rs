// src/packages/directory.rs

//! Package directory listing
//!
//! Package state is always computed fresh from the directory, never carried
//! incrementally, so in-memory assumptions cannot drift from disk.

use crate::error::Result;
use crate::packages::name::{canonical_from_disabled, disabled_filename, is_package_filename};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Availability of a package as seen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageState {
    /// File present at its canonical name
    Enabled,
    /// File present at canonical name + disabled suffix
    Disabled,
    /// Neither form exists
    Missing,
}

/// One package found in the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    /// Canonical filename (`*.var`)
    pub name: String,
    pub state: PackageState,
    /// True when both the canonical and the disabled file exist
    pub shadowed: bool,
}

/// Path of the canonical (enabled) form
pub fn enabled_path(addon_dir: &Path, name: &str) -> PathBuf {
    addon_dir.join(name)
}

/// Path of the disabled form
pub fn disabled_path(addon_dir: &Path, name: &str) -> PathBuf {
    addon_dir.join(disabled_filename(name))
}

/// Current state of a single package
pub fn state_of(addon_dir: &Path, name: &str) -> PackageState {
    if enabled_path(addon_dir, name).is_file() {
        PackageState::Enabled
    } else if disabled_path(addon_dir, name).is_file() {
        PackageState::Disabled
    } else {
        PackageState::Missing
    }
}

/// List every package in the directory (top level only), sorted by name
///
/// A package present in both forms is reported `Enabled` and flagged
/// `shadowed`; the host sees the canonical file.
pub fn list_packages(addon_dir: &Path) -> Result<Vec<PackageEntry>> {
    let mut found: BTreeMap<String, (bool, bool)> = BTreeMap::new();

    for entry in fs::read_dir(addon_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            warn!("Skipping non UTF-8 filename in {}", addon_dir.display());
            continue;
        };

        if is_package_filename(file_name) {
            found.entry(file_name.to_string()).or_default().0 = true;
        } else if let Some(canonical) = canonical_from_disabled(file_name) {
            found.entry(canonical.to_string()).or_default().1 = true;
        }
    }

    Ok(found
        .into_iter()
        .map(|(name, (enabled, disabled))| PackageEntry {
            name,
            state: if enabled {
                PackageState::Enabled
            } else {
                PackageState::Disabled
            },
            shadowed: enabled && disabled,
        })
        .collect())
}
