// src/activation/mod.rs

//! Activation engine
//!
//! Turns a keep set into renames against the package directory. A package
//! is taken out of the host's view by renaming `X.var` to `X.var.disabled`
//! and brought back by the reverse rename; content is never copied or
//! deleted.
//!
//! # Durability
//!
//! Each pass opens a [`journal::RenameJournal`], records an intent before
//! every rename, persists the manifest with an atomic replace, then closes
//! the journal. A journal found at startup means the previous pass died;
//! [`ActivationEngine::recover`] reconciles the manifest with the disk.
//!
//! # Failures
//!
//! A rename that fails (permissions, a file held open by the host) is
//! recorded in [`ActivationReport::failures`] and the pass moves on. Only
//! successful renames are tracked, so a retry picks up exactly the work that
//! is left.

pub mod journal;
pub mod lock;
pub mod manifest;

pub use crate::packages::directory::PackageState;
pub use journal::JournalOp;
pub use lock::SessionLock;
pub use manifest::{ActivationManifest, RenameEntry};

use crate::error::{Error, Result};
use crate::packages::directory::{disabled_path, enabled_path, list_packages, state_of};
use crate::resolver::KeepSet;
use journal::{JournalRecord, RenameJournal, read_journal};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Direction of a rename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenameAction {
    Disable,
    Restore,
}

/// A rename that was attempted and failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameFailure {
    pub name: String,
    pub action: RenameAction,
    pub reason: String,
}

/// What one pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Packages renamed to their disabled form
    pub disabled: Vec<String>,
    /// Packages renamed back to their canonical form
    pub restored: Vec<String>,
    /// Left alone because the destination name was taken
    pub skipped: Vec<String>,
    /// Manifest entries whose disabled file no longer exists
    pub dropped: Vec<String>,
    pub failures: Vec<RenameFailure>,
}

impl ActivationReport {
    /// `(disabled, restored)`
    pub fn counts(&self) -> (usize, usize) {
        (self.disabled.len(), self.restored.len())
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of folding a leftover journal back into the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryOutcome {
    /// Pass the journal belonged to, if its header survived
    pub op: Option<JournalOp>,
    /// Whether the pass had reached `Done`
    pub completed: bool,
    /// Packages found disabled on disk and now tracked
    pub adopted: Vec<String>,
    /// Packages found enabled on disk and no longer tracked
    pub released: Vec<String>,
    /// The restore that was rolled forward, for an interrupted restore
    pub rolled_forward: Option<ActivationReport>,
}

enum RenameOutcome {
    Renamed,
    /// Destination already exists
    Collision,
    /// Source does not exist
    Vanished,
    Failed(io::Error),
}

/// Rename engine for one package directory
#[derive(Debug, Clone)]
pub struct ActivationEngine {
    addon_dir: PathBuf,
    manifest_path: PathBuf,
    journal_path: PathBuf,
}

impl ActivationEngine {
    pub fn new(
        addon_dir: impl Into<PathBuf>,
        manifest_path: impl Into<PathBuf>,
        journal_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            addon_dir: addon_dir.into(),
            manifest_path: manifest_path.into(),
            journal_path: journal_path.into(),
        }
    }

    pub fn addon_dir(&self) -> &Path {
        &self.addon_dir
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    /// An active session exists iff the manifest does
    pub fn has_session(&self) -> bool {
        self.manifest_path.exists()
    }

    pub fn manifest(&self) -> Result<Option<ActivationManifest>> {
        ActivationManifest::load_for(&self.manifest_path, &self.addon_dir)
    }

    /// True if a previous pass left its journal behind
    pub fn needs_recovery(&self) -> bool {
        self.journal_path.exists()
    }

    /// Current state of one package
    pub fn state_of(&self, name: &str) -> PackageState {
        state_of(&self.addon_dir, name)
    }

    /// Manifest entries that break mutual exclusion: the disabled file is
    /// gone, or the canonical file exists alongside it
    pub fn inconsistencies(&self, manifest: &ActivationManifest) -> Vec<String> {
        manifest
            .renamed
            .iter()
            .filter(|entry| {
                !disabled_path(&self.addon_dir, &entry.from).is_file()
                    || enabled_path(&self.addon_dir, &entry.from).exists()
            })
            .map(|entry| entry.from.clone())
            .collect()
    }

    /// Cold disable: rename every enabled package outside `keep`
    ///
    /// Starts a session. Assumes nothing else is reading the directory.
    pub fn disable_unrelated(&self, keep: &KeepSet) -> Result<ActivationReport> {
        if self.has_session() {
            return Err(Error::SessionError(format!(
                "a session is already active ({}); reconcile or restore it first",
                self.manifest_path.display()
            )));
        }

        let packages = list_packages(&self.addon_dir)?;
        let mut journal = RenameJournal::begin(&self.journal_path, JournalOp::Disable, &self.addon_dir)?;
        let mut manifest = ActivationManifest::new(&self.addon_dir);
        let mut report = ActivationReport::default();

        for entry in packages {
            if entry.state != PackageState::Enabled || keep.contains(&entry.name) {
                continue;
            }
            self.disable_one(&entry.name, &mut journal, &mut manifest, &mut report)?;
        }

        self.commit(journal, &mut manifest, &report)?;
        info!(
            "Disabled {} packages ({} skipped, {} failed)",
            report.disabled.len(),
            report.skipped.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Live reconcile: move the directory toward `keep`
    ///
    /// Restores tracked packages that are needed again, then disables
    /// untracked enabled packages that are not. Calling it twice with the
    /// same keep set does nothing the second time.
    pub fn reconcile(&self, keep: &KeepSet) -> Result<ActivationReport> {
        let mut manifest = self
            .manifest()?
            .unwrap_or_else(|| ActivationManifest::new(&self.addon_dir));
        let mut journal =
            RenameJournal::begin(&self.journal_path, JournalOp::Reconcile, &self.addon_dir)?;
        let mut report = ActivationReport::default();

        self.prune_vanished(&mut manifest, &mut report);

        let needed: Vec<String> = manifest
            .renamed
            .iter()
            .filter(|entry| keep.contains(&entry.from))
            .map(|entry| entry.from.clone())
            .collect();
        for name in needed {
            self.restore_one(&name, &mut journal, &mut manifest, &mut report)?;
        }

        for entry in list_packages(&self.addon_dir)? {
            if entry.state != PackageState::Enabled
                || keep.contains(&entry.name)
                || manifest.is_tracked(&entry.name)
            {
                continue;
            }
            self.disable_one(&entry.name, &mut journal, &mut manifest, &mut report)?;
        }

        self.commit(journal, &mut manifest, &report)?;
        let (disabled, restored) = report.counts();
        info!("Reconciled: {} disabled, {} restored", disabled, restored);
        Ok(report)
    }

    /// Restore every tracked package and end the session
    ///
    /// Collisions are logged and left alone. The manifest is deleted unless
    /// some renames failed, in which case it is rewritten with just those so
    /// a retry can finish the job.
    pub fn restore_all(&self) -> Result<ActivationReport> {
        let Some(mut manifest) = self.manifest()? else {
            debug!("No manifest, nothing to restore");
            return Ok(ActivationReport::default());
        };

        let mut journal =
            RenameJournal::begin(&self.journal_path, JournalOp::Restore, &self.addon_dir)?;
        let mut report = ActivationReport::default();

        self.prune_vanished(&mut manifest, &mut report);

        let tracked: Vec<String> = manifest.renamed.iter().map(|e| e.from.clone()).collect();
        for name in tracked {
            self.restore_one(&name, &mut journal, &mut manifest, &mut report)?;
        }

        retain_failed(&mut manifest, &report);

        if manifest.is_empty() {
            ActivationManifest::remove(&self.manifest_path)?;
            journal.finish(0, report.restored.len())?;
        } else {
            warn!(
                "{} packages could not be restored; keeping manifest",
                manifest.len()
            );
            self.commit(journal, &mut manifest, &report)?;
        }

        info!(
            "Restored {} packages ({} collisions, {} failed)",
            report.restored.len(),
            report.skipped.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Fold a leftover journal into the manifest
    ///
    /// Each journaled intent is checked against the disk: a package found
    /// disabled with its canonical name free is tracked, one found enabled
    /// with no disabled file is not. An interrupted restore is finished.
    /// Returns `None` when there was nothing to recover.
    pub fn recover(&self) -> Result<Option<RecoveryOutcome>> {
        let Some(records) = read_journal(&self.journal_path)? else {
            return Ok(None);
        };

        warn!("Recovering from interrupted pass: {}", self.journal_path.display());

        let existing = self.manifest()?;
        let had_manifest = existing.is_some();
        let mut manifest = existing.unwrap_or_else(|| ActivationManifest::new(&self.addon_dir));
        let mut outcome = RecoveryOutcome::default();

        for record in &records {
            let name = match record {
                JournalRecord::Begin { op, .. } => {
                    outcome.op = Some(*op);
                    continue;
                }
                JournalRecord::Done { .. } => {
                    outcome.completed = true;
                    continue;
                }
                JournalRecord::Disable { name } | JournalRecord::Restore { name } => name,
            };

            match self.state_of(name) {
                PackageState::Disabled => {
                    if !manifest.is_tracked(name) {
                        manifest.track(name);
                        outcome.adopted.push(name.clone());
                    }
                }
                PackageState::Enabled if !disabled_path(&self.addon_dir, name).exists() => {
                    if manifest.is_tracked(name) {
                        manifest.untrack(name);
                        outcome.released.push(name.clone());
                    }
                }
                _ => {}
            }
        }

        if had_manifest || !manifest.is_empty() {
            manifest.save(&self.manifest_path)?;
        }
        remove_if_exists(&self.journal_path)?;

        if outcome.op == Some(JournalOp::Restore) && !outcome.completed {
            info!("Rolling interrupted restore forward");
            outcome.rolled_forward = Some(self.restore_all()?);
        }

        info!(
            "Recovery: {} adopted, {} released",
            outcome.adopted.len(),
            outcome.released.len()
        );
        Ok(Some(outcome))
    }

    /// Drop tracked entries whose disabled file is gone
    fn prune_vanished(&self, manifest: &mut ActivationManifest, report: &mut ActivationReport) {
        let addon_dir = &self.addon_dir;
        manifest.renamed.retain(|entry| {
            let present = disabled_path(addon_dir, &entry.from).exists();
            if !present {
                debug!("Dropping {}: disabled file is gone", entry.from);
                report.dropped.push(entry.from.clone());
            }
            present
        });
    }

    fn disable_one(
        &self,
        name: &str,
        journal: &mut RenameJournal,
        manifest: &mut ActivationManifest,
        report: &mut ActivationReport,
    ) -> Result<()> {
        journal.write(&JournalRecord::Disable {
            name: name.to_string(),
        })?;

        let from = enabled_path(&self.addon_dir, name);
        let to = disabled_path(&self.addon_dir, name);
        match rename_if_free(&from, &to) {
            RenameOutcome::Renamed => {
                debug!("Disabled {}", name);
                manifest.track(name);
                report.disabled.push(name.to_string());
            }
            RenameOutcome::Collision => {
                warn!("Not disabling {}: disabled file already exists", name);
                report.skipped.push(name.to_string());
            }
            RenameOutcome::Vanished => {
                debug!("Not disabling {}: file is gone", name);
            }
            RenameOutcome::Failed(e) => {
                warn!("Failed to disable {}: {}", name, e);
                report.failures.push(RenameFailure {
                    name: name.to_string(),
                    action: RenameAction::Disable,
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    fn restore_one(
        &self,
        name: &str,
        journal: &mut RenameJournal,
        manifest: &mut ActivationManifest,
        report: &mut ActivationReport,
    ) -> Result<()> {
        journal.write(&JournalRecord::Restore {
            name: name.to_string(),
        })?;

        let from = disabled_path(&self.addon_dir, name);
        let to = enabled_path(&self.addon_dir, name);
        match rename_if_free(&from, &to) {
            RenameOutcome::Renamed => {
                debug!("Restored {}", name);
                manifest.untrack(name);
                report.restored.push(name.to_string());
            }
            RenameOutcome::Collision => {
                warn!("Not restoring {}: canonical file already exists", name);
                report.skipped.push(name.to_string());
            }
            RenameOutcome::Vanished => {
                manifest.untrack(name);
                report.dropped.push(name.to_string());
            }
            RenameOutcome::Failed(e) => {
                warn!("Failed to restore {}: {}", name, e);
                report.failures.push(RenameFailure {
                    name: name.to_string(),
                    action: RenameAction::Restore,
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Persist the manifest, then close the journal
    fn commit(
        &self,
        journal: RenameJournal,
        manifest: &mut ActivationManifest,
        report: &ActivationReport,
    ) -> Result<()> {
        manifest.save(&self.manifest_path)?;
        let (disabled, restored) = report.counts();
        journal.finish(disabled, restored)
    }
}

/// Rename only when the destination is free and the source exists
fn rename_if_free(from: &Path, to: &Path) -> RenameOutcome {
    if to.exists() {
        return RenameOutcome::Collision;
    }
    if !from.exists() {
        return RenameOutcome::Vanished;
    }
    match fs::rename(from, to) {
        Ok(()) => RenameOutcome::Renamed,
        Err(e) if e.kind() == io::ErrorKind::NotFound => RenameOutcome::Vanished,
        Err(e) => RenameOutcome::Failed(e),
    }
}

/// Keep only entries whose rename failed; collisions are not retried
fn retain_failed(manifest: &mut ActivationManifest, report: &ActivationReport) {
    manifest
        .renamed
        .retain(|entry| report.failures.iter().any(|f| f.name == entry.from));
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
