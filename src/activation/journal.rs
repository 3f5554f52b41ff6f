// src/activation/journal.rs

//! Append-only rename journal for crash recovery
//!
//! Every state-changing pass records its intent before touching the
//! directory. If the process dies mid-pass the journal survives and the next
//! session folds what actually happened on disk back into the manifest.
//!
//! Format: `{crc32_hex}|{json}\n`, one record per line. `Begin` and `Done`
//! are fsync barriers.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Kind of pass a journal describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalOp {
    Disable,
    Reconcile,
    Restore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JournalRecord {
    /// Pass started
    Begin {
        op: JournalOp,
        addon_dir: PathBuf,
        timestamp: DateTime<Utc>,
    },
    /// About to rename `name` to its disabled form
    Disable { name: String },
    /// About to rename `name` back to its canonical form
    Restore { name: String },
    /// Pass complete and manifest persisted
    Done { disabled: usize, restored: usize },
}

impl JournalRecord {
    pub fn is_barrier(&self) -> bool {
        matches!(self, Self::Begin { .. } | Self::Done { .. })
    }
}

/// Open journal for one pass
pub struct RenameJournal {
    path: PathBuf,
    file: File,
}

impl RenameJournal {
    /// Start a journal, replacing any leftover file, and write `Begin`
    pub fn begin(path: &Path, op: JournalOp, addon_dir: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut journal = Self {
            path: path.to_path_buf(),
            file,
        };
        journal.write_barrier(&JournalRecord::Begin {
            op,
            addon_dir: addon_dir.to_path_buf(),
            timestamp: Utc::now(),
        })?;
        Ok(journal)
    }

    /// Write a record (no fsync)
    pub fn write(&mut self, record: &JournalRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let crc = crc32fast::hash(json.as_bytes());
        writeln!(self.file, "{:08x}|{}", crc, json)?;
        self.file.flush()?;
        Ok(())
    }

    /// Write a record and fsync
    pub fn write_barrier(&mut self, record: &JournalRecord) -> Result<()> {
        self.write(record)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Write `Done` and delete the journal
    pub fn finish(mut self, disabled: usize, restored: usize) -> Result<()> {
        self.write_barrier(&JournalRecord::Done { disabled, restored })?;
        drop(self.file);
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

/// Read the records of a leftover journal; `Ok(None)` if there is none
///
/// Reading stops at the first record whose checksum does not match, which
/// is where a torn write would be.
pub fn read_journal(path: &Path) -> Result<Option<Vec<JournalRecord>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let Some((crc_hex, json)) = line.split_once('|') else {
            warn!("Malformed journal line {}: missing delimiter", line_num + 1);
            break;
        };

        let expected = u32::from_str_radix(crc_hex, 16).map_err(|_| {
            Error::JournalError(format!("invalid checksum at line {}", line_num + 1))
        })?;
        let actual = crc32fast::hash(json.as_bytes());
        if expected != actual {
            warn!(
                "CRC mismatch at line {}: expected {:08x}, got {:08x}",
                line_num + 1,
                expected,
                actual
            );
            break;
        }

        let record = serde_json::from_str(json).map_err(|e| {
            Error::JournalError(format!("bad record at line {}: {}", line_num + 1, e))
        })?;
        records.push(record);
    }

    Ok(Some(records))
}
