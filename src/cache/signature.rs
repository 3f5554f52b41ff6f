// src/cache/signature.rs

//! Cheap content fingerprints
//!
//! A signature is file size plus whole-second modification time. It is not a
//! content hash: directories hold tens of thousands of archives and a stat
//! per file is all a change check can afford.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Size + modification-time fingerprint of a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentSignature {
    pub size: u64,
    /// Seconds since the Unix epoch
    pub modified: i64,
}

impl ContentSignature {
    /// Fingerprint a file; unreadable files get the zero signature
    pub fn of(path: &Path) -> Self {
        let Ok(metadata) = fs::metadata(path) else {
            return Self::default();
        };

        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Self {
            size: metadata.len(),
            modified,
        }
    }
}

impl fmt::Display for ContentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.size, self.modified)
    }
}

/// Name-keyed signatures of one population (packages or loose scenes)
pub type Signatures = BTreeMap<String, ContentSignature>;

/// True if the two populations differ in membership or in any signature
pub fn signatures_differ(cached: &Signatures, current: &Signatures) -> bool {
    cached != current
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_signature_tracks_size_and_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.Pack.1.var");
        fs::write(&path, b"12345").unwrap();

        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();

        let sig = ContentSignature::of(&path);
        assert_eq!(sig.size, 5);
        assert_eq!(sig.modified, 1_700_000_000);
        assert_eq!(sig.to_string(), "5:1700000000");
    }

    #[test]
    fn test_missing_file_has_zero_signature() {
        let dir = TempDir::new().unwrap();
        let sig = ContentSignature::of(&dir.path().join("nope.var"));
        assert_eq!(sig, ContentSignature::default());
    }

    #[test]
    fn test_signatures_differ() {
        let mut cached = Signatures::new();
        cached.insert("A.var".to_string(), ContentSignature { size: 1, modified: 1 });

        let mut current = cached.clone();
        assert!(!signatures_differ(&cached, &current));

        current.insert("B.var".to_string(), ContentSignature { size: 1, modified: 1 });
        assert!(signatures_differ(&cached, &current));

        current.remove("B.var");
        current.insert("A.var".to_string(), ContentSignature { size: 2, modified: 1 });
        assert!(signatures_differ(&cached, &current));
    }
}
