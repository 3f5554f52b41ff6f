// src/cache/previews.rs

//! On-disk store for scene preview images pulled out of archives

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const PREVIEW_DIR: &str = "previews";

/// Preview images keyed by package and scene
#[derive(Debug, Clone)]
pub struct PreviewStore {
    root: PathBuf,
}

impl PreviewStore {
    /// Store rooted at the cache directory; images land in `<root>/previews/`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Relative path an image for this scene is stored at
    pub fn relative_path(package: &str, scene: &str) -> String {
        let digest = Sha256::digest(format!("{}::{}", package, scene).as_bytes());
        format!("{}/{:x}.bin", PREVIEW_DIR, digest)
    }

    /// Store image bytes, returning the relative path; empty images are not stored
    pub fn write(&self, package: &str, scene: &str, bytes: &[u8]) -> Result<Option<String>> {
        if bytes.is_empty() {
            return Ok(None);
        }

        let relative = Self::relative_path(package, scene);
        let path = self.root.join(&relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;

        debug!("Stored preview for {}::{} ({} bytes)", package, scene, bytes.len());
        Ok(Some(relative))
    }

    /// Read a stored image back; `None` if it is gone
    pub fn read(&self, relative: &str) -> Option<Vec<u8>> {
        if relative.is_empty() {
            return None;
        }
        fs::read(self.root.join(relative)).ok()
    }
}
