// src/packages/traits.rs

//! Package metadata records and the lookup seam used by the resolver

use crate::cache::signature::ContentSignature;
use serde::{Deserialize, Serialize};

/// Who owns a scene
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SceneOwner {
    /// Bundled inside a package archive
    Package { name: String },
    /// A scene document on disk outside any package
    Loose,
}

/// A user-facing scene discovered in a package or on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRef {
    pub scene_name: String,
    pub owner: SceneOwner,
    /// Inner archive path of the preview image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<String>,
    /// Inner archive path of the scene document, or the relative path of a loose scene
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_path: Option<String>,
    /// Relative path of the stored preview in the preview cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_file: Option<String>,
    /// Preview bytes read eagerly in full scan mode
    #[serde(skip)]
    pub preview_bytes: Option<Vec<u8>>,
}

impl SceneRef {
    /// Scene bundled in a package
    pub fn packaged(scene_name: String, package: &str) -> Self {
        Self {
            scene_name,
            owner: SceneOwner::Package {
                name: package.to_string(),
            },
            preview_path: None,
            scene_path: None,
            preview_file: None,
            preview_bytes: None,
        }
    }

    /// Scene document found outside any package
    pub fn loose(scene_name: String, relative_path: String) -> Self {
        Self {
            scene_name,
            owner: SceneOwner::Loose,
            preview_path: None,
            scene_path: Some(relative_path),
            preview_file: None,
            preview_bytes: None,
        }
    }

    /// Owning package name, `None` for loose scenes
    pub fn package(&self) -> Option<&str> {
        match &self.owner {
            SceneOwner::Package { name } => Some(name),
            SceneOwner::Loose => None,
        }
    }
}

/// Normalized metadata of one package archive
///
/// Immutable once built: a changed signature produces a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Canonical filename (`*.var`)
    pub name: String,
    pub signature: ContentSignature,
    /// Dependency tokens in declaration order
    pub dependencies: Vec<String>,
    pub scenes: Vec<SceneRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
}

impl PackageRecord {
    /// Record with no dependencies and no scenes
    ///
    /// Used for unreadable archives: a package that declares nothing pulls
    /// nothing in, and is kept only if something else requires it.
    pub fn empty(name: String, signature: ContentSignature) -> Self {
        Self {
            name,
            signature,
            dependencies: Vec::new(),
            scenes: Vec::new(),
            creator: None,
            package_name: None,
        }
    }

    pub fn has_scenes(&self) -> bool {
        !self.scenes.is_empty()
    }
}

/// Source of declared dependencies for the resolver
pub trait MetadataLookup {
    /// Dependency tokens declared by `package`; empty when unknown
    fn dependencies(&mut self, package: &str) -> Vec<String>;
}

impl<F> MetadataLookup for F
where
    F: FnMut(&str) -> Vec<String>,
{
    fn dependencies(&mut self, package: &str) -> Vec<String> {
        self(package)
    }
}
