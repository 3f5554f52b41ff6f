// src/cache/loose.rs

//! Loose scene discovery
//!
//! Scene documents saved directly under `Saves/scene/` rather than shipped in
//! a package. They seed nothing but are listed alongside packaged scenes.

use super::signature::{ContentSignature, Signatures};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

const SCENE_SUFFIX: &str = ".json";
const HIDE_SUFFIX: &str = ".hide";

/// Whether a relative scene path counts as a user scene
///
/// The host's own `default.json` and autosaves with purely numeric names are
/// skipped.
pub fn is_countable_scene(relative_path: &str) -> bool {
    let relative_path = relative_path.trim();
    if relative_path.is_empty() {
        return false;
    }

    let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
    if file_name.eq_ignore_ascii_case("default.json") {
        return false;
    }

    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    !(!stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()))
}

/// Fingerprint every loose scene document below `saves_scene_dir`
///
/// Keys are forward-slash paths relative to `saves_scene_dir`. A missing
/// directory yields no scenes.
pub fn discover_loose_scenes(saves_scene_dir: &Path, include_hidden: bool) -> Signatures {
    let mut found = Signatures::new();
    if !saves_scene_dir.is_dir() {
        return found;
    }

    for entry in WalkDir::new(saves_scene_dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable scene path: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let is_scene = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase().ends_with(SCENE_SUFFIX))
            .unwrap_or(false);
        if !is_scene {
            continue;
        }

        if !include_hidden {
            let mut sidecar = path.as_os_str().to_owned();
            sidecar.push(HIDE_SUFFIX);
            if Path::new(&sidecar).exists() {
                continue;
            }
        }

        let Ok(relative) = path.strip_prefix(saves_scene_dir) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if !is_countable_scene(&relative) {
            continue;
        }

        found.insert(relative, ContentSignature::of(path));
    }

    debug!(
        "Found {} loose scenes in {}",
        found.len(),
        saves_scene_dir.display()
    );
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_is_countable_scene() {
        assert!(is_countable_scene("MyScene.json"));
        assert!(is_countable_scene("sub/Scene 2.json"));
        assert!(!is_countable_scene("default.json"));
        assert!(!is_countable_scene("sub/Default.json"));
        assert!(!is_countable_scene("1699999999.json"));
        assert!(!is_countable_scene(""));
    }

    #[test]
    fn test_discover_loose_scenes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("Club.json"), b"{}").unwrap();
        fs::write(root.join("sub/Beach.json"), b"{}").unwrap();
        fs::write(root.join("Secret.json"), b"{}").unwrap();
        fs::write(root.join("Secret.json.hide"), b"").unwrap();
        fs::write(root.join("default.json"), b"{}").unwrap();
        fs::write(root.join("12345.json"), b"{}").unwrap();
        fs::write(root.join("Club.jpg"), b"img").unwrap();

        let found = discover_loose_scenes(root, false);
        let keys: Vec<&str> = found.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Club.json", "sub/Beach.json"]);
        assert_eq!(found["Club.json"].size, 2);

        let with_hidden = discover_loose_scenes(root, true);
        assert!(with_hidden.contains_key("Secret.json"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(discover_loose_scenes(&dir.path().join("nope"), false).is_empty());
    }
}
