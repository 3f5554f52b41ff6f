// src/packages/scanner.rs

//! Package archive scanner
//!
//! Opens a `.var` archive once and derives everything the resolver and the
//! scene list need: declared dependencies and the scenes bundled under
//! `Saves/scene/`, each with its scene document and preview image paths.
//! Reading is stateless and never writes to the archive.

use crate::cache::signature::ContentSignature;
use crate::error::{Error, Result};
use crate::packages::meta::{META_FILENAME, MetaDocument};
use crate::packages::name::{DISABLED_SUFFIX, disabled_filename};
use crate::packages::traits::{PackageRecord, SceneRef};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

/// Directory prefix (lowercase) holding scene documents
const SCENE_DIR: &str = "saves/scene/";

/// Scene document suffix
const SCENE_SUFFIX: &str = ".json";

/// Sidecar suffix marking a scene hidden
const HIDE_SUFFIX: &str = ".hide";

/// Scene name reserved by the host for its default scene
const DEFAULT_SCENE: &str = "default";

/// Preview image suffixes, in order of preference
const PREVIEW_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg"];

type Archive = ZipArchive<BufReader<File>>;

/// How much to read per archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Inner paths only; previews are fetched lazily with [`Scanner::read_entry`]
    #[default]
    Fast,
    /// Also read preview bytes during the same archive open
    Full,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    pub mode: ScanMode,
    /// Report scenes hidden by a `.hide` sidecar
    pub include_hidden: bool,
}

/// Package archive scanner
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    options: ScanOptions,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Scan an archive, degrading to an empty record on any failure
    ///
    /// A corrupt archive or malformed manifest yields a record with no
    /// dependencies and no scenes rather than an error.
    pub fn scan(&self, archive_path: &Path) -> PackageRecord {
        match self.try_scan(archive_path) {
            Ok(record) => record,
            Err(e) => {
                debug!("Treating {} as empty: {}", archive_path.display(), e);
                let path = resolve_archive_path(archive_path);
                PackageRecord::empty(canonical_name(archive_path), ContentSignature::of(&path))
            }
        }
    }

    /// Scan an archive, reporting why it could not be read
    pub fn try_scan(&self, archive_path: &Path) -> Result<PackageRecord> {
        let path = resolve_archive_path(archive_path);
        let name = canonical_name(archive_path);
        let signature = ContentSignature::of(&path);

        debug!("Scanning package: {}", path.display());

        let mut archive = open_archive(&path)?;
        let entries = EntryIndex::new(&archive);

        let raw_meta = read_named(&mut archive, &entries, META_FILENAME)
            .ok_or_else(|| Error::InvalidPackage(format!("{}: no {}", name, META_FILENAME)))?;
        let meta = MetaDocument::from_bytes(&raw_meta)
            .ok_or_else(|| Error::InvalidPackage(format!("{}: malformed {}", name, META_FILENAME)))?;

        let paths = merge_paths(&meta.content_list, entries.names());
        let mut scenes = Vec::new();

        for scene_name in scene_names(&paths, self.options.include_hidden) {
            let mut scene = SceneRef::packaged(scene_name, &name);
            scene.scene_path = scene_document_path(&paths, &scene.scene_name);
            scene.preview_path = scene
                .scene_path
                .as_deref()
                .and_then(|doc| preview_path_for(&paths, doc));

            if self.options.mode == ScanMode::Full {
                scene.preview_bytes = scene
                    .preview_path
                    .as_deref()
                    .and_then(|inner| read_named(&mut archive, &entries, inner));
            }

            scenes.push(scene);
        }

        debug!(
            "Scanned {}: {} dependencies, {} scenes",
            name,
            meta.dependencies.len(),
            scenes.len()
        );

        Ok(PackageRecord {
            name,
            signature,
            dependencies: meta.dependencies,
            scenes,
            creator: meta.creator,
            package_name: meta.package_name,
        })
    }

    /// Read one inner file on demand
    pub fn read_entry(archive_path: &Path, inner_path: &str) -> Option<Vec<u8>> {
        if inner_path.is_empty() {
            return None;
        }
        let path = resolve_archive_path(archive_path);
        let mut archive = open_archive(&path).ok()?;
        let entries = EntryIndex::new(&archive);
        read_named(&mut archive, &entries, inner_path)
    }

    /// True if the scene only features female looks
    ///
    /// A scene document counts when it references `/female` and never
    /// `/male`. Any read failure counts as false.
    pub fn detect_looks(archive_path: &Path, scene_name: &str) -> bool {
        let wanted = format!("{}{}", scene_name.to_lowercase(), SCENE_SUFFIX);
        let path = resolve_archive_path(archive_path);

        let Ok(mut archive) = open_archive(&path) else {
            return false;
        };
        let entries = EntryIndex::new(&archive);

        let target = entries.names().iter().find(|entry| {
            let lower = entry.to_lowercase();
            lower.contains(SCENE_DIR) && file_name(&lower) == wanted
        });

        let Some(target) = target.cloned() else {
            return false;
        };

        match read_named(&mut archive, &entries, &target) {
            Some(raw) => {
                let text = String::from_utf8_lossy(&raw).to_lowercase();
                text.contains("/female") && !text.contains("/male")
            }
            None => false,
        }
    }
}

/// Canonical `.var` filename for a path that may point at the disabled form
fn canonical_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.strip_suffix(DISABLED_SUFFIX) {
        Some(canonical) => canonical.to_string(),
        None => file_name,
    }
}

/// Path of the archive as it exists on disk: canonical first, then disabled
pub fn resolve_archive_path(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }

    let alt = path
        .file_name()
        .map(|n| path.with_file_name(disabled_filename(&n.to_string_lossy())));
    match alt {
        Some(alt) if alt.exists() => alt,
        _ => path.to_path_buf(),
    }
}

fn open_archive(path: &Path) -> Result<Archive> {
    let file = File::open(path)?;
    Ok(ZipArchive::new(BufReader::new(file))?)
}

/// Archive entry names, with a normalized index for tolerant lookups
struct EntryIndex {
    names: Vec<String>,
    by_normalized: HashMap<String, String>,
}

impl EntryIndex {
    fn new(archive: &Archive) -> Self {
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        let by_normalized = names
            .iter()
            .map(|n| (normalize(n).to_lowercase(), n.clone()))
            .collect();
        Self {
            names,
            by_normalized,
        }
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    /// Actual entry name for a listed path (slashes and case may differ)
    fn resolve(&self, inner_path: &str) -> Option<&str> {
        self.by_normalized
            .get(&normalize(inner_path).to_lowercase())
            .map(String::as_str)
    }
}

fn read_named(archive: &mut Archive, entries: &EntryIndex, inner_path: &str) -> Option<Vec<u8>> {
    let actual = entries.resolve(inner_path)?;
    let mut file = archive.by_name(actual).ok()?;
    let mut content = Vec::new();
    file.read_to_end(&mut content).ok()?;
    Some(content)
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Content listing first, then any archive entries it missed
fn merge_paths(content_list: &[String], entry_names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    content_list
        .iter()
        .chain(entry_names)
        .map(|p| normalize(p))
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// File name without its last extension
fn stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

fn is_scene_entry(lower: &str) -> bool {
    lower.starts_with(SCENE_DIR)
}

/// Lowercased stems of scenes hidden by a `.hide` sidecar
fn hidden_scene_stems(paths: &[String]) -> HashSet<String> {
    paths
        .iter()
        .map(|p| p.to_lowercase())
        .filter(|lp| is_scene_entry(lp))
        .filter_map(|lp| lp.strip_suffix(HIDE_SUFFIX).map(|s| stem(s).to_string()))
        .collect()
}

/// Names of the scenes bundled in the archive, sorted case-insensitively
fn scene_names(paths: &[String], include_hidden: bool) -> Vec<String> {
    let hidden = if include_hidden {
        HashSet::new()
    } else {
        hidden_scene_stems(paths)
    };

    let mut seen = HashSet::new();
    let mut names: Vec<String> = paths
        .iter()
        .filter(|p| {
            let lp = p.to_lowercase();
            is_scene_entry(&lp) && lp.ends_with(SCENE_SUFFIX)
        })
        .map(|p| stem(p).to_string())
        .filter(|name| {
            let lower = name.to_lowercase();
            lower != DEFAULT_SCENE && !hidden.contains(&lower) && seen.insert(lower)
        })
        .collect();

    names.sort_by_key(|name| name.to_lowercase());
    names
}

/// Inner path of the scene document named `scene_name`
fn scene_document_path(paths: &[String], scene_name: &str) -> Option<String> {
    paths
        .iter()
        .find(|p| {
            let lp = p.to_lowercase();
            is_scene_entry(&lp)
                && lp.ends_with(SCENE_SUFFIX)
                && stem(p).eq_ignore_ascii_case(scene_name)
        })
        .cloned()
}

/// Sibling preview image of a scene document: same directory, same stem
fn preview_path_for(paths: &[String], scene_doc: &str) -> Option<String> {
    let dir = parent_dir(scene_doc).to_lowercase();
    let wanted_stem = stem(scene_doc).to_lowercase();

    PREVIEW_SUFFIXES.iter().find_map(|suffix| {
        paths
            .iter()
            .find(|p| {
                let lp = p.to_lowercase();
                lp.ends_with(suffix) && parent_dir(&lp) == dir && stem(&lp) == wanted_stem
            })
            .cloned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn write_archive(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_scan_dependencies_and_scenes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.Scene.1.var");
        write_archive(
            &path,
            &[
                ("meta.json", br#"{"creator": "A", "dependencies": {"B.Hair.latest": {}}}"#),
                ("Saves/scene/Club.json", b"{}"),
                ("Saves/scene/Club.jpg", b"jpg"),
                ("Saves/scene/Club.png", b"png"),
                ("Saves/scene/default.json", b"{}"),
                ("Saves/scene/Secret.json", b"{}"),
                ("Saves/scene/Secret.json.hide", b""),
                ("Custom/Atom/thing.vap", b"{}"),
            ],
        );

        let record = Scanner::default().scan(&path);
        assert_eq!(record.name, "A.Scene.1.var");
        assert_eq!(record.dependencies, vec!["B.Hair.latest"]);
        assert_eq!(record.creator.as_deref(), Some("A"));
        assert_eq!(record.scenes.len(), 1);

        let scene = &record.scenes[0];
        assert_eq!(scene.scene_name, "Club");
        assert_eq!(scene.package(), Some("A.Scene.1.var"));
        assert_eq!(scene.scene_path.as_deref(), Some("Saves/scene/Club.json"));
        assert_eq!(scene.preview_path.as_deref(), Some("Saves/scene/Club.png"));
        assert!(scene.preview_bytes.is_none());
    }

    #[test]
    fn test_include_hidden() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.Scene.1.var");
        write_archive(
            &path,
            &[
                ("meta.json", b"{}"),
                ("Saves/scene/Secret.json", b"{}"),
                ("Saves/scene/Secret.json.hide", b""),
            ],
        );

        let scanner = Scanner::new(ScanOptions {
            include_hidden: true,
            ..Default::default()
        });
        let record = scanner.scan(&path);
        assert_eq!(record.scenes.len(), 1);
        assert_eq!(record.scenes[0].scene_name, "Secret");
    }

    #[test]
    fn test_full_mode_reads_preview_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.Scene.1.var");
        write_archive(
            &path,
            &[
                ("meta.json", br#"{"contentList": ["Saves\\scene\\sub\\Beach.json", "Saves\\scene\\sub\\Beach.jpg"]}"#),
                ("Saves/scene/sub/Beach.json", b"{}"),
                ("Saves/scene/sub/Beach.jpg", b"jpeg-bytes"),
                ("Saves/scene/Beach.png", b"wrong-dir"),
            ],
        );

        let scanner = Scanner::new(ScanOptions {
            mode: ScanMode::Full,
            include_hidden: false,
        });
        let record = scanner.scan(&path);
        assert_eq!(record.scenes.len(), 1);
        let scene = &record.scenes[0];
        assert_eq!(scene.preview_path.as_deref(), Some("Saves/scene/sub/Beach.jpg"));
        assert_eq!(scene.preview_bytes.as_deref(), Some(&b"jpeg-bytes"[..]));
    }

    #[test]
    fn test_corrupt_archive_yields_empty_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Broken.Pack.1.var");
        fs::write(&path, b"definitely not a zip").unwrap();

        let scanner = Scanner::default();
        assert!(scanner.try_scan(&path).is_err());

        let record = scanner.scan(&path);
        assert_eq!(record.name, "Broken.Pack.1.var");
        assert!(record.dependencies.is_empty());
        assert!(record.scenes.is_empty());
        assert_eq!(record.signature.size, 20);
    }

    #[test]
    fn test_missing_or_malformed_meta_yields_empty_record() {
        let dir = TempDir::new().unwrap();
        let no_meta = dir.path().join("A.NoMeta.1.var");
        write_archive(&no_meta, &[("Saves/scene/Club.json", b"{}")]);
        let bad_meta = dir.path().join("A.BadMeta.1.var");
        write_archive(&bad_meta, &[("meta.json", b"{oops"), ("Saves/scene/Club.json", b"{}")]);

        let scanner = Scanner::default();
        for path in [no_meta, bad_meta] {
            assert!(matches!(scanner.try_scan(&path), Err(Error::InvalidPackage(_))));
            let record = scanner.scan(&path);
            assert!(record.dependencies.is_empty());
            assert!(record.scenes.is_empty());
        }
    }

    #[test]
    fn test_scan_falls_back_to_disabled_file() {
        let dir = TempDir::new().unwrap();
        let disabled = dir.path().join("A.Pack.1.var.disabled");
        write_archive(&disabled, &[("meta.json", br#"{"dependencies": ["B.Dep.1"]}"#)]);

        let record = Scanner::default().scan(&dir.path().join("A.Pack.1.var"));
        assert_eq!(record.name, "A.Pack.1.var");
        assert_eq!(record.dependencies, vec!["B.Dep.1"]);
    }

    #[test]
    fn test_read_entry_and_detect_looks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.Looks.1.var");
        write_archive(
            &path,
            &[
                ("meta.json", b"{}"),
                ("Saves/scene/Her.json", br#"{"atoms": [{"id": "Person/Female/x"}]}"#),
                ("Saves/scene/Them.json", br#"{"a": "/female", "b": "/male"}"#),
            ],
        );

        assert_eq!(Scanner::read_entry(&path, "meta.json").as_deref(), Some(&b"{}"[..]));
        assert!(Scanner::read_entry(&path, "missing.json").is_none());
        assert!(Scanner::read_entry(&path, "").is_none());

        assert!(Scanner::detect_looks(&path, "Her"));
        assert!(!Scanner::detect_looks(&path, "Them"));
        assert!(!Scanner::detect_looks(&path, "Nobody"));
    }

    #[test]
    fn test_scene_name_helpers() {
        let paths: Vec<String> = [
            "Saves/scene/b.json",
            "Saves/scene/A.json",
            "saves/scene/a.json",
            "Saves/scene/Default.json",
            "Saves/scene/notes.txt",
            "Other/scene.json",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(scene_names(&paths, false), vec!["A", "b"]);
        assert_eq!(stem("Saves/scene/x.y.json"), "x.y");
        assert_eq!(parent_dir("Saves/scene/x.json"), "Saves/scene");
    }
}
