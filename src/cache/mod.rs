// src/cache/mod.rs

//! Incremental scan cache
//!
//! Maps each package to the record scanned from it, keyed by a cheap content
//! signature so unchanged archives are never reopened. A refresh never edits
//! the cache in place: it builds a complete replacement that the caller then
//! saves with an atomic file replace.

pub mod loose;
pub mod previews;
pub mod signature;

pub use previews::PreviewStore;
pub use signature::{ContentSignature, Signatures};

use crate::error::Result;
use crate::packages::directory::list_packages;
use crate::packages::name::choose_latest;
use crate::packages::scanner::{Scanner, resolve_archive_path};
use crate::packages::traits::{MetadataLookup, PackageRecord, SceneRef};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Bumped whenever the persisted layout changes; older caches are discarded
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Cache file name inside the cache directory
pub const CACHE_FILENAME: &str = "scene_cache.json";

/// Signatures describing one directory state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureSet {
    pub addon_dir: PathBuf,
    /// Latest variant of each package base
    pub packages: Signatures,
    /// Loose scene documents by relative path
    pub loose: Signatures,
}

/// True when the cached state no longer describes the directory
///
/// Any change of directory, package membership, package signature, loose
/// scene membership or loose scene signature requires a rescan.
pub fn needs_rescan(cached: &SignatureSet, current: &SignatureSet) -> bool {
    if cached.addon_dir != current.addon_dir {
        debug!("Rescan needed: package directory changed");
        return true;
    }
    if signature::signatures_differ(&cached.packages, &current.packages) {
        debug!("Rescan needed: package set or signatures changed");
        return true;
    }
    if signature::signatures_differ(&cached.loose, &current.loose) {
        debug!("Rescan needed: loose scenes changed");
        return true;
    }
    false
}

/// Fingerprints of the directory as it is now
#[derive(Debug, Clone)]
pub struct DirectorySnapshot {
    pub signatures: SignatureSet,
    pub saves_scene_dir: Option<PathBuf>,
}

impl DirectorySnapshot {
    /// Fingerprint the latest variant of every package (enabled or disabled)
    /// and every loose scene
    pub fn capture(
        addon_dir: &Path,
        saves_scene_dir: Option<&Path>,
        include_hidden: bool,
    ) -> Result<Self> {
        let entries = list_packages(addon_dir)?;
        let latest = choose_latest(entries.iter().map(|e| e.name.as_str()));

        let packages: Signatures = latest
            .into_iter()
            .map(|name| {
                let path = resolve_archive_path(&addon_dir.join(&name));
                (name, ContentSignature::of(&path))
            })
            .collect();

        let loose = saves_scene_dir
            .map(|dir| loose::discover_loose_scenes(dir, include_hidden))
            .unwrap_or_default();

        Ok(Self {
            signatures: SignatureSet {
                addon_dir: addon_dir.to_path_buf(),
                packages,
                loose,
            },
            saves_scene_dir: saves_scene_dir.map(Path::to_path_buf),
        })
    }

    pub fn addon_dir(&self) -> &Path {
        &self.signatures.addon_dir
    }
}

/// A loose scene and the signature it was recorded under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLoose {
    pub signature: ContentSignature,
    pub scene: SceneRef,
}

/// Counts from one refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub reused: usize,
    pub scanned: usize,
    pub loose: usize,
}

/// Persisted scan results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCache {
    pub version: u32,
    pub addon_dir: PathBuf,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageRecord>,
    #[serde(default)]
    pub loose: BTreeMap<String, CachedLoose>,
    /// "looks only" flags by `package::scene`
    #[serde(default)]
    pub looks: BTreeMap<String, bool>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl ScanCache {
    /// Empty cache for a package directory
    pub fn new(addon_dir: impl Into<PathBuf>) -> Self {
        Self {
            version: CACHE_SCHEMA_VERSION,
            addon_dir: addon_dir.into(),
            packages: BTreeMap::new(),
            loose: BTreeMap::new(),
            looks: BTreeMap::new(),
            saved_at: None,
        }
    }

    /// Load a cache file
    ///
    /// Returns `None` when the file is missing, unreadable, or written by a
    /// different schema version; the caller then does a full scan.
    pub fn load(path: &Path) -> Option<Self> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No usable cache at {}: {}", path.display(), e);
                return None;
            }
        };

        let cache: Self = match serde_json::from_slice(&raw) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Ignoring unreadable cache {}: {}", path.display(), e);
                return None;
            }
        };

        if cache.version != CACHE_SCHEMA_VERSION {
            info!(
                "Cache schema {} != {}, rescanning",
                cache.version, CACHE_SCHEMA_VERSION
            );
            return None;
        }

        Some(cache)
    }

    /// Write the cache with an atomic replace
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        debug!("Saved cache to {}", path.display());
        Ok(())
    }

    /// Signatures the cache was built from
    pub fn signature_set(&self) -> SignatureSet {
        SignatureSet {
            addon_dir: self.addon_dir.clone(),
            packages: self
                .packages
                .iter()
                .map(|(name, record)| (name.clone(), record.signature))
                .collect(),
            loose: self
                .loose
                .iter()
                .map(|(path, cached)| (path.clone(), cached.signature))
                .collect(),
        }
    }

    /// True if the cache still describes the snapshot
    pub fn is_current(&self, snapshot: &DirectorySnapshot) -> bool {
        !needs_rescan(&self.signature_set(), &snapshot.signatures)
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.packages.get(name)
    }

    /// Build the cache for a snapshot, reusing every record whose signature
    /// still matches
    ///
    /// Changed and new archives are scanned on a pool of at most
    /// `max_threads` workers. With a preview store, eagerly read preview
    /// images are written out and referenced from their scenes.
    pub fn refresh(
        &self,
        snapshot: &DirectorySnapshot,
        scanner: &Scanner,
        previews: Option<&PreviewStore>,
        max_threads: usize,
    ) -> (ScanCache, RefreshStats) {
        let same_dir = self.addon_dir == snapshot.addon_dir();
        let mut stats = RefreshStats::default();
        let mut packages = BTreeMap::new();
        let mut pending = Vec::new();

        for (name, signature) in &snapshot.signatures.packages {
            match self.packages.get(name) {
                Some(record) if same_dir && record.signature == *signature => {
                    packages.insert(name.clone(), record.clone());
                    stats.reused += 1;
                }
                _ => pending.push(name.clone()),
            }
        }

        let addon_dir = snapshot.addon_dir();
        let scan_one = |name: &String| {
            let mut record = scanner.scan(&addon_dir.join(name));
            if let Some(store) = previews {
                store_previews(store, &mut record);
            }
            record
        };

        let scanned: Vec<PackageRecord> = match build_pool(max_threads) {
            Some(pool) => pool.install(|| pending.par_iter().map(scan_one).collect()),
            None => pending.iter().map(scan_one).collect(),
        };
        stats.scanned = scanned.len();
        for record in scanned {
            packages.insert(record.name.clone(), record);
        }

        let mut loose = BTreeMap::new();
        for (path, signature) in &snapshot.signatures.loose {
            let cached = match self.loose.get(path) {
                Some(cached) if same_dir && cached.signature == *signature => cached.clone(),
                _ => CachedLoose {
                    signature: *signature,
                    scene: SceneRef::loose(path.clone(), path.clone()),
                },
            };
            loose.insert(path.clone(), cached);
        }
        stats.loose = loose.len();

        info!(
            "Cache refresh: {} reused, {} scanned, {} loose scenes",
            stats.reused, stats.scanned, stats.loose
        );

        let cache = ScanCache {
            version: CACHE_SCHEMA_VERSION,
            addon_dir: addon_dir.to_path_buf(),
            packages,
            loose,
            looks: if same_dir {
                self.looks.clone()
            } else {
                BTreeMap::new()
            },
            saved_at: Some(Utc::now()),
        };
        (cache, stats)
    }

    /// Every known scene: packaged first by package, then loose
    pub fn scenes(&self) -> Vec<&SceneRef> {
        let mut scenes: Vec<&SceneRef> = self
            .packages
            .values()
            .flat_map(|record| record.scenes.iter())
            .collect();
        scenes.extend(self.loose.values().map(|cached| &cached.scene));
        scenes
    }

    /// Cached "looks only" flag for a packaged scene
    pub fn looks(&self, package: &str, scene: &str) -> Option<bool> {
        self.looks.get(&looks_key(package, scene)).copied()
    }

    pub fn set_looks(&mut self, package: &str, scene: &str, looks: bool) {
        self.looks.insert(looks_key(package, scene), looks);
    }
}

fn looks_key(package: &str, scene: &str) -> String {
    format!("{}::{}", package, scene)
}

/// Worker pool sized to the machine, capped at `max_threads`
fn build_pool(max_threads: usize) -> Option<rayon::ThreadPool> {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let threads = cores.min(max_threads.max(1));

    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("Scanning sequentially, worker pool unavailable: {}", e);
            None
        }
    }
}

/// Move eagerly read preview bytes into the store
fn store_previews(store: &PreviewStore, record: &mut PackageRecord) {
    for scene in &mut record.scenes {
        let Some(bytes) = scene.preview_bytes.take() else {
            continue;
        };
        match store.write(&record.name, &scene.scene_name, &bytes) {
            Ok(relative) => scene.preview_file = relative,
            Err(e) => warn!(
                "Could not store preview for {}::{}: {}",
                record.name, scene.scene_name, e
            ),
        }
    }
}

/// Dependency lookup backed by the cache, scanning packages it does not hold
///
/// Older variants are never cached (only the latest of each base is), so
/// resolution through an exact older version falls back to a scan, memoized
/// for the lifetime of the lookup.
pub struct CachedLookup<'a> {
    cache: &'a ScanCache,
    scanner: &'a Scanner,
    addon_dir: PathBuf,
    scanned: HashMap<String, Vec<String>>,
}

impl<'a> CachedLookup<'a> {
    pub fn new(cache: &'a ScanCache, scanner: &'a Scanner, addon_dir: &Path) -> Self {
        Self {
            cache,
            scanner,
            addon_dir: addon_dir.to_path_buf(),
            scanned: HashMap::new(),
        }
    }

    /// Packages that had to be scanned because the cache missed
    pub fn misses(&self) -> usize {
        self.scanned.len()
    }
}

impl MetadataLookup for CachedLookup<'_> {
    fn dependencies(&mut self, package: &str) -> Vec<String> {
        if let Some(record) = self.cache.get(package) {
            return record.dependencies.clone();
        }

        let scanner = self.scanner;
        let addon_dir = &self.addon_dir;
        self.scanned
            .entry(package.to_string())
            .or_insert_with(|| scanner.scan(&addon_dir.join(package)).dependencies)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::scanner::{ScanMode, ScanOptions};
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn write_archive(path: &Path, meta: &str, extra: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("meta.json", options).unwrap();
        zip.write_all(meta.as_bytes()).unwrap();
        for (name, content) in extra {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    fn set_mtime(path: &Path, secs: u64) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    struct Fixture {
        _dir: TempDir,
        addon: PathBuf,
        scenes: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let addon = dir.path().join("AddonPackages");
        let scenes = dir.path().join("Saves/scene");
        fs::create_dir_all(&addon).unwrap();
        fs::create_dir_all(&scenes).unwrap();

        write_archive(
            &addon.join("A.Scene.1.var"),
            r#"{"dependencies": {"B.Hair.latest": {}}}"#,
            &[("Saves/scene/Club.json", b"{}"), ("Saves/scene/Club.png", b"img")],
        );
        write_archive(&addon.join("B.Hair.1.var"), "{}", &[]);
        write_archive(&addon.join("B.Hair.2.var"), "{}", &[]);
        fs::write(scenes.join("Mine.json"), b"{}").unwrap();

        for name in ["A.Scene.1.var", "B.Hair.1.var", "B.Hair.2.var"] {
            set_mtime(&addon.join(name), 1_700_000_000);
        }

        Fixture {
            _dir: dir,
            addon,
            scenes,
        }
    }

    #[test]
    fn test_snapshot_keeps_latest_variants() {
        let fx = fixture();
        let snapshot = DirectorySnapshot::capture(&fx.addon, Some(&fx.scenes), false).unwrap();

        let names: Vec<&str> = snapshot.signatures.packages.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["A.Scene.1.var", "B.Hair.2.var"]);
        assert!(snapshot.signatures.loose.contains_key("Mine.json"));
    }

    #[test]
    fn test_refresh_reuses_unchanged_records() {
        let fx = fixture();
        let scanner = Scanner::default();
        let snapshot = DirectorySnapshot::capture(&fx.addon, Some(&fx.scenes), false).unwrap();

        let (first, stats) = ScanCache::new(&fx.addon).refresh(&snapshot, &scanner, None, 2);
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.reused, 0);
        assert_eq!(stats.loose, 1);
        assert!(first.is_current(&snapshot));
        assert_eq!(first.get("A.Scene.1.var").unwrap().dependencies, vec!["B.Hair.latest"]);

        let (second, stats) = first.refresh(&snapshot, &scanner, None, 2);
        assert_eq!(stats.scanned, 0);
        assert_eq!(stats.reused, 2);
        assert_eq!(second.packages, first.packages);
    }

    #[test]
    fn test_changed_archive_needs_rescan() {
        let fx = fixture();
        let scanner = Scanner::default();
        let snapshot = DirectorySnapshot::capture(&fx.addon, Some(&fx.scenes), false).unwrap();
        let (cache, _) = ScanCache::new(&fx.addon).refresh(&snapshot, &scanner, None, 2);

        // Reading an archive leaves its signature alone
        let _ = fs::read(fx.addon.join("B.Hair.2.var")).unwrap();
        let unchanged = DirectorySnapshot::capture(&fx.addon, Some(&fx.scenes), false).unwrap();
        assert!(cache.is_current(&unchanged));

        write_archive(&fx.addon.join("B.Hair.2.var"), r#"{"dependencies": ["C.X.1"]}"#, &[]);
        let changed = DirectorySnapshot::capture(&fx.addon, Some(&fx.scenes), false).unwrap();
        assert!(!cache.is_current(&changed));

        let (updated, stats) = cache.refresh(&changed, &scanner, None, 2);
        assert_eq!(stats.scanned, 1);
        assert_eq!(updated.get("B.Hair.2.var").unwrap().dependencies, vec!["C.X.1"]);
    }

    #[test]
    fn test_new_loose_scene_needs_rescan() {
        let fx = fixture();
        let snapshot = DirectorySnapshot::capture(&fx.addon, Some(&fx.scenes), false).unwrap();
        let (cache, _) = ScanCache::new(&fx.addon).refresh(&snapshot, &Scanner::default(), None, 1);

        fs::write(fx.scenes.join("Another.json"), b"{}").unwrap();
        let current = DirectorySnapshot::capture(&fx.addon, Some(&fx.scenes), false).unwrap();
        assert!(!cache.is_current(&current));
    }

    #[test]
    fn test_directory_change_needs_rescan() {
        let cached = SignatureSet {
            addon_dir: PathBuf::from("/a"),
            ..Default::default()
        };
        let current = SignatureSet {
            addon_dir: PathBuf::from("/b"),
            ..Default::default()
        };
        assert!(needs_rescan(&cached, &current));
        assert!(!needs_rescan(&cached, &cached.clone()));
    }

    #[test]
    fn test_save_and_load() {
        let fx = fixture();
        let snapshot = DirectorySnapshot::capture(&fx.addon, Some(&fx.scenes), false).unwrap();
        let (mut cache, _) = ScanCache::new(&fx.addon).refresh(&snapshot, &Scanner::default(), None, 2);
        cache.set_looks("A.Scene.1.var", "Club", true);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CACHE_FILENAME);
        cache.save(&path).unwrap();

        let loaded = ScanCache::load(&path).unwrap();
        assert_eq!(loaded, cache);
        assert_eq!(loaded.looks("A.Scene.1.var", "Club"), Some(true));
        assert_eq!(loaded.scenes().len(), 2);
    }

    #[test]
    fn test_load_rejects_other_schema_and_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CACHE_FILENAME);
        assert!(ScanCache::load(&path).is_none());

        let mut cache = ScanCache::new("/addon");
        cache.version = CACHE_SCHEMA_VERSION + 1;
        cache.save(&path).unwrap();
        assert!(ScanCache::load(&path).is_none());

        fs::write(&path, b"not json").unwrap();
        assert!(ScanCache::load(&path).is_none());
    }

    #[test]
    fn test_full_refresh_stores_previews() {
        let fx = fixture();
        let store_dir = TempDir::new().unwrap();
        let store = PreviewStore::new(store_dir.path());
        let scanner = Scanner::new(ScanOptions {
            mode: ScanMode::Full,
            include_hidden: false,
        });

        let snapshot = DirectorySnapshot::capture(&fx.addon, None, false).unwrap();
        let (cache, _) = ScanCache::new(&fx.addon).refresh(&snapshot, &scanner, Some(&store), 2);

        let scene = &cache.get("A.Scene.1.var").unwrap().scenes[0];
        let relative = scene.preview_file.as_deref().unwrap();
        assert_eq!(store.read(relative).as_deref(), Some(&b"img"[..]));
        assert!(scene.preview_bytes.is_none());
    }

    #[test]
    fn test_cached_lookup_falls_back_to_scanner() {
        let fx = fixture();
        let scanner = Scanner::default();
        let snapshot = DirectorySnapshot::capture(&fx.addon, None, false).unwrap();
        let (cache, _) = ScanCache::new(&fx.addon).refresh(&snapshot, &scanner, None, 2);

        write_archive(&fx.addon.join("B.Hair.1.var"), r#"{"dependencies": ["Z.Z.1"]}"#, &[]);

        let mut lookup = CachedLookup::new(&cache, &scanner, &fx.addon);
        assert_eq!(lookup.dependencies("A.Scene.1.var"), vec!["B.Hair.latest"]);
        assert_eq!(lookup.dependencies("B.Hair.1.var"), vec!["Z.Z.1"]);
        assert_eq!(lookup.dependencies("B.Hair.1.var"), vec!["Z.Z.1"]);
        assert_eq!(lookup.misses(), 1);
    }
}
