// src/packages/mod.rs

//! Package archives and the directory that holds them
//!
//! Naming rules, `meta.json` decoding, archive scanning, and the per-package
//! enabled/disabled state derived from the add-on directory.

pub mod directory;
pub mod meta;
pub mod name;
pub mod scanner;
pub mod traits;

pub use directory::{PackageEntry, PackageState, list_packages};
pub use name::PackageName;
pub use scanner::{ScanMode, ScanOptions, Scanner};
pub use traits::{MetadataLookup, PackageRecord, SceneOwner, SceneRef};
