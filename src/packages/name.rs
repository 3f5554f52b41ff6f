// src/packages/name.rs

//! Package file naming
//!
//! VaM packages are named `Creator.Package.Version.var`. The base may itself
//! contain dots; only the final component is the version. Packages sharing a
//! base are variants of each other.

use std::collections::HashMap;
use std::fmt;

/// Archive extension for packages
pub const ARCHIVE_EXTENSION: &str = ".var";

/// Suffix appended to a package filename to take it out of the host's view
pub const DISABLED_SUFFIX: &str = ".disabled";

/// Suffix of a "latest version" dependency reference
pub const LATEST_SUFFIX: &str = ".latest";

/// A parsed package filename
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageName {
    filename: String,
    base: String,
    version: String,
}

impl PackageName {
    /// Parse a package filename into base and version
    ///
    /// Names with fewer than three dot-separated parts carry no version; the
    /// whole stem is treated as the base.
    pub fn parse(filename: &str) -> Self {
        let stem = strip_extension(filename);
        let parts: Vec<&str> = stem.split('.').collect();

        let (base, version) = if parts.len() < 3 {
            (stem.to_string(), String::new())
        } else {
            let (base_parts, version) = parts.split_at(parts.len() - 1);
            (base_parts.join("."), version[0].to_string())
        };

        Self {
            filename: filename.to_string(),
            base,
            version,
        }
    }

    /// Full filename including the archive extension
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Integer version, or -1 when the version is missing or not numeric
    pub fn version_number(&self) -> i64 {
        self.version.parse().unwrap_or(-1)
    }

    /// Ordering key used to pick the latest variant
    fn latest_key(&self) -> (i64, &str, &str) {
        (self.version_number(), &self.version, &self.filename)
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename)
    }
}

/// Strip the archive extension if present
fn strip_extension(filename: &str) -> &str {
    filename.strip_suffix(ARCHIVE_EXTENSION).unwrap_or(filename)
}

/// True if the filename carries the archive extension
pub fn is_package_filename(filename: &str) -> bool {
    filename.ends_with(ARCHIVE_EXTENSION)
}

/// Filename of the disabled form of a package
pub fn disabled_filename(filename: &str) -> String {
    format!("{}{}", filename, DISABLED_SUFFIX)
}

/// Canonical filename for a disabled package filename, if it is one
pub fn canonical_from_disabled(filename: &str) -> Option<&str> {
    filename
        .strip_suffix(DISABLED_SUFFIX)
        .filter(|name| is_package_filename(name))
}

/// Keep only the latest variant of each base
///
/// Variants are compared by integer version, then version string, then
/// filename. Names that carry no version form their own base.
pub fn choose_latest<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: HashMap<String, PackageName> = HashMap::new();

    for name in names {
        let candidate = PackageName::parse(name);
        match best.get(candidate.base()) {
            Some(current) if current.latest_key() >= candidate.latest_key() => {}
            _ => {
                best.insert(candidate.base().to_string(), candidate);
            }
        }
    }

    let mut latest: Vec<String> = best.into_values().map(|p| p.filename).collect();
    latest.sort();
    latest
}

/// True if the package matches one of the protected naming markers
///
/// Protected packages (assets, plugins) stay enabled regardless of usage.
pub fn is_protected(filename: &str, markers: &[String]) -> bool {
    let lower = filename.to_lowercase();
    markers
        .iter()
        .any(|marker| lower.contains(&marker.to_lowercase()))
}
