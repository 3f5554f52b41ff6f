// src/resolver/token.rs

//! Dependency tokens and the package universe they match against

use crate::error::Result;
use crate::packages::directory::list_packages;
use crate::packages::name::{ARCHIVE_EXTENSION, LATEST_SUFFIX};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Bound;
use std::path::Path;

/// A classified dependency reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyToken {
    /// Full filename, matched verbatim
    Exact(String),
    /// `base.latest`: every variant of `base`
    Latest { base: String },
    /// Base name without extension, matched as `name.var`
    Bare(String),
    /// Empty or otherwise unusable; matches nothing
    Invalid(String),
}

impl DependencyToken {
    pub fn parse(raw: &str) -> Self {
        let token = raw.trim();
        if token.is_empty() {
            return Self::Invalid(raw.to_string());
        }

        if token.ends_with(ARCHIVE_EXTENSION) {
            Self::Exact(token.to_string())
        } else if let Some(base) = token.strip_suffix(LATEST_SUFFIX) {
            if base.is_empty() {
                Self::Invalid(raw.to_string())
            } else {
                Self::Latest {
                    base: base.to_string(),
                }
            }
        } else {
            Self::Bare(token.to_string())
        }
    }
}

impl fmt::Display for DependencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(name) | Self::Bare(name) | Self::Invalid(name) => f.write_str(name),
            Self::Latest { base } => write!(f, "{}{}", base, LATEST_SUFFIX),
        }
    }
}

/// Canonical names of every package present on disk, enabled or disabled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Universe {
    names: BTreeSet<String>,
}

impl Universe {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Every package in the directory, whatever its state
    pub fn from_directory(addon_dir: &Path) -> Result<Self> {
        Ok(Self::new(list_packages(addon_dir)?.into_iter().map(|entry| entry.name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Packages a token resolves to, in name order
    pub fn matches(&self, token: &DependencyToken) -> Vec<String> {
        match token {
            DependencyToken::Exact(name) => self.exact(name),
            DependencyToken::Bare(name) => self.exact(&format!("{}{}", name, ARCHIVE_EXTENSION)),
            DependencyToken::Latest { base } => {
                let prefix = format!("{}.", base);
                self.names
                    .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
                    .take_while(|name| name.starts_with(&prefix))
                    .filter(|name| name.ends_with(ARCHIVE_EXTENSION))
                    .cloned()
                    .collect()
            }
            DependencyToken::Invalid(_) => Vec::new(),
        }
    }

    fn exact(&self, name: &str) -> Vec<String> {
        if self.names.contains(name) {
            vec![name.to_string()]
        } else {
            Vec::new()
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Universe {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_forms() {
        assert_eq!(
            DependencyToken::parse("A.Hair.3.var"),
            DependencyToken::Exact("A.Hair.3.var".to_string())
        );
        assert_eq!(
            DependencyToken::parse("A.Hair.latest"),
            DependencyToken::Latest {
                base: "A.Hair".to_string()
            }
        );
        assert_eq!(
            DependencyToken::parse(" A.Hair.3 "),
            DependencyToken::Bare("A.Hair.3".to_string())
        );
        assert!(matches!(DependencyToken::parse(""), DependencyToken::Invalid(_)));
        assert!(matches!(DependencyToken::parse(".latest"), DependencyToken::Invalid(_)));
        assert_eq!(DependencyToken::parse("A.Hair.latest").to_string(), "A.Hair.latest");
    }

    #[test]
    fn test_tokens_with_spaces_still_match() {
        let universe = Universe::new(["Some Creator.Pack.1.var", "Some Creator.Pack.2.var"]);
        assert_eq!(
            universe.matches(&DependencyToken::parse("Some Creator.Pack.latest")),
            vec!["Some Creator.Pack.1.var", "Some Creator.Pack.2.var"]
        );
        assert_eq!(
            universe.matches(&DependencyToken::parse("Some Creator.Pack.2")),
            vec!["Some Creator.Pack.2.var"]
        );
    }

    #[test]
    fn test_latest_matches_every_variant() {
        let universe = Universe::new(["A.1.var", "A.2.var", "A.10.var", "AB.1.var", "B.1.var"]);
        let matched = universe.matches(&DependencyToken::parse("A.latest"));
        assert_eq!(matched, vec!["A.1.var", "A.10.var", "A.2.var"]);
    }

    #[test]
    fn test_exact_and_bare_match_at_most_one() {
        let universe = Universe::new(["A.Pack.1.var", "A.Pack.2.var"]);
        assert_eq!(
            universe.matches(&DependencyToken::parse("A.Pack.1.var")),
            vec!["A.Pack.1.var"]
        );
        assert_eq!(
            universe.matches(&DependencyToken::parse("A.Pack.2")),
            vec!["A.Pack.2.var"]
        );
        assert!(universe.matches(&DependencyToken::parse("A.Pack.3")).is_empty());
        assert!(universe.matches(&DependencyToken::parse("")).is_empty());
    }

    #[test]
    fn test_universe_includes_disabled_packages() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("A.Pack.1.var"), b"a").unwrap();
        std::fs::write(dir.path().join("B.Pack.1.var.disabled"), b"b").unwrap();

        let universe = Universe::from_directory(dir.path()).unwrap();
        assert_eq!(universe.len(), 2);
        assert!(universe.contains("B.Pack.1.var"));
    }
}
