// src/resolver/mod.rs

//! Dependency resolution
//!
//! Computes the set of packages that must stay enabled for a seed set of
//! packages: the transitive closure of their declared dependencies over the
//! packages present on disk, plus every protected (asset/plugin) package.

mod report;
mod token;

pub use report::{DependencyLine, DependencyReport, DependencyStatus, dependency_report};
pub use token::{DependencyToken, Universe};

use crate::packages::name::is_protected;
use crate::packages::traits::{MetadataLookup, SceneRef};
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// Packages that must remain enabled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeepSet(BTreeSet<String>);

impl KeepSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Returns true if the package was not already kept
    pub fn insert(&mut self, name: String) -> bool {
        self.0.insert(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for KeepSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Outcome of one resolution request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub keep: KeepSet,
    /// Universe packages outside the keep set, sorted
    pub unused: Vec<String>,
    /// Tokens that matched nothing, sorted and deduplicated
    pub missing: Vec<String>,
}

/// Resolve the keep set for `seeds`
///
/// Seeds not present in the universe are ignored. Tokens that match nothing
/// are collected in [`Resolution::missing`] and otherwise dropped.
pub fn resolve<'a, I, L>(
    seeds: I,
    universe: &Universe,
    lookup: &mut L,
    protected_markers: &[String],
) -> Resolution
where
    I: IntoIterator<Item = &'a str>,
    L: MetadataLookup + ?Sized,
{
    let mut keep = KeepSet::new();
    let mut stack: Vec<String> = Vec::new();
    let mut missing = BTreeSet::new();

    let protected = universe
        .iter()
        .filter(|name| is_protected(name, protected_markers))
        .map(str::to_string);
    let seeded = seeds
        .into_iter()
        .filter(|name| universe.contains(name))
        .map(str::to_string);
    let roots: Vec<String> = protected.chain(seeded).collect();

    for name in roots {
        if !keep.contains(&name) {
            trace!("Keeping {} (root)", name);
            stack.extend(lookup.dependencies(&name));
            keep.insert(name);
        }
    }

    while let Some(raw) = stack.pop() {
        let token = DependencyToken::parse(&raw);
        let matched = universe.matches(&token);

        if matched.is_empty() {
            trace!("Dependency {} matched nothing", raw);
            missing.insert(raw);
            continue;
        }

        for name in matched {
            if keep.contains(&name) {
                continue;
            }
            trace!("Keeping {} (via {})", name, token);
            stack.extend(lookup.dependencies(&name));
            keep.insert(name);
        }
    }

    let unused: Vec<String> = universe
        .iter()
        .filter(|name| !keep.contains(name))
        .map(str::to_string)
        .collect();

    debug!(
        "Resolved {} kept, {} unused, {} missing dependencies",
        keep.len(),
        unused.len(),
        missing.len()
    );

    Resolution {
        keep,
        unused,
        missing: missing.into_iter().collect(),
    }
}

/// Owning packages of packaged scenes, deduplicated
pub fn seeds_from_scenes<'a, I>(scenes: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a SceneRef>,
{
    scenes
        .into_iter()
        .filter_map(SceneRef::package)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn markers() -> Vec<String> {
        vec!["[asset]".to_string(), "[plugin]".to_string()]
    }

    fn graph(edges: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(name, deps)| {
                (
                    name.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    fn lookup_from(
        deps: &HashMap<String, Vec<String>>,
    ) -> impl FnMut(&str) -> Vec<String> + '_ {
        move |name: &str| deps.get(name).cloned().unwrap_or_default()
    }

    #[test]
    fn test_latest_token_keeps_every_variant() {
        let universe = Universe::new(["Scene.var", "Hair.1.var", "Hair.2.var", "Prop.var"]);
        let deps = graph(&[("Scene.var", &["Hair.latest"])]);

        let resolution = resolve(["Scene.var"], &universe, &mut lookup_from(&deps), &markers());

        let kept: Vec<&str> = resolution.keep.iter().collect();
        assert_eq!(kept, vec!["Hair.1.var", "Hair.2.var", "Scene.var"]);
        assert_eq!(resolution.unused, vec!["Prop.var"]);
        assert!(resolution.missing.is_empty());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let universe = Universe::new([
            "A.Scene.1.var",
            "B.Look.1.var",
            "C.Hair.1.var",
            "C.Hair.2.var",
            "D.Unused.1.var",
        ]);
        let deps = graph(&[
            ("A.Scene.1.var", &["B.Look.1", "X.Missing.latest"]),
            ("B.Look.1.var", &["C.Hair.latest"]),
        ]);

        let first = resolve(["A.Scene.1.var"], &universe, &mut lookup_from(&deps), &markers());
        let again = resolve(first.keep.iter(), &universe, &mut lookup_from(&deps), &markers());

        assert_eq!(first.keep, again.keep);
        assert_eq!(first.missing, vec!["X.Missing.latest"]);
        assert_eq!(first.unused, vec!["D.Unused.1.var"]);
    }

    #[test]
    fn test_protected_packages_always_kept() {
        let universe = Universe::new([
            "A.Textures[Asset].1.var",
            "B.Tool[Plugin].1.var",
            "C.Lib.1.var",
            "D.Other.1.var",
        ]);
        let deps = graph(&[("B.Tool[Plugin].1.var", &["C.Lib.1.var"])]);

        let resolution = resolve(
            std::iter::empty::<&str>(),
            &universe,
            &mut lookup_from(&deps),
            &markers(),
        );

        assert!(resolution.keep.contains("A.Textures[Asset].1.var"));
        assert!(resolution.keep.contains("B.Tool[Plugin].1.var"));
        assert!(resolution.keep.contains("C.Lib.1.var"));
        assert_eq!(resolution.unused, vec!["D.Other.1.var"]);
    }

    #[test]
    fn test_cycles_and_self_references_terminate() {
        let universe = Universe::new(["A.P.1.var", "B.P.1.var"]);
        let deps = graph(&[
            ("A.P.1.var", &["B.P.1.var", "A.P.1.var"]),
            ("B.P.1.var", &["A.P.latest"]),
        ]);

        let mut calls = 0;
        let mut lookup = |name: &str| {
            calls += 1;
            deps.get(name).cloned().unwrap_or_default()
        };
        let resolution = resolve(["A.P.1.var"], &universe, &mut lookup, &[]);

        assert_eq!(resolution.keep.len(), 2);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_seeds_outside_universe_ignored() {
        let universe = Universe::new(["A.P.1.var"]);
        let resolution = resolve(["Gone.P.1.var"], &universe, &mut |_: &str| Vec::<String>::new(), &[]);
        assert!(resolution.keep.is_empty());
        assert_eq!(resolution.unused, vec!["A.P.1.var"]);
    }

    #[test]
    fn test_seeds_from_scenes() {
        let scenes = vec![
            SceneRef::packaged("One".to_string(), "A.Scene.1.var"),
            SceneRef::packaged("Two".to_string(), "A.Scene.1.var"),
            SceneRef::loose("mine".to_string(), "mine.json".to_string()),
        ];
        let seeds = seeds_from_scenes(&scenes);
        assert_eq!(seeds.into_iter().collect::<Vec<_>>(), vec!["A.Scene.1.var"]);
    }
}
