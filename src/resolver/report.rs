// src/resolver/report.rs

//! Per-dependency status for display

use super::token::{DependencyToken, Universe};
use serde::Serialize;

/// How one declared dependency resolves
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DependencyStatus {
    /// Resolved; `chosen` is the greatest matching name
    Present { chosen: String, matches: usize },
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyLine {
    pub token: String,
    #[serde(flatten)]
    pub status: DependencyStatus,
}

/// Resolution status of a package's declared dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    pub lines: Vec<DependencyLine>,
    pub present: usize,
    pub missing: usize,
}

impl DependencyReport {
    pub fn is_satisfied(&self) -> bool {
        self.missing == 0
    }
}

/// Report how each token resolves against the universe
///
/// Only one concrete match is shown per token; closure still keeps them all.
pub fn dependency_report<S: AsRef<str>>(tokens: &[S], universe: &Universe) -> DependencyReport {
    let mut report = DependencyReport::default();

    for raw in tokens {
        let raw = raw.as_ref();
        let matches = universe.matches(&DependencyToken::parse(raw));

        let status = match matches.iter().max() {
            Some(chosen) => {
                report.present += 1;
                DependencyStatus::Present {
                    chosen: chosen.clone(),
                    matches: matches.len(),
                }
            }
            None => {
                report.missing += 1;
                DependencyStatus::Missing
            }
        };

        report.lines.push(DependencyLine {
            token: raw.to_string(),
            status,
        });
    }

    report
}
