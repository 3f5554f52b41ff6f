// src/lib.rs

//! varkeep
//!
//! Keeps a large VaM addon library lean by enabling only the packages a
//! chosen set of scenes actually needs, and toggling the rest off by
//! renaming them. Nothing is ever deleted.
//!
//! # Architecture
//!
//! - Scanner: reads `meta.json` and the entry listing of each `.var` archive
//! - Resolver: transitive closure of dependencies from a seed set
//! - Cache: signature-keyed scan results so unchanged archives are never reopened
//! - Activation: rename-based enable/disable with a durable manifest and journal
//! - Session: single-writer controller tying activation to the host lifecycle

pub mod activation;
pub mod cache;
pub mod config;
mod error;
pub mod packages;
pub mod resolver;
pub mod session;

pub use error::{Error, Result};
