// src/error.rs

use thiserror::Error;

/// Core error types for varkeep
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode errors (cache, manifest, journal records)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Package archive could not be read
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Package archive readable but its manifest is missing or malformed
    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Host directory does not look like a VaM install
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    /// Activation manifest unreadable or inconsistent
    #[error("Manifest error: {0}")]
    ManifestError(String),

    /// Rename journal unreadable
    #[error("Journal error: {0}")]
    JournalError(String),

    /// Session lock could not be taken
    #[error("Lock error: {0}")]
    LockError(String),

    /// Operation not valid in the current session state
    #[error("Session error: {0}")]
    SessionError(String),

    /// Requested item not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias using varkeep's Error type
pub type Result<T> = std::result::Result<T, Error>;
