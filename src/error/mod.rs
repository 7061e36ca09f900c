//! # Error Module
//!
//! Error types for the photo importer.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Per-file isolation** - one broken file never aborts the batch
//! - **Include context** - paths, devices, what went wrong
//! - **Recovery hints** - suggest how to fix when possible

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),

    #[error("Copy error: {0}")]
    Copy(#[from] CopyError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid state transition for {path}: {from} -> {to}")]
    StateError {
        path: PathBuf,
        from: String,
        to: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors that occur while scanning a source device
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Device root not found: {path}")]
    DeviceNotFound { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Device disconnected during scan")]
    DeviceDisconnected,

    #[error("Scan was cancelled")]
    Cancelled,
}

/// Errors from the metadata/thumbnail extractor
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },

    #[error("Extractor crashed while reading {path}")]
    ExtractionCrashed { path: PathBuf },

    #[error("Extraction timed out after {seconds}s for {path}")]
    Timeout { path: PathBuf, seconds: u64 },

    #[error("Failed to open {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No metadata provider is available: {reason}")]
    ProviderUnavailable { reason: String },
}

/// Errors from the sequence & naming engine
#[derive(Error, Debug)]
pub enum NamingError {
    #[error("Failed to persist sequence state to {path}: {reason}")]
    SequencePersistFailed { path: PathBuf, reason: String },
}

/// Errors from the copy/verify/backup stages
#[derive(Error, Debug)]
pub enum CopyError {
    #[error("I/O error copying {src} to {dst}: {source}")]
    Io {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Verification mismatch: {dst} does not match {src}. Source file was kept.")]
    VerificationMismatch { src: PathBuf, dst: PathBuf },

    #[error("Backup target unavailable: {root}")]
    BackupTargetUnavailable { root: PathBuf },

    #[error("Destination is not writable: {root}")]
    DestinationUnwritable { root: PathBuf },

    #[error("Copy was cancelled")]
    Cancelled,
}

/// Errors that occur with the thumbnail cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to open cache database at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Cache corruption detected at {path}. Delete this file and try again.")]
    Corrupted { path: PathBuf },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, ImportError>;
