//! # Photo Importer
//!
//! An import engine for photos and videos on cameras, cards, and folders:
//! scan, extract metadata and thumbnails, resolve destination names, copy
//! with verification, and fan out to backup drives.
//!
//! ## Core Philosophy
//! - **Never lose a file** - every copy is verified before the file counts
//!   as imported, and sources are never deleted
//! - **Per-file isolation** - one unreadable or crashing file never aborts
//!   the batch
//! - **Deterministic names** - the same card imported twice resolves the
//!   same destinations, and collisions are handled by explicit policy
//!
//! ## Architecture
//! The library is split into a core engine (UI-agnostic) and presentation
//! layers:
//! - `core` - The import engine
//! - `events` - Event-driven progress reporting (GUI-ready)
//! - `error` - User-friendly error types
//! - `cli` - Command-line interface

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{ImportError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point (CLI or GUI).
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}
