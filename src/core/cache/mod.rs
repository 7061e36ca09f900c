//! # Cache Module
//!
//! Content-addressed thumbnail cache.
//!
//! Entries are keyed by the file identity tuple (device id, path, size,
//! mtime) so re-scanning an unchanged device is fast: a hit returns the
//! stored metadata and thumbnail without invoking the extractor. Entries
//! become invalid as soon as any part of the key tuple changes.
//!
//! Keys are immutable after creation, so the cache is safe for concurrent
//! access from extraction workers; last-writer-wins on rebuild.

mod memory;
mod sqlite;

pub use memory::InMemoryCache;
pub use sqlite::SqliteThumbCache;

use crate::core::extractor::MediaMetadata;
use crate::error::CacheError;
use std::path::Path;
use std::time::SystemTime;
use uuid::Uuid;

/// One cached extraction result
#[derive(Debug, Clone)]
pub struct ThumbEntry {
    /// Owning device (part of the key)
    pub device_id: Uuid,
    /// Source path on the device (part of the key)
    pub path: std::path::PathBuf,
    /// File size when cached (part of the key)
    pub file_size: u64,
    /// File mtime when cached (part of the key)
    pub file_modified: SystemTime,
    /// Extracted metadata
    pub metadata: MediaMetadata,
    /// Encoded thumbnail, when extraction produced one
    pub thumbnail: Option<Vec<u8>>,
    /// When this entry was written
    pub cached_at: SystemTime,
}

impl ThumbEntry {
    /// Whether the entry is still valid for the given identity
    pub fn is_valid_for(&self, size: u64, modified: SystemTime) -> bool {
        self.file_size == size && self.file_modified == modified
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_thumbnail_bytes: u64,
}

/// Trait for thumbnail cache backends
pub trait ThumbCache: Send + Sync {
    /// Get a cached entry if it exists and its key tuple still matches
    fn get(
        &self,
        device_id: Uuid,
        path: &Path,
        current_size: u64,
        current_modified: SystemTime,
    ) -> Result<Option<ThumbEntry>, CacheError>;

    /// Store an entry, replacing any stale entry for the same (device, path)
    fn set(&self, entry: ThumbEntry) -> Result<(), CacheError>;

    /// Remove a specific entry
    fn remove(&self, device_id: Uuid, path: &Path) -> Result<(), CacheError>;

    /// Clear all cached entries
    fn clear(&self) -> Result<(), CacheError>;

    /// Get cache statistics
    fn stats(&self) -> Result<CacheStats, CacheError>;
}
