//! In-memory cache backend.
//!
//! Used by tests and one-shot runs where persistence across program
//! restarts is not wanted.

use super::{CacheStats, ThumbCache, ThumbEntry};
use crate::error::CacheError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;
use uuid::Uuid;

/// Thread-safe in-memory thumbnail cache
pub struct InMemoryCache {
    entries: RwLock<HashMap<(Uuid, PathBuf), ThumbEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ThumbCache for InMemoryCache {
    fn get(
        &self,
        device_id: Uuid,
        path: &Path,
        current_size: u64,
        current_modified: SystemTime,
    ) -> Result<Option<ThumbEntry>, CacheError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        Ok(entries
            .get(&(device_id, path.to_path_buf()))
            .filter(|entry| entry.is_valid_for(current_size, current_modified))
            .cloned())
    }

    fn set(&self, entry: ThumbEntry) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        entries.insert((entry.device_id, entry.path.clone()), entry);
        Ok(())
    }

    fn remove(&self, device_id: Uuid, path: &Path) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        entries.remove(&(device_id, path.to_path_buf()));
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        entries.clear();
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        let total_thumbnail_bytes = entries
            .values()
            .filter_map(|e| e.thumbnail.as_ref())
            .map(|t| t.len() as u64)
            .sum();

        Ok(CacheStats {
            total_entries: entries.len(),
            total_thumbnail_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::MediaMetadata;

    fn entry(device_id: Uuid, path: &str, modified: SystemTime) -> ThumbEntry {
        ThumbEntry {
            device_id,
            path: PathBuf::from(path),
            file_size: 1000,
            file_modified: modified,
            metadata: MediaMetadata::default(),
            thumbnail: Some(vec![0xFF, 0xD8, 0xFF, 0xD9]),
            cached_at: SystemTime::now(),
        }
    }

    #[test]
    fn stores_and_retrieves() {
        let cache = InMemoryCache::new();
        let device = Uuid::new_v4();
        let now = SystemTime::now();

        cache.set(entry(device, "/DCIM/IMG_0001.JPG", now)).unwrap();

        let hit = cache
            .get(device, Path::new("/DCIM/IMG_0001.JPG"), 1000, now)
            .unwrap();
        assert!(hit.is_some());
        assert!(hit.unwrap().thumbnail.is_some());
    }

    #[test]
    fn invalidates_on_size_change() {
        let cache = InMemoryCache::new();
        let device = Uuid::new_v4();
        let now = SystemTime::now();

        cache.set(entry(device, "/DCIM/IMG_0001.JPG", now)).unwrap();

        let miss = cache
            .get(device, Path::new("/DCIM/IMG_0001.JPG"), 2000, now)
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn key_includes_device_identity() {
        let cache = InMemoryCache::new();
        let now = SystemTime::now();
        let device_a = Uuid::new_v4();
        let device_b = Uuid::new_v4();

        cache.set(entry(device_a, "/DCIM/IMG_0001.JPG", now)).unwrap();

        // Same path on another device must not hit
        let miss = cache
            .get(device_b, Path::new("/DCIM/IMG_0001.JPG"), 1000, now)
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn clear_removes_everything() {
        let cache = InMemoryCache::new();
        let device = Uuid::new_v4();
        let now = SystemTime::now();

        cache.set(entry(device, "/a.jpg", now)).unwrap();
        cache.set(entry(device, "/b.jpg", now)).unwrap();
        cache.clear().unwrap();

        assert_eq!(cache.stats().unwrap().total_entries, 0);
    }
}
