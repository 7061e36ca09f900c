//! SQLite cache backend for persistence across program runs.

use super::{CacheStats, ThumbCache, ThumbEntry};
use crate::core::extractor::MediaMetadata;
use crate::error::CacheError;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// SQLite-backed persistent thumbnail cache
///
/// Uses WAL (Write-Ahead Logging) mode so extraction workers can read
/// while another worker writes.
pub struct SqliteThumbCache {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteThumbCache {
    /// Open or create a cache database at the given path
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| CacheError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS thumbnails (
                device_id TEXT NOT NULL,
                path TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                file_modified INTEGER NOT NULL,
                metadata TEXT NOT NULL,
                thumbnail BLOB,
                cached_at INTEGER NOT NULL,
                PRIMARY KEY (device_id, path)
            )",
            [],
        )
        .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    /// Convert SystemTime to Unix timestamp
    fn to_timestamp(time: SystemTime) -> i64 {
        time.duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs() as i64
    }

    /// Convert Unix timestamp to SystemTime
    fn from_timestamp(timestamp: i64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(timestamp.max(0) as u64)
    }
}

impl ThumbCache for SqliteThumbCache {
    fn get(
        &self,
        device_id: Uuid,
        path: &Path,
        current_size: u64,
        current_modified: SystemTime,
    ) -> Result<Option<ThumbEntry>, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Corrupted {
            path: self.db_path.clone(),
        })?;

        let path_str = path.to_string_lossy();

        let result: Result<ThumbEntry, _> = conn.query_row(
            "SELECT file_size, file_modified, metadata, thumbnail, cached_at
             FROM thumbnails WHERE device_id = ? AND path = ?",
            params![device_id.to_string(), path_str],
            |row| {
                let metadata_json: String = row.get(2)?;
                Ok(ThumbEntry {
                    device_id,
                    path: path.to_path_buf(),
                    file_size: row.get::<_, i64>(0)? as u64,
                    file_modified: Self::from_timestamp(row.get(1)?),
                    metadata: serde_json::from_str::<MediaMetadata>(&metadata_json)
                        .unwrap_or_default(),
                    thumbnail: row.get::<_, Option<Vec<u8>>>(3)?,
                    cached_at: Self::from_timestamp(row.get(4)?),
                })
            },
        );

        match result {
            Ok(entry) => {
                // SQLite stores mtimes at second precision; compare at
                // the same granularity
                let truncated =
                    Self::from_timestamp(Self::to_timestamp(current_modified));
                if entry.is_valid_for(current_size, truncated) {
                    Ok(Some(entry))
                } else {
                    Ok(None)
                }
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CacheError::QueryFailed(e.to_string())),
        }
    }

    fn set(&self, entry: ThumbEntry) -> Result<(), CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Corrupted {
            path: self.db_path.clone(),
        })?;

        let metadata_json = serde_json::to_string(&entry.metadata)
            .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO thumbnails
             (device_id, path, file_size, file_modified, metadata, thumbnail, cached_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.device_id.to_string(),
                entry.path.to_string_lossy(),
                entry.file_size as i64,
                Self::to_timestamp(entry.file_modified),
                metadata_json,
                entry.thumbnail,
                Self::to_timestamp(entry.cached_at),
            ],
        )
        .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    fn remove(&self, device_id: Uuid, path: &Path) -> Result<(), CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Corrupted {
            path: self.db_path.clone(),
        })?;

        conn.execute(
            "DELETE FROM thumbnails WHERE device_id = ? AND path = ?",
            params![device_id.to_string(), path.to_string_lossy()],
        )
        .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Corrupted {
            path: self.db_path.clone(),
        })?;

        conn.execute("DELETE FROM thumbnails", [])
            .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Corrupted {
            path: self.db_path.clone(),
        })?;

        let total_entries: usize = conn
            .query_row("SELECT COUNT(*) FROM thumbnails", [], |row| {
                row.get::<_, i64>(0).map(|v| v as usize)
            })
            .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        let total_thumbnail_bytes: u64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(thumbnail)), 0) FROM thumbnails",
                [],
                |row| row.get::<_, i64>(0).map(|v| v as u64),
            )
            .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        Ok(CacheStats {
            total_entries,
            total_thumbnail_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn entry(device_id: Uuid, path: &str, modified: SystemTime) -> ThumbEntry {
        // Truncate to whole seconds up front, matching SQLite storage
        let modified = SqliteThumbCache::from_timestamp(SqliteThumbCache::to_timestamp(modified));
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
    fn creates_database_file() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("thumbs.db");

        let cache = SqliteThumbCache::open(&db_path).unwrap();

        assert!(db_path.exists());
        assert_eq!(cache.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn stores_and_retrieves_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("thumbs.db");
        let device = Uuid::new_v4();
        let now = SystemTime::now();

        {
            let cache = SqliteThumbCache::open(&db_path).unwrap();
            cache.set(entry(device, "/DCIM/IMG_0001.JPG", now)).unwrap();
        }

        let cache = SqliteThumbCache::open(&db_path).unwrap();
        let hit = cache
            .get(device, Path::new("/DCIM/IMG_0001.JPG"), 1000, now)
            .unwrap();
        assert!(hit.is_some());
    }

    #[test]
    fn invalidates_on_modification() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("thumbs.db");
        let device = Uuid::new_v4();
        let now = SystemTime::now();

        let cache = SqliteThumbCache::open(&db_path).unwrap();
        cache.set(entry(device, "/DCIM/IMG_0001.JPG", now)).unwrap();

        let later = now + Duration::from_secs(60);
        let miss = cache
            .get(device, Path::new("/DCIM/IMG_0001.JPG"), 1000, later)
            .unwrap();
        assert!(miss.is_none());
    }
}
