//! Event type definitions for progress reporting.

use crate::core::candidate::LifecycleState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// All events emitted by the import engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Session-level events (start, pause, completion)
    Session(SessionEvent),
    /// Scanning phase events
    Scan(ScanEvent),
    /// Metadata/thumbnail extraction events
    Extract(ExtractEvent),
    /// Copy and verification events
    Copy(CopyEvent),
    /// Backup fan-out events
    Backup(BackupEvent),
    /// Per-file lifecycle events
    File(FileEvent),
}

/// Session-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A device session has started
    Started {
        session: Uuid,
        device_label: String,
    },
    /// Dispatching was paused; in-flight jobs keep running
    Paused,
    /// Dispatching resumed
    Resumed,
    /// A device session was cancelled
    Cancelled { session: Uuid },
    /// All sessions finished
    Completed { summary: ImportSummary },
    /// A session-fatal condition (e.g. unwritable destination)
    Fatal { session: Uuid, message: String },
}

/// Events during the scanning phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Scanning has started for a device
    Started { session: Uuid, root: PathBuf },
    /// A candidate file was found
    FileFound { session: Uuid, path: PathBuf },
    /// An error occurred but scanning continues
    Error {
        session: Uuid,
        path: PathBuf,
        message: String,
    },
    /// Scanning completed for a device
    Completed {
        session: Uuid,
        total_files: usize,
        total_bytes: u64,
    },
}

/// Events during metadata/thumbnail extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExtractEvent {
    /// Extraction has started
    Started { total_files: usize },
    /// Metadata (and possibly a thumbnail) was extracted
    Extracted { path: PathBuf },
    /// A thumbnail was served from cache (no re-extraction)
    CacheHit { path: PathBuf },
    /// The file proceeds without a thumbnail
    NoThumbnail { path: PathBuf, reason: String },
    /// An error occurred but extraction continues for other files
    Error { path: PathBuf, message: String },
    /// Extraction completed
    Completed {
        extracted: usize,
        cache_hits: usize,
    },
}

/// Events during the copy/verify phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CopyEvent {
    /// Copying has started
    Started {
        total_files: usize,
        total_bytes: u64,
    },
    /// Aggregate progress update
    Progress(CopyProgress),
    /// One file finished copying
    Copied {
        path: PathBuf,
        destination: PathBuf,
        bytes: u64,
    },
    /// A copied file passed verification
    Verified { path: PathBuf },
    /// An error occurred but the batch continues
    Error { path: PathBuf, message: String },
    /// Copying completed
    Completed {
        files_copied: usize,
        bytes_copied: u64,
    },
}

/// Aggregate progress during copying
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyProgress {
    /// Files fully copied so far
    pub files_completed: usize,
    /// Total files in the batch
    pub files_total: usize,
    /// Bytes copied so far (all files)
    pub bytes_copied: u64,
    /// Total bytes in the batch
    pub bytes_total: u64,
    /// File currently being copied
    pub current_path: PathBuf,
}

/// Events during backup fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BackupEvent {
    /// A backup sub-job started
    Started { path: PathBuf, target: PathBuf },
    /// A backup sub-job completed
    Completed { path: PathBuf, target: PathBuf },
    /// A backup was skipped per the target's conflict policy
    Skipped { path: PathBuf, target: PathBuf },
    /// A backup sub-job failed
    Error {
        path: PathBuf,
        target: PathBuf,
        message: String,
    },
}

/// Per-file lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FileEvent {
    /// A candidate moved to a new lifecycle state
    StateChanged {
        session: Uuid,
        path: PathBuf,
        state: LifecycleState,
    },
    /// A non-fatal warning attached to a candidate (e.g. degraded metadata)
    Warning { path: PathBuf, message: String },
}

/// Summary of a finished import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Files that reached COMPLETED
    pub files_completed: usize,
    /// Files that ended FAILED
    pub files_failed: usize,
    /// Files that ended SKIPPED
    pub files_skipped: usize,
    /// Files still held in BackupPending at session end
    pub files_incomplete: usize,
    /// Total bytes copied to the primary destination
    pub bytes_copied: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Copy(CopyEvent::Progress(CopyProgress {
            files_completed: 3,
            files_total: 120,
            bytes_copied: 17_000_000,
            bytes_total: 4_200_000_000,
            current_path: PathBuf::from("/media/CARD01/DCIM/IMG_0004.CR2"),
        }));

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Copy(CopyEvent::Progress(p)) => {
                assert_eq!(p.files_total, 120);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn import_summary_is_serializable() {
        let summary = ImportSummary {
            files_completed: 500,
            files_failed: 2,
            files_skipped: 1,
            files_incomplete: 0,
            bytes_copied: 12_000_000_000,
            duration_ms: 90_000,
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("12000000000"));
    }
}
