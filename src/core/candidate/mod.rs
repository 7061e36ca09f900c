//! # Candidate Module
//!
//! The per-file data model: `FileCandidate` and its lifecycle state machine.
//!
//! ## Ownership
//! Candidates are owned exclusively by the coordinator. Worker pools get
//! immutable `FileRef` snapshots and send typed results back; they never
//! touch a candidate directly.
//!
//! ## Lifecycle
//! ```text
//! Discovered -> MetadataPending -> MetadataReady -> NamingResolved
//!            -> CopyPending -> Copied -> VerifyPending
//!            -> Completed | Failed | Skipped
//! ```
//! Transitions are forward-only; any state may fall to `Failed`.
//! Backup sub-jobs track their own `BackupPending -> BackedUp` per target.

use crate::core::device::{FileKind, FileRef};
use crate::core::extractor::MediaMetadata;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle state of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecycleState {
    Discovered,
    MetadataPending,
    MetadataReady,
    NamingResolved,
    CopyPending,
    Copied,
    VerifyPending,
    BackupPending,
    Completed,
    Failed,
    Skipped,
}

impl LifecycleState {
    /// Whether this state is terminal
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Completed | LifecycleState::Failed | LifecycleState::Skipped
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Discovered => "discovered",
            LifecycleState::MetadataPending => "metadata-pending",
            LifecycleState::MetadataReady => "metadata-ready",
            LifecycleState::NamingResolved => "naming-resolved",
            LifecycleState::CopyPending => "copy-pending",
            LifecycleState::Copied => "copied",
            LifecycleState::VerifyPending => "verify-pending",
            LifecycleState::BackupPending => "backup-pending",
            LifecycleState::Completed => "COMPLETED",
            LifecycleState::Failed => "FAILED",
            LifecycleState::Skipped => "SKIPPED",
        };
        write!(f, "{}", name)
    }
}

/// Why a candidate ended up FAILED or SKIPPED
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    ExtractionCrashed,
    WorkerCrashed,
    NameConflict,
    CopyIo(String),
    VerificationMismatch,
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::ExtractionCrashed => write!(f, "metadata extractor crashed"),
            FailureReason::WorkerCrashed => write!(f, "worker crashed"),
            FailureReason::NameConflict => write!(f, "destination name conflict"),
            FailureReason::CopyIo(msg) => write!(f, "copy I/O error: {}", msg),
            FailureReason::VerificationMismatch => write!(f, "verification mismatch"),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Which pipeline task a report entry belongs to, for the grouped error view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Scan,
    Extract,
    Rename,
    Copy,
    Backup,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskKind::Scan => "scan",
            TaskKind::Extract => "extract",
            TaskKind::Rename => "rename",
            TaskKind::Copy => "copy",
            TaskKind::Backup => "backup",
        };
        write!(f, "{}", name)
    }
}

/// State of one backup sub-job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupState {
    Pending,
    BackedUp,
    Skipped,
    Failed(String),
}

/// One file moving through the import pipeline
#[derive(Debug, Clone)]
pub struct FileCandidate {
    /// Owning device session
    pub session: Uuid,
    /// Immutable source snapshot (identity tuple lives here)
    pub file: FileRef,
    /// Current lifecycle state
    state: LifecycleState,
    /// Extracted metadata, filled after the extract stage
    pub metadata: Option<MediaMetadata>,
    /// Thumbnail bytes, when extraction produced one
    pub thumbnail: Option<Vec<u8>>,
    /// User-assigned job code for naming
    pub job_code: Option<String>,
    /// Sequence number drawn by the naming engine
    pub sequence_number: Option<u64>,
    /// Resolved destination path
    pub destination: Option<PathBuf>,
    /// Content checksum, filled during copy
    pub checksum: Option<u64>,
    /// Terminal failure/skip reason
    pub reason: Option<FailureReason>,
    /// Task during which the terminal reason arose
    pub failed_task: Option<TaskKind>,
    /// Non-fatal warnings (e.g. degraded metadata fallback)
    pub warnings: Vec<String>,
    /// Per-backup-target sub-job states, keyed by target root
    pub backups: HashMap<PathBuf, BackupState>,
}

impl FileCandidate {
    /// Create a freshly discovered candidate
    pub fn new(session: Uuid, file: FileRef) -> Self {
        Self {
            session,
            file,
            state: LifecycleState::Discovered,
            metadata: None,
            thumbnail: None,
            job_code: None,
            sequence_number: None,
            destination: None,
            checksum: None,
            reason: None,
            failed_task: None,
            warnings: Vec::new(),
            backups: HashMap::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Whether the candidate has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Advance to a later state.
    ///
    /// Forward-only: moving backward (other than to `Failed`) is rejected,
    /// as is leaving a terminal state.
    pub fn advance(&mut self, to: LifecycleState) -> Result<(), (LifecycleState, LifecycleState)> {
        if self.state.is_terminal() {
            return Err((self.state, to));
        }
        if to == LifecycleState::Failed {
            self.state = to;
            return Ok(());
        }
        if to <= self.state {
            return Err((self.state, to));
        }
        self.state = to;
        Ok(())
    }

    /// Mark failed with a reason, recording the task it arose in
    pub fn fail(&mut self, task: TaskKind, reason: FailureReason) {
        if self.state.is_terminal() {
            return;
        }
        self.state = LifecycleState::Failed;
        self.failed_task = Some(task);
        self.reason = Some(reason);
    }

    /// Mark skipped with a reason
    pub fn skip(&mut self, task: TaskKind, reason: FailureReason) {
        if self.state.is_terminal() {
            return;
        }
        self.state = LifecycleState::Skipped;
        self.failed_task = Some(task);
        self.reason = Some(reason);
    }

    /// Whether the file is a sidecar following a primary file
    pub fn is_sidecar(&self) -> bool {
        self.file.kind == FileKind::Sidecar
    }

    /// Whether all non-best-effort backups have finished successfully
    pub fn backups_settled(&self) -> bool {
        self.backups
            .values()
            .all(|s| !matches!(s, BackupState::Pending))
    }

    /// Produce the terminal report entry for this candidate
    pub fn report(&self) -> FileReport {
        FileReport {
            source: self.file.path.clone(),
            destination: self.destination.clone(),
            outcome: self.state,
            task: self.failed_task,
            reason: self.reason.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Final per-file outcome, suitable for an error-report view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub outcome: LifecycleState,
    pub task: Option<TaskKind>,
    pub reason: Option<FailureReason>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn candidate() -> FileCandidate {
        FileCandidate::new(
            Uuid::new_v4(),
            FileRef {
                device_id: Uuid::new_v4(),
                path: PathBuf::from("/media/CARD01/DCIM/IMG_0001.JPG"),
                size: 4_200_000,
                modified: SystemTime::UNIX_EPOCH,
                kind: FileKind::Photo,
            },
        )
    }

    #[test]
    fn starts_discovered() {
        let c = candidate();
        assert_eq!(c.state(), LifecycleState::Discovered);
        assert!(!c.is_terminal());
    }

    #[test]
    fn forward_transitions_succeed() {
        let mut c = candidate();
        c.advance(LifecycleState::MetadataPending).unwrap();
        c.advance(LifecycleState::MetadataReady).unwrap();
        c.advance(LifecycleState::NamingResolved).unwrap();
        c.advance(LifecycleState::CopyPending).unwrap();
        c.advance(LifecycleState::Copied).unwrap();
        c.advance(LifecycleState::VerifyPending).unwrap();
        c.advance(LifecycleState::Completed).unwrap();
        assert!(c.is_terminal());
    }

    #[test]
    fn backward_transition_is_rejected() {
        let mut c = candidate();
        c.advance(LifecycleState::MetadataReady).unwrap();
        assert!(c.advance(LifecycleState::Discovered).is_err());
        assert_eq!(c.state(), LifecycleState::MetadataReady);
    }

    #[test]
    fn any_state_may_fail() {
        let mut c = candidate();
        c.advance(LifecycleState::CopyPending).unwrap();
        c.fail(TaskKind::Copy, FailureReason::CopyIo("disk full".to_string()));
        assert_eq!(c.state(), LifecycleState::Failed);
        assert_eq!(c.failed_task, Some(TaskKind::Copy));
    }

    #[test]
    fn terminal_state_is_sticky() {
        let mut c = candidate();
        c.skip(TaskKind::Rename, FailureReason::NameConflict);
        assert!(c.advance(LifecycleState::Completed).is_err());
        c.fail(TaskKind::Copy, FailureReason::Cancelled);
        // fail() on a terminal candidate is a no-op
        assert_eq!(c.state(), LifecycleState::Skipped);
        assert_eq!(c.reason, Some(FailureReason::NameConflict));
    }

    #[test]
    fn report_carries_reason_and_task() {
        let mut c = candidate();
        c.fail(TaskKind::Extract, FailureReason::ExtractionCrashed);
        let report = c.report();
        assert_eq!(report.outcome, LifecycleState::Failed);
        assert_eq!(report.task, Some(TaskKind::Extract));
        assert_eq!(report.reason, Some(FailureReason::ExtractionCrashed));
    }

    #[test]
    fn backups_settled_accounts_for_pending() {
        let mut c = candidate();
        c.backups
            .insert(PathBuf::from("/backup1"), BackupState::Pending);
        c.backups
            .insert(PathBuf::from("/backup2"), BackupState::BackedUp);
        assert!(!c.backups_settled());

        c.backups
            .insert(PathBuf::from("/backup1"), BackupState::BackedUp);
        assert!(c.backups_settled());
    }
}
