//! # Copier Module
//!
//! Destination filesystem operations: chunked copy with cooperative
//! cancellation, checksum verification, retry with backoff, and backup
//! fan-out targets.
//!
//! Verification never deletes anything from the source: a mismatch is
//! terminal for the file and leaves the source untouched for the user
//! to inspect.

use crate::core::pool::CancelFlag;
use crate::error::CopyError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use xxhash_rust::xxh3::Xxh3;

/// Copy loop chunk size; also the cancellation checkpoint granularity
const CHUNK_SIZE: usize = 1024 * 1024;

/// Automatic retries for transient I/O failures
const IO_RETRIES: u32 = 2;

/// Backoff between I/O retries
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Conflict policy for a backup target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupPolicy {
    /// Replace an existing file at the target
    Overwrite,
    /// Leave an existing file alone and mark the sub-job skipped
    Skip,
}

/// One backup destination, independent of the primary download destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupTarget {
    /// Root directory of the backup volume
    pub root: PathBuf,
    /// What to do when the file already exists there
    pub policy: BackupPolicy,
    /// Best-effort targets do not hold up file completion when they fail
    pub best_effort: bool,
}

/// Capability: the destination filesystem used by copy/verify/backup
pub trait DestinationFs: Send + Sync {
    /// Copy src to dst, returning bytes written.
    ///
    /// Checks `cancel` between chunks; a cancelled copy removes its
    /// partial destination file and returns `CopyError::Cancelled`.
    fn copy(&self, src: &Path, dst: &Path, cancel: &CancelFlag) -> Result<u64, CopyError>;

    /// Whether dst's content matches src
    fn verify(&self, src: &Path, dst: &Path) -> Result<bool, CopyError>;

    fn exists(&self, path: &Path) -> bool;
}

/// Local filesystem implementation
#[derive(Debug, Default, Clone)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }

    fn copy_once(src: &Path, dst: &Path, cancel: &CancelFlag) -> Result<u64, CopyError> {
        let io_err = |e: std::io::Error| CopyError::Io {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            source: e,
        };

        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut reader = File::open(src).map_err(io_err)?;
        let mut writer = File::create(dst).map_err(io_err)?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;

        loop {
            // Cancellation checkpoint between file reads
            if cancel.is_cancelled() {
                drop(writer);
                let _ = std::fs::remove_file(dst);
                return Err(CopyError::Cancelled);
            }

            let n = reader.read(&mut buffer).map_err(io_err)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n]).map_err(io_err)?;
            written += n as u64;
        }

        writer.flush().map_err(io_err)?;
        drop(writer);

        // Carry the source mtime so date-based tools agree on both copies
        if let Ok(metadata) = std::fs::metadata(src) {
            if let Ok(mtime) = metadata.modified() {
                let _ = File::options()
                    .write(true)
                    .open(dst)
                    .and_then(|f| f.set_modified(mtime));
            }
        }

        Ok(written)
    }
}

impl DestinationFs for LocalFs {
    fn copy(&self, src: &Path, dst: &Path, cancel: &CancelFlag) -> Result<u64, CopyError> {
        let mut attempt = 0;
        loop {
            match Self::copy_once(src, dst, cancel) {
                Ok(written) => return Ok(written),
                Err(CopyError::Cancelled) => return Err(CopyError::Cancelled),
                Err(e) if attempt < IO_RETRIES => {
                    attempt += 1;
                    warn!(
                        src = %src.display(),
                        attempt,
                        "copy failed, retrying: {e}"
                    );
                    std::thread::sleep(RETRY_BACKOFF);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn verify(&self, src: &Path, dst: &Path) -> Result<bool, CopyError> {
        let io_err = |path: &Path, e: std::io::Error| CopyError::Io {
            src: src.to_path_buf(),
            dst: path.to_path_buf(),
            source: e,
        };

        // Size fast-path before hashing anything
        let src_len = std::fs::metadata(src).map_err(|e| io_err(src, e))?.len();
        let dst_len = std::fs::metadata(dst).map_err(|e| io_err(dst, e))?.len();
        if src_len != dst_len {
            return Ok(false);
        }

        let src_hash = hash_file(src).map_err(|e| io_err(src, e))?;
        let dst_hash = hash_file(dst).map_err(|e| io_err(dst, e))?;
        debug!(src = %src.display(), matched = (src_hash == dst_hash), "verified");
        Ok(src_hash == dst_hash)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// xxh3 hash of a file's content
pub fn hash_file(path: &Path) -> std::io::Result<u64> {
    let mut file = File::open(path)?;
    let mut hasher = Xxh3::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.digest())
}

/// Outcome of one backup sub-job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    BackedUp,
    /// Target had the file and its policy is Skip
    SkippedExisting,
    Failed(String),
}

/// Copy one verified file to a backup target.
///
/// Backups preserve the file's resolved destination name, placed relative
/// to the target root.
pub fn backup_file(
    fs: &dyn DestinationFs,
    target: &BackupTarget,
    source: &Path,
    relative_destination: &Path,
    cancel: &CancelFlag,
) -> BackupOutcome {
    if !target.root.exists() {
        return BackupOutcome::Failed(
            CopyError::BackupTargetUnavailable {
                root: target.root.clone(),
            }
            .to_string(),
        );
    }

    let dst = target.root.join(relative_destination);

    if fs.exists(&dst) {
        match target.policy {
            BackupPolicy::Skip => return BackupOutcome::SkippedExisting,
            BackupPolicy::Overwrite => {}
        }
    }

    match fs.copy(source, &dst, cancel) {
        Ok(_) => match fs.verify(source, &dst) {
            Ok(true) => BackupOutcome::BackedUp,
            Ok(false) => BackupOutcome::Failed(
                CopyError::VerificationMismatch {
                    src: source.to_path_buf(),
                    dst,
                }
                .to_string(),
            ),
            Err(e) => BackupOutcome::Failed(e.to_string()),
        },
        Err(e) => BackupOutcome::Failed(e.to_string()),
    }
}
