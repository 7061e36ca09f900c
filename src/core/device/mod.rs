//! # Device Module
//!
//! Source device enumeration.
//!
//! A "device" is anything that can hand the importer a restartable list of
//! candidate files plus identity metadata usable in naming templates
//! (camera model, serial). Real mounting/unmounting is out of scope; the
//! built-in implementation treats a mounted folder (card reader, MTP mount,
//! plain directory) as a device.

mod folder;
mod kind;

pub use folder::FolderDevice;
pub use kind::{is_jpeg_extension, is_raw_extension, FileKind};

use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use uuid::Uuid;

/// Identity metadata for a source device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Stable identifier for this device within the process
    pub id: Uuid,
    /// Human-readable label (volume name or folder name)
    pub label: String,
    /// Camera model, when the device exposes one
    pub model: Option<String>,
    /// Camera serial number, when the device exposes one
    pub serial: Option<String>,
}

/// A reference to one file on a source device.
///
/// This is the immutable snapshot handed to workers; identity is the
/// tuple (device id, path, size, mtime).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    /// Owning device
    pub device_id: Uuid,
    /// Absolute path on the source device
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Filesystem modification time
    pub modified: SystemTime,
    /// Detected kind (photo/video/audio/sidecar)
    pub kind: FileKind,
}

impl FileRef {
    /// Base filename without extension, used for RAW+JPEG pairing and
    /// sidecar association.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Lowercased extension, empty string when absent.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// Capability: enumerate candidate files on one source device.
///
/// `enumerate` must be restartable: calling it twice on an unchanged
/// device yields the same files in the same deterministic order
/// (modification time, ties broken by lexical path order).
pub trait DeviceSource: Send + Sync {
    /// Identity metadata for naming-template fields
    fn identity(&self) -> &DeviceIdentity;

    /// Enumerate candidate files in deterministic order
    fn enumerate(&self) -> Result<Vec<FileRef>, ScanError>;
}
