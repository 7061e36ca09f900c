//! # Extractor Module
//!
//! Metadata and thumbnail extraction, modeled as a capability.
//!
//! The engine never links metadata libraries directly into its control
//! flow: it talks to a [`MetadataProvider`] that, given a file reference
//! and a byte-range hint, returns a metadata mapping and optionally an
//! embedded preview. Providers run inside the worker pool so a crashing
//! extractor takes down one job, not the process.
//!
//! Which provider is available is probed once at startup and never
//! re-checked mid-pipeline.

mod exif_provider;
mod hints;

pub use exif_provider::ExifProvider;
pub use hints::ByteRangeHint;

use crate::core::device::FileRef;
use crate::error::ExtractError;
use chrono::{DateTime, Utc};
use crossbeam_channel::RecvTimeoutError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Metadata extracted from one media file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Capture date/time (DateTimeOriginal or container equivalent)
    pub capture_time: Option<DateTime<Utc>>,
    /// Sub-second fraction of the capture time, when recorded
    pub sub_second: Option<u32>,
    /// Camera make
    pub camera_make: Option<String>,
    /// Camera model
    pub camera_model: Option<String>,
    /// Camera body serial number
    pub camera_serial: Option<String>,
    /// Image width in pixels
    pub width: Option<u32>,
    /// Image height in pixels
    pub height: Option<u32>,
    /// Orientation (1-8, where 1 is normal)
    pub orientation: Option<u16>,
    /// Raw tag -> value mapping for template fields not modeled above
    pub tags: HashMap<String, String>,
}

impl MediaMetadata {
    /// Whether any field was extracted
    pub fn has_data(&self) -> bool {
        self.capture_time.is_some()
            || self.camera_make.is_some()
            || self.camera_model.is_some()
            || self.width.is_some()
            || !self.tags.is_empty()
    }
}

/// Result of a successful extraction
#[derive(Debug, Clone)]
pub struct Extraction {
    pub metadata: MediaMetadata,
    /// Encoded thumbnail bytes (JPEG), when one could be produced
    pub thumbnail: Option<Vec<u8>>,
}

/// Capability: extract metadata and a preview from one file.
///
/// Implementations must be cheap to share across worker threads and must
/// honor the byte-range hint where the underlying format allows it.
pub trait MetadataProvider: Send + Sync {
    /// Extract metadata and an optional thumbnail
    fn extract(&self, file: &FileRef, hint: ByteRangeHint) -> Result<Extraction, ExtractError>;

    /// Number of times `extract` has actually run (cache hits bypass it).
    /// Used to verify re-scan idempotence.
    fn invocations(&self) -> usize;
}

/// Outcome of the startup capability probe
pub enum ProviderAvailability {
    Available(Arc<dyn MetadataProvider>),
    Unavailable { reason: String },
}

impl ProviderAvailability {
    /// Probe for a usable provider. Selected once at startup.
    pub fn probe() -> Self {
        // The EXIF provider is compiled in and has no runtime dependency
        // to check, so probing cannot fail today. The enum stays so a
        // missing external tool (exiftool-style provider) is representable.
        ProviderAvailability::Available(Arc::new(ExifProvider::new()))
    }
}

/// Run an extraction with a per-file wall-clock ceiling.
///
/// The provider call runs on a helper thread; on timeout the thread is
/// abandoned (it holds only a file handle) and the file proceeds without
/// a thumbnail.
pub fn extract_with_timeout(
    provider: Arc<dyn MetadataProvider>,
    file: &FileRef,
    hint: ByteRangeHint,
    timeout: Duration,
) -> Result<Extraction, ExtractError> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let file_clone = file.clone();

    std::thread::spawn(move || {
        let result = provider.extract(&file_clone, hint);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(ExtractError::Timeout {
            path: file.path.clone(),
            seconds: timeout.as_secs(),
        }),
        Err(RecvTimeoutError::Disconnected) => Err(ExtractError::ExtractionCrashed {
            path: file.path.clone(),
        }),
    }
}
