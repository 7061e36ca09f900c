//! Byte-range hints: how much of a file must be read to extract metadata.
//!
//! Large videos keep their metadata atoms near one end of the container;
//! reading the whole file just to learn the capture time would dominate
//! import time on slow card readers. The table below is a conservative
//! per-format ceiling learned from real camera output.

use crate::core::device::{FileKind, FileRef};
use serde::{Deserialize, Serialize};

/// How many bytes of the file a provider should need to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteRangeHint {
    /// Read at most this many bytes from the start of the file
    Prefix(u64),
    /// No known bound; the provider may read the entire file
    WholeFile,
}

impl ByteRangeHint {
    /// Look up the hint for a file based on its extension and kind
    pub fn for_file(file: &FileRef) -> ByteRangeHint {
        let ext = file.extension();
        match ext.as_str() {
            // JPEG APP1 segment sits at the front
            "jpg" | "jpe" | "jpeg" => ByteRangeHint::Prefix(512 * 1024),
            // TIFF-based RAW: IFDs and embedded preview in the first MiB or two
            "cr2" | "cr3" | "nef" | "arw" | "dng" | "orf" | "raf" | "rw2" | "pef" | "srw" => {
                ByteRangeHint::Prefix(2 * 1024 * 1024)
            }
            "heic" | "heif" => ByteRangeHint::Prefix(1024 * 1024),
            "png" | "tif" | "tiff" | "webp" => ByteRangeHint::Prefix(1024 * 1024),
            // QuickTime/MP4 moov atom is usually within the first few MiB
            // for camera output, but can trail the mdat
            "mov" | "mp4" | "3gp" => ByteRangeHint::Prefix(8 * 1024 * 1024),
            _ => match file.kind {
                FileKind::Video => ByteRangeHint::WholeFile,
                _ => ByteRangeHint::Prefix(4 * 1024 * 1024),
            },
        }
    }

    /// The byte bound, when one exists
    pub fn bytes(&self) -> Option<u64> {
        match self {
            ByteRangeHint::Prefix(n) => Some(*n),
            ByteRangeHint::WholeFile => None,
        }
    }
}
