//! File kind detection by extension.
//!
//! Extension tables follow what cameras actually write to cards: JPEG and
//! the common RAW families for photos, the AVCHD/QuickTime/MP4 families for
//! video, audio annotations some cameras record, and the sidecar files
//! (XMP, THM) that travel with a primary file.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Detected kind of a candidate file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Photo,
    Video,
    Audio,
    Sidecar,
}

const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpe", "jpeg", "png", "heic", "heif", "tif", "tiff", "webp",
    // RAW families
    "arw", "cr2", "cr3", "crw", "dng", "nef", "nrw", "orf", "pef", "raf", "raw", "rw2", "sr2",
    "srw", "x3f",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "3gp", "avi", "m2t", "m2ts", "mkv", "mov", "mp4", "mpeg", "mpg", "mts", "tod", "mod",
];

const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3"];

const SIDECAR_EXTENSIONS: &[&str] = &["xmp", "thm", "log"];

/// RAW photo extensions, needed for RAW+JPEG pairing
const RAW_EXTENSIONS: &[&str] = &[
    "arw", "cr2", "cr3", "crw", "dng", "nef", "nrw", "orf", "pef", "raf", "raw", "rw2", "sr2",
    "srw", "x3f",
];

const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpe", "jpeg"];

impl FileKind {
    /// Detect the kind of a file from its extension.
    ///
    /// Returns None for files the importer does not handle.
    pub fn detect(path: &Path) -> Option<FileKind> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        let ext = ext.as_str();

        if PHOTO_EXTENSIONS.contains(&ext) {
            Some(FileKind::Photo)
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Some(FileKind::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            Some(FileKind::Audio)
        } else if SIDECAR_EXTENSIONS.contains(&ext) {
            Some(FileKind::Sidecar)
        } else {
            None
        }
    }
}

/// Whether the extension is a RAW photo format
pub fn is_raw_extension(ext: &str) -> bool {
    RAW_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

/// Whether the extension is a JPEG variant
pub fn is_jpeg_extension(ext: &str) -> bool {
    JPEG_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn detects_jpeg_as_photo() {
        assert_eq!(
            FileKind::detect(&PathBuf::from("IMG_0001.JPG")),
            Some(FileKind::Photo)
        );
    }

    #[test]
    fn detects_raw_as_photo() {
        assert_eq!(
            FileKind::detect(&PathBuf::from("IMG_0001.CR2")),
            Some(FileKind::Photo)
        );
        assert!(is_raw_extension("CR2"));
        assert!(!is_raw_extension("jpg"));
    }

    #[test]
    fn detects_video() {
        assert_eq!(
            FileKind::detect(&PathBuf::from("clip.MOV")),
            Some(FileKind::Video)
        );
    }

    #[test]
    fn detects_sidecar() {
        assert_eq!(
            FileKind::detect(&PathBuf::from("IMG_0001.xmp")),
            Some(FileKind::Sidecar)
        );
    }

    #[test]
    fn ignores_unknown_extension() {
        assert_eq!(FileKind::detect(&PathBuf::from("readme.txt")), None);
        assert_eq!(FileKind::detect(&PathBuf::from("no_extension")), None);
    }

    #[test]
    fn jpeg_variants_pair_with_raw() {
        assert!(is_jpeg_extension("jpeg"));
        assert!(is_jpeg_extension("JPE"));
        assert!(!is_jpeg_extension("png"));
    }
}
