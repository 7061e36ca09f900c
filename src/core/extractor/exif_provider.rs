//! EXIF-backed metadata provider.
//!
//! Parses EXIF from JPEG/TIFF-family files with kamadak-exif and builds
//! thumbnails by decoding the image and downscaling it. Video containers
//! are not parsed by this provider and report `UnsupportedFormat`; the
//! pipeline downloads those files un-thumbnailed with mtime fallback.

use super::{ByteRangeHint, Extraction, MediaMetadata, MetadataProvider};
use crate::core::device::{FileKind, FileRef};
use crate::error::ExtractError;
use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{In, Reader, Tag, Value};
use image::ImageReader;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Longest edge of generated thumbnails, in pixels
const THUMBNAIL_EDGE: u32 = 160;

/// Metadata provider backed by kamadak-exif and the image crate
pub struct ExifProvider {
    invocations: AtomicUsize,
}

impl ExifProvider {
    pub fn new() -> Self {
        Self {
            invocations: AtomicUsize::new(0),
        }
    }

    fn read_prefix(file: &FileRef, hint: ByteRangeHint) -> Result<Vec<u8>, ExtractError> {
        let handle = std::fs::File::open(&file.path).map_err(|e| ExtractError::IoError {
            path: file.path.clone(),
            source: e,
        })?;

        let mut buffer = Vec::new();
        match hint.bytes() {
            Some(limit) => {
                handle
                    .take(limit)
                    .read_to_end(&mut buffer)
                    .map_err(|e| ExtractError::IoError {
                        path: file.path.clone(),
                        source: e,
                    })?;
            }
            None => {
                let mut handle = handle;
                handle
                    .read_to_end(&mut buffer)
                    .map_err(|e| ExtractError::IoError {
                        path: file.path.clone(),
                        source: e,
                    })?;
            }
        }
        Ok(buffer)
    }

    fn parse_exif(bytes: &[u8]) -> MediaMetadata {
        let mut metadata = MediaMetadata::default();

        let exif_reader = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
            Ok(r) => r,
            Err(_) => return metadata,
        };

        if let Some(field) = exif_reader.get_field(Tag::DateTimeOriginal, In::PRIMARY) {
            if let Some(s) = get_string_value(&field.value) {
                // EXIF date format: "YYYY:MM:DD HH:MM:SS"
                if let Ok(naive) = NaiveDateTime::parse_from_str(&s, "%Y:%m:%d %H:%M:%S") {
                    metadata.capture_time = Some(DateTime::from_naive_utc_and_offset(naive, Utc));
                }
            }
        }

        if let Some(field) = exif_reader.get_field(Tag::SubSecTimeOriginal, In::PRIMARY) {
            if let Some(s) = get_string_value(&field.value) {
                metadata.sub_second = s.trim().parse::<u32>().ok();
            }
        }

        if let Some(field) = exif_reader.get_field(Tag::Make, In::PRIMARY) {
            metadata.camera_make = get_string_value(&field.value);
        }
        if let Some(field) = exif_reader.get_field(Tag::Model, In::PRIMARY) {
            metadata.camera_model = get_string_value(&field.value);
        }
        if let Some(field) = exif_reader.get_field(Tag::BodySerialNumber, In::PRIMARY) {
            metadata.camera_serial = get_string_value(&field.value);
        }

        if let Some(field) = exif_reader.get_field(Tag::PixelXDimension, In::PRIMARY) {
            metadata.width = get_u32_value(&field.value);
        }
        if let Some(field) = exif_reader.get_field(Tag::PixelYDimension, In::PRIMARY) {
            metadata.height = get_u32_value(&field.value);
        }
        if let Some(field) = exif_reader.get_field(Tag::Orientation, In::PRIMARY) {
            if let Value::Short(ref vec) = field.value {
                metadata.orientation = vec.first().copied();
            }
        }

        // Keep everything else as raw tag text for template fields
        for field in exif_reader.fields() {
            if field.ifd_num == In::PRIMARY {
                metadata.tags.insert(
                    field.tag.to_string(),
                    field.display_value().to_string(),
                );
            }
        }

        metadata
    }

    fn build_thumbnail(file: &FileRef) -> Option<Vec<u8>> {
        let decoded = ImageReader::open(&file.path).ok()?.decode().ok()?;
        let thumb = decoded.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE);

        let mut bytes = Vec::new();
        thumb
            .into_rgb8()
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .ok()?;
        Some(bytes)
    }
}

impl Default for ExifProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataProvider for ExifProvider {
    fn extract(&self, file: &FileRef, hint: ByteRangeHint) -> Result<Extraction, ExtractError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        match file.kind {
            FileKind::Photo => {}
            _ => {
                return Err(ExtractError::UnsupportedFormat {
                    path: file.path.clone(),
                    format: file.extension(),
                })
            }
        }

        let prefix = Self::read_prefix(file, hint)?;
        let metadata = Self::parse_exif(&prefix);
        let thumbnail = Self::build_thumbnail(file);

        Ok(Extraction {
            metadata,
            thumbnail,
        })
    }

    fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

/// Helper to extract u32 from various EXIF value types
fn get_u32_value(value: &Value) -> Option<u32> {
    match value {
        Value::Long(vec) => vec.first().copied(),
        Value::Short(vec) => vec.first().map(|v| *v as u32),
        _ => None,
    }
}

/// Helper to extract string from EXIF ASCII value
fn get_string_value(value: &Value) -> Option<String> {
    if let Value::Ascii(ref vec) = value {
        if let Some(bytes) = vec.first() {
            if let Ok(s) = std::str::from_utf8(bytes) {
                let trimmed = s.trim_end_matches('\0').trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::SystemTime;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn file_ref(path: PathBuf, kind: FileKind) -> FileRef {
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        FileRef {
            device_id: Uuid::new_v4(),
            path,
            size,
            modified: SystemTime::UNIX_EPOCH,
            kind,
        }
    }

    /// Minimal valid 1x1 PNG
    fn create_test_png(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(&[
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
            0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00,
            0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08,
            0xD7, 0x63, 0xF8, 0xFF, 0xFF, 0x3F, 0x00, 0x05, 0xFE, 0x02, 0xFE, 0xDC, 0xCC, 0x59,
            0xE7, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
        ])
        .unwrap();
        path
    }

    #[test]
    fn extracting_png_produces_thumbnail_without_exif() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_test_png(&temp_dir, "pixel.png");
        let file = file_ref(path, FileKind::Photo);

        let provider = ExifProvider::new();
        let extraction = provider
            .extract(&file, ByteRangeHint::for_file(&file))
            .unwrap();

        // No EXIF in a bare PNG, but the pixel data decodes
        assert!(extraction.metadata.capture_time.is_none());
        assert!(extraction.thumbnail.is_some());
        assert_eq!(provider.invocations(), 1);
    }

    #[test]
    fn corrupt_photo_still_yields_extraction() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.jpg");
        std::fs::write(&path, b"not a jpeg at all").unwrap();
        let file = file_ref(path, FileKind::Photo);

        let provider = ExifProvider::new();
        let extraction = provider
            .extract(&file, ByteRangeHint::for_file(&file))
            .unwrap();

        assert!(!extraction.metadata.has_data());
        assert!(extraction.thumbnail.is_none());
    }

    #[test]
    fn video_reports_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mov");
        std::fs::write(&path, b"\x00\x00\x00\x14ftypqt  ").unwrap();
        let file = file_ref(path, FileKind::Video);

        let provider = ExifProvider::new();
        let result = provider.extract(&file, ByteRangeHint::for_file(&file));

        assert!(matches!(
            result,
            Err(ExtractError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let file = file_ref(PathBuf::from("/nonexistent/IMG_0001.JPG"), FileKind::Photo);
        let provider = ExifProvider::new();
        let result = provider.extract(&file, ByteRangeHint::for_file(&file));
        assert!(matches!(result, Err(ExtractError::IoError { .. })));
    }
}
