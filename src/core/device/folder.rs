//! Folder-backed device implementation using walkdir.
//!
//! Treats any mounted directory tree (card reader, MTP mount point, plain
//! folder) as a source device. Camera model/serial are taken from the
//! constructor when the caller knows them (e.g. from a gphoto2 probe).

use super::{DeviceIdentity, DeviceSource, FileKind, FileRef};
use crate::error::ScanError;
use std::path::PathBuf;
use std::time::SystemTime;
use uuid::Uuid;
use walkdir::WalkDir;

/// A source device backed by a mounted directory tree
pub struct FolderDevice {
    identity: DeviceIdentity,
    root: PathBuf,
    follow_symlinks: bool,
}

impl FolderDevice {
    /// Create a device for a mounted folder
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let label = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.display().to_string());

        Self {
            identity: DeviceIdentity {
                id: Uuid::new_v4(),
                label,
                model: None,
                serial: None,
            },
            root,
            follow_symlinks: false,
        }
    }

    /// Attach camera identity known from an external probe
    pub fn with_camera(mut self, model: impl Into<String>, serial: Option<String>) -> Self {
        self.identity.model = Some(model.into());
        self.identity.serial = serial;
        self
    }

    /// Follow symbolic links during enumeration
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// The device's root path
    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

impl DeviceSource for FolderDevice {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn enumerate(&self) -> Result<Vec<FileRef>, ScanError> {
        if !self.root.exists() {
            return Err(ScanError::DeviceNotFound {
                path: self.root.clone(),
            });
        }

        let mut files = Vec::new();

        for entry_result in WalkDir::new(&self.root).follow_links(self.follow_symlinks) {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    if e.io_error().map(|e| e.kind())
                        == Some(std::io::ErrorKind::PermissionDenied)
                    {
                        return Err(ScanError::PermissionDenied { path });
                    }
                    // A vanished entry mid-walk usually means the card was pulled
                    return Err(ScanError::DeviceDisconnected);
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }

            // Hidden files are never camera media
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    continue;
                }
            }

            let kind = match FileKind::detect(path) {
                Some(kind) => kind,
                None => continue,
            };

            let metadata = entry.metadata().map_err(|e| ScanError::ReadFailed {
                path: path.to_path_buf(),
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("metadata unavailable")),
            })?;

            files.push(FileRef {
                device_id: self.identity.id,
                path: path.to_path_buf(),
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                kind,
            });
        }

        // Deterministic scan order: modification time, then lexical path
        files.sort_by(|a, b| {
            a.modified
                .cmp(&b.modified)
                .then_with(|| a.path.cmp(&b.path))
        });

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_file(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        path
    }

    #[test]
    fn enumerate_empty_folder_returns_empty_vec() {
        let temp_dir = TempDir::new().unwrap();
        let device = FolderDevice::new(temp_dir.path());

        let files = device.enumerate().unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn enumerate_finds_media_files_only() {
        let temp_dir = TempDir::new().unwrap();
        create_file(&temp_dir, "IMG_0001.JPG");
        create_file(&temp_dir, "IMG_0001.CR2");
        create_file(&temp_dir, "clip.mov");
        create_file(&temp_dir, "notes.txt");

        let device = FolderDevice::new(temp_dir.path());
        let files = device.enumerate().unwrap();

        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| !f.path.ends_with("notes.txt")));
    }

    #[test]
    fn enumerate_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        create_file(&temp_dir, "b.jpg");
        create_file(&temp_dir, "a.jpg");
        create_file(&temp_dir, "c.jpg");

        let device = FolderDevice::new(temp_dir.path());
        let first: Vec<_> = device.enumerate().unwrap().iter().map(|f| f.path.clone()).collect();
        let second: Vec<_> = device.enumerate().unwrap().iter().map(|f| f.path.clone()).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn enumerate_skips_hidden_files() {
        let temp_dir = TempDir::new().unwrap();
        create_file(&temp_dir, "visible.jpg");
        create_file(&temp_dir, ".hidden.jpg");

        let device = FolderDevice::new(temp_dir.path());
        let files = device.enumerate().unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("visible.jpg"));
    }

    #[test]
    fn missing_root_is_device_not_found() {
        let device = FolderDevice::new("/nonexistent/card/12345");
        let result = device.enumerate();
        assert!(matches!(result, Err(ScanError::DeviceNotFound { .. })));
    }

    #[test]
    fn camera_identity_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let device = FolderDevice::new(temp_dir.path())
            .with_camera("EOS R5", Some("123456".to_string()));

        assert_eq!(device.identity().model.as_deref(), Some("EOS R5"));
        assert_eq!(device.identity().serial.as_deref(), Some("123456"));
    }
}
