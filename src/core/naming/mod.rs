//! # Naming Module
//!
//! The sequence & naming engine: a pure computation mapping (file,
//! metadata, template, counters) to a unique destination path.
//!
//! ## Discipline
//! The engine is deliberately not thread-safe: the coordinator serializes
//! all calls (single-writer), which is what keeps the uniqueness set and
//! the sequence counters consistent without locks.
//!
//! ## Collision handling
//! Uniqueness is checked first against the in-memory set of destinations
//! already resolved this session, then against the filesystem for files
//! from prior sessions. Per policy a collision either skips the file or
//! appends an incrementing `_1`, `_2`, ... suffix that is never reused.

mod sequence;
mod sync;

pub use sequence::{SequenceDraw, SequenceState};
pub use sync::{CaptureKey, SyncRawJpeg};

use crate::core::device::{is_jpeg_extension, is_raw_extension, FileRef};
use crate::core::extractor::MediaMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Date rendering choices for template components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatePart {
    /// 20240615
    Ymd,
    /// 2024-06-15
    IsoDate,
    /// 2024
    Year,
    /// 06
    Month,
    /// 15
    Day,
    /// 103042
    Hms,
}

impl DatePart {
    fn render(&self, time: &DateTime<Utc>) -> String {
        let fmt = match self {
            DatePart::Ymd => "%Y%m%d",
            DatePart::IsoDate => "%Y-%m-%d",
            DatePart::Year => "%Y",
            DatePart::Month => "%m",
            DatePart::Day => "%d",
            DatePart::Hms => "%H%M%S",
        };
        time.format(fmt).to_string()
    }
}

/// One ordered component of a naming template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameComponent {
    /// Literal text (also used as separators)
    Literal(String),
    /// A capture-date part
    Date(DatePart),
    /// Session sequence number, zero-padded to `width`
    SequenceNumber { width: usize },
    /// Downloads-today counter, zero-padded to `width`
    DownloadsToday { width: usize },
    /// Stored (across-run) counter, zero-padded to `width`
    StoredNumber { width: usize },
    /// The user-assigned job code
    JobCode,
    /// Original filename without extension
    OriginalStem,
    /// Camera model from metadata or device identity
    CameraModel,
    /// Camera serial number
    CameraSerial,
}

/// An ordered list of name components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingTemplate {
    pub components: Vec<NameComponent>,
}

impl NamingTemplate {
    pub fn new(components: Vec<NameComponent>) -> Self {
        Self { components }
    }

    /// The default filename template: `YYYYMMDD_NNNN`
    pub fn default_filename() -> Self {
        Self::new(vec![
            NameComponent::Date(DatePart::Ymd),
            NameComponent::Literal("_".to_string()),
            NameComponent::DownloadsToday { width: 4 },
        ])
    }

    /// The default subfolder template: `YYYY/2024-06-15`
    pub fn default_subfolder() -> Self {
        Self::new(vec![
            NameComponent::Date(DatePart::Year),
            NameComponent::Literal("/".to_string()),
            NameComponent::Date(DatePart::IsoDate),
        ])
    }

    fn render(&self, ctx: &RenderContext) -> String {
        let mut out = String::new();
        for component in &self.components {
            match component {
                NameComponent::Literal(text) => out.push_str(text),
                NameComponent::Date(part) => out.push_str(&part.render(&ctx.timestamp)),
                NameComponent::SequenceNumber { width } => {
                    out.push_str(&format!("{:0width$}", ctx.draw.session, width = width))
                }
                NameComponent::DownloadsToday { width } => out.push_str(&format!(
                    "{:0width$}",
                    ctx.draw.downloads_today,
                    width = width
                )),
                NameComponent::StoredNumber { width } => {
                    out.push_str(&format!("{:0width$}", ctx.draw.stored, width = width))
                }
                NameComponent::JobCode => {
                    if let Some(code) = ctx.job_code {
                        out.push_str(code)
                    }
                }
                NameComponent::OriginalStem => out.push_str(ctx.stem),
                NameComponent::CameraModel => {
                    if let Some(model) = ctx.camera_model {
                        out.push_str(model)
                    }
                }
                NameComponent::CameraSerial => {
                    if let Some(serial) = ctx.camera_serial {
                        out.push_str(serial)
                    }
                }
            }
        }
        out
    }
}

struct RenderContext<'a> {
    timestamp: DateTime<Utc>,
    draw: SequenceDraw,
    job_code: Option<&'a str>,
    stem: &'a str,
    camera_model: Option<&'a str>,
    camera_serial: Option<&'a str>,
}

/// What to do when two files would share a destination name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Mark the later file SKIPPED
    Skip,
    /// Append an incrementing `_N` suffix
    AddUniqueIdentifier,
}

/// Naming engine configuration
#[derive(Debug, Clone)]
pub struct NamingConfig {
    /// Primary destination root
    pub destination: PathBuf,
    /// Filename template (extension appended automatically)
    pub filename_template: NamingTemplate,
    /// Optional date-based subfolder template under the destination root
    pub subfolder_template: Option<NamingTemplate>,
    /// Collision policy
    pub policy: ConflictPolicy,
    /// Whether a RAW+JPEG pair shares one sequence draw
    pub synchronize_raw_jpeg: bool,
}

impl NamingConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            filename_template: NamingTemplate::default_filename(),
            subfolder_template: Some(NamingTemplate::default_subfolder()),
            policy: ConflictPolicy::AddUniqueIdentifier,
            synchronize_raw_jpeg: true,
        }
    }
}

/// One naming request, snapshotting everything the engine may read
pub struct NamingRequest<'a> {
    pub file: &'a FileRef,
    pub metadata: Option<&'a MediaMetadata>,
    pub job_code: Option<&'a str>,
    /// Camera model from device identity, used when metadata lacks one
    pub device_model: Option<&'a str>,
}

/// A successfully resolved destination
#[derive(Debug, Clone)]
pub struct ResolvedName {
    pub destination: PathBuf,
    pub draw: SequenceDraw,
    /// The capture timestamp fell back to filesystem mtime
    pub degraded_timestamp: bool,
    /// The `_N` suffix applied to resolve a collision, when any
    pub unique_suffix: Option<u32>,
}

/// Outcome of one naming call
#[derive(Debug, Clone)]
pub enum NamingOutcome {
    Resolved(ResolvedName),
    /// Policy was Skip and the name collided
    Skipped { destination: PathBuf },
}

/// The sequence & naming engine
pub struct NamingEngine {
    config: NamingConfig,
    sequences: SequenceState,
    sync: SyncRawJpeg,
    resolved: HashSet<PathBuf>,
}

impl NamingEngine {
    pub fn new(config: NamingConfig, sequences: SequenceState) -> Self {
        Self {
            config,
            sequences,
            sync: SyncRawJpeg::new(),
            resolved: HashSet::new(),
        }
    }

    /// Resolve the destination path for one file.
    ///
    /// Draws sequence numbers, applies RAW+JPEG synchronization, renders
    /// the templates, and resolves collisions per policy. Counters are
    /// committed even when the file later fails to copy.
    pub fn resolve(&mut self, request: &NamingRequest<'_>) -> NamingOutcome {
        let (timestamp, degraded) = self.effective_timestamp(request);

        let draw = self.draw_for(request, timestamp);

        let stem = request.file.stem();
        let camera_model = request
            .metadata
            .and_then(|m| m.camera_model.as_deref())
            .or(request.device_model);
        let camera_serial = request.metadata.and_then(|m| m.camera_serial.as_deref());

        let ctx = RenderContext {
            timestamp,
            draw,
            job_code: request.job_code,
            stem: &stem,
            camera_model,
            camera_serial,
        };

        let filename = self.config.filename_template.render(&ctx);
        let subfolder = self
            .config
            .subfolder_template
            .as_ref()
            .map(|t| t.render(&ctx));

        let extension = request.file.extension();
        let base_name = if extension.is_empty() {
            filename
        } else {
            format!("{}.{}", filename, extension)
        };

        let dir = match subfolder {
            Some(sub) => self.config.destination.join(sub),
            None => self.config.destination.clone(),
        };
        let candidate = dir.join(&base_name);

        if !self.is_taken(&candidate) {
            self.resolved.insert(candidate.clone());
            return NamingOutcome::Resolved(ResolvedName {
                destination: candidate,
                draw,
                degraded_timestamp: degraded,
                unique_suffix: None,
            });
        }

        match self.config.policy {
            ConflictPolicy::Skip => NamingOutcome::Skipped {
                destination: candidate,
            },
            ConflictPolicy::AddUniqueIdentifier => {
                let (unique, suffix) = self.add_unique_identifier(&candidate);
                self.resolved.insert(unique.clone());
                NamingOutcome::Resolved(ResolvedName {
                    destination: unique,
                    draw,
                    degraded_timestamp: degraded,
                    unique_suffix: Some(suffix),
                })
            }
        }
    }

    /// Destination for a sidecar: the primary's resolved path with the
    /// sidecar's extension.
    pub fn resolve_sidecar(&mut self, primary_destination: &Path, extension: &str) -> PathBuf {
        let destination = primary_destination.with_extension(extension);
        self.resolved.insert(destination.clone());
        destination
    }

    /// Persist sequence counters; called once at session end
    pub fn persist_sequences(&self) -> Result<(), crate::error::NamingError> {
        self.sequences.persist()
    }

    /// Capture timestamp with mtime fallback
    fn effective_timestamp(&self, request: &NamingRequest<'_>) -> (DateTime<Utc>, bool) {
        if let Some(time) = request.metadata.and_then(|m| m.capture_time) {
            return (time, false);
        }
        // Missing or corrupt capture metadata: fall back to mtime and
        // attach a degraded-metadata warning upstream
        (DateTime::<Utc>::from(request.file.modified), true)
    }

    /// Draw a sequence set, sharing the partner's draw for RAW+JPEG pairs
    fn draw_for(&mut self, request: &NamingRequest<'_>, timestamp: DateTime<Utc>) -> SequenceDraw {
        let ext = request.file.extension();
        let pairable = self.config.synchronize_raw_jpeg
            && (is_raw_extension(&ext) || is_jpeg_extension(&ext));

        if !pairable {
            return self.sequences.draw();
        }

        let key = CaptureKey {
            time: request.metadata.and_then(|m| m.capture_time).or(Some(timestamp)),
            sub_second: request.metadata.and_then(|m| m.sub_second),
        };
        let stem = request.file.stem();

        if let Some(shared) = self.sync.matching_pair(&stem, &key) {
            return shared;
        }

        let draw = self.sequences.draw();
        self.sync.record(&stem, key, draw);
        draw
    }

    /// Whether a destination is already claimed this session or on disk
    fn is_taken(&self, path: &Path) -> bool {
        self.resolved.contains(path) || path.exists()
    }

    /// Find the first free `_N`-suffixed variant
    fn add_unique_identifier(&self, path: &Path) -> (PathBuf, u32) {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("file");
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let parent = path.parent().unwrap_or(Path::new(""));

        let mut counter = 1u32;
        loop {
            let name = if ext.is_empty() {
                format!("{}_{}", stem, counter)
            } else {
                format!("{}_{}.{}", stem, counter, ext)
            };
            let candidate = parent.join(name);
            if !self.is_taken(&candidate) {
                return (candidate, counter);
            }
            counter += 1;
        }
    }
}
