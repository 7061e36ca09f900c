//! # Core Module
//!
//! The UI-agnostic import engine.
//!
//! ## Modules
//! - `device` - Enumerates candidate files on source devices
//! - `candidate` - The per-file data model and lifecycle state machine
//! - `extractor` - Metadata and thumbnail extraction (capability-based)
//! - `cache` - Thumbnail cache keyed by file identity
//! - `naming` - Sequence counters and destination-name resolution
//! - `pool` - Crash-isolated worker pools
//! - `copier` - Chunked copy, verification, and backup targets
//! - `coordinator` - Owns candidates and drives the pipeline
//! - `timeline` - Groups files by capture-time proximity

pub mod cache;
pub mod candidate;
pub mod coordinator;
pub mod copier;
pub mod device;
pub mod extractor;
pub mod naming;
pub mod pool;
pub mod timeline;

// Re-export commonly used types
pub use candidate::{FailureReason, FileCandidate, FileReport, LifecycleState, TaskKind};
pub use coordinator::{Coordinator, ImportConfig, ImportControl, ImportReport};
pub use copier::{BackupPolicy, BackupTarget};
pub use device::{DeviceIdentity, DeviceSource, FileKind, FileRef, FolderDevice};
pub use extractor::{ExifProvider, MediaMetadata, MetadataProvider, ProviderAvailability};
pub use naming::{ConflictPolicy, NamingConfig, NamingEngine, SequenceState};
pub use timeline::TimelineCluster;
