//! End-to-end tests for the import pipeline.
//!
//! These drive the coordinator through the public API against real
//! temporary directories: scanning, extraction, naming, copy/verify,
//! backups, and the control surface.

use photo_importer::core::cache::InMemoryCache;
use photo_importer::core::extractor::{ByteRangeHint, Extraction, MediaMetadata, MetadataProvider};
use photo_importer::core::{
    Coordinator, ExifProvider, FailureReason, FileRef, FolderDevice, ImportConfig, LifecycleState,
};
use photo_importer::error::ExtractError;
use photo_importer::events::{null_sender, Event, EventChannel, SessionEvent};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn write_media(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, format!("media bytes for {name}")).unwrap();
    path
}

fn set_mtime(path: &Path, time: SystemTime) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

fn simple_coordinator(destination: &Path) -> Coordinator {
    Coordinator::new(
        ImportConfig::new(destination),
        Arc::new(ExifProvider::new()),
        Arc::new(InMemoryCache::new()),
        null_sender(),
    )
}

#[test]
fn import_emits_session_lifecycle_events() {
    let temp = TempDir::new().unwrap();
    let card = temp.path().join("card");
    write_media(&card, "DCIM/IMG_0001.JPG");
    write_media(&card, "DCIM/IMG_0002.JPG");

    let (sender, receiver) = EventChannel::new();
    let mut coordinator = Coordinator::new(
        ImportConfig::new(temp.path().join("photos")),
        Arc::new(ExifProvider::new()),
        Arc::new(InMemoryCache::new()),
        sender,
    );
    coordinator.add_device(Arc::new(FolderDevice::new(&card)));
    let report = coordinator.run().unwrap();

    assert_eq!(report.summary.files_completed, 2);

    let events: Vec<Event> = receiver.iter().collect();
    let started = events
        .iter()
        .any(|e| matches!(e, Event::Session(SessionEvent::Started { .. })));
    let completed = events.iter().any(|e| {
        matches!(
            e,
            Event::Session(SessionEvent::Completed { summary }) if summary.files_completed == 2
        )
    });
    assert!(started);
    assert!(completed);
}

#[test]
fn raw_jpeg_pair_shares_a_sequence_number() {
    let temp = TempDir::new().unwrap();
    let card = temp.path().join("card");
    let raw = write_media(&card, "DCIM/IMG_0042.CR2");
    let jpeg = write_media(&card, "DCIM/IMG_0042.JPG");
    let other = write_media(&card, "DCIM/IMG_0043.JPG");

    // One shutter press: identical modification times
    let shot = SystemTime::UNIX_EPOCH + Duration::from_secs(1_718_450_000);
    set_mtime(&raw, shot);
    set_mtime(&jpeg, shot);
    set_mtime(&other, shot + Duration::from_secs(30));

    let mut coordinator = simple_coordinator(&temp.path().join("photos"));
    coordinator.add_device(Arc::new(FolderDevice::new(&card)));
    let report = coordinator.run().unwrap();

    assert_eq!(report.summary.files_completed, 3);

    let dest_of = |name: &str| {
        report
            .files
            .iter()
            .find(|f| f.source.to_string_lossy().ends_with(name))
            .and_then(|f| f.destination.clone())
            .unwrap()
    };

    let raw_dest = dest_of("IMG_0042.CR2");
    let jpeg_dest = dest_of("IMG_0042.JPG");
    let other_dest = dest_of("IMG_0043.JPG");

    // The pair shares one drawn number: same stem, different extension
    assert_eq!(raw_dest.file_stem(), jpeg_dest.file_stem());
    // The counter moved exactly once for the pair
    assert!(raw_dest.to_string_lossy().ends_with("_0001.cr2"));
    assert!(other_dest.to_string_lossy().ends_with("_0002.jpg"));
}

#[test]
fn timeline_clusters_follow_capture_gaps() {
    let temp = TempDir::new().unwrap();
    let card = temp.path().join("card");
    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_718_450_000);

    // 100 shots two seconds apart, then one an hour later
    for i in 0..100u64 {
        let path = write_media(&card, &format!("DCIM/IMG_{i:04}.JPG"));
        set_mtime(&path, base + Duration::from_secs(i * 2));
    }
    let straggler = write_media(&card, "DCIM/IMG_9999.JPG");
    set_mtime(&straggler, base + Duration::from_secs(99 * 2 + 3600));

    let mut coordinator = simple_coordinator(&temp.path().join("photos"));
    coordinator.add_device(Arc::new(FolderDevice::new(&card)));
    let report = coordinator.run().unwrap();

    assert_eq!(report.summary.files_completed, 101);
    assert_eq!(report.clusters.len(), 2);
    assert_eq!(report.clusters[0].files.len(), 100);
    assert_eq!(report.clusters[1].files.len(), 1);
}

#[test]
fn sequence_numbers_persist_across_runs() {
    let temp = TempDir::new().unwrap();
    let sequence_file = temp.path().join("sequences.json");
    let dest = temp.path().join("photos");

    let card1 = temp.path().join("card1");
    write_media(&card1, "DCIM/IMG_0001.JPG");
    let mut config = ImportConfig::new(&dest);
    config.sequence_file = Some(sequence_file.clone());
    let mut first = Coordinator::new(
        config.clone(),
        Arc::new(ExifProvider::new()),
        Arc::new(InMemoryCache::new()),
        null_sender(),
    );
    first.add_device(Arc::new(FolderDevice::new(&card1)));
    let report = first.run().unwrap();
    assert!(report.files[0]
        .destination
        .as_ref()
        .unwrap()
        .to_string_lossy()
        .ends_with("_0001.jpg"));

    let card2 = temp.path().join("card2");
    write_media(&card2, "DCIM/IMG_0002.JPG");
    let mut second = Coordinator::new(
        config,
        Arc::new(ExifProvider::new()),
        Arc::new(InMemoryCache::new()),
        null_sender(),
    );
    second.add_device(Arc::new(FolderDevice::new(&card2)));
    let report = second.run().unwrap();

    // Downloads-today continues where the first run left it
    assert!(report.files[0]
        .destination
        .as_ref()
        .unwrap()
        .to_string_lossy()
        .ends_with("_0002.jpg"));
}

/// A provider that dies on one specific file, a limited number of times
struct CrashingProvider {
    poison: PathBuf,
    crashes: AtomicUsize,
    calls: AtomicUsize,
}

impl MetadataProvider for CrashingProvider {
    fn extract(&self, file: &FileRef, hint: ByteRangeHint) -> Result<Extraction, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if file.path == self.poison && self.crashes.load(Ordering::SeqCst) > 0 {
            self.crashes.fetch_sub(1, Ordering::SeqCst);
            panic!("simulated metadata library crash");
        }
        let _ = hint;
        Ok(Extraction {
            metadata: MediaMetadata::default(),
            thumbnail: None,
        })
    }

    fn invocations(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[test]
fn crashing_extraction_fails_one_file_not_the_batch() {
    let temp = TempDir::new().unwrap();
    let card = temp.path().join("card");
    let poison = write_media(&card, "DCIM/IMG_0002.JPG");
    write_media(&card, "DCIM/IMG_0001.JPG");
    write_media(&card, "DCIM/IMG_0003.JPG");

    let provider = Arc::new(CrashingProvider {
        poison: poison.clone(),
        crashes: AtomicUsize::new(usize::MAX),
        calls: AtomicUsize::new(0),
    });

    let mut coordinator = Coordinator::new(
        ImportConfig::new(temp.path().join("photos")),
        provider,
        Arc::new(InMemoryCache::new()),
        null_sender(),
    );
    coordinator.add_device(Arc::new(FolderDevice::new(&card)));
    let report = coordinator.run().unwrap();

    assert_eq!(report.summary.files_completed, 2);
    assert_eq!(report.summary.files_failed, 1);

    let failed = report
        .files
        .iter()
        .find(|f| f.outcome == LifecycleState::Failed)
        .unwrap();
    assert_eq!(failed.source, poison);
    assert_eq!(failed.reason, Some(FailureReason::ExtractionCrashed));
}

#[test]
fn extractor_crash_is_retried_once_then_succeeds() {
    let temp = TempDir::new().unwrap();
    let card = temp.path().join("card");
    let poison = write_media(&card, "DCIM/IMG_0001.JPG");

    let provider = Arc::new(CrashingProvider {
        poison,
        crashes: AtomicUsize::new(1),
        calls: AtomicUsize::new(0),
    });

    let mut coordinator = Coordinator::new(
        ImportConfig::new(temp.path().join("photos")),
        provider.clone(),
        Arc::new(InMemoryCache::new()),
        null_sender(),
    );
    coordinator.add_device(Arc::new(FolderDevice::new(&card)));
    let report = coordinator.run().unwrap();

    // First attempt dies, the automatic retry lands the file
    assert_eq!(provider.invocations(), 2);
    assert_eq!(report.summary.files_completed, 1);
    assert_eq!(report.summary.files_failed, 0);
}

#[test]
fn cancellation_mid_run_leaves_only_terminal_states() {
    let temp = TempDir::new().unwrap();
    let card = temp.path().join("card");
    for i in 0..40 {
        write_media(&card, &format!("DCIM/IMG_{i:04}.JPG"));
    }

    let mut coordinator = simple_coordinator(&temp.path().join("photos"));
    coordinator.add_device(Arc::new(FolderDevice::new(&card)));
    let control = coordinator.control();

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        control.cancel_all();
    });

    let report = coordinator.run().unwrap();
    canceller.join().unwrap();

    assert_eq!(report.summary.files_incomplete, 0);
    for file in &report.files {
        assert!(file.outcome.is_terminal());
    }
}

#[test]
fn paused_import_resumes_and_completes() {
    let temp = TempDir::new().unwrap();
    let card = temp.path().join("card");
    write_media(&card, "DCIM/IMG_0001.JPG");
    write_media(&card, "DCIM/IMG_0002.JPG");

    let mut coordinator = simple_coordinator(&temp.path().join("photos"));
    coordinator.add_device(Arc::new(FolderDevice::new(&card)));
    let control = coordinator.control();
    control.pause();

    let resumer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        control.resume();
    });

    let report = coordinator.run().unwrap();
    resumer.join().unwrap();

    assert_eq!(report.summary.files_completed, 2);
}

#[test]
fn empty_source_imports_nothing() {
    let temp = TempDir::new().unwrap();
    let card = temp.path().join("card");
    std::fs::create_dir_all(&card).unwrap();

    let mut coordinator = simple_coordinator(&temp.path().join("photos"));
    coordinator.add_device(Arc::new(FolderDevice::new(&card)));
    let report = coordinator.run().unwrap();

    assert_eq!(report.summary.files_completed, 0);
    assert!(report.files.is_empty());
    assert!(report.clusters.is_empty());
}

#[test]
fn two_devices_import_concurrently_without_collisions() {
    let temp = TempDir::new().unwrap();
    let card_a = temp.path().join("card_a");
    let card_b = temp.path().join("card_b");
    for i in 0..5 {
        write_media(&card_a, &format!("DCIM/IMG_{i:04}.JPG"));
        write_media(&card_b, &format!("DCIM/DSC_{i:04}.JPG"));
    }

    let mut coordinator = simple_coordinator(&temp.path().join("photos"));
    coordinator.add_device(Arc::new(FolderDevice::new(&card_a)));
    coordinator.add_device(Arc::new(FolderDevice::new(&card_b)));
    let report = coordinator.run().unwrap();

    assert_eq!(report.summary.files_completed, 10);
    let destinations: std::collections::HashSet<_> = report
        .files
        .iter()
        .filter_map(|f| f.destination.clone())
        .collect();
    assert_eq!(destinations.len(), 10);
    for destination in destinations {
        assert!(destination.exists());
    }
}
