//! # Coordinator Module
//!
//! Owns every [`FileCandidate`] and drives the pipeline:
//!
//! ```text
//! scan -> extract (metadata + thumbnail) -> naming -> copy/verify -> backup
//! ```
//!
//! Workers receive immutable snapshots and send typed results back; only
//! the coordinator mutates candidate state, which is what lets the naming
//! engine stay single-writer and lock-free. Dispatch is round-robin across
//! active device sessions with a bounded number of jobs in flight per
//! stage, so one large card does not starve another and copy jobs never
//! pile up faster than destination I/O drains them.
//!
//! Pause stops dispatching but lets in-flight jobs finish; cancelling a
//! session moves all its non-terminal candidates to FAILED(Cancelled) and
//! in-flight jobs abort at their next checkpoint.

use crate::core::candidate::{
    BackupState, FailureReason, FileCandidate, FileReport, LifecycleState, TaskKind,
};
use crate::core::cache::{ThumbCache, ThumbEntry};
use crate::core::copier::{backup_file, BackupOutcome, BackupTarget, DestinationFs, LocalFs};
use crate::core::device::{DeviceSource, FileRef};
use crate::core::extractor::{
    extract_with_timeout, ByteRangeHint, Extraction, MetadataProvider,
};
use crate::core::naming::{NamingConfig, NamingEngine, NamingOutcome, NamingRequest, SequenceState};
use crate::core::pool::{CancelFlag, JobId, JobOutcome, PoolJob, WorkerPool};
use crate::core::timeline::{cluster, TimelineCluster};
use crate::error::{CopyError, ExtractError, ImportError};
use crate::events::{
    BackupEvent, CopyEvent, CopyProgress, Event, EventSender, ExtractEvent, FileEvent, ImportSummary,
    ScanEvent, SessionEvent,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Poll slice while waiting on pool results
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Candidate key: (session, source path)
type Key = (Uuid, PathBuf);

/// Everything the coordinator needs to run one import
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Naming engine configuration (destination root, templates, policy)
    pub naming: NamingConfig,
    /// Backup fan-out targets
    pub backups: Vec<BackupTarget>,
    /// Job code applied to every file in this import
    pub job_code: Option<String>,
    /// Per-file extraction wall-clock ceiling
    pub extract_timeout: Duration,
    /// Maximum jobs in flight per stage
    pub queue_depth: usize,
    /// Timeline clustering gap threshold
    pub timeline_threshold: Duration,
    /// Where sequence counters persist across runs; None keeps them in memory
    pub sequence_file: Option<PathBuf>,
    /// Hour at which "today" begins for the downloads-today counter
    pub day_start_hour: u32,
}

impl ImportConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            naming: NamingConfig::new(destination),
            backups: Vec::new(),
            job_code: None,
            extract_timeout: Duration::from_secs(10),
            queue_depth: 16,
            timeline_threshold: Duration::from_secs(60),
            sequence_file: None,
            day_start_hour: 3,
        }
    }
}

/// Shared control surface for a running import.
///
/// Cloneable and thread-safe; a UI thread holds one while `run` blocks.
#[derive(Clone, Default)]
pub struct ImportControl {
    paused: Arc<AtomicBool>,
    sessions: Arc<Mutex<HashMap<Uuid, CancelFlag>>>,
}

impl ImportControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop dispatching new jobs; in-flight jobs finish
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Continue from the next undispatched state
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Cancel one device session
    pub fn cancel_session(&self, session: Uuid) {
        if let Ok(sessions) = self.sessions.lock() {
            if let Some(flag) = sessions.get(&session) {
                flag.cancel();
            }
        }
    }

    /// Cancel every session
    pub fn cancel_all(&self) {
        if let Ok(sessions) = self.sessions.lock() {
            for flag in sessions.values() {
                flag.cancel();
            }
        }
    }

    fn register(&self, session: Uuid) -> CancelFlag {
        let flag = CancelFlag::new();
        if let Ok(mut sessions) = self.sessions.lock() {
            // Cancel requests can arrive before registration; a
            // pre-registered flag wins
            sessions.entry(session).or_insert_with(|| flag.clone());
            return sessions[&session].clone();
        }
        flag
    }

    fn is_cancelled(&self, session: Uuid) -> bool {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(&session).map(|f| f.is_cancelled()))
            .unwrap_or(false)
    }
}

/// Final outcome of one import run
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub summary: ImportSummary,
    /// Per-file outcomes, grouped by the caller per task for error views
    pub files: Vec<FileReport>,
    /// Timeline clusters over everything scanned, for grouping/selection
    pub clusters: Vec<TimelineCluster>,
}

impl ImportReport {
    /// Report entries grouped by the task their failure arose in
    pub fn failures_by_task(&self) -> HashMap<TaskKind, Vec<&FileReport>> {
        let mut grouped: HashMap<TaskKind, Vec<&FileReport>> = HashMap::new();
        for file in &self.files {
            if let Some(task) = file.task {
                grouped.entry(task).or_default().push(file);
            }
        }
        grouped
    }
}

struct DeviceSession {
    id: Uuid,
    device: Arc<dyn DeviceSource>,
    cancel: CancelFlag,
    /// Cancelled event already emitted
    cancel_reported: bool,
}

/// The job coordinator
pub struct Coordinator {
    config: ImportConfig,
    sessions: Vec<DeviceSession>,
    candidates: HashMap<Key, FileCandidate>,
    naming: NamingEngine,
    provider: Arc<dyn MetadataProvider>,
    cache: Arc<dyn ThumbCache>,
    fs: Arc<dyn DestinationFs>,
    events: EventSender,
    control: ImportControl,
    was_paused: bool,
}

impl Coordinator {
    pub fn new(
        config: ImportConfig,
        provider: Arc<dyn MetadataProvider>,
        cache: Arc<dyn ThumbCache>,
        events: EventSender,
    ) -> Self {
        let sequences = match &config.sequence_file {
            Some(path) => SequenceState::load(path, config.day_start_hour),
            None => SequenceState::in_memory(config.day_start_hour),
        };
        let naming = NamingEngine::new(config.naming.clone(), sequences);

        Self {
            config,
            sessions: Vec::new(),
            candidates: HashMap::new(),
            naming,
            provider,
            cache,
            fs: Arc::new(LocalFs::new()),
            events,
            control: ImportControl::new(),
            was_paused: false,
        }
    }

    /// Replace the destination filesystem used for copy/verify/backup
    pub fn with_destination_fs(mut self, fs: Arc<dyn DestinationFs>) -> Self {
        self.fs = fs;
        self
    }

    /// Register a source device; returns its session id
    pub fn add_device(&mut self, device: Arc<dyn DeviceSource>) -> Uuid {
        let id = Uuid::new_v4();
        let cancel = self.control.register(id);
        self.sessions.push(DeviceSession {
            id,
            device,
            cancel,
            cancel_reported: false,
        });
        id
    }

    /// The control surface for pausing/cancelling while `run` blocks
    pub fn control(&self) -> ImportControl {
        self.control.clone()
    }

    /// Run the import to completion.
    ///
    /// Blocks until every candidate reaches a terminal state. Fails fast
    /// only for an unwritable primary destination; everything else is
    /// per-file.
    pub fn run(mut self) -> crate::error::Result<ImportReport> {
        let started = Instant::now();

        self.preflight_destination()?;

        for session in &self.sessions {
            self.events.send(Event::Session(SessionEvent::Started {
                session: session.id,
                device_label: session.device.identity().label.clone(),
            }));
        }

        self.scan_stage();
        self.extract_stage();
        self.naming_stage();
        self.copy_stage();

        self.reap_cancelled_sessions();

        if let Err(e) = self.naming.persist_sequences() {
            warn!("failed to persist sequence counters: {e}");
        }

        let clusters = self.build_timeline();
        let summary = self.summarize(started.elapsed());
        self.events.send(Event::Session(SessionEvent::Completed {
            summary: summary.clone(),
        }));

        let files = self.candidates.values().map(|c| c.report()).collect();
        Ok(ImportReport {
            summary,
            files,
            clusters,
        })
    }

    /// Verify the destination root is writable before any work starts
    fn preflight_destination(&self) -> crate::error::Result<()> {
        let root = &self.config.naming.destination;
        let probe = || -> std::io::Result<()> {
            std::fs::create_dir_all(root)?;
            let marker = root.join(".photo-import-probe");
            std::fs::write(&marker, b"")?;
            std::fs::remove_file(&marker)?;
            Ok(())
        };

        if probe().is_err() {
            let message = CopyError::DestinationUnwritable { root: root.clone() }.to_string();
            for session in &self.sessions {
                self.events.send(Event::Session(SessionEvent::Fatal {
                    session: session.id,
                    message: message.clone(),
                }));
            }
            return Err(ImportError::Copy(CopyError::DestinationUnwritable {
                root: root.clone(),
            }));
        }
        Ok(())
    }

    // ---- scan ----

    fn scan_stage(&mut self) {
        let mut pool: WorkerPool<ScanJob> = WorkerPool::new("scan");
        let mut by_job: HashMap<JobId, Uuid> = HashMap::new();

        for session in &self.sessions {
            self.events.send(Event::Scan(ScanEvent::Started {
                session: session.id,
                root: PathBuf::from(session.device.identity().label.clone()),
            }));
            let id = pool.submit(ScanJob {
                session: session.id,
                device: session.device.clone(),
                cancel: session.cancel.clone(),
            });
            by_job.insert(id, session.id);
        }

        for outcome in pool.drain() {
            match outcome {
                JobOutcome::Completed { output, .. } => self.handle_scan_result(output),
                JobOutcome::Crashed { id } => {
                    if let Some(session) = by_job.get(&id) {
                        warn!(session = %session, "scan worker crashed twice; session abandoned");
                        self.control.cancel_session(*session);
                    }
                }
            }
        }
    }

    fn handle_scan_result(&mut self, done: ScanDone) {
        match done.result {
            Ok(files) => {
                let total_bytes: u64 = files.iter().map(|f| f.size).sum();
                let total_files = files.len();
                for file in files {
                    self.events.send(Event::Scan(ScanEvent::FileFound {
                        session: done.session,
                        path: file.path.clone(),
                    }));
                    let key = (done.session, file.path.clone());
                    self.candidates
                        .insert(key, FileCandidate::new(done.session, file));
                }
                self.events.send(Event::Scan(ScanEvent::Completed {
                    session: done.session,
                    total_files,
                    total_bytes,
                }));
            }
            Err(e) => {
                // A device that vanished or became unreadable cancels its
                // own session; others continue
                self.events.send(Event::Scan(ScanEvent::Error {
                    session: done.session,
                    path: PathBuf::new(),
                    message: e.to_string(),
                }));
                self.control.cancel_session(done.session);
            }
        }
    }

    // ---- extract ----

    fn extract_stage(&mut self) {
        let mut queues = self.dispatch_queues();
        let total: usize = queues.iter().map(|q| q.len()).sum();
        if total == 0 {
            return;
        }
        self.events
            .send(Event::Extract(ExtractEvent::Started { total_files: total }));

        let mut pool: WorkerPool<ExtractJob> = WorkerPool::new("extract");
        let mut by_job: HashMap<JobId, Key> = HashMap::new();
        let mut retried: HashSet<Key> = HashSet::new();
        let mut in_flight = 0usize;
        let mut rr = 0usize;
        let mut extracted = 0usize;
        let mut cache_hits = 0usize;

        loop {
            self.reap_cancelled_sessions();
            self.pause_edge();

            if !self.control.is_paused() {
                while in_flight < self.config.queue_depth {
                    let Some(key) = next_round_robin(&mut queues, &mut rr) else {
                        break;
                    };
                    let Some(candidate) = self.candidates.get_mut(&key) else {
                        continue;
                    };
                    if candidate.is_terminal() {
                        continue;
                    }
                    let _ = candidate.advance(LifecycleState::MetadataPending);
                    let file = candidate.file.clone();
                    let session = candidate.session;
                    self.emit_state(&key);

                    let cancel = self.control.register(session);
                    let id = pool.submit(ExtractJob {
                        file,
                        provider: self.provider.clone(),
                        cache: self.cache.clone(),
                        timeout: self.config.extract_timeout,
                        cancel,
                    });
                    by_job.insert(id, key);
                    in_flight += 1;
                }
            }

            if in_flight == 0 {
                if queues.iter().all(|q| q.is_empty()) {
                    break;
                }
                // Paused with nothing in flight
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }

            match pool.recv_timeout(POLL_INTERVAL) {
                Some(JobOutcome::Completed { id, output }) => {
                    in_flight -= 1;
                    if let Some(key) = by_job.remove(&id) {
                        // A crashed extractor gets exactly one fresh
                        // attempt, mirroring the pool's own crash policy
                        let crashed = matches!(output.outcome, ExtractOutcome::Crashed);
                        if crashed && retried.insert(key.clone()) {
                            if let Some(candidate) = self
                                .candidates
                                .get(&key)
                                .filter(|c| !c.is_terminal())
                            {
                                let cancel = self.control.register(candidate.session);
                                let id = pool.submit(ExtractJob {
                                    file: candidate.file.clone(),
                                    provider: self.provider.clone(),
                                    cache: self.cache.clone(),
                                    timeout: self.config.extract_timeout,
                                    cancel,
                                });
                                by_job.insert(id, key);
                                in_flight += 1;
                            }
                        } else {
                            match self.handle_extract_result(&key, output) {
                                ExtractTally::Extracted => extracted += 1,
                                ExtractTally::CacheHit => cache_hits += 1,
                                ExtractTally::Other => {}
                            }
                        }
                    }
                }
                Some(JobOutcome::Crashed { id }) => {
                    in_flight -= 1;
                    if let Some(key) = by_job.remove(&id) {
                        if let Some(candidate) = self.candidates.get_mut(&key) {
                            candidate.fail(TaskKind::Extract, FailureReason::WorkerCrashed);
                        }
                        self.events.send(Event::Extract(ExtractEvent::Error {
                            path: key.1.clone(),
                            message: "extraction worker crashed".to_string(),
                        }));
                        self.emit_state(&key);
                    }
                }
                None => {}
            }
        }

        self.events.send(Event::Extract(ExtractEvent::Completed {
            extracted,
            cache_hits,
        }));
    }

    fn handle_extract_result(&mut self, key: &Key, done: ExtractDone) -> ExtractTally {
        let Some(candidate) = self.candidates.get_mut(key) else {
            return ExtractTally::Other;
        };
        if candidate.is_terminal() {
            return ExtractTally::Other;
        }

        let tally = match done.outcome {
            ExtractOutcome::Extracted(extraction) => {
                candidate.metadata = Some(extraction.metadata);
                candidate.thumbnail = extraction.thumbnail;
                self.events.send(Event::Extract(ExtractEvent::Extracted {
                    path: key.1.clone(),
                }));
                ExtractTally::Extracted
            }
            ExtractOutcome::CacheHit(extraction) => {
                candidate.metadata = Some(extraction.metadata);
                candidate.thumbnail = extraction.thumbnail;
                self.events.send(Event::Extract(ExtractEvent::CacheHit {
                    path: key.1.clone(),
                }));
                ExtractTally::CacheHit
            }
            ExtractOutcome::Cancelled => {
                candidate.fail(TaskKind::Extract, FailureReason::Cancelled);
                ExtractTally::Other
            }
            ExtractOutcome::Degraded(reason) => {
                // The file still imports; it just proceeds without
                // metadata or a thumbnail
                candidate.warnings.push(reason.clone());
                self.events.send(Event::Extract(ExtractEvent::NoThumbnail {
                    path: key.1.clone(),
                    reason,
                }));
                ExtractTally::Other
            }
            ExtractOutcome::Crashed => {
                candidate.fail(TaskKind::Extract, FailureReason::ExtractionCrashed);
                self.events.send(Event::Extract(ExtractEvent::Error {
                    path: key.1.clone(),
                    message: "metadata extractor crashed".to_string(),
                }));
                ExtractTally::Other
            }
        };

        if !candidate.is_terminal() {
            let _ = candidate.advance(LifecycleState::MetadataReady);
        }
        self.emit_state(key);
        tally
    }

    // ---- naming ----

    /// Resolve destinations serially, primaries before sidecars.
    ///
    /// Single-writer: this is the only call path into the naming engine,
    /// which keeps sequence draws and the uniqueness set consistent.
    fn naming_stage(&mut self) {
        self.reap_cancelled_sessions();

        let mut primaries: Vec<Key> = Vec::new();
        let mut sidecars: Vec<Key> = Vec::new();
        for key in self.ordered_keys() {
            let Some(candidate) = self.candidates.get(&key) else {
                continue;
            };
            if candidate.is_terminal() {
                continue;
            }
            if candidate.is_sidecar() {
                sidecars.push(key);
            } else {
                primaries.push(key);
            }
        }

        // stem -> primary destination, for sidecar pairing
        let mut primary_dest: HashMap<(Uuid, String), PathBuf> = HashMap::new();

        for key in primaries {
            self.resolve_one(&key, &mut primary_dest);
        }

        for key in sidecars {
            let Some(candidate) = self.candidates.get(&key) else {
                continue;
            };
            let stem_key = (candidate.session, candidate.file.stem().to_lowercase());
            if let Some(primary) = primary_dest.get(&stem_key).cloned() {
                let extension = candidate.file.extension();
                let destination = self.naming.resolve_sidecar(&primary, &extension);
                if let Some(candidate) = self.candidates.get_mut(&key) {
                    candidate.destination = Some(destination);
                    let _ = candidate.advance(LifecycleState::NamingResolved);
                }
                self.emit_state(&key);
            } else {
                // Orphan sidecar: name it like any other file
                self.resolve_one(&key, &mut primary_dest);
            }
        }
    }

    fn resolve_one(&mut self, key: &Key, primary_dest: &mut HashMap<(Uuid, String), PathBuf>) {
        let Some(candidate) = self.candidates.get(key) else {
            return;
        };
        let session = candidate.session;
        let device_model = self
            .sessions
            .iter()
            .find(|s| s.id == session)
            .and_then(|s| s.device.identity().model.clone());

        let request = NamingRequest {
            file: &candidate.file,
            metadata: candidate.metadata.as_ref(),
            job_code: self.config.job_code.as_deref(),
            device_model: device_model.as_deref(),
        };
        let outcome = self.naming.resolve(&request);
        let stem_key = (session, candidate.file.stem().to_lowercase());

        match outcome {
            NamingOutcome::Resolved(resolved) => {
                if resolved.degraded_timestamp {
                    let message =
                        "capture time missing or unreadable; used file modification time"
                            .to_string();
                    self.events.send(Event::File(FileEvent::Warning {
                        path: key.1.clone(),
                        message: message.clone(),
                    }));
                    if let Some(candidate) = self.candidates.get_mut(key) {
                        candidate.warnings.push(message);
                    }
                }
                primary_dest
                    .entry(stem_key)
                    .or_insert_with(|| resolved.destination.clone());
                if let Some(candidate) = self.candidates.get_mut(key) {
                    candidate.destination = Some(resolved.destination);
                    candidate.sequence_number = Some(resolved.draw.downloads_today);
                    candidate.job_code = self.config.job_code.clone();
                    let _ = candidate.advance(LifecycleState::NamingResolved);
                }
            }
            NamingOutcome::Skipped { destination } => {
                debug!(path = %key.1.display(), dest = %destination.display(), "name conflict; skipping");
                if let Some(candidate) = self.candidates.get_mut(key) {
                    candidate.skip(TaskKind::Rename, FailureReason::NameConflict);
                }
            }
        }
        self.emit_state(key);
    }

    // ---- copy / verify / backup ----

    fn copy_stage(&mut self) {
        let mut queues: Vec<VecDeque<Key>> = self
            .sessions
            .iter()
            .map(|s| {
                self.ordered_keys()
                    .into_iter()
                    .filter(|(session, _)| *session == s.id)
                    .filter(|key| {
                        self.candidates
                            .get(key)
                            .map(|c| c.state() == LifecycleState::NamingResolved)
                            .unwrap_or(false)
                    })
                    .collect()
            })
            .collect();

        let files_total: usize = queues.iter().map(|q| q.len()).sum();
        if files_total == 0 {
            return;
        }
        let bytes_total: u64 = queues
            .iter()
            .flatten()
            .filter_map(|key| self.candidates.get(key).map(|c| c.file.size))
            .sum();
        self.events.send(Event::Copy(CopyEvent::Started {
            total_files: files_total,
            total_bytes: bytes_total,
        }));

        let mut pool: WorkerPool<CopyJob> = WorkerPool::new("copy");
        let mut by_job: HashMap<JobId, Key> = HashMap::new();
        let mut in_flight = 0usize;
        let mut rr = 0usize;
        let mut files_completed = 0usize;
        let mut bytes_copied = 0u64;

        loop {
            self.reap_cancelled_sessions();
            self.pause_edge();

            if !self.control.is_paused() {
                while in_flight < self.config.queue_depth {
                    let Some(key) = next_round_robin(&mut queues, &mut rr) else {
                        break;
                    };
                    let Some(candidate) = self.candidates.get_mut(&key) else {
                        continue;
                    };
                    if candidate.is_terminal() {
                        continue;
                    }
                    let Some(destination) = candidate.destination.clone() else {
                        continue;
                    };
                    let _ = candidate.advance(LifecycleState::CopyPending);
                    let file = candidate.file.clone();
                    let session = candidate.session;
                    self.emit_state(&key);

                    let relative = destination
                        .strip_prefix(&self.config.naming.destination)
                        .unwrap_or(&destination)
                        .to_path_buf();
                    let cancel = self.control.register(session);
                    let id = pool.submit(CopyJob {
                        file,
                        destination,
                        relative,
                        backups: self.config.backups.clone(),
                        fs: self.fs.clone(),
                        cancel,
                    });
                    by_job.insert(id, key);
                    in_flight += 1;
                }
            }

            if in_flight == 0 {
                if queues.iter().all(|q| q.is_empty()) {
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }

            match pool.recv_timeout(POLL_INTERVAL) {
                Some(JobOutcome::Completed { id, output }) => {
                    in_flight -= 1;
                    if let Some(key) = by_job.remove(&id) {
                        if let Some(bytes) = self.handle_copy_result(&key, output) {
                            files_completed += 1;
                            bytes_copied += bytes;
                            self.events.send(Event::Copy(CopyEvent::Progress(
                                CopyProgress {
                                    files_completed,
                                    files_total,
                                    bytes_copied,
                                    bytes_total,
                                    current_path: key.1.clone(),
                                },
                            )));
                        }
                    }
                }
                Some(JobOutcome::Crashed { id }) => {
                    in_flight -= 1;
                    if let Some(key) = by_job.remove(&id) {
                        if let Some(candidate) = self.candidates.get_mut(&key) {
                            candidate.fail(TaskKind::Copy, FailureReason::WorkerCrashed);
                        }
                        self.emit_state(&key);
                    }
                }
                None => {}
            }
        }

        self.events.send(Event::Copy(CopyEvent::Completed {
            files_copied: files_completed,
            bytes_copied,
        }));
    }

    /// Apply one copy job's result; returns bytes copied on success
    fn handle_copy_result(&mut self, key: &Key, done: CopyDone) -> Option<u64> {
        let candidate = self.candidates.get_mut(key)?;
        if candidate.is_terminal() {
            return None;
        }

        let copied = match done.result {
            Ok(copied) => copied,
            Err(CopyError::Cancelled) => {
                candidate.fail(TaskKind::Copy, FailureReason::Cancelled);
                self.emit_state(key);
                return None;
            }
            Err(CopyError::VerificationMismatch { .. }) => {
                candidate.fail(TaskKind::Copy, FailureReason::VerificationMismatch);
                self.events.send(Event::Copy(CopyEvent::Error {
                    path: key.1.clone(),
                    message: "verification mismatch; source file was kept".to_string(),
                }));
                self.emit_state(key);
                return None;
            }
            Err(e) => {
                candidate.fail(TaskKind::Copy, FailureReason::CopyIo(e.to_string()));
                self.events.send(Event::Copy(CopyEvent::Error {
                    path: key.1.clone(),
                    message: e.to_string(),
                }));
                self.emit_state(key);
                return None;
            }
        };

        candidate.checksum = Some(copied.checksum);
        let _ = candidate.advance(LifecycleState::Copied);
        let _ = candidate.advance(LifecycleState::VerifyPending);
        self.events.send(Event::Copy(CopyEvent::Copied {
            path: key.1.clone(),
            destination: copied.destination.clone(),
            bytes: copied.bytes,
        }));
        self.events.send(Event::Copy(CopyEvent::Verified {
            path: key.1.clone(),
        }));

        // Backup fan-out: a file only completes once every non-best-effort
        // backup succeeded
        let candidate = self.candidates.get_mut(key)?;
        let _ = candidate.advance(LifecycleState::BackupPending);
        let mut blocked = false;
        for (target, outcome) in &done.backups {
            let best_effort = self
                .config
                .backups
                .iter()
                .find(|t| &t.root == target)
                .map(|t| t.best_effort)
                .unwrap_or(false);
            let state = match outcome {
                BackupOutcome::BackedUp => {
                    self.events.send(Event::Backup(BackupEvent::Completed {
                        path: key.1.clone(),
                        target: target.clone(),
                    }));
                    BackupState::BackedUp
                }
                BackupOutcome::SkippedExisting => {
                    self.events.send(Event::Backup(BackupEvent::Skipped {
                        path: key.1.clone(),
                        target: target.clone(),
                    }));
                    BackupState::Skipped
                }
                BackupOutcome::Failed(message) => {
                    self.events.send(Event::Backup(BackupEvent::Error {
                        path: key.1.clone(),
                        target: target.clone(),
                        message: message.clone(),
                    }));
                    if !best_effort {
                        blocked = true;
                    }
                    BackupState::Failed(message.clone())
                }
            };
            let candidate = self.candidates.get_mut(key)?;
            if let BackupState::Failed(message) = &state {
                candidate
                    .warnings
                    .push(format!("backup to {} failed: {}", target.display(), message));
            }
            candidate.backups.insert(target.clone(), state);
        }

        if blocked {
            // The primary copy is verified, so the file is not failed; it
            // stays held in BackupPending and counts as incomplete
            warn!(
                path = %key.1.display(),
                "required backup target unavailable; file held awaiting backup"
            );
            self.emit_state(key);
            return None;
        }
        let candidate = self.candidates.get_mut(key)?;
        let _ = candidate.advance(LifecycleState::Completed);
        self.emit_state(key);
        Some(copied.bytes)
    }

    // ---- shared plumbing ----

    /// Per-session dispatch queues in extraction priority order: a
    /// temporal stride sample so early thumbnails cover the whole shoot
    /// instead of the first directory in card order.
    fn dispatch_queues(&self) -> Vec<VecDeque<Key>> {
        self.sessions
            .iter()
            .map(|session| {
                let mut keys: Vec<&FileCandidate> = self
                    .candidates
                    .values()
                    .filter(|c| c.session == session.id && !c.is_terminal())
                    .collect();
                keys.sort_by(|a, b| {
                    (a.file.modified, &a.file.path).cmp(&(b.file.modified, &b.file.path))
                });
                stride_order(keys.len())
                    .into_iter()
                    .map(|i| (session.id, keys[i].file.path.clone()))
                    .collect()
            })
            .collect()
    }

    /// Keys in deterministic order: sessions in added order, files by
    /// (mtime, path) within each
    fn ordered_keys(&self) -> Vec<Key> {
        let mut keys = Vec::new();
        for session in &self.sessions {
            let mut session_keys: Vec<&FileCandidate> = self
                .candidates
                .values()
                .filter(|c| c.session == session.id)
                .collect();
            session_keys.sort_by(|a, b| {
                (a.file.modified, &a.file.path).cmp(&(b.file.modified, &b.file.path))
            });
            keys.extend(
                session_keys
                    .into_iter()
                    .map(|c| (c.session, c.file.path.clone())),
            );
        }
        keys
    }

    /// Move every non-terminal candidate of a cancelled session to
    /// FAILED(Cancelled), once per session
    fn reap_cancelled_sessions(&mut self) {
        let cancelled: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|s| !s.cancel_reported && self.control.is_cancelled(s.id))
            .map(|s| s.id)
            .collect();

        for session in cancelled {
            info!(session = %session, "session cancelled");
            let keys: Vec<Key> = self
                .candidates
                .iter()
                .filter(|(_, c)| c.session == session && !c.is_terminal())
                .map(|(k, _)| k.clone())
                .collect();
            for key in keys {
                if let Some(candidate) = self.candidates.get_mut(&key) {
                    // File the failure under the stage the candidate had
                    // actually reached
                    let task = match candidate.state() {
                        LifecycleState::Discovered => TaskKind::Scan,
                        LifecycleState::MetadataPending | LifecycleState::MetadataReady => {
                            TaskKind::Extract
                        }
                        LifecycleState::NamingResolved => TaskKind::Rename,
                        LifecycleState::BackupPending => TaskKind::Backup,
                        _ => TaskKind::Copy,
                    };
                    candidate.fail(task, FailureReason::Cancelled);
                }
                self.emit_state(&key);
            }
            if let Some(s) = self.sessions.iter_mut().find(|s| s.id == session) {
                s.cancel_reported = true;
            }
            self.events
                .send(Event::Session(SessionEvent::Cancelled { session }));
        }
    }

    /// Emit Paused/Resumed on edges
    fn pause_edge(&mut self) {
        let paused = self.control.is_paused();
        if paused != self.was_paused {
            self.was_paused = paused;
            self.events.send(Event::Session(if paused {
                SessionEvent::Paused
            } else {
                SessionEvent::Resumed
            }));
        }
    }

    fn emit_state(&self, key: &Key) {
        if let Some(candidate) = self.candidates.get(key) {
            self.events.send(Event::File(FileEvent::StateChanged {
                session: key.0,
                path: key.1.clone(),
                state: candidate.state(),
            }));
        }
    }

    fn build_timeline(&self) -> Vec<TimelineCluster> {
        let timestamped: Vec<(DateTime<Utc>, PathBuf)> = self
            .candidates
            .values()
            .map(|c| {
                let time = c
                    .metadata
                    .as_ref()
                    .and_then(|m| m.capture_time)
                    .unwrap_or_else(|| DateTime::<Utc>::from(c.file.modified));
                (time, c.file.path.clone())
            })
            .collect();
        cluster(&timestamped, self.config.timeline_threshold)
    }

    fn summarize(&self, elapsed: Duration) -> ImportSummary {
        let mut summary = ImportSummary {
            files_completed: 0,
            files_failed: 0,
            files_skipped: 0,
            files_incomplete: 0,
            bytes_copied: 0,
            duration_ms: elapsed.as_millis() as u64,
        };
        for candidate in self.candidates.values() {
            match candidate.state() {
                LifecycleState::Completed => {
                    summary.files_completed += 1;
                    summary.bytes_copied += candidate.file.size;
                }
                LifecycleState::Failed => summary.files_failed += 1,
                LifecycleState::Skipped => summary.files_skipped += 1,
                _ => summary.files_incomplete += 1,
            }
        }
        summary
    }
}

/// Pop the next key round-robin across per-session queues
fn next_round_robin(queues: &mut [VecDeque<Key>], rr: &mut usize) -> Option<Key> {
    if queues.is_empty() {
        return None;
    }
    for _ in 0..queues.len() {
        let index = *rr % queues.len();
        *rr += 1;
        if let Some(key) = queues[index].pop_front() {
            return Some(key);
        }
    }
    None
}

/// Midpoint-subdivision ordering over `0..len`.
///
/// Yields index 0, then the midpoint, then the midpoints of the halves,
/// breadth-first, so the first few jobs sample the whole time range.
fn stride_order(len: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(len);
    if len == 0 {
        return order;
    }
    let mut seen = vec![false; len];
    order.push(0);
    seen[0] = true;

    let mut ranges: VecDeque<(usize, usize)> = VecDeque::new();
    ranges.push_back((0, len - 1));
    while let Some((lo, hi)) = ranges.pop_front() {
        if lo >= hi {
            continue;
        }
        let mid = lo + (hi - lo + 1) / 2;
        if !seen[mid] {
            order.push(mid);
            seen[mid] = true;
        }
        ranges.push_back((lo, mid.saturating_sub(1)));
        ranges.push_back((mid, hi));
    }

    for (i, taken) in seen.iter().enumerate() {
        if !taken {
            order.push(i);
        }
    }
    order
}

// ---- pool jobs ----

struct ScanJob {
    session: Uuid,
    device: Arc<dyn DeviceSource>,
    cancel: CancelFlag,
}

struct ScanDone {
    session: Uuid,
    result: Result<Vec<FileRef>, crate::error::ScanError>,
}

impl PoolJob for ScanJob {
    type Output = ScanDone;

    fn run(&self, _pool_cancel: &CancelFlag) -> ScanDone {
        let result = if self.cancel.is_cancelled() {
            Err(crate::error::ScanError::Cancelled)
        } else {
            self.device.enumerate()
        };
        ScanDone {
            session: self.session,
            result,
        }
    }
}

struct ExtractJob {
    file: FileRef,
    provider: Arc<dyn MetadataProvider>,
    cache: Arc<dyn ThumbCache>,
    timeout: Duration,
    cancel: CancelFlag,
}

enum ExtractOutcome {
    Extracted(Extraction),
    CacheHit(Extraction),
    /// Extraction failed but the file still imports (no metadata)
    Degraded(String),
    Crashed,
    Cancelled,
}

enum ExtractTally {
    Extracted,
    CacheHit,
    Other,
}

struct ExtractDone {
    outcome: ExtractOutcome,
}

impl PoolJob for ExtractJob {
    type Output = ExtractDone;

    fn run(&self, _pool_cancel: &CancelFlag) -> ExtractDone {
        if self.cancel.is_cancelled() {
            return ExtractDone {
                outcome: ExtractOutcome::Cancelled,
            };
        }

        // Identity-tuple cache hit skips the extractor entirely
        match self.cache.get(
            self.file.device_id,
            &self.file.path,
            self.file.size,
            self.file.modified,
        ) {
            Ok(Some(entry)) => {
                return ExtractDone {
                    outcome: ExtractOutcome::CacheHit(Extraction {
                        metadata: entry.metadata,
                        thumbnail: entry.thumbnail,
                    }),
                }
            }
            Ok(None) => {}
            Err(e) => warn!(path = %self.file.path.display(), "cache read failed: {e}"),
        }

        let hint = ByteRangeHint::for_file(&self.file);
        let outcome = match extract_with_timeout(
            self.provider.clone(),
            &self.file,
            hint,
            self.timeout,
        ) {
            Ok(extraction) => {
                let entry = ThumbEntry {
                    device_id: self.file.device_id,
                    path: self.file.path.clone(),
                    file_size: self.file.size,
                    file_modified: self.file.modified,
                    metadata: extraction.metadata.clone(),
                    thumbnail: extraction.thumbnail.clone(),
                    cached_at: std::time::SystemTime::now(),
                };
                if let Err(e) = self.cache.set(entry) {
                    warn!(path = %self.file.path.display(), "cache write failed: {e}");
                }
                ExtractOutcome::Extracted(extraction)
            }
            Err(ExtractError::ExtractionCrashed { .. }) => ExtractOutcome::Crashed,
            Err(e) => ExtractOutcome::Degraded(e.to_string()),
        };

        ExtractDone { outcome }
    }
}

struct CopyJob {
    file: FileRef,
    destination: PathBuf,
    /// Destination relative to the primary root, reused under backup roots
    relative: PathBuf,
    backups: Vec<BackupTarget>,
    fs: Arc<dyn DestinationFs>,
    cancel: CancelFlag,
}

struct CopiedFile {
    destination: PathBuf,
    bytes: u64,
    checksum: u64,
}

struct CopyDone {
    result: Result<CopiedFile, CopyError>,
    backups: Vec<(PathBuf, BackupOutcome)>,
}

impl CopyJob {
    fn copy_and_verify(&self) -> Result<CopiedFile, CopyError> {
        let bytes = self.fs.copy(&self.file.path, &self.destination, &self.cancel)?;

        if !self.fs.verify(&self.file.path, &self.destination)? {
            // Leave the source alone; remove the bad copy
            let _ = std::fs::remove_file(&self.destination);
            return Err(CopyError::VerificationMismatch {
                src: self.file.path.clone(),
                dst: self.destination.clone(),
            });
        }

        let checksum =
            crate::core::copier::hash_file(&self.destination).map_err(|e| CopyError::Io {
                src: self.file.path.clone(),
                dst: self.destination.clone(),
                source: e,
            })?;

        Ok(CopiedFile {
            destination: self.destination.clone(),
            bytes,
            checksum,
        })
    }
}

impl PoolJob for CopyJob {
    type Output = CopyDone;

    fn run(&self, _pool_cancel: &CancelFlag) -> CopyDone {
        if self.cancel.is_cancelled() {
            return CopyDone {
                result: Err(CopyError::Cancelled),
                backups: Vec::new(),
            };
        }

        let result = self.copy_and_verify();

        let mut backups = Vec::new();
        if result.is_ok() {
            for target in &self.backups {
                let outcome = backup_file(
                    self.fs.as_ref(),
                    target,
                    &self.destination,
                    &self.relative,
                    &self.cancel,
                );
                backups.push((target.root.clone(), outcome));
            }
        }

        CopyDone { result, backups }
    }
}
