//! # Pool Module
//!
//! A generic bounded-concurrency worker pool with crash isolation.
//!
//! One pool instance serves one pipeline stage (scan, extract, copy) so a
//! slow extractor cannot starve copy throughput. Each worker runs a single
//! job to completion. A panicking job - the in-process analogue of a
//! metadata library segfaulting a worker process - is caught at the worker
//! boundary: the worker reports the crash and terminates, the pool
//! respawns a replacement at the next poll, and the job is retried
//! automatically exactly once. A second crash is terminal for that job
//! only; concurrently scheduled jobs are unaffected.
//!
//! Jobs must therefore be safe to run twice. Workers observe a shared
//! cancellation flag between jobs; long-running jobs receive the flag so
//! they can checkpoint inside chunked loops.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::warn;

/// Upper bound on workers per pool regardless of core count
const MAX_WORKERS: usize = 8;

/// Identifier for one submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

/// Shared cooperative-cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; observed at the next checkpoint
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// A unit of work executed by pool workers
pub trait PoolJob: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Run the job to completion, checking `cancel` at safe checkpoints
    fn run(&self, cancel: &CancelFlag) -> Self::Output;
}

/// Terminal outcome of one job
#[derive(Debug)]
pub enum JobOutcome<T> {
    /// The job ran to completion (its output may itself be an error)
    Completed { id: JobId, output: T },
    /// The job crashed its worker twice and is abandoned
    Crashed { id: JobId },
}

struct WorkItem<J> {
    id: JobId,
    job: Arc<J>,
    attempt: u8,
}

enum WorkerMsg<J: PoolJob> {
    Done { id: JobId, output: J::Output },
    /// First crash: the pool resubmits the job
    Retry(WorkItem<J>),
    /// Second crash: terminal
    Crashed { id: JobId },
}

/// Bounded-concurrency executor for one pipeline stage
pub struct WorkerPool<J: PoolJob> {
    work_tx: Option<Sender<WorkItem<J>>>,
    work_rx: Receiver<WorkItem<J>>,
    msg_rx: Receiver<WorkerMsg<J>>,
    msg_tx: Sender<WorkerMsg<J>>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancelFlag,
    next_id: AtomicU64,
    /// Jobs submitted but not yet terminally resolved
    outstanding: u64,
    name: &'static str,
}

impl<J: PoolJob> WorkerPool<J> {
    /// Create a pool with the default worker count:
    /// min(available cores, 8)
    pub fn new(name: &'static str) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self::with_workers(name, cores.min(MAX_WORKERS))
    }

    /// Create a pool with an explicit worker count (tests use 1-2)
    pub fn with_workers(name: &'static str, workers: usize) -> Self {
        let (work_tx, work_rx) = unbounded::<WorkItem<J>>();
        let (msg_tx, msg_rx) = unbounded::<WorkerMsg<J>>();
        let cancel = CancelFlag::new();

        let mut pool = Self {
            work_tx: Some(work_tx),
            work_rx,
            msg_rx,
            msg_tx,
            workers: Vec::with_capacity(workers.max(1)),
            cancel,
            next_id: AtomicU64::new(0),
            outstanding: 0,
            name,
        };

        for _ in 0..workers.max(1) {
            pool.spawn_worker();
        }

        pool
    }

    fn spawn_worker(&mut self) {
        let work_rx = self.work_rx.clone();
        let msg_tx = self.msg_tx.clone();
        let cancel = self.cancel.clone();
        let name = self.name;

        let handle = std::thread::Builder::new()
            .name(format!("{}-worker", name))
            .spawn(move || worker_loop(work_rx, msg_tx, cancel))
            .expect("failed to spawn pool worker thread");

        self.workers.push(handle);
    }

    /// Replace workers that died catching a crashed job
    fn respawn_dead_workers(&mut self) {
        let mut respawn = 0;
        self.workers.retain(|h| {
            if h.is_finished() {
                respawn += 1;
                false
            } else {
                true
            }
        });
        for _ in 0..respawn {
            warn!(pool = self.name, "respawning crashed worker");
            self.spawn_worker();
        }
    }

    /// The pool's cancellation flag, shared with all workers
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Submit a job for execution
    pub fn submit(&mut self, job: J) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.outstanding += 1;
        let item = WorkItem {
            id,
            job: Arc::new(job),
            attempt: 0,
        };
        if let Some(tx) = &self.work_tx {
            let _ = tx.send(item);
        }
        id
    }

    /// Number of jobs submitted but not yet terminally resolved
    pub fn outstanding(&self) -> u64 {
        self.outstanding
    }

    /// Wait up to `timeout` for the next terminal job outcome.
    ///
    /// Returns None on timeout or when nothing is outstanding. Internal
    /// retries and worker respawns are handled transparently.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<JobOutcome<J::Output>> {
        if self.outstanding == 0 {
            return None;
        }

        let deadline = std::time::Instant::now() + timeout;
        loop {
            self.respawn_dead_workers();

            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.msg_rx.recv_timeout(remaining.min(Duration::from_millis(50))) {
                Ok(WorkerMsg::Done { id, output }) => {
                    self.outstanding -= 1;
                    return Some(JobOutcome::Completed { id, output });
                }
                Ok(WorkerMsg::Retry(mut item)) => {
                    warn!(pool = self.name, job = item.id.0, "job crashed; retrying once");
                    item.attempt += 1;
                    if let Some(tx) = &self.work_tx {
                        let _ = tx.send(item);
                    }
                }
                Ok(WorkerMsg::Crashed { id }) => {
                    self.outstanding -= 1;
                    return Some(JobOutcome::Crashed { id });
                }
                Err(RecvTimeoutError::Timeout) => {
                    if std::time::Instant::now() >= deadline {
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Collect outcomes until every outstanding job resolves
    pub fn drain(&mut self) -> Vec<JobOutcome<J::Output>> {
        let mut outcomes = Vec::new();
        while self.outstanding > 0 {
            if let Some(outcome) = self.recv_timeout(Duration::from_secs(60)) {
                outcomes.push(outcome);
            } else if self.workers.iter().all(|h| h.is_finished()) {
                // All workers gone and nothing arriving: give up
                break;
            }
        }
        outcomes
    }
}

impl<J: PoolJob> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        // Closing the work channel lets idle workers exit
        self.work_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop<J: PoolJob>(
    work_rx: Receiver<WorkItem<J>>,
    msg_tx: Sender<WorkerMsg<J>>,
    cancel: CancelFlag,
) {
    while let Ok(item) = work_rx.recv() {
        let result = catch_unwind(AssertUnwindSafe(|| item.job.run(&cancel)));

        match result {
            Ok(output) => {
                let _ = msg_tx.send(WorkerMsg::Done {
                    id: item.id,
                    output,
                });
            }
            Err(_) => {
                // The job took this worker down. Report and terminate;
                // the pool respawns a replacement.
                let msg = if item.attempt == 0 {
                    WorkerMsg::Retry(item)
                } else {
                    WorkerMsg::Crashed { id: item.id }
                };
                let _ = msg_tx.send(msg);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingJob {
        runs: Arc<AtomicUsize>,
        crash_first_n: usize,
        value: u32,
    }

    impl PoolJob for CountingJob {
        type Output = u32;

        fn run(&self, _cancel: &CancelFlag) -> u32 {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run < self.crash_first_n {
                panic!("simulated extractor crash");
            }
            self.value
        }
    }

    #[test]
    fn jobs_complete_and_return_output() {
        let mut pool: WorkerPool<CountingJob> = WorkerPool::with_workers("test", 2);
        let runs = Arc::new(AtomicUsize::new(0));

        for value in 0..10 {
            pool.submit(CountingJob {
                runs: runs.clone(),
                crash_first_n: 0,
                value,
            });
        }

        let outcomes = pool.drain();
        assert_eq!(outcomes.len(), 10);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, JobOutcome::Completed { .. })));
    }

    #[test]
    fn crashed_job_is_retried_once_then_succeeds() {
        let mut pool: WorkerPool<CountingJob> = WorkerPool::with_workers("test", 1);
        let runs = Arc::new(AtomicUsize::new(0));

        pool.submit(CountingJob {
            runs: runs.clone(),
            crash_first_n: 1,
            value: 42,
        });

        let outcomes = pool.drain();
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            JobOutcome::Completed { output, .. } => assert_eq!(*output, 42),
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn twice_crashed_job_is_terminal() {
        let mut pool: WorkerPool<CountingJob> = WorkerPool::with_workers("test", 1);
        let runs = Arc::new(AtomicUsize::new(0));

        pool.submit(CountingJob {
            runs: runs.clone(),
            crash_first_n: 99,
            value: 42,
        });

        let outcomes = pool.drain();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], JobOutcome::Crashed { .. }));
        // One original attempt plus exactly one automatic retry
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn crash_does_not_affect_other_jobs() {
        let mut pool: WorkerPool<CountingJob> = WorkerPool::with_workers("test", 2);
        let crash_runs = Arc::new(AtomicUsize::new(0));
        let ok_runs = Arc::new(AtomicUsize::new(0));

        let crash_id = pool.submit(CountingJob {
            runs: crash_runs.clone(),
            crash_first_n: 99,
            value: 0,
        });
        for value in 1..=5 {
            pool.submit(CountingJob {
                runs: ok_runs.clone(),
                crash_first_n: 0,
                value,
            });
        }

        let outcomes = pool.drain();
        assert_eq!(outcomes.len(), 6);

        let completed: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                JobOutcome::Completed { output, .. } => Some(*output),
                _ => None,
            })
            .collect();
        assert_eq!(completed.len(), 5);

        let crashed: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                JobOutcome::Crashed { id } => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(crashed, vec![crash_id]);
    }

    struct CancellableJob;

    impl PoolJob for CancellableJob {
        type Output = bool;

        fn run(&self, cancel: &CancelFlag) -> bool {
            // Simulate a chunked loop with checkpoints
            for _ in 0..100 {
                if cancel.is_cancelled() {
                    return false;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            true
        }
    }

    #[test]
    fn cancellation_is_observed_at_checkpoints() {
        let mut pool: WorkerPool<CancellableJob> = WorkerPool::with_workers("test", 1);
        let flag = pool.cancel_flag();

        pool.submit(CancellableJob);
        std::thread::sleep(Duration::from_millis(10));
        flag.cancel();

        let outcomes = pool.drain();
        match &outcomes[0] {
            JobOutcome::Completed { output, .. } => assert!(!output),
            other => panic!("expected completion, got {:?}", other),
        }
    }
}
