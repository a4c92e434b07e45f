//! Fixed-size pool of persistent parse workers.
//!
//! The pool owns a vector of worker slots and hands out workers round-robin
//! under a single dispatch lock. There is no background health monitoring:
//! dead or recycle-due workers are discovered and replaced lazily at the
//! moment a slot comes up for dispatch, so a crash costs nothing until the
//! pool actually needs that slot.

use crate::error::{ModidxError, Result};
use crate::pool::handle::{WorkerHandle, WorkerLauncher};
use crate::pool::result::{FailureKind, ParseResult};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::available_parallelism;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Completed parses a worker serves before it is replaced.
pub const DEFAULT_RECYCLE_AFTER: u64 = 200;

/// Default worker count: one per core, capped.
pub fn default_worker_count() -> usize {
    available_parallelism().map(|n| n.get()).unwrap_or(1).min(4)
}

/// Pool sizing and worker launch settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub recycle_after: u64,
    pub launcher: WorkerLauncher,
}

impl PoolConfig {
    pub fn new(launcher: WorkerLauncher) -> Self {
        Self {
            worker_count: default_worker_count(),
            recycle_after: DEFAULT_RECYCLE_AFTER,
            launcher,
        }
    }
}

/// Worker slots plus the round-robin cursor, guarded together.
struct PoolState {
    slots: Vec<Option<Arc<WorkerHandle>>>,
    cursor: usize,
}

/// Snapshot of one worker slot.
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub slot: usize,
    pub pid: Option<u32>,
    pub alive: bool,
    pub parses_completed: u64,
}

/// Point-in-time snapshot of the whole pool.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub workers: Vec<WorkerStats>,
}

impl PoolStats {
    pub fn alive_count(&self) -> usize {
        self.workers.iter().filter(|w| w.alive).count()
    }
}

/// The worker pool. One instance serves the whole process.
pub struct ParsePool {
    config: PoolConfig,
    state: Mutex<PoolState>,
    running: AtomicBool,
}

impl ParsePool {
    /// Start a pool by spawning `worker_count` workers up front.
    ///
    /// Individual spawn failures are tolerated (the slot starts empty and
    /// is retried lazily on dispatch); only a pool with zero live workers
    /// fails to start.
    pub fn start(config: PoolConfig) -> Result<Arc<Self>> {
        let mut slots = Vec::with_capacity(config.worker_count);
        for slot in 0..config.worker_count {
            match WorkerHandle::start(&config.launcher, config.recycle_after) {
                Ok(handle) => {
                    debug!(slot, pid = handle.pid(), "worker started");
                    slots.push(Some(Arc::new(handle)));
                }
                Err(e) => {
                    warn!(slot, error = %e, "worker failed to start");
                    slots.push(None);
                }
            }
        }

        let live = slots.iter().filter(|s| s.is_some()).count();
        if live == 0 {
            return Err(ModidxError::PoolStart(format!(
                "none of {} workers started",
                config.worker_count
            )));
        }
        info!(live, total = config.worker_count, "parse pool started");

        Ok(Arc::new(Self {
            config,
            state: Mutex::new(PoolState { slots, cursor: 0 }),
            running: AtomicBool::new(true),
        }))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Parse a file on the next pooled worker.
    pub fn parse_file(&self, path: &Path, timeout: Duration) -> ParseResult {
        match self.next_worker() {
            Ok(worker) => worker.parse_file(path, timeout),
            Err(result) => result,
        }
    }

    /// Parse inline text. Runs on a dedicated one-shot worker, never a
    /// pooled one, so a hung inline parse cannot poison a warm slot.
    pub fn parse_text(&self, content: &str, filename: &str, timeout: Duration) -> ParseResult {
        if !self.is_running() {
            return ParseResult::failure(
                FailureKind::PoolNotRunning,
                "parse pool is not running",
            );
        }
        crate::pool::oneshot::parse_text(&self.config.launcher, content, filename, timeout)
    }

    /// Pick the next slot round-robin, replacing its occupant if it is
    /// dead, missing, or due for recycling. Runs under the dispatch lock;
    /// the returned worker is used outside it.
    fn next_worker(&self) -> std::result::Result<Arc<WorkerHandle>, ParseResult> {
        if !self.is_running() {
            return Err(ParseResult::failure(
                FailureKind::PoolNotRunning,
                "parse pool is not running",
            ));
        }

        let mut state = self.state.lock().expect("pool state lock poisoned");
        let slot = state.cursor;
        state.cursor = (state.cursor + 1) % self.config.worker_count;

        match &state.slots[slot] {
            Some(worker) if worker.is_alive() && !worker.needs_recycle() => {
                return Ok(Arc::clone(worker))
            }
            Some(worker) => {
                if worker.needs_recycle() {
                    debug!(
                        slot,
                        pid = worker.pid(),
                        parses = worker.parses_completed(),
                        "recycling worker"
                    );
                    worker.kill();
                } else {
                    warn!(slot, pid = worker.pid(), "replacing dead worker");
                }
            }
            None => {}
        }

        // Respawn in place, still under the lock. Startup is the slow path
        // and only blocks dispatch, not in-flight parses.
        match WorkerHandle::start(&self.config.launcher, self.config.recycle_after) {
            Ok(handle) => {
                let handle = Arc::new(handle);
                state.slots[slot] = Some(Arc::clone(&handle));
                Ok(handle)
            }
            Err(e) => {
                state.slots[slot] = None;
                warn!(slot, error = %e, "worker respawn failed");
                Err(ParseResult::failure(
                    FailureKind::NoWorkerAvailable,
                    format!("could not respawn worker: {}", e),
                ))
            }
        }
    }

    /// Snapshot per-slot liveness and counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock().expect("pool state lock poisoned");
        let workers = state
            .slots
            .iter()
            .enumerate()
            .map(|(slot, occupant)| match occupant {
                Some(worker) => WorkerStats {
                    slot,
                    pid: Some(worker.pid()),
                    alive: worker.is_alive(),
                    parses_completed: worker.parses_completed(),
                },
                None => WorkerStats {
                    slot,
                    pid: None,
                    alive: false,
                    parses_completed: 0,
                },
            })
            .collect();
        PoolStats { workers }
    }

    /// Stop accepting requests and shut every worker down.
    ///
    /// Idempotent; later parse calls fail fast with `PoolNotRunning`.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let workers: Vec<_> = {
            let mut state = self.state.lock().expect("pool state lock poisoned");
            state.slots.iter_mut().filter_map(Option::take).collect()
        };
        for worker in workers {
            worker.shutdown();
        }
        info!("parse pool shut down");
    }
}

impl Drop for ParsePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
