//! Process-wide entry point for parsing.
//!
//! `ParseService` owns the lazily-started pool and routes every parse call:
//! file parses go to the pool when it is enabled and startable, inline-text
//! parses and the disabled-pool path go to one-shot workers. Callers only
//! ever see [`ParseResult`] values.

use crate::error::{ModidxError, Result};
use crate::pool::handle::WorkerLauncher;
use crate::pool::oneshot;
use crate::pool::pool::{ParsePool, PoolConfig, PoolStats};
use crate::pool::result::ParseResult;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-parse budget when the caller gives none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Service-level settings, normally read from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// False disables the pool entirely; every parse runs one-shot.
    pub pool_enabled: bool,
    pub pool: PoolConfig,
}

impl ServiceConfig {
    /// Build a config from `MODIDX_*` environment variables.
    ///
    /// An explicit `root` (e.g. from a CLI flag) wins over `MODIDX_ROOT`;
    /// with neither, the current directory is the corpus root.
    /// `MODIDX_WORKERS` and `MODIDX_RECYCLE_AFTER` override pool sizing,
    /// and `MODIDX_NO_POOL` (any non-empty value) disables pooling.
    pub fn from_env(root: Option<&Path>) -> Result<Self> {
        let root = match root {
            Some(root) => root.to_path_buf(),
            None => match std::env::var_os("MODIDX_ROOT") {
                Some(root) => std::path::PathBuf::from(root),
                None => std::env::current_dir()?,
            },
        };
        let mut config = Self::new(WorkerLauncher::current_exe(root)?);

        if let Ok(value) = std::env::var("MODIDX_WORKERS") {
            config.pool.worker_count = value.parse().map_err(|_| {
                ModidxError::Config(format!("MODIDX_WORKERS is not a number: {:?}", value))
            })?;
            if config.pool.worker_count == 0 {
                return Err(ModidxError::Config("MODIDX_WORKERS must be at least 1".into()));
            }
        }
        if let Ok(value) = std::env::var("MODIDX_RECYCLE_AFTER") {
            config.pool.recycle_after = value.parse().map_err(|_| {
                ModidxError::Config(format!("MODIDX_RECYCLE_AFTER is not a number: {:?}", value))
            })?;
        }
        if std::env::var_os("MODIDX_NO_POOL").is_some_and(|v| !v.is_empty()) {
            config.pool_enabled = false;
        }
        Ok(config)
    }

    pub fn new(launcher: WorkerLauncher) -> Self {
        Self {
            pool_enabled: true,
            pool: PoolConfig::new(launcher),
        }
    }
}

/// The parse front end. One instance per process, shared by reference.
pub struct ParseService {
    config: ServiceConfig,
    pool: Mutex<Option<Arc<ParsePool>>>,
}

impl ParseService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            pool: Mutex::new(None),
        }
    }

    pub fn from_env(root: Option<&Path>) -> Result<Self> {
        Ok(Self::new(ServiceConfig::from_env(root)?))
    }

    /// Whether file parses will use the pool.
    pub fn pool_enabled(&self) -> bool {
        self.config.pool_enabled
    }

    /// The pool, started on first use (or rebuilt after `shutdown_pool`).
    /// Returns None when pooling is disabled or the pool failed to start
    /// (the caller then falls back to a one-shot worker).
    fn pool(&self) -> Option<Arc<ParsePool>> {
        if !self.config.pool_enabled {
            return None;
        }
        let mut guard = self.pool.lock().expect("service pool lock poisoned");
        if let Some(pool) = guard.as_ref() {
            return Some(Arc::clone(pool));
        }
        match ParsePool::start(self.config.pool.clone()) {
            Ok(pool) => {
                *guard = Some(Arc::clone(&pool));
                Some(pool)
            }
            Err(e) => {
                warn!(error = %e, "pool failed to start; falling back to one-shot workers");
                None
            }
        }
    }

    /// Parse a file, pooled when possible.
    pub fn parse_file(&self, path: &Path, timeout: Duration) -> ParseResult {
        match self.pool() {
            Some(pool) => pool.parse_file(path, timeout),
            None => oneshot::parse_file(&self.config.pool.launcher, path, timeout),
        }
    }

    /// Parse inline text. Always runs on a one-shot worker so a hung
    /// inline parse can never take a pooled worker down with it.
    pub fn parse_text(&self, content: &str, filename: &str, timeout: Duration) -> ParseResult {
        oneshot::parse_text(&self.config.pool.launcher, content, filename, timeout)
    }

    /// Pool stats, if a pool has been started.
    pub fn stats(&self) -> Option<PoolStats> {
        self.started_pool().map(|pool| pool.stats())
    }

    /// Shut the pool down and clear it. Idempotent; a later parse call
    /// builds a fresh pool.
    pub fn shutdown_pool(&self) {
        let pool = self.pool.lock().expect("service pool lock poisoned").take();
        if let Some(pool) = pool {
            debug!("shutting down parse pool");
            pool.shutdown();
        }
    }

    fn started_pool(&self) -> Option<Arc<ParsePool>> {
        self.pool
            .lock()
            .expect("service pool lock poisoned")
            .as_ref()
            .map(Arc::clone)
    }
}

impl Drop for ParseService {
    fn drop(&mut self) {
        self.shutdown_pool();
    }
}
