//! Bulk corpus scan: walk a directory tree and parse every script file.

use crate::pool::{ParseResult, ParseService};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What to scan and how hard.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    /// Extensions (without dot) that count as script files.
    pub extensions: Vec<String>,
    /// Caller-side threads issuing parse requests.
    pub jobs: usize,
    pub timeout: Duration,
}

impl ScanOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: vec!["txt".to_string()],
            jobs: crate::pool::default_worker_count(),
            timeout: crate::pool::DEFAULT_TIMEOUT,
        }
    }
}

/// Totals for one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub files: usize,
    pub parsed: usize,
    pub failed: usize,
    pub nodes: usize,
    pub elapsed: Duration,
    /// Per-file failure descriptions, in completion order.
    pub failures: Vec<(PathBuf, String)>,
}

/// Collect the script files under the root, sorted for stable output.
pub fn collect_files(options: &ScanOptions) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(&options.root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| has_script_extension(entry.path(), &options.extensions))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn has_script_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Parse every collected file through the service, fanning out across
/// caller threads. Failures are logged and counted, never fatal.
pub fn scan(service: &ParseService, options: &ScanOptions) -> ScanSummary {
    let files = collect_files(options);
    let started = Instant::now();
    info!(files = files.len(), root = %options.root.display(), "scanning");

    let next = AtomicUsize::new(0);
    let parsed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let nodes = AtomicUsize::new(0);
    let failures: Mutex<Vec<(PathBuf, String)>> = Mutex::new(Vec::new());

    let jobs = options.jobs.max(1);
    std::thread::scope(|scope| {
        for _ in 0..jobs {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(path) = files.get(index) else { break };
                match service.parse_file(path, options.timeout) {
                    ParseResult::Success { node_count, .. } => {
                        parsed.fetch_add(1, Ordering::Relaxed);
                        nodes.fetch_add(node_count, Ordering::Relaxed);
                        debug!(path = %path.display(), node_count, "parsed");
                    }
                    ParseResult::Failure { kind, message } => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        warn!(path = %path.display(), kind = %kind, "parse failed: {}", message);
                        failures
                            .lock()
                            .expect("failure list poisoned")
                            .push((path.clone(), format!("{}: {}", kind, message)));
                    }
                }
            });
        }
    });

    ScanSummary {
        files: files.len(),
        parsed: parsed.into_inner(),
        failed: failed.into_inner(),
        nodes: nodes.into_inner(),
        elapsed: started.elapsed(),
        failures: failures.into_inner().expect("failure list poisoned"),
    }
}
