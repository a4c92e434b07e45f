//! Pool-less fallback: spawn a worker, run one job, shut it down.
//!
//! Used when pooling is disabled and for inline-text parses, which always
//! take this route so a hung inline parse can never poison a pooled worker.

use crate::pool::handle::{WorkerHandle, WorkerLauncher};
use crate::pool::result::{FailureKind, ParseResult};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

fn with_oneshot_worker<F>(launcher: &WorkerLauncher, f: F) -> ParseResult
where
    F: FnOnce(&WorkerHandle) -> ParseResult,
{
    // The worker never survives long enough to hit a recycle ceiling.
    let worker = match WorkerHandle::start(launcher, u64::MAX) {
        Ok(worker) => worker,
        Err(e) => {
            return ParseResult::failure(
                FailureKind::NoWorkerAvailable,
                format!("could not start one-shot worker: {}", e),
            )
        }
    };
    debug!(pid = worker.pid(), "one-shot worker started");
    let result = f(&worker);
    worker.shutdown();
    result
}

/// Parse a file on a dedicated short-lived worker.
pub fn parse_file(launcher: &WorkerLauncher, path: &Path, timeout: Duration) -> ParseResult {
    with_oneshot_worker(launcher, |worker| worker.parse_file(path, timeout))
}

/// Parse inline text on a dedicated short-lived worker.
pub fn parse_text(
    launcher: &WorkerLauncher,
    content: &str,
    filename: &str,
    timeout: Duration,
) -> ParseResult {
    with_oneshot_worker(launcher, |worker| {
        worker.parse_text(content, filename, timeout)
    })
}
