//! Handle owning a single worker subprocess.
//!
//! A `WorkerHandle` manages the line-protocol IPC with one worker: a
//! background reader thread drains the worker's stdout and matches replies
//! to waiting callers by correlation id, so several requests can be
//! outstanding against the same worker at once. The only per-request
//! serialization is the stdin write lock; the full round trip is not
//! exclusive. Timeouts are enforced purely on the caller side, and the sole
//! cancellation mechanism is killing the whole subprocess.

use crate::error::{ModidxError, Result};
use crate::pool::protocol::{to_line, Control, ParseReply, ParseRequest, WorkerLine};
use crate::pool::result::{FailureKind, ParseResult};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// How long `start` waits for the ready handshake.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed allowance added to every caller wait budget to cover IPC overhead.
pub const IPC_OVERHEAD: Duration = Duration::from_millis(250);

/// How long `shutdown` waits for a graceful exit before killing.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// How a worker subprocess is launched.
///
/// By default the worker is this same binary re-executed in its hidden
/// internal-worker mode; tests substitute an explicit program path.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments selecting worker mode.
    pub args: Vec<String>,
    /// Corpus root handed to the worker (`MODIDX_ROOT`, also its cwd).
    pub root: PathBuf,
}

impl WorkerLauncher {
    /// Launcher that re-executes the current binary as a worker.
    pub fn current_exe(root: impl Into<PathBuf>) -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| ModidxError::Worker(format!("cannot locate own executable: {}", e)))?;
        Ok(Self {
            program,
            args: vec!["internal-worker".to_string()],
            root: root.into(),
        })
    }
}

/// State shared between caller threads and the background reader thread.
#[derive(Debug)]
struct Shared {
    /// In-flight correlation id -> waiting caller's one-shot channel.
    pending: Mutex<HashMap<String, mpsc::Sender<ParseReply>>>,
    /// True once the ready handshake completed, false after the stream closes.
    alive: AtomicBool,
}

/// Exclusive owner of one worker subprocess.
#[derive(Debug)]
pub struct WorkerHandle {
    pid: u32,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    shared: Arc<Shared>,
    parses_completed: AtomicU64,
    recycle_after: u64,
}

impl WorkerHandle {
    /// Spawn a worker and wait for its ready handshake.
    ///
    /// Any spawn failure, handshake timeout, malformed first line, or
    /// premature stream close kills the partial process and returns an
    /// error; a returned handle is always fully started.
    pub fn start(launcher: &WorkerLauncher, recycle_after: u64) -> Result<Self> {
        let mut cmd = Command::new(&launcher.program);
        cmd.args(&launcher.args)
            .env("MODIDX_ROOT", &launcher.root)
            .env("MODIDX_RECYCLE_AFTER", recycle_after.to_string())
            .current_dir(&launcher.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| ModidxError::Worker(format!("failed to spawn worker: {}", e)))?;

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ModidxError::Worker("worker stdin not captured".into()));
            }
        };
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ModidxError::Worker("worker stdout not captured".into()));
            }
        };

        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            alive: AtomicBool::new(false),
        });

        let (ready_tx, ready_rx) = mpsc::channel();
        {
            let shared = Arc::clone(&shared);
            let name = format!("modidx-reader-{}", child.id());
            if let Err(e) = thread::Builder::new()
                .name(name)
                .spawn(move || reader_loop(stdout, shared, ready_tx))
            {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ModidxError::Worker(format!(
                    "failed to spawn reader thread: {}",
                    e
                )));
            }
        }

        // Covers handshake timeout, malformed first line, and premature
        // stream close (the reader drops the sender without sending).
        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(pid) => {
                debug!(pid, "worker completed ready handshake");
                Ok(Self {
                    pid,
                    child: Mutex::new(child),
                    stdin: Mutex::new(stdin),
                    shared,
                    parses_completed: AtomicU64::new(0),
                    recycle_after,
                })
            }
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(ModidxError::Worker(
                    "worker did not complete the ready handshake".into(),
                ))
            }
        }
    }

    /// Process id the worker reported in its handshake.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Completed round trips served by this worker.
    pub fn parses_completed(&self) -> u64 {
        self.parses_completed.load(Ordering::Relaxed)
    }

    /// Whether the worker has handshaken and has not since exited.
    pub fn is_alive(&self) -> bool {
        if !self.shared.alive.load(Ordering::SeqCst) {
            return false;
        }
        let mut child = self.child.lock().expect("worker child lock poisoned");
        match child.try_wait() {
            Ok(None) => true,
            _ => {
                self.shared.alive.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Whether this worker has served its completed-parse ceiling.
    pub fn needs_recycle(&self) -> bool {
        self.parses_completed.load(Ordering::Relaxed) >= self.recycle_after
    }

    /// Parse a file by absolute path.
    pub fn parse_file(&self, path: &Path, timeout: Duration) -> ParseResult {
        let request = ParseRequest::for_path(path.display().to_string(), duration_ms(timeout));
        self.roundtrip(request, timeout)
    }

    /// Parse inline content under a display filename.
    pub fn parse_text(&self, content: &str, filename: &str, timeout: Duration) -> ParseResult {
        let request = ParseRequest::for_text(content, filename, duration_ms(timeout));
        self.roundtrip(request, timeout)
    }

    fn roundtrip(&self, mut request: ParseRequest, timeout: Duration) -> ParseResult {
        if !self.is_alive() {
            return ParseResult::failure(FailureKind::WorkerDead, "worker process is not alive");
        }

        let id = Uuid::new_v4().to_string();
        request.id = id.clone();

        let (tx, rx) = mpsc::channel();
        self.shared
            .pending
            .lock()
            .expect("pending map poisoned")
            .insert(id.clone(), tx);

        let line = to_line(&request);
        {
            // Serializes writes so concurrent callers never interleave
            // partial lines. This is the only per-request serialization.
            let mut stdin = self.stdin.lock().expect("worker stdin lock poisoned");
            if let Err(e) = stdin
                .write_all(line.as_bytes())
                .and_then(|()| stdin.flush())
            {
                self.remove_pending(&id);
                self.shared.alive.store(false, Ordering::SeqCst);
                return ParseResult::failure(
                    FailureKind::WorkerCrashed,
                    format!("failed to send request to worker: {}", e),
                );
            }
        }

        match rx.recv_timeout(timeout + IPC_OVERHEAD) {
            Ok(reply) => {
                self.parses_completed.fetch_add(1, Ordering::Relaxed);
                ParseResult::from_reply(reply)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.remove_pending(&id);
                warn!(
                    pid = self.pid,
                    timeout_ms = duration_ms(timeout),
                    "parse timed out; killing worker"
                );
                // Coarse-grained cancellation: killing the process dooms any
                // other in-flight requests, which run out their own clocks.
                self.kill();
                ParseResult::failure(
                    FailureKind::ParseTimeout,
                    format!("no response within {} ms", duration_ms(timeout)),
                )
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.remove_pending(&id);
                ParseResult::failure(
                    FailureKind::WorkerCrashed,
                    "response channel closed without a reply",
                )
            }
        }
    }

    fn remove_pending(&self, id: &str) {
        self.shared
            .pending
            .lock()
            .expect("pending map poisoned")
            .remove(id);
    }

    /// Abrupt terminate and reap, best effort.
    pub fn kill(&self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().expect("worker child lock poisoned");
        let _ = child.kill();
        let _ = child.wait();
    }

    /// Ask the worker to exit gracefully; kill it if it does not comply.
    pub fn shutdown(&self) {
        {
            let mut stdin = self.stdin.lock().expect("worker stdin lock poisoned");
            let line = to_line(&Control::shutdown());
            let _ = stdin
                .write_all(line.as_bytes())
                .and_then(|()| stdin.flush());
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            {
                let mut child = self.child.lock().expect("worker child lock poisoned");
                if let Ok(Some(_)) = child.try_wait() {
                    self.shared.alive.store(false, Ordering::SeqCst);
                    return;
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.kill();
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.shared.alive.load(Ordering::SeqCst) {
            self.kill();
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Background loop draining one worker's stdout for the handle's lifetime.
///
/// The first line must be the ready handshake; its pid is delivered over
/// `ready_tx`. After that, correlated replies are matched against the
/// pending map and recycling notices are observed and ignored. Malformed or
/// unmatched lines are dropped silently. The loop exits when the stream
/// closes; requests still pending at that point are left to run out their
/// own caller-side clocks.
fn reader_loop(stdout: ChildStdout, shared: Arc<Shared>, ready_tx: mpsc::Sender<u32>) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    match reader.read_line(&mut line) {
        Ok(0) | Err(_) => return,
        Ok(_) => {}
    }
    match serde_json::from_str::<WorkerLine>(line.trim()) {
        Ok(WorkerLine::Handshake(h)) if h.ready => {
            shared.alive.store(true, Ordering::SeqCst);
            let _ = ready_tx.send(h.pid);
        }
        _ => {
            trace!("worker first line was not a ready handshake");
            return;
        }
    }
    drop(ready_tx);

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match serde_json::from_str::<WorkerLine>(line.trim()) {
            Ok(WorkerLine::Reply(reply)) => {
                let waiter = shared
                    .pending
                    .lock()
                    .expect("pending map poisoned")
                    .remove(&reply.id);
                match waiter {
                    // The caller may have timed out concurrently; a failed
                    // send is dropped like any other unmatched reply.
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => trace!(id = %reply.id, "dropping reply with no waiting caller"),
                }
            }
            Ok(WorkerLine::Recycle(_)) => {
                // The worker will self-exit; the pool discovers this lazily
                // on next dispatch.
                debug!("worker announced self-recycle");
            }
            Ok(WorkerLine::Handshake(_)) => {
                trace!("dropping duplicate handshake line");
            }
            Err(_) => {
                trace!("dropping malformed worker line");
            }
        }
    }

    shared.alive.store(false, Ordering::SeqCst);
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    /// Launcher running a shell script in place of a real worker.
    fn sh_launcher(script: &str) -> WorkerLauncher {
        WorkerLauncher {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            root: std::env::temp_dir(),
        }
    }

    /// Fake worker: handshakes, then echoes a success reply for every
    /// request, reusing the request's correlation id.
    const ECHO_WORKER: &str = r#"
        echo '{"ready":true,"pid":7}'
        exec sed -un 's/.*"id":"\([^"]*\)".*/{"id":"\1","ok":true,"ast_json":"{\\"statements\\":[]}","node_count":1}/p'
    "#;

    #[test]
    fn test_start_and_handshake() {
        let launcher = sh_launcher("echo '{\"ready\":true,\"pid\":42}'; sleep 30");
        let handle = WorkerHandle::start(&launcher, 100).unwrap();
        assert_eq!(handle.pid(), 42);
        assert!(handle.is_alive());
        assert!(!handle.needs_recycle());
        handle.kill();
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_start_fails_on_premature_exit() {
        let launcher = sh_launcher("exit 0");
        let err = WorkerHandle::start(&launcher, 100).unwrap_err();
        assert!(err.to_string().contains("handshake"));
    }

    #[test]
    fn test_start_fails_on_malformed_handshake() {
        let launcher = sh_launcher("echo hello; sleep 30");
        assert!(WorkerHandle::start(&launcher, 100).is_err());
    }

    #[test]
    fn test_start_fails_on_missing_program() {
        let launcher = WorkerLauncher {
            program: PathBuf::from("/nonexistent/worker-binary"),
            args: vec![],
            root: std::env::temp_dir(),
        };
        assert!(WorkerHandle::start(&launcher, 100).is_err());
    }

    #[test]
    fn test_parse_against_dead_worker_is_worker_dead() {
        let launcher = sh_launcher("echo '{\"ready\":true,\"pid\":1}'; sleep 30");
        let handle = WorkerHandle::start(&launcher, 100).unwrap();
        handle.kill();
        let result = handle.parse_file(Path::new("/tmp/x.txt"), Duration::from_secs(1));
        assert_eq!(result.failure_kind(), Some(&FailureKind::WorkerDead));
    }

    #[test]
    fn test_roundtrip_correlates_reply() {
        let launcher = sh_launcher(ECHO_WORKER);
        let handle = WorkerHandle::start(&launcher, 100).unwrap();
        let result = handle.parse_file(Path::new("/tmp/a.txt"), Duration::from_secs(5));
        assert!(result.is_success(), "got {:?}", result);
        assert_eq!(handle.parses_completed(), 1);
        handle.kill();
    }

    #[test]
    fn test_timeout_kills_worker() {
        // Handshakes but never replies.
        let launcher = sh_launcher("echo '{\"ready\":true,\"pid\":9}'; sleep 60");
        let handle = WorkerHandle::start(&launcher, 100).unwrap();
        let started = Instant::now();
        let result = handle.parse_file(Path::new("/tmp/a.txt"), Duration::from_millis(50));
        assert_eq!(result.failure_kind(), Some(&FailureKind::ParseTimeout));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_collateral_requests_run_out_their_own_clocks() {
        // Handshakes but never replies, so one request times out and kills
        // the worker while the other is still waiting.
        let launcher = sh_launcher("echo '{\"ready\":true,\"pid\":11}'; sleep 60");
        let handle = Arc::new(WorkerHandle::start(&launcher, 100).unwrap());

        let victim = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                let started = Instant::now();
                let result =
                    handle.parse_file(Path::new("/tmp/slow.txt"), Duration::from_millis(1500));
                (result, started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(100));
        let killer = handle.parse_file(Path::new("/tmp/fast.txt"), Duration::from_millis(50));
        assert_eq!(killer.failure_kind(), Some(&FailureKind::ParseTimeout));
        assert!(!handle.is_alive());

        // The collateral victim is not failed early by the worker's death;
        // it times out on its own budget.
        let (result, elapsed) = victim.join().unwrap();
        assert_eq!(result.failure_kind(), Some(&FailureKind::ParseTimeout));
        assert!(elapsed >= Duration::from_millis(1500), "returned after {:?}", elapsed);
    }

    #[test]
    fn test_needs_recycle_after_ceiling() {
        let launcher = sh_launcher(ECHO_WORKER);
        let handle = WorkerHandle::start(&launcher, 2).unwrap();
        assert!(!handle.needs_recycle());
        for _ in 0..2 {
            let result = handle.parse_file(Path::new("/tmp/a.txt"), Duration::from_secs(5));
            assert!(result.is_success());
        }
        assert!(handle.needs_recycle());
        handle.kill();
    }

    #[test]
    fn test_shutdown_reaps_worker() {
        // Exits on any stdin line, which includes the shutdown command.
        let launcher = sh_launcher("echo '{\"ready\":true,\"pid\":3}'; read _line; exit 0");
        let handle = WorkerHandle::start(&launcher, 100).unwrap();
        handle.shutdown();
        assert!(!handle.is_alive());
    }
}
