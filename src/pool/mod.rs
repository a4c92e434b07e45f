//! Persistent parse worker pool.
//!
//! Parsing runs in subprocess workers so a parser crash or hang can never
//! take the host process down. The pool keeps a fixed set of workers warm,
//! dispatches round-robin, and replaces dead or worn-out workers lazily at
//! use time. [`ParseService`] is the front end the rest of the crate talks
//! to; every call returns a [`ParseResult`], never an error.

pub mod handle;
pub mod oneshot;
#[allow(clippy::module_inception)]
pub mod pool;
pub mod protocol;
pub mod result;
pub mod service;
pub mod worker_main;

pub use handle::{WorkerHandle, WorkerLauncher};
pub use pool::{default_worker_count, ParsePool, PoolConfig, PoolStats, WorkerStats};
pub use result::{FailureKind, ParseResult};
pub use service::{ParseService, ServiceConfig, DEFAULT_TIMEOUT};
