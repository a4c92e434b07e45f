//! modidx - script corpus indexing pipeline.
//!
//! The core subsystem is the persistent parse worker pool in [`pool`]: a
//! supervisor keeping a fixed number of long-lived worker subprocesses alive,
//! each parsing many script files without repeated process-startup cost, with
//! transparent recovery from worker death, hangs, and memory growth.

pub mod cli;
pub mod error;
pub mod logging;
pub mod pool;
pub mod scan;
pub mod script;
