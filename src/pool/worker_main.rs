//! Entry point for the hidden worker mode.
//!
//! A worker is this same binary re-executed with the internal-worker
//! subcommand. It speaks the line protocol on stdin/stdout: one ready
//! handshake, then one reply line per request, until stdin closes, a
//! shutdown command arrives, or its recycle ceiling is reached. Everything
//! human-readable goes to stderr; stdout carries protocol lines only.

use crate::pool::protocol::{
    error_kind, to_line, Control, Handshake, ParseReply, ParseRequest, PoolLine, RecycleNotice,
};
use crate::script;
use std::io::{self, BufRead, Write};

/// Run the worker loop on this process's stdio, then exit.
pub fn run_worker() -> ! {
    // The pool may die while we hold an unflushed reply; broken-pipe write
    // errors must surface as Err, not a process-killing signal.
    #[cfg(unix)]
    {
        use nix::sys::signal::{signal, SigHandler, Signal};
        unsafe {
            let _ = signal(Signal::SIGPIPE, SigHandler::SigIgn);
        }
    }

    let recycle_after = std::env::var("MODIDX_RECYCLE_AFTER")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(u64::MAX);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let code = match worker_loop(stdin.lock(), stdout.lock(), recycle_after) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("worker: {}", e);
            1
        }
    };
    std::process::exit(code);
}

fn worker_loop(
    reader: impl BufRead,
    mut writer: impl Write,
    recycle_after: u64,
) -> io::Result<()> {
    let handshake = Handshake {
        ready: true,
        pid: std::process::id(),
    };
    writer.write_all(to_line(&handshake).as_bytes())?;
    writer.flush()?;

    let mut served = 0u64;
    for line in reader.lines() {
        let line = line?;
        let message = match serde_json::from_str::<PoolLine>(&line) {
            Ok(message) => message,
            // A malformed request has no id to reply to; drop it.
            Err(_) => continue,
        };
        match message {
            PoolLine::Control(Control { command }) if command == "shutdown" => return Ok(()),
            PoolLine::Control(_) => continue,
            PoolLine::Request(request) => {
                let reply = handle_request(request);
                writer.write_all(to_line(&reply).as_bytes())?;
                writer.flush()?;
                served += 1;
                if served >= recycle_after {
                    writer.write_all(to_line(&RecycleNotice { recycle: true }).as_bytes())?;
                    writer.flush()?;
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

/// Serve one request. Every failure, including a missing file or bad
/// encoding, becomes a classified reply on the same correlation id.
fn handle_request(request: ParseRequest) -> ParseReply {
    let id = request.id.clone();
    let text = match (&request.content, &request.path) {
        (Some(content), _) => content.clone(),
        (None, Some(path)) => match std::fs::read(path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    return ParseReply::failure(
                        id,
                        error_kind::ENCODING,
                        format!("not valid utf-8: {}", path),
                    )
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return ParseReply::failure(
                    id,
                    error_kind::FILE_NOT_FOUND,
                    format!("file not found: {}", path),
                )
            }
            Err(e) => {
                return ParseReply::failure(id, error_kind::IO, format!("{}: {}", path, e));
            }
        },
        (None, None) => {
            return ParseReply::failure(
                id,
                error_kind::INTERNAL,
                "request carries neither path nor content",
            )
        }
    };

    match script::parse(&text) {
        Ok(file) => match serde_json::to_string(&file) {
            Ok(ast_json) => {
                let node_count = file.node_count();
                ParseReply::success(id, ast_json, node_count)
            }
            Err(e) => ParseReply::failure(id, error_kind::INTERNAL, e.to_string()),
        },
        Err(e) => ParseReply::failure(id, error_kind::SYNTAX, e.to_string()),
    }
}
