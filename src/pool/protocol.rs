//! IPC protocol between the pool and worker subprocesses.
//!
//! Messages are JSON-serialized, one object per newline-delimited UTF-8 line.
//! The worker sends exactly one `{"ready":true,"pid":N}` handshake line
//! before accepting requests; replies are matched to requests by correlation
//! id, never by arrival order.

use serde::{Deserialize, Serialize};

/// Worker error classifications passed through to callers verbatim.
pub mod error_kind {
    pub const SYNTAX: &str = "syntax_error";
    pub const FILE_NOT_FOUND: &str = "file_not_found";
    pub const ENCODING: &str = "encoding_error";
    pub const IO: &str = "io_error";
    pub const INTERNAL: &str = "internal_error";
}

/// One-time startup handshake, worker to pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub ready: bool,
    pub pid: u32,
}

/// Parse request, pool to worker. Carries either a path or inline content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRequest {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub timeout_ms: u64,
}

impl ParseRequest {
    /// Request to parse a file by absolute path.
    pub fn for_path(path: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            id: String::new(),
            path: Some(path.into()),
            content: None,
            filename: None,
            timeout_ms,
        }
    }

    /// Request to parse inline content under a display filename.
    pub fn for_text(
        content: impl Into<String>,
        filename: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            id: String::new(),
            path: None,
            content: Some(content.into()),
            filename: Some(filename.into()),
            timeout_ms,
        }
    }
}

/// Correlated parse result, worker to pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseReply {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ast_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ParseReply {
    pub fn success(id: impl Into<String>, ast_json: String, node_count: usize) -> Self {
        Self {
            id: id.into(),
            ok: true,
            ast_json: Some(ast_json),
            node_count: Some(node_count),
            error_type: None,
            error: None,
        }
    }

    pub fn failure(
        id: impl Into<String>,
        error_type: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            ok: false,
            ast_json: None,
            node_count: None,
            error_type: Some(error_type.into()),
            error: Some(error.into()),
        }
    }
}

/// Uncorrelated notice the worker may emit before self-terminating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecycleNotice {
    pub recycle: bool,
}

/// Uncorrelated control message, pool to worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Control {
    pub command: String,
}

impl Control {
    pub fn shutdown() -> Self {
        Self {
            command: "shutdown".to_string(),
        }
    }
}

/// Any line the pool may read from a worker's stdout.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WorkerLine {
    Reply(ParseReply),
    Handshake(Handshake),
    Recycle(RecycleNotice),
}

/// Any line the worker may read from its stdin.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PoolLine {
    Request(ParseRequest),
    Control(Control),
}

/// Serialize a message to a JSON line (with trailing newline).
pub fn to_line<T: Serialize>(message: &T) -> String {
    let mut json = serde_json::to_string(message).expect("protocol message serialization failed");
    json.push('\n');
    json
}
