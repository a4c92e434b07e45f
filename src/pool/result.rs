//! The uniform result value returned from every parse call.
//!
//! Every failure mode of the pool, of a worker, and of the parse itself is
//! mapped into [`ParseResult`]; callers never see a raw error or panic.

use super::protocol::{error_kind, ParseReply};

/// Outcome of a single parse, success or classified failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    Success {
        /// The AST serialized as JSON text.
        ast_json: String,
        node_count: usize,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
}

/// Why a parse call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Dispatch-time liveness check failed; no I/O attempted.
    WorkerDead,
    /// The pool could not produce a usable worker for this call.
    NoWorkerAvailable,
    /// The pool never started or was shut down.
    PoolNotRunning,
    /// No correlated response within budget; the worker was killed.
    ParseTimeout,
    /// Send failure or a wait that fired with no stored response.
    WorkerCrashed,
    /// The worker's own classification, passed through verbatim.
    Parser(String),
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WorkerDead => write!(f, "worker_dead"),
            Self::NoWorkerAvailable => write!(f, "no_worker_available"),
            Self::PoolNotRunning => write!(f, "pool_not_running"),
            Self::ParseTimeout => write!(f, "parse_timeout"),
            Self::WorkerCrashed => write!(f, "worker_crashed"),
            Self::Parser(kind) => write!(f, "{}", kind),
        }
    }
}

impl ParseResult {
    pub fn success(ast_json: impl Into<String>, node_count: usize) -> Self {
        Self::Success {
            ast_json: ast_json.into(),
            node_count,
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The failure kind, if this is a failure.
    pub fn failure_kind(&self) -> Option<&FailureKind> {
        match self {
            Self::Failure { kind, .. } => Some(kind),
            Self::Success { .. } => None,
        }
    }

    /// Map a worker's wire reply into the caller-facing result, passing the
    /// worker's own success/failure classification through unchanged.
    pub(crate) fn from_reply(reply: ParseReply) -> Self {
        if reply.ok {
            Self::Success {
                ast_json: reply.ast_json.unwrap_or_default(),
                node_count: reply.node_count.unwrap_or(0),
            }
        } else {
            Self::Failure {
                kind: FailureKind::Parser(
                    reply
                        .error_type
                        .unwrap_or_else(|| error_kind::INTERNAL.to_string()),
                ),
                message: reply.error.unwrap_or_default(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_success_reply() {
        let reply = ParseReply::success("id", "{\"statements\":[]}".to_string(), 3);
        let result = ParseResult::from_reply(reply);
        assert!(result.is_success());
        match result {
            ParseResult::Success {
                ast_json,
                node_count,
            } => {
                assert!(!ast_json.is_empty());
                assert_eq!(node_count, 3);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_from_failure_reply_passes_kind_through() {
        let reply = ParseReply::failure("id", error_kind::FILE_NOT_FOUND, "file not found: /x");
        let result = ParseResult::from_reply(reply);
        assert_eq!(
            result.failure_kind(),
            Some(&FailureKind::Parser("file_not_found".to_string()))
        );
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::WorkerDead.to_string(), "worker_dead");
        assert_eq!(FailureKind::ParseTimeout.to_string(), "parse_timeout");
        assert_eq!(
            FailureKind::Parser("syntax_error".into()).to_string(),
            "syntax_error"
        );
    }

    #[test]
    fn test_malformed_failure_reply_defaults_to_internal() {
        let reply = ParseReply {
            id: "id".into(),
            ok: false,
            ast_json: None,
            node_count: None,
            error_type: None,
            error: None,
        };
        let result = ParseResult::from_reply(reply);
        assert_eq!(
            result.failure_kind(),
            Some(&FailureKind::Parser("internal_error".to_string()))
        );
    }
}
