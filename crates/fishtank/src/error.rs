use std::time::Duration;

use thiserror::Error;

/// Defines the failure kinds surfaced by this crate.
///
/// Functions throughout the crate return `eyre::Result` for flexible
/// reporting; callers that need to react to a specific failure (a timed-out
/// wait, a rejected name) can downcast to one of these types.

/// Raised when a cluster or node identifier contains characters outside
/// `[A-Za-z0-9_-]` or is empty. Names double as docker resource names and
/// hostnames, so they are validated before any resource is touched.
#[derive(Debug, Clone, Error)]
#[error("invalid name {0:?}: names may only contain letters, numbers, underscores, or hyphens")]
pub struct InvalidNameError(pub String);

/// Raised by [`crate::wait::loop_with_timeout`] when the deadline elapses.
/// Carries the last readiness reason observed so flaky waits are debuggable.
#[derive(Debug, Clone, Error)]
#[error("timeout of {timeout:?} exceeded\nstatus: {reason}")]
pub struct TimeoutError {
    pub timeout: Duration,
    pub reason: String,
}

/// A docker command exited with a non-zero status. The captured output is
/// kept verbatim; backend command failures are never retried.
#[derive(Debug, Clone, Error)]
#[error("command `{command}` exited with status {}:\n{stderr}", exit_code_display(*.exit_code))]
pub struct CommandError {
    pub command: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

fn exit_code_display(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Errors from the node RPC collaborator.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("failed to connect to node RPC at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("RPC request `{route}` failed with status {status}: {message}")]
    Response {
        route: String,
        status: u16,
        message: String,
    },

    #[error("RPC connection closed unexpectedly")]
    ConnectionClosed,

    #[error("RPC I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RPC codec error: {0}")]
    Codec(String),
}

impl RpcError {
    /// The 404-equivalent shape: the queried entity does not exist (yet).
    /// Part of the condition semantics of `mine_until(TransactionMined)`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RpcError::Response { status: 404, .. })
    }
}
