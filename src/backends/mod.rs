//! Evaluation backends
//!
//! A backend runs compiled JavaScript in some remote runtime and reports
//! what happened. Every backend implements the mandatory [`EvalBackend`]
//! methods; default-`None` probes expose the optional capabilities.
//!
//! # Lifecycle
//!
//! ```text
//! setup --> evaluate / load ... --> tear_down
//! ```
//!
//! `setup` and `tear_down` run exactly once per session; other calls are
//! only valid in between.

pub mod node;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::build::BuildError;
use crate::repl::ReplOptions;
use crate::source_map::StackFrame;

/// Backend errors
///
/// Apart from [`BackendError::LoadFailed`], these mean the remote runtime
/// can no longer be trusted and end the session.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("JavaScript interpreter not found: {command}")]
    InterpreterNotFound {
        command: String,
        #[source]
        source: which::Error,
    },

    #[error("Failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Could not connect to {addr} after {attempts} attempts: {source}")]
    Connect {
        addr: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("JavaScript process exited before accepting connections ({status})")]
    ProcessExited { status: String },

    #[error("Connection closed by the JavaScript runtime")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed response: {0}")]
    Protocol(String),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Bootstrap step '{step}' failed: {message}")]
    Bootstrap { step: &'static str, message: String },

    #[error("Failed to load {module}: {message}")]
    LoadFailed { module: String, message: String },
}

impl BackendError {
    /// Whether the session has to end
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BackendError::LoadFailed { .. })
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Terminal status of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalStatus {
    Success,
    Error,
    Exception,
}

impl fmt::Display for EvalStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(match self {
            EvalStatus::Success => "success",
            EvalStatus::Error => "error",
            EvalStatus::Exception => "exception",
        })
    }
}

/// Outcome of one evaluation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalResult {
    Success {
        value: String,
    },
    Error {
        value: String,
        stacktrace: Option<String>,
    },
    Exception {
        value: String,
        stacktrace: Option<String>,
    },
}

impl EvalResult {
    pub fn success(value: impl Into<String>) -> Self {
        EvalResult::Success {
            value: value.into(),
        }
    }

    pub fn exception(
        value: impl Into<String>,
        stacktrace: Option<String>,
    ) -> Self {
        EvalResult::Exception {
            value: value.into(),
            stacktrace,
        }
    }

    pub fn status(&self) -> EvalStatus {
        match self {
            EvalResult::Success { .. } => EvalStatus::Success,
            EvalResult::Error { .. } => EvalStatus::Error,
            EvalResult::Exception { .. } => EvalStatus::Exception,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            EvalResult::Success { value }
            | EvalResult::Error { value, .. }
            | EvalResult::Exception { value, .. } => value,
        }
    }

    /// Raw trace text, only ever present on failures
    pub fn stacktrace(&self) -> Option<&str> {
        match self {
            EvalResult::Success { .. } => None,
            EvalResult::Error { stacktrace, .. } | EvalResult::Exception { stacktrace, .. } => {
                stacktrace.as_deref()
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EvalResult::Success { .. })
    }
}

/// Optional capability: turning raw traces into canonical frames
pub trait StacktraceParser {
    fn parse_stacktrace(
        &self,
        raw: &str,
        result: &EvalResult,
        options: &ReplOptions,
    ) -> Vec<StackFrame>;
}

/// The mandatory backend interface plus capability probes
pub trait EvalBackend {
    /// Start the runtime; called once before anything else
    fn setup(
        &mut self,
        options: &ReplOptions,
    ) -> BackendResult<()>;

    /// Evaluate one JavaScript fragment and wait for its terminal status
    fn evaluate(
        &mut self,
        filename: &str,
        line: u32,
        code: &str,
    ) -> BackendResult<EvalResult>;

    /// Deliver one compiled unit providing `provides`, located at `url`
    fn load(
        &mut self,
        provides: &[String],
        url: &Path,
    ) -> BackendResult<()>;

    /// Release every resource; called once at the end of the session
    fn tear_down(&mut self) -> BackendResult<()>;

    /// Target-specific option defaults, merged under the caller's
    fn repl_options(&self) -> Option<ReplOptions> {
        None
    }

    /// Trace parsing, when the backend supports mapped traces
    fn stacktrace_parser(&self) -> Option<&dyn StacktraceParser> {
        None
    }
}

/// Render a socket address for error messages
pub(crate) fn describe_addr(
    host: &str,
    port: u16,
) -> String {
    match host.parse::<std::net::IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{}:{}", host, port),
    }
}

/// Absolute form of a path, falling back to the path itself
pub(crate) fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
