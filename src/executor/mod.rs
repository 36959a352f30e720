//! Multi-language code execution.
//!
//! Untrusted source plus a language tag goes in; a uniform
//! [`ExecutionResult`] comes out. Each request gets a private [`Workspace`],
//! the matching [`Toolchain`] materializes and compiles it, and the
//! [`ProcessRunner`] runs every step under a deadline.

pub mod capabilities;
mod dispatcher;
mod language;
mod process;
pub mod toolchain;
mod workspace;

pub use capabilities::ToolchainStatus;
pub use dispatcher::Dispatcher;
pub use language::{Language, UnknownLanguage};
pub use process::{Invocation, ProcessOutcome, ProcessRunner, SpawnError};
pub use toolchain::{BuildPlan, Toolchain};
pub use workspace::{Workspace, WorkspaceError, WorkspaceKind};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default compile-step deadline
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default run-step deadline
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(10);
/// Default per-stream output cap
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Configuration shared by every execution
#[derive(Clone, Debug)]
pub struct ExecutionConfig {
    /// Deadline for compiler invocations and combined build-and-run steps
    pub compile_timeout: Duration,
    /// Deadline for program runs (and the Python interpreter)
    pub run_timeout: Duration,
    /// Maximum bytes kept per output stream
    pub max_output_bytes: usize,
    /// Parent directory for workspaces (OS temp dir when `None`)
    pub temp_root: Option<PathBuf>,
    /// Python interpreter binary
    pub python_interpreter: String,
    /// Target framework written into generated C# project files
    pub dotnet_target_framework: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            compile_timeout: DEFAULT_COMPILE_TIMEOUT,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            temp_root: None,
            python_interpreter: "python3".to_string(),
            dotnet_target_framework: "net6.0".to_string(),
        }
    }
}

impl ExecutionConfig {
    /// Deadline for a step of the given class
    #[must_use]
    pub const fn timeout_for(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Compile => self.compile_timeout,
            Phase::Run => self.run_timeout,
        }
    }
}

/// Which step of an execution a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Compiler invocation
    Compile,
    /// Program (or interpreter) invocation
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile => f.write_str("Compilation"),
            Self::Run => f.write_str("Code execution"),
        }
    }
}

/// Failure classes, in the order a request can hit them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or empty input; nothing was spawned
    Validation,
    /// Language tag with no adapter
    UnsupportedLanguage,
    /// Compiler or runtime binary absent from the host
    ToolchainMissing,
    /// Compiler exited non-zero
    Compilation,
    /// Program exited non-zero or was killed by a signal
    Runtime,
    /// A step exceeded its deadline
    Timeout,
    /// Anything else
    Internal,
}

/// Execution errors
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Missing or empty code / language
    #[error("{0}")]
    Validation(String),

    /// Unrecognized language tag
    #[error(transparent)]
    UnsupportedLanguage(#[from] UnknownLanguage),

    /// Toolchain binary not installed
    #[error("{0}")]
    ToolchainMissing(String),

    /// Compiler rejected the source
    #[error("Compilation error: {0}")]
    Compilation(String),

    /// Program ran and failed
    #[error("program exited with code {exit_code:?} (signal {signal:?})")]
    Runtime {
        /// Captured stdout
        stdout: String,
        /// Captured stderr, if any
        stderr: Option<String>,
        /// Exit code, if the program exited normally
        exit_code: Option<i32>,
        /// Terminating signal, if any
        signal: Option<i32>,
    },

    /// Deadline exceeded
    #[error("{} timed out ({} limit)", .phase, describe_limit(.limit))]
    Timeout {
        /// Step that was killed
        phase: Phase,
        /// Deadline that applied
        limit: Duration,
        /// Stdout produced before the kill
        partial_output: String,
    },

    /// Workspace could not be prepared
    #[error("Execution error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// Unexpected fault
    #[error("Execution error: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// Failure class of this error
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::UnsupportedLanguage(_) => FailureKind::UnsupportedLanguage,
            Self::ToolchainMissing(_) => FailureKind::ToolchainMissing,
            Self::Compilation(_) => FailureKind::Compilation,
            Self::Runtime { .. } => FailureKind::Runtime,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Workspace(_) | Self::Internal(_) => FailureKind::Internal,
        }
    }
}

fn describe_limit(limit: &Duration) -> String {
    if limit.subsec_nanos() == 0 {
        format!("{} seconds", limit.as_secs())
    } else {
        format!("{} ms", limit.as_millis())
    }
}

/// The response contract of an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Final step exited 0 within its deadline
    pub success: bool,
    /// Stdout of the final step (partial on failure)
    pub output: String,
    /// Diagnostics, stderr, or failure notice
    pub error: Option<String>,
    /// Failure class; not part of the wire format
    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    /// A run that exited 0. Non-empty stderr (warnings) is passed through.
    #[must_use]
    pub fn completed(stdout: String, stderr: Option<String>) -> Self {
        Self {
            success: true,
            output: stdout,
            error: stderr.filter(|s| !s.is_empty()),
            failure: None,
        }
    }
}

impl From<ExecutionError> for ExecutionResult {
    fn from(err: ExecutionError) -> Self {
        let failure = Some(err.kind());
        let message = err.to_string();
        match err {
            ExecutionError::Runtime {
                stdout,
                stderr,
                signal,
                ..
            } => Self {
                success: false,
                output: stdout,
                error: stderr
                    .filter(|s| !s.is_empty())
                    .or_else(|| signal.map(|sig| format!("Process terminated by signal {sig}"))),
                failure,
            },
            ExecutionError::Timeout { partial_output, .. } => Self {
                success: false,
                output: partial_output,
                error: Some(message),
                failure,
            },
            _ => Self {
                success: false,
                output: String::new(),
                error: Some(message),
                failure,
            },
        }
    }
}
