//! Error type shared by codec handles, sample streams and the mixer.

use std::sync::Arc;

use thiserror::Error;

/// Result alias for transmux operations.
pub type Result<T> = std::result::Result<T, MixError>;

/// Errors raised while spawning, reading, writing or mixing streams.
///
/// The type is `Clone` so the most recent failure can be kept in an error slot
/// and handed out again from `err()` accessors.
#[derive(Error, Debug, Clone)]
pub enum MixError {
    #[error("codec target must not be empty")]
    InvalidTarget,

    #[error("failed to start `{program}`: {reason}")]
    SpawnFailed {
        program: String,
        reason: String,
        diagnostics: String,
    },

    #[error("codec process for `{target}` exited with {status}")]
    ProcessExited {
        target: String,
        status: String,
        diagnostics: String,
    },

    #[error("not running")]
    NotRunning,

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("end of stream")]
    EndOfStream,

    #[error("no sample arrived within {deadline_ms} ms")]
    DeadlineMissed { deadline_ms: u64 },

    #[error("sink write failed: {0}")]
    SinkWrite(Box<MixError>),

    #[error("invalid encoder profile: {field} must not be empty")]
    InvalidProfile { field: &'static str },

    #[error("no sink attached")]
    NoSink,

    #[error("a running sink is already attached")]
    SinkAttached,

    #[error("I/O error: {0}")]
    Io(#[source] Arc<std::io::Error>),
}

impl From<std::io::Error> for MixError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl MixError {
    /// Stable identifier for logs and CLI output.
    pub fn error_code(&self) -> &'static str {
        match self {
            MixError::InvalidTarget => "INVALID_TARGET",
            MixError::SpawnFailed { .. } => "SPAWN_FAILED",
            MixError::ProcessExited { .. } => "PROCESS_EXITED",
            MixError::NotRunning => "NOT_RUNNING",
            MixError::ShortRead { .. } => "SHORT_READ",
            MixError::EndOfStream => "END_OF_STREAM",
            MixError::DeadlineMissed { .. } => "DEADLINE_MISSED",
            MixError::SinkWrite(_) => "SINK_WRITE",
            MixError::InvalidProfile { .. } => "INVALID_PROFILE",
            MixError::NoSink => "NO_SINK",
            MixError::SinkAttached => "SINK_ATTACHED",
            MixError::Io(_) => "IO_ERROR",
        }
    }

    /// Whether the caller can keep using the owning object after this error.
    ///
    /// Construction failures and a dead sink are terminal; `NotRunning` only
    /// tells the caller to stop using the closed object.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MixError::NotRunning | MixError::NoSink | MixError::SinkAttached
        )
    }

    /// Captured codec stderr attached to the error, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            MixError::SpawnFailed { diagnostics, .. }
            | MixError::ProcessExited { diagnostics, .. } => Some(diagnostics.as_str()),
            MixError::SinkWrite(inner) => inner.diagnostics(),
            _ => None,
        }
    }
}
