//! Control seam over the OS process behind a codec handle.

use std::process::Child;

use log::debug;

/// How a codec process finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    Success,
    Failure(String),
}

/// Exit polling and termination for the process feeding a handle.
pub trait ProcessControl: Send {
    /// Non-blocking check; `Some` once the process has finished.
    fn poll_exit(&mut self) -> Option<ProcessExit>;

    /// Forcibly stop the process and reap it. Must tolerate repeated calls and
    /// an already-exited process.
    fn terminate(&mut self);
}

impl ProcessControl for Child {
    fn poll_exit(&mut self) -> Option<ProcessExit> {
        match self.try_wait() {
            Ok(Some(status)) if status.success() => Some(ProcessExit::Success),
            Ok(Some(status)) => Some(ProcessExit::Failure(status.to_string())),
            Ok(None) => None,
            Err(err) => Some(ProcessExit::Failure(err.to_string())),
        }
    }

    fn terminate(&mut self) {
        if let Err(err) = self.kill() {
            // Already reaped or exited on its own.
            debug!("kill of codec process {} skipped: {}", self.id(), err);
        }
        if let Err(err) = self.wait() {
            debug!("wait on codec process {} failed: {}", self.id(), err);
        }
    }
}

/// Process stand-in for handles whose channels are not backed by a child
/// process (in-memory channels, pipes owned elsewhere).
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl ProcessControl for Detached {
    fn poll_exit(&mut self) -> Option<ProcessExit> {
        Some(ProcessExit::Success)
    }

    fn terminate(&mut self) {}
}
