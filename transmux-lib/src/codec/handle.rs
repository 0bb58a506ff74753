//! Duplex byte channel over one codec process.

use std::io::{ErrorKind, Read, Write};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::error::{MixError, Result};

use super::diagnostics::{spawn_drain, DiagnosticTail};
use super::process::{ProcessControl, ProcessExit};
use super::profile::{CodecInvocation, DecodeProfile};

const EXIT_POLL_MS: u64 = 25;
const FINISH_POLL_MS: u64 = 10;

/// The three channels of a codec process, as seen from this side.
pub struct CodecChannels {
    /// Feeds the process stdin.
    pub input: Box<dyn Write + Send>,
    /// Process stdout.
    pub output: Box<dyn Read + Send>,
    /// Process stderr.
    pub diagnostics: Box<dyn Read + Send>,
}

struct HandleShared {
    target: String,
    running: AtomicBool,
    last_error: Mutex<Option<MixError>>,
    input: Mutex<Option<Box<dyn Write + Send>>>,
    output: Mutex<Option<Box<dyn Read + Send>>>,
    diagnostics: Arc<DiagnosticTail>,
    process: Mutex<Box<dyn ProcessControl>>,
}

impl HandleShared {
    fn set_error(&self, err: MixError) {
        *self.last_error.lock().unwrap() = Some(err);
    }

    fn close(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.process.lock().unwrap().terminate();

        // A reader or writer blocked inside its channel holds the lock; it
        // drops the channel itself once it observes `running == false`.
        if let Ok(mut input) = self.input.try_lock() {
            input.take();
        }
        if let Ok(mut output) = self.output.try_lock() {
            output.take();
        }
        debug!("closed codec handle for {}", self.target);
    }

    /// Record `err` and close; used for fatal channel failures.
    fn fail(&self, err: MixError) {
        self.set_error(err);
        self.close();
    }
}

/// One external codec process exposed as a duplex byte channel.
///
/// Reads come from the process stdout and writes go to its stdin. Both sides
/// are independently locked, so one thread may read encoded output while
/// another writes PCM. Once closed, every operation reports
/// [`MixError::NotRunning`]; a handle is never revived.
pub struct CodecHandle {
    shared: Arc<HandleShared>,
}

impl CodecHandle {
    /// Spawn the default codec program on `target`.
    ///
    /// An empty `args` list substitutes the default decode profile (raw `f64`
    /// PCM, 48 kHz, stereo, one thread); otherwise `args` is passed verbatim.
    pub fn spawn(target: &str, args: &[String]) -> Result<Self> {
        let invocation = if args.is_empty() {
            CodecInvocation::decoder(target, &DecodeProfile::default())
        } else {
            CodecInvocation::new(crate::constants::DEFAULT_PROGRAM, args.to_vec())
        };
        Self::spawn_invocation(target, &invocation)
    }

    /// Spawn `invocation` and attach its stdin, stdout and stderr.
    ///
    /// # Arguments
    ///
    /// * `target` - Input or output locator the process works on; must not be
    ///   empty. Also used as the handle label in logs.
    /// * `invocation` - Program and full argument list.
    pub fn spawn_invocation(target: &str, invocation: &CodecInvocation) -> Result<Self> {
        validate_target(target)?;

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| MixError::SpawnFailed {
                program: invocation.program.clone(),
                reason: err.to_string(),
                diagnostics: String::new(),
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(stdout), Some(stderr)) = (stdin, stdout, stderr) else {
            child.terminate();
            return Err(MixError::SpawnFailed {
                program: invocation.program.clone(),
                reason: "failed to attach stdio channels".to_string(),
                diagnostics: String::new(),
            });
        };

        info!(
            "spawned `{}` (pid {}) for {}",
            invocation.program,
            child.id(),
            target
        );

        let channels = CodecChannels {
            input: Box::new(stdin),
            output: Box::new(stdout),
            diagnostics: Box::new(stderr),
        };
        let program = invocation.program.clone();
        Self::from_channels(target, channels, Box::new(child)).map_err(|err| match err {
            MixError::Io(io) => MixError::SpawnFailed {
                program,
                reason: io.to_string(),
                diagnostics: String::new(),
            },
            other => other,
        })
    }

    /// Build a running handle from already-open channels.
    ///
    /// Starts the stderr drain and the exit watcher. If a helper thread cannot
    /// be started, the process is terminated before the error is returned.
    pub fn from_channels(
        target: &str,
        channels: CodecChannels,
        mut process: Box<dyn ProcessControl>,
    ) -> Result<Self> {
        validate_target(target)?;

        let CodecChannels {
            input,
            output,
            diagnostics,
        } = channels;

        let (tail, _drain) = match spawn_drain(target, diagnostics) {
            Ok(drain) => drain,
            Err(err) => {
                process.terminate();
                return Err(err.into());
            }
        };

        let shared = Arc::new(HandleShared {
            target: target.to_string(),
            running: AtomicBool::new(true),
            last_error: Mutex::new(None),
            input: Mutex::new(Some(input)),
            output: Mutex::new(Some(output)),
            diagnostics: tail,
            process: Mutex::new(process),
        });

        let watched = shared.clone();
        let watcher = thread::Builder::new()
            .name(format!("codec-watch:{}", target))
            .spawn(move || watch_exit(watched));
        if let Err(err) = watcher {
            shared.close();
            return Err(err.into());
        }

        Ok(Self { shared })
    }

    /// Target locator this handle was spawned for.
    pub fn target(&self) -> &str {
        &self.shared.target
    }

    /// Return `true` until the handle has been closed.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Last captured error. Only the most recent failure is kept, so sample
    /// it right after observing a failure elsewhere.
    pub fn err(&self) -> Option<MixError> {
        self.shared.last_error.lock().unwrap().clone()
    }

    /// Read from the process output.
    ///
    /// End of stream and channel errors are fatal: the handle records the
    /// error and closes itself before returning it.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_running()?;
        let mut output = self.shared.output.lock().unwrap();
        let Some(channel) = output.as_mut() else {
            return Err(MixError::NotRunning);
        };

        let result = loop {
            match channel.read(buf) {
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        if !self.is_running() {
            // Closed while this read was in flight.
            output.take();
            return Err(MixError::NotRunning);
        }

        match result {
            Ok(0) if !buf.is_empty() => {
                drop(output);
                debug!("end of output from {}", self.shared.target);
                self.shared.fail(MixError::EndOfStream);
                Err(MixError::EndOfStream)
            }
            Ok(n) => Ok(n),
            Err(err) => {
                drop(output);
                let err = MixError::from(err);
                warn!("read from {} failed: {}", self.shared.target, err);
                self.shared.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Write all of `buf` to the process input.
    ///
    /// Failures are returned to the caller without closing the handle.
    pub fn write(&self, buf: &[u8]) -> Result<()> {
        self.ensure_running()?;
        let mut input = self.shared.input.lock().unwrap();
        let Some(channel) = input.as_mut() else {
            return Err(MixError::NotRunning);
        };

        let result = channel.write_all(buf);
        if !self.is_running() {
            input.take();
            return Err(MixError::NotRunning);
        }
        result.map_err(MixError::from)
    }

    /// Read pending stderr output; returns `Ok(0)` when nothing is buffered.
    pub fn read_error(&self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_running()?;
        Ok(self.shared.diagnostics.read_pending(buf))
    }

    /// Recent stderr lines of the process.
    pub fn diagnostics(&self) -> String {
        self.shared.diagnostics.text()
    }

    /// Close the process input and wait up to `grace` for the process to exit
    /// on its own, so an encoder can flush its trailer. The handle stays open;
    /// call [`close`](Self::close) afterwards.
    ///
    /// Returns `true` if the process exited within the grace period.
    pub fn finish(&self, grace: Duration) -> bool {
        if !self.is_running() {
            return false;
        }
        if let Some(mut input) = self.shared.input.lock().unwrap().take() {
            if let Err(err) = input.flush() {
                debug!("flush of {} input failed: {}", self.shared.target, err);
            }
        }

        let started = Instant::now();
        loop {
            if self.shared.process.lock().unwrap().poll_exit().is_some() {
                return true;
            }
            if started.elapsed() >= grace {
                warn!(
                    "{} did not exit within {} ms of end of input",
                    self.shared.target,
                    grace.as_millis()
                );
                return false;
            }
            thread::sleep(Duration::from_millis(FINISH_POLL_MS));
        }
    }

    /// Terminate the process and close all channels. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(MixError::NotRunning)
        }
    }
}

impl Drop for CodecHandle {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl std::fmt::Debug for CodecHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecHandle")
            .field("target", &self.shared.target)
            .field("running", &self.is_running())
            .finish()
    }
}

fn validate_target(target: &str) -> Result<()> {
    if target.trim().is_empty() {
        return Err(MixError::InvalidTarget);
    }
    Ok(())
}

/// Poll the process until it exits or the handle is closed.
///
/// A failing exit is captured into the error slot and closes the handle. A
/// clean exit leaves the output open so buffered PCM drains to end of stream.
fn watch_exit(shared: Arc<HandleShared>) {
    loop {
        if !shared.running.load(Ordering::SeqCst) {
            return;
        }
        let exit = shared.process.lock().unwrap().poll_exit();
        match exit {
            None => thread::sleep(Duration::from_millis(EXIT_POLL_MS)),
            Some(ProcessExit::Success) => {
                debug!("codec process for {} exited cleanly", shared.target);
                return;
            }
            Some(ProcessExit::Failure(status)) => {
                // Give the stderr drain a moment to catch the final lines.
                thread::sleep(Duration::from_millis(EXIT_POLL_MS));
                let err = MixError::ProcessExited {
                    target: shared.target.clone(),
                    status,
                    diagnostics: shared.diagnostics.text(),
                };
                error!("{}", err);
                shared.fail(err);
                return;
            }
        }
    }
}
