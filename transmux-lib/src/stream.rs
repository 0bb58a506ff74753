//! Gain-scaled sample streams over codec handles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::trace;

use crate::codec::{CodecHandle, CodecInvocation};
use crate::constants::SAMPLE_BYTES;
use crate::error::{MixError, Result};
use crate::sample;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// One audio source or sink exchanging single `f64` samples with its codec.
///
/// The stream exclusively owns its [`CodecHandle`]; dropping the stream
/// closes the process. Streams are shared as `Arc<SampleStream>` between the
/// mixer and callers that adjust volume, so every mutable field is guarded.
pub struct SampleStream {
    id: u64,
    handle: CodecHandle,
    gain: Mutex<f64>,
    last_error: Mutex<Option<MixError>>,
}

impl SampleStream {
    /// Wrap an open handle with an initial gain.
    pub fn new(handle: CodecHandle, gain: f64) -> Self {
        Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            handle,
            gain: Mutex::new(gain),
            last_error: Mutex::new(None),
        }
    }

    /// Spawn a decoder on `target`; empty `args` selects the default profile.
    pub fn spawn(target: &str, args: &[String], gain: f64) -> Result<Self> {
        Ok(Self::new(CodecHandle::spawn(target, args)?, gain))
    }

    /// Spawn a stream from a prepared invocation.
    pub fn spawn_invocation(target: &str, invocation: &CodecInvocation, gain: f64) -> Result<Self> {
        Ok(Self::new(
            CodecHandle::spawn_invocation(target, invocation)?,
            gain,
        ))
    }

    /// Process-unique identifier, assigned at construction.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Target locator of the underlying codec process.
    pub fn target(&self) -> &str {
        self.handle.target()
    }

    /// The underlying codec handle, e.g. to read encoded sink output or stderr.
    pub fn handle(&self) -> &CodecHandle {
        &self.handle
    }

    /// Read the next sample scaled by the current gain.
    pub fn read_sample(&self) -> Result<f64> {
        let raw = self.read_raw_sample()?;
        Ok(self.apply_gain(raw))
    }

    /// Read the next sample without applying gain.
    ///
    /// A read that yields fewer than [`SAMPLE_BYTES`] bytes is a frame-boundary
    /// violation and fails with [`MixError::ShortRead`]; the partial bytes are
    /// discarded.
    pub fn read_raw_sample(&self) -> Result<f64> {
        let mut frame = [0u8; SAMPLE_BYTES];
        let read = self.handle.read(&mut frame)?;
        if read != SAMPLE_BYTES {
            return Err(MixError::ShortRead {
                expected: SAMPLE_BYTES,
                actual: read,
            });
        }
        Ok(sample::decode(frame))
    }

    /// Scale a raw sample by the gain in effect right now.
    pub fn apply_gain(&self, raw: f64) -> f64 {
        raw * *self.gain.lock().unwrap()
    }

    /// Write one sample unscaled.
    pub fn write_sample(&self, value: f64) -> Result<()> {
        self.handle.write(&sample::encode(value))
    }

    /// Replace the gain; the next read uses the new value.
    pub fn set_volume(&self, gain: f64) {
        trace!("stream {} gain -> {}", self.id, gain);
        *self.gain.lock().unwrap() = gain;
    }

    /// Current gain.
    pub fn volume(&self) -> f64 {
        *self.gain.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn close(&self) {
        self.handle.close();
    }

    /// Most recent error recorded for this stream, falling back to the handle.
    pub fn err(&self) -> Option<MixError> {
        self.last_error
            .lock()
            .unwrap()
            .clone()
            .or_else(|| self.handle.err())
    }

    pub(crate) fn set_error(&self, err: MixError) {
        *self.last_error.lock().unwrap() = Some(err);
    }
}

impl std::fmt::Debug for SampleStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStream")
            .field("id", &self.id)
            .field("target", &self.target())
            .field("gain", &self.volume())
            .field("running", &self.is_running())
            .finish()
    }
}
