//! The mixing engine.
//!
//! A [`Mixer`] owns the active source streams and at most one sink. Its loop
//! pulls one sample from every source per pass, sums them, applies the master
//! gain and writes the result to the sink, until no source remains.
//!
//! - `settings` holds read-mode, sink and tuning configuration.
//! - `policy` maps failure sites to what the loop does about them.
//! - `gather` collects one sample per stream, sequentially or fanned out.
//! - `runner` is the loop itself; `guard` keeps the run flag honest.

mod gather;
mod guard;
pub mod policy;
mod runner;
mod settings;
mod state;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{info, warn};

use crate::codec::CodecInvocation;
use crate::error::{MixError, Result};
use crate::stream::SampleStream;

pub use settings::{MixerSettings, ReadMode, SinkConfig, StragglerPolicy};

use state::MixerShared;

/// Handle to a mixing session.
///
/// Cloning is cheap and every clone controls the same session, so one thread
/// can block in [`run`](Self::run) while others add streams or change gain.
#[derive(Clone)]
pub struct Mixer {
    shared: Arc<MixerShared>,
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer").finish_non_exhaustive()
    }
}

impl Mixer {
    /// Create a mixer, spawning the sink encoder if `sink` is given.
    ///
    /// Without a sink the mixer runs in a degenerate mode: mixed samples are
    /// computed and counted but discarded until [`attach_sink`](Self::attach_sink)
    /// is called.
    ///
    /// # Arguments
    ///
    /// * `streams` - Initial sources, mixed in the given order.
    /// * `sink` - Output target and encoder profile.
    /// * `master_gain` - Gain applied to every mixed sample.
    pub fn new(
        streams: Vec<SampleStream>,
        sink: Option<&SinkConfig>,
        master_gain: f64,
    ) -> Result<Self> {
        Self::with_settings(streams, sink, master_gain, MixerSettings::default())
    }

    /// Like [`new`](Self::new) with explicit runtime settings.
    pub fn with_settings(
        streams: Vec<SampleStream>,
        sink: Option<&SinkConfig>,
        master_gain: f64,
        settings: MixerSettings,
    ) -> Result<Self> {
        let sink = match sink {
            Some(config) => {
                config.profile.validate()?;
                Some(SampleStream::spawn_invocation(
                    &config.target,
                    &config.invocation(),
                    1.0,
                )?)
            }
            None => {
                warn!("mixer has no sink; mixed samples are discarded until one is attached");
                None
            }
        };
        Ok(Self::from_parts(streams, sink, master_gain, settings))
    }

    /// Assemble a mixer from already-open streams.
    pub fn from_parts(
        streams: Vec<SampleStream>,
        sink: Option<SampleStream>,
        master_gain: f64,
        settings: MixerSettings,
    ) -> Self {
        let streams = streams.into_iter().map(Arc::new).collect();
        Self {
            shared: Arc::new(MixerShared::new(
                streams,
                sink.map(Arc::new),
                master_gain,
                settings,
            )),
        }
    }

    /// Spawn a decoder on `target` and add it to the mix.
    ///
    /// Allowed at any time; a running loop picks the stream up on its next
    /// pass. Empty `args` select the default decode profile.
    pub fn add_stream(&self, target: &str, args: &[String], gain: f64) -> Result<Arc<SampleStream>> {
        let stream = Arc::new(SampleStream::spawn(target, args, gain)?);
        self.shared.admit(stream.clone());
        Ok(stream)
    }

    /// Spawn a stream from a prepared invocation and add it to the mix.
    pub fn add_stream_invocation(
        &self,
        target: &str,
        invocation: &CodecInvocation,
        gain: f64,
    ) -> Result<Arc<SampleStream>> {
        let stream = Arc::new(SampleStream::spawn_invocation(target, invocation, gain)?);
        self.shared.admit(stream.clone());
        Ok(stream)
    }

    /// Inject an existing stream into a running mix.
    ///
    /// Fails with [`MixError::NotRunning`] while the mixer is idle; initial
    /// sources belong in the constructor or [`add_stream`](Self::add_stream).
    pub fn add_running_stream(&self, stream: Arc<SampleStream>) -> Result<Arc<SampleStream>> {
        if !self.shared.admit_running(stream.clone()) {
            return Err(MixError::NotRunning);
        }
        Ok(stream)
    }

    /// Attach a sink to a mixer created without one, or replace a sink that
    /// already finished.
    pub fn attach_sink(&self, sink: SampleStream) -> Result<Arc<SampleStream>> {
        let mut slot = self.shared.sink.lock().unwrap();
        let draining = self.shared.sink_draining.load(Ordering::SeqCst);
        if !draining && slot.as_ref().is_some_and(|current| current.is_running()) {
            return Err(MixError::SinkAttached);
        }
        let sink = Arc::new(sink);
        info!("attached sink {}", sink.target());
        *slot = Some(sink.clone());
        Ok(sink)
    }

    /// The sink stream, if any.
    pub fn sink(&self) -> Option<Arc<SampleStream>> {
        self.shared.sink()
    }

    /// Snapshot of the active sources in admission order.
    pub fn streams(&self) -> Vec<Arc<SampleStream>> {
        self.shared.snapshot()
    }

    pub fn active_count(&self) -> usize {
        self.shared.active_count()
    }

    /// Replace the master gain; applies from the next mixed sample.
    pub fn set_master_volume(&self, gain: f64) {
        *self.shared.master_gain.lock().unwrap() = gain;
    }

    pub fn master_volume(&self) -> f64 {
        self.shared.master_gain()
    }

    /// Run the mix loop on this thread until every source has retired, the
    /// sink fails, or the mixer is closed. No-op if already running.
    ///
    /// On exit the running flag is cleared and every remaining stream and the
    /// sink are closed. When the sources ran out and the sink exited within
    /// its grace period, the sink output stays readable through
    /// [`read_encoded`](Self::read_encoded) until end of stream.
    pub fn run(&self) {
        runner::run_mix_loop(&self.shared);
    }

    /// Run the mix loop on a dedicated thread.
    pub fn spawn_run(&self) -> Result<JoinHandle<()>> {
        let mixer = self.clone();
        let handle = thread::Builder::new()
            .name("mixer".to_string())
            .spawn(move || mixer.run())?;
        Ok(handle)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Last engine-level error (a fatal sink failure). Source failures are
    /// recorded on the retired streams instead.
    pub fn err(&self) -> Option<MixError> {
        self.shared.last_error.lock().unwrap().clone()
    }

    /// Samples mixed since construction.
    pub fn mixed_samples(&self) -> u64 {
        self.shared.mixed_samples.load(Ordering::Relaxed)
    }

    /// Streams retired since construction.
    pub fn retired_streams(&self) -> u64 {
        self.shared.retired_streams.load(Ordering::Relaxed)
    }

    /// Read encoded output from the sink process (for `pipe:1` sinks).
    ///
    /// Returns [`MixError::EndOfStream`] once the output is drained, after
    /// which the sink is closed.
    pub fn read_encoded(&self, buf: &mut [u8]) -> Result<usize> {
        match self.shared.sink() {
            Some(sink) => sink.handle().read(buf),
            None => Err(MixError::NoSink),
        }
    }

    /// Close every active stream and the sink, whether or not the loop is
    /// running. A running loop stops at its next pass. Idempotent.
    pub fn close(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.close_all();
    }
}

impl crate::tools::fade::GainControl for Mixer {
    fn set_gain(&self, gain: f64) {
        self.set_master_volume(gain);
    }

    fn gain(&self) -> f64 {
        self.master_volume()
    }
}

#[cfg(test)]
mod tests;
