//! State shared between the mixer handle, its callers and the mix loop.
//!
//! Every field is locked only for the duration of one access; no lock is held
//! across a blocking stream read or sink write.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::error::MixError;
use crate::stream::SampleStream;

use super::settings::MixerSettings;

pub(crate) struct MixerShared {
    /// Active sources in admission order.
    pub(crate) streams: Mutex<Vec<Arc<SampleStream>>>,
    pub(crate) sink: Mutex<Option<Arc<SampleStream>>>,
    pub(crate) master_gain: Mutex<f64>,
    pub(crate) running: AtomicBool,
    /// Set by an explicit close so the loop stops without blaming the sink.
    pub(crate) shutdown: AtomicBool,
    /// Set when the sink exited cleanly after end of input; its output is
    /// left open for readers until end of stream.
    pub(crate) sink_draining: AtomicBool,
    pub(crate) last_error: Mutex<Option<MixError>>,
    pub(crate) settings: MixerSettings,
    pub(crate) mixed_samples: AtomicU64,
    pub(crate) retired_streams: AtomicU64,
}

impl MixerShared {
    pub(crate) fn new(
        streams: Vec<Arc<SampleStream>>,
        sink: Option<Arc<SampleStream>>,
        master_gain: f64,
        settings: MixerSettings,
    ) -> Self {
        Self {
            streams: Mutex::new(streams),
            sink: Mutex::new(sink),
            master_gain: Mutex::new(master_gain),
            running: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            sink_draining: AtomicBool::new(false),
            last_error: Mutex::new(None),
            settings,
            mixed_samples: AtomicU64::new(0),
            retired_streams: AtomicU64::new(0),
        }
    }

    /// Copy of the active collection for one pass.
    pub(crate) fn snapshot(&self) -> Vec<Arc<SampleStream>> {
        self.streams.lock().unwrap().clone()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    pub(crate) fn admit(&self, stream: Arc<SampleStream>) {
        debug!("admitting stream {} ({})", stream.id(), stream.target());
        self.streams.lock().unwrap().push(stream);
    }

    /// Admit `stream` only while a loop is running.
    ///
    /// The run flag is checked under the streams lock. The guard clears the
    /// flag before its cascade takes that lock, so a stream admitted here is
    /// either mixed or closed by the cascade.
    pub(crate) fn admit_running(&self, stream: Arc<SampleStream>) -> bool {
        let mut streams = self.streams.lock().unwrap();
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        debug!(
            "admitting stream {} ({}) into the running mix",
            stream.id(),
            stream.target()
        );
        streams.push(stream);
        true
    }

    pub(crate) fn sink(&self) -> Option<Arc<SampleStream>> {
        self.sink.lock().unwrap().clone()
    }

    pub(crate) fn master_gain(&self) -> f64 {
        *self.master_gain.lock().unwrap()
    }

    pub(crate) fn set_error(&self, err: MixError) {
        *self.last_error.lock().unwrap() = Some(err);
    }

    /// Record `err` on the stream, close it and drop it from the active set.
    pub(crate) fn retire(&self, stream: &Arc<SampleStream>, err: MixError) {
        info!(
            "retiring stream {} ({}): {}",
            stream.id(),
            stream.target(),
            err
        );
        stream.set_error(err);
        stream.close();
        self.streams
            .lock()
            .unwrap()
            .retain(|active| !Arc::ptr_eq(active, stream));
        self.retired_streams.fetch_add(1, Ordering::Relaxed);
    }

    /// Close every active stream and the sink. Safe to call repeatedly.
    pub(crate) fn close_all(&self) {
        self.close_streams();
        self.close_sink();
    }

    pub(crate) fn close_streams(&self) {
        let streams = std::mem::take(&mut *self.streams.lock().unwrap());
        for stream in &streams {
            stream.close();
        }
        if !streams.is_empty() {
            debug!("closed {} active stream(s)", streams.len());
        }
    }

    pub(crate) fn close_sink(&self) {
        self.sink_draining.store(false, Ordering::SeqCst);
        if let Some(sink) = self.sink() {
            sink.close();
        }
    }
}
