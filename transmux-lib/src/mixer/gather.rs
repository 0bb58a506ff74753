//! Collecting one sample from every active stream per pass.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{MixError, Result};
use crate::stream::SampleStream;

use super::policy::FailureSite;
use super::settings::{MixerSettings, ReadMode, StragglerPolicy};

/// Outcome of one pass over the active streams.
#[derive(Default)]
pub(super) struct Pass {
    pub(super) sum: f64,
    pub(super) contributed: usize,
    pub(super) failures: Vec<(Arc<SampleStream>, FailureSite, MixError)>,
}

impl Pass {
    fn add(&mut self, sample: f64) {
        self.sum += sample;
        self.contributed += 1;
    }

    fn fail(&mut self, stream: &Arc<SampleStream>, site: FailureSite, err: MixError) {
        self.failures.push((stream.clone(), site, err));
    }
}

/// Strategy selected by [`ReadMode`].
pub(super) enum Gatherer {
    Sequential,
    Concurrent(FanOut),
}

impl Gatherer {
    pub(super) fn new(settings: &MixerSettings) -> Self {
        match settings.read_mode {
            ReadMode::Sequential => Gatherer::Sequential,
            ReadMode::Concurrent {
                deadline_ms,
                straggler,
            } => Gatherer::Concurrent(FanOut {
                deadline: Duration::from_millis(deadline_ms),
                straggler,
                depth: settings.prefetch_depth.max(1),
                readers: HashMap::new(),
            }),
        }
    }

    /// Gather one sample per stream, summed in admission order.
    pub(super) fn collect(&mut self, active: &[Arc<SampleStream>]) -> Pass {
        match self {
            Gatherer::Sequential => collect_sequential(active),
            Gatherer::Concurrent(fan_out) => fan_out.collect(active),
        }
    }
}

fn collect_sequential(active: &[Arc<SampleStream>]) -> Pass {
    let mut pass = Pass::default();
    for stream in active {
        match stream.read_sample() {
            Ok(sample) => pass.add(sample),
            Err(err) => pass.fail(stream, FailureSite::SourceRead, err),
        }
    }
    pass
}

type SampleReceiver = Receiver<Result<f64>>;

/// Per-stream read-ahead workers with a shared per-pass deadline.
///
/// Workers queue raw samples; gain is applied when a sample is taken into a
/// pass, so volume changes still land on the next mixed sample.
pub(super) struct FanOut {
    deadline: Duration,
    straggler: StragglerPolicy,
    depth: usize,
    readers: HashMap<u64, SampleReceiver>,
}

impl FanOut {
    fn collect(&mut self, active: &[Arc<SampleStream>]) -> Pass {
        self.readers
            .retain(|id, _| active.iter().any(|stream| stream.id() == *id));

        let started = Instant::now();
        let deadline = self.deadline;
        let straggler = self.straggler;
        let mut pass = Pass::default();

        for stream in active {
            let receiver = match self.readers.entry(stream.id()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => match spawn_reader(stream.clone(), self.depth) {
                    Ok(receiver) => entry.insert(receiver),
                    Err(err) => {
                        pass.fail(stream, FailureSite::SourceRead, err);
                        continue;
                    }
                },
            };

            let remaining = deadline.saturating_sub(started.elapsed());
            match receiver.recv_timeout(remaining) {
                Ok(Ok(raw)) => pass.add(stream.apply_gain(raw)),
                Ok(Err(err)) => pass.fail(stream, FailureSite::SourceRead, err),
                Err(RecvTimeoutError::Timeout) if stream.is_running() => {
                    let err = MixError::DeadlineMissed {
                        deadline_ms: deadline.as_millis() as u64,
                    };
                    pass.fail(stream, FailureSite::SourceDeadline(straggler), err);
                }
                Err(_) => {
                    // Closed from outside, or the worker is gone.
                    let err = stream.err().unwrap_or(MixError::NotRunning);
                    pass.fail(stream, FailureSite::SourceRead, err);
                }
            }
        }

        pass
    }
}

/// Start a worker reading raw samples from `stream` until it fails or the
/// receiving side is dropped.
fn spawn_reader(stream: Arc<SampleStream>, depth: usize) -> Result<SampleReceiver> {
    let (sender, receiver) = mpsc::sync_channel(depth);
    thread::Builder::new()
        .name(format!("mix-read:{}", stream.id()))
        .spawn(move || loop {
            let sample = stream.read_raw_sample();
            let failed = sample.is_err();
            if sender.send(sample).is_err() || failed {
                break;
            }
        })?;
    Ok(receiver)
}
