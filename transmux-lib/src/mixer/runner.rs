//! The long-running mix loop.

use std::sync::atomic::Ordering;

use log::{debug, error, info, trace, warn};

use crate::error::MixError;

use super::gather::Gatherer;
use super::guard::RunningGuard;
use super::policy::{disposition, Disposition, FailureSite};
use super::state::MixerShared;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Every source retired.
    Exhausted,
    /// A failure escalated to the whole mix.
    Aborted,
    /// `Mixer::close` was called while running.
    Closed,
}

/// Run the mix loop on the calling thread until no stream remains active.
///
/// Returns immediately if another run is in progress.
pub(super) fn run_mix_loop(shared: &MixerShared) {
    let Some(_guard) = RunningGuard::acquire(shared) else {
        debug!("mix loop already running");
        return;
    };
    info!("mix loop started with {} stream(s)", shared.active_count());

    let mut gatherer = Gatherer::new(&shared.settings);

    let exit = 'mix: loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break LoopExit::Closed;
        }

        let active = shared.snapshot();
        if active.is_empty() {
            break LoopExit::Exhausted;
        }

        let pass = gatherer.collect(&active);
        for (stream, site, err) in pass.failures {
            match disposition(site) {
                Disposition::SkipPass => {
                    trace!("stream {} skipped this pass: {}", stream.id(), err)
                }
                Disposition::RetireStream => shared.retire(&stream, err),
                Disposition::AbortMix => {
                    error!("stream {} failure ends the mix: {}", stream.id(), err);
                    shared.set_error(err);
                    break 'mix LoopExit::Aborted;
                }
            }
        }

        if shared.active_count() == 0 {
            break if shared.shutdown.load(Ordering::SeqCst) {
                LoopExit::Closed
            } else {
                LoopExit::Exhausted
            };
        }
        if pass.contributed == 0 {
            continue;
        }

        let mixed = pass.sum * shared.master_gain();
        shared.mixed_samples.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "debug")]
        {
            let count = shared.mixed_samples.load(Ordering::Relaxed);
            if count % 48_000 == 0 {
                debug!(
                    "mixed {} samples across {} stream(s)",
                    count,
                    shared.active_count()
                );
            }
        }

        // Without a sink the sample is produced and discarded.
        let Some(sink) = shared.sink() else {
            continue;
        };
        if let Err(err) = sink.write_sample(mixed) {
            if shared.shutdown.load(Ordering::SeqCst) {
                break LoopExit::Closed;
            }
            match disposition(FailureSite::SinkWrite) {
                Disposition::SkipPass => warn!("dropped mixed sample: {}", err),
                Disposition::RetireStream => {
                    warn!("detaching sink after write failure: {}", err);
                    sink.close();
                    shared.sink.lock().unwrap().take();
                }
                Disposition::AbortMix => {
                    let err = MixError::SinkWrite(Box::new(err));
                    error!("{}", err);
                    shared.set_error(err);
                    break LoopExit::Aborted;
                }
            }
        }
    };

    if exit == LoopExit::Exhausted {
        if let Some(sink) = shared.sink() {
            if sink.handle().finish(shared.settings.sink_grace()) {
                shared.sink_draining.store(true, Ordering::SeqCst);
            }
        }
    }

    info!(
        "mix loop finished ({:?}) after {} sample(s), {} stream(s) retired",
        exit,
        shared.mixed_samples.load(Ordering::Relaxed),
        shared.retired_streams.load(Ordering::Relaxed)
    );
}
