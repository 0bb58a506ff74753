//! Run-state guard for the mix loop.

use std::sync::atomic::Ordering;

use log::debug;

use super::state::MixerShared;

/// Keeps `running` true for exactly the lifetime of one loop run.
///
/// Dropping the guard (normal exit, abort or panic) clears the flag and then
/// runs the close cascade over every remaining stream and the sink. A sink
/// that already exited cleanly keeps its output open until a reader hits end
/// of stream.
pub(super) struct RunningGuard<'a> {
    shared: &'a MixerShared,
}

impl<'a> RunningGuard<'a> {
    /// Claim the run; `None` if a loop is already running.
    pub(super) fn acquire(shared: &'a MixerShared) -> Option<Self> {
        shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        shared.shutdown.store(false, Ordering::SeqCst);
        shared.sink_draining.store(false, Ordering::SeqCst);
        Some(Self { shared })
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.close_streams();
        if self.shared.sink_draining.load(Ordering::SeqCst) {
            debug!("sink output left open until end of stream");
        } else {
            self.shared.close_sink();
        }
    }
}
