//! Failure handling table for the mix loop.
//!
//! A failing source only leaves the mix; a failing sink ends it, since the
//! mixed signal has nowhere else to go.

use super::settings::StragglerPolicy;

/// Where in a pass a failure was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSite {
    /// A source read failed (end of stream, short read, closed handle).
    SourceRead,
    /// A source produced nothing before the pass deadline.
    SourceDeadline(StragglerPolicy),
    /// Writing the mixed sample to the sink failed.
    SinkWrite,
}

/// What the loop does about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Leave the stream out of this pass only.
    SkipPass,
    /// Record the error on the stream, close it and drop it from the mix.
    RetireStream,
    /// Record the error on the mixer, close everything and stop.
    AbortMix,
}

const FAILURE_POLICY: [(FailureSite, Disposition); 4] = [
    (FailureSite::SourceRead, Disposition::RetireStream),
    (
        FailureSite::SourceDeadline(StragglerPolicy::Skip),
        Disposition::SkipPass,
    ),
    (
        FailureSite::SourceDeadline(StragglerPolicy::Retire),
        Disposition::RetireStream,
    ),
    (FailureSite::SinkWrite, Disposition::AbortMix),
];

/// Look up the disposition for `site`.
pub fn disposition(site: FailureSite) -> Disposition {
    FAILURE_POLICY
        .iter()
        .find(|(entry, _)| *entry == site)
        .map(|(_, disposition)| *disposition)
        .unwrap_or(Disposition::AbortMix)
}
