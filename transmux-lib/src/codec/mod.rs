//! Codec process handles.
//!
//! A handle wraps one external decode or encode process as a duplex byte
//! channel with an explicit `spawn -> running -> closed` lifecycle:
//! - `profile` builds the process invocations from explicit fields.
//! - `process` is the control seam over the OS process (exit polling, kill).
//! - `diagnostics` drains the process stderr into a bounded tail.
//! - `handle` ties the channels, liveness flag and error slot together.

mod diagnostics;
mod handle;
mod process;
mod profile;

pub use handle::{CodecChannels, CodecHandle};
pub use process::{Detached, ProcessControl, ProcessExit};
pub use profile::{CodecInvocation, DecodeProfile, EncodeProfile, PcmFormat};
