//! Fixed PCM contract shared by every codec process.

/// Bytes in one encoded sample (`f64`, little endian).
pub const SAMPLE_BYTES: usize = 8;

/// Sample rate every decoder is asked to produce and the encoder expects.
pub const SAMPLE_RATE: u32 = 48_000;

/// Interleaved channel count of the PCM exchange.
pub const CHANNELS: u16 = 2;

/// ffmpeg codec name for the raw sample format.
pub const PCM_CODEC: &str = "pcm_f64le";

/// ffmpeg container name for the raw sample format.
pub const PCM_CONTAINER: &str = "f64le";

/// Codec program used when an invocation does not name one.
pub const DEFAULT_PROGRAM: &str = "ffmpeg";

/// Number of stderr lines retained per codec process.
pub const DIAGNOSTIC_LINES: usize = 64;

/// Upper bound on unread stderr bytes kept for `read_error`.
pub const DIAGNOSTIC_BYTES: usize = 64 * 1024;
