//! Runtime settings for the mixer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::{CodecInvocation, EncodeProfile};
use crate::constants::DEFAULT_PROGRAM;

const DEFAULT_PREFETCH_DEPTH: usize = 4096;
const DEFAULT_SINK_GRACE_MS: u64 = 2_000;

/// What to do with a source that missed the per-pass deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StragglerPolicy {
    /// Leave it out of this pass; its late sample is mixed in a later pass.
    Skip,
    /// Retire it like a failed read.
    Retire,
}

/// How one sample is gathered from every active stream per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReadMode {
    /// Blocking reads in admission order; a stalled source stalls the mix.
    #[default]
    Sequential,
    /// Every stream is read ahead by its own worker; a pass waits at most
    /// `deadline_ms` in total for the streams' next samples.
    Concurrent {
        deadline_ms: u64,
        straggler: StragglerPolicy,
    },
}

/// Tunables of a [`Mixer`](super::Mixer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    pub read_mode: ReadMode,
    /// Samples buffered per stream by concurrent read workers.
    pub prefetch_depth: usize,
    /// How long the sink encoder may take to flush after end of input.
    pub sink_grace_ms: u64,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            read_mode: ReadMode::default(),
            prefetch_depth: DEFAULT_PREFETCH_DEPTH,
            sink_grace_ms: DEFAULT_SINK_GRACE_MS,
        }
    }
}

impl MixerSettings {
    pub fn sink_grace(&self) -> Duration {
        Duration::from_millis(self.sink_grace_ms)
    }
}

/// Where and how the mixed signal is encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Output locator handed to the encoder (file path, URL or `pipe:1`).
    pub target: String,
    #[serde(default)]
    pub profile: EncodeProfile,
    #[serde(default = "default_program")]
    pub program: String,
}

impl SinkConfig {
    pub fn new(target: &str, codec: &str, format: &str, bitrate: &str) -> Self {
        Self {
            target: target.to_string(),
            profile: EncodeProfile::new(codec, format, bitrate),
            program: default_program(),
        }
    }

    /// The encoder invocation for this sink.
    pub fn invocation(&self) -> CodecInvocation {
        CodecInvocation::encoder(&self.target, &self.profile).with_program(&self.program)
    }
}

fn default_program() -> String {
    DEFAULT_PROGRAM.to_string()
}
