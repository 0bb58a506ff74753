//! Codec process invocations built from explicit fields.

use serde::{Deserialize, Serialize};

use crate::constants::{CHANNELS, DEFAULT_PROGRAM, PCM_CODEC, PCM_CONTAINER, SAMPLE_RATE};
use crate::error::{MixError, Result};

/// Raw PCM layout exchanged with every codec process.
///
/// The sample encoding itself is fixed to `f64` little endian; only the rate
/// and channel count are carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
        }
    }
}

impl PcmFormat {
    fn push_arguments(&self, args: &mut Vec<String>) {
        push(args, ["-acodec", PCM_CODEC, "-f", PCM_CONTAINER]);
        args.push("-ar".to_string());
        args.push(self.sample_rate.to_string());
        args.push("-ac".to_string());
        args.push(self.channels.to_string());
    }
}

/// Settings for a source process decoding some input into raw PCM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeProfile {
    pub pcm: PcmFormat,
    pub threads: u16,
    /// Read the input at its native rate (`-re`).
    pub realtime: bool,
}

impl Default for DecodeProfile {
    fn default() -> Self {
        Self {
            pcm: PcmFormat::default(),
            threads: 1,
            realtime: true,
        }
    }
}

/// Settings for the sink process encoding raw PCM into the final output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeProfile {
    /// Input PCM layout; the encoder writes at the same rate and channel count.
    pub pcm: PcmFormat,
    pub codec: String,
    pub format: String,
    pub bitrate: String,
    pub threads: u16,
    /// Pace the PCM input at its native rate (`-re`).
    pub realtime: bool,
    /// Overwrite an existing output file (`-y`).
    pub overwrite: bool,
}

impl Default for EncodeProfile {
    fn default() -> Self {
        Self {
            pcm: PcmFormat::default(),
            codec: "libmp3lame".to_string(),
            format: "mp3".to_string(),
            bitrate: "128k".to_string(),
            threads: 2,
            realtime: true,
            overwrite: true,
        }
    }
}

impl EncodeProfile {
    /// Create a profile for the given codec, container format and bitrate.
    pub fn new(codec: &str, format: &str, bitrate: &str) -> Self {
        Self {
            codec: codec.to_string(),
            format: format.to_string(),
            bitrate: bitrate.to_string(),
            ..Self::default()
        }
    }

    /// Reject profiles the encoder could never start with.
    pub fn validate(&self) -> Result<()> {
        if self.codec.trim().is_empty() {
            return Err(MixError::InvalidProfile { field: "codec" });
        }
        if self.format.trim().is_empty() {
            return Err(MixError::InvalidProfile { field: "format" });
        }
        if self.bitrate.trim().is_empty() {
            return Err(MixError::InvalidProfile { field: "bitrate" });
        }
        Ok(())
    }
}

/// A concrete program plus argument list for one codec process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl CodecInvocation {
    /// Wrap a caller-built argument list.
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }

    /// Invocation decoding `input` into raw PCM on stdout.
    pub fn decoder(input: &str, profile: &DecodeProfile) -> Self {
        let mut args = Vec::new();
        push(&mut args, ["-hide_banner", "-stats"]);
        if profile.realtime {
            args.push("-re".to_string());
        }
        push(&mut args, ["-i", input, "-map", "0:a"]);
        profile.pcm.push_arguments(&mut args);
        args.push("-threads".to_string());
        args.push(profile.threads.max(1).to_string());
        args.push("pipe:1".to_string());
        Self::new(DEFAULT_PROGRAM, args)
    }

    /// Invocation encoding raw PCM from stdin into `output`.
    pub fn encoder(output: &str, profile: &EncodeProfile) -> Self {
        let mut args = Vec::new();
        push(&mut args, ["-hide_banner", "-stats"]);
        if profile.overwrite {
            args.push("-y".to_string());
        }
        profile.pcm.push_arguments(&mut args);
        if profile.realtime {
            args.push("-re".to_string());
        }
        push(
            &mut args,
            [
                "-i",
                "-",
                "-acodec",
                profile.codec.as_str(),
                "-f",
                profile.format.as_str(),
            ],
        );
        args.push("-ar".to_string());
        args.push(profile.pcm.sample_rate.to_string());
        args.push("-ac".to_string());
        args.push(profile.pcm.channels.to_string());
        push(&mut args, ["-b:a", profile.bitrate.as_str()]);
        args.push("-threads".to_string());
        args.push(profile.threads.max(1).to_string());
        args.push(output.to_string());
        Self::new(DEFAULT_PROGRAM, args)
    }

    /// Replace the program, e.g. with an absolute ffmpeg path.
    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }
}

fn push<const N: usize>(args: &mut Vec<String>, items: [&str; N]) {
    args.extend(items.iter().map(|item| item.to_string()));
}
