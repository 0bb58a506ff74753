//! Mix sessions: what to mix, where to, and how.
//!
//! A session comes either from command-line flags or from a JSON file, and
//! resolves into a [`Plan`] of concrete codec invocations.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use transmux_lib::{
    CodecInvocation, DecodeProfile, MixerSettings, ReadMode, SinkConfig, StragglerPolicy,
};

fn unity() -> f64 {
    1.0
}

fn default_after_ms() -> u64 {
    1000
}

fn default_duck_gain() -> f64 {
    0.3
}

fn default_fade_ms() -> u64 {
    500
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInput {
    pub target: String,
    #[serde(default = "unity")]
    pub gain: f64,
}

/// An input joining an already running mix, ducking the first input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub target: String,
    #[serde(default = "unity")]
    pub gain: f64,
    #[serde(default = "default_after_ms")]
    pub after_ms: u64,
    /// Factor applied to the first input's gain while the overlay plays.
    #[serde(default = "default_duck_gain")]
    pub duck_gain: f64,
    #[serde(default = "default_fade_ms")]
    pub fade_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub inputs: Vec<SessionInput>,
    pub sink: SinkConfig,
    #[serde(default = "unity")]
    pub master_gain: f64,
    #[serde(default)]
    pub decode: DecodeProfile,
    #[serde(default)]
    pub settings: MixerSettings,
    #[serde(default)]
    pub overlay: Option<Overlay>,
}

/// Resolved invocations, printed by `--dry-run`.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub inputs: Vec<CodecInvocation>,
    pub sink: CodecInvocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<CodecInvocation>,
}

impl Session {
    /// Read a session from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read session {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid session file {}", path.display()))
    }

    /// Build a session from command-line flags.
    pub fn from_args(args: &ArgMatches) -> Result<Self> {
        let targets: Vec<&String> = args
            .get_many::<String>("INPUT")
            .map(|values| values.collect())
            .unwrap_or_default();
        let gains: Vec<f64> = args
            .get_many::<String>("gain")
            .map(|values| {
                values
                    .map(|value| parse_f64("gain", value))
                    .collect::<Result<Vec<f64>>>()
            })
            .unwrap_or_else(|| Ok(Vec::new()))?;
        if gains.len() > targets.len() {
            bail!(
                "{} gains given for {} inputs",
                gains.len(),
                targets.len()
            );
        }

        let inputs = targets
            .iter()
            .enumerate()
            .map(|(index, target)| SessionInput {
                target: target.to_string(),
                gain: gains.get(index).copied().unwrap_or(1.0),
            })
            .collect();

        let output = required(args, "output")?;
        let sink = SinkConfig::new(
            output,
            required(args, "codec")?,
            required(args, "format")?,
            required(args, "bitrate")?,
        );

        let read_mode = match required(args, "read-mode")? {
            "concurrent" => ReadMode::Concurrent {
                deadline_ms: parse_u64("deadline-ms", required(args, "deadline-ms")?)?,
                straggler: match required(args, "straggler")? {
                    "retire" => StragglerPolicy::Retire,
                    _ => StragglerPolicy::Skip,
                },
            },
            _ => ReadMode::Sequential,
        };

        let overlay = match args.get_one::<String>("overlay") {
            Some(target) => Some(Overlay {
                target: target.clone(),
                gain: parse_f64("overlay-gain", required(args, "overlay-gain")?)?,
                after_ms: parse_u64("overlay-after-ms", required(args, "overlay-after-ms")?)?,
                duck_gain: parse_f64("duck-gain", required(args, "duck-gain")?)?,
                fade_ms: parse_u64("fade-ms", required(args, "fade-ms")?)?,
            }),
            None => None,
        };

        Ok(Self {
            inputs,
            sink,
            master_gain: parse_f64("master-gain", required(args, "master-gain")?)?,
            decode: DecodeProfile::default(),
            settings: MixerSettings {
                read_mode,
                ..MixerSettings::default()
            },
            overlay,
        })
    }

    /// Use `program` for every codec process in this session.
    pub fn set_program(&mut self, program: &str) {
        self.sink.program = program.to_string();
    }

    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            bail!("no inputs to mix");
        }
        for input in &self.inputs {
            if input.target.trim().is_empty() {
                bail!("input target is empty");
            }
            check_gain("input gain", input.gain)?;
        }
        if self.sink.target.trim().is_empty() {
            bail!("output target is empty");
        }
        check_gain("master gain", self.master_gain)?;
        self.sink.profile.validate()?;
        if let Some(overlay) = &self.overlay {
            if overlay.target.trim().is_empty() {
                bail!("overlay target is empty");
            }
            check_gain("overlay gain", overlay.gain)?;
            check_gain("duck gain", overlay.duck_gain)?;
        }
        Ok(())
    }

    /// Resolve every codec invocation of this session.
    pub fn plan(&self) -> Plan {
        let decoder = |target: &str| {
            CodecInvocation::decoder(target, &self.decode).with_program(&self.sink.program)
        };
        Plan {
            inputs: self
                .inputs
                .iter()
                .map(|input| decoder(&input.target))
                .collect(),
            sink: self.sink.invocation(),
            overlay: self
                .overlay
                .as_ref()
                .map(|overlay| decoder(&overlay.target)),
        }
    }
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing --{}", name))
}

fn parse_f64(name: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .with_context(|| format!("invalid {}: {}", name, value))
}

fn parse_u64(name: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .with_context(|| format!("invalid {}: {}", name, value))
}

fn check_gain(name: &str, gain: f64) -> Result<()> {
    if !gain.is_finite() {
        bail!("{} must be finite, got {}", name, gain);
    }
    Ok(())
}
