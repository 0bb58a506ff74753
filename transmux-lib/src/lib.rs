//! # Transmux Library
//!
//! Realtime mixing of several independently running audio sources into one
//! encoded output. Every source and the output sink are external codec
//! processes that exchange raw little-endian `f64` PCM over pipes; this crate
//! owns the per-sample mix loop, source lifecycle and gain control.

pub mod codec;
pub mod constants;
pub mod error;
pub mod mixer;
pub mod sample;
pub mod stream;
pub mod test_support;
pub mod tools;

pub use codec::{CodecHandle, CodecInvocation, DecodeProfile, EncodeProfile, PcmFormat};
pub use error::{MixError, Result};
pub use mixer::{Mixer, MixerSettings, ReadMode, SinkConfig, StragglerPolicy};
pub use stream::SampleStream;
