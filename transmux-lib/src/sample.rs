//! Byte-level sample codec for the raw PCM exchange.

use crate::constants::SAMPLE_BYTES;

/// Encode one sample as little-endian IEEE-754 bytes.
pub fn encode(sample: f64) -> [u8; SAMPLE_BYTES] {
    sample.to_le_bytes()
}

/// Decode one little-endian IEEE-754 frame.
pub fn decode(frame: [u8; SAMPLE_BYTES]) -> f64 {
    f64::from_le_bytes(frame)
}

/// Encode a run of samples into one contiguous byte buffer.
pub fn encode_all(samples: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * SAMPLE_BYTES);
    for &sample in samples {
        out.extend_from_slice(&encode(sample));
    }
    out
}

/// Decode every complete frame in `bytes`; a trailing partial frame is ignored.
pub fn decode_all(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(SAMPLE_BYTES)
        .map(|chunk| {
            let mut frame = [0u8; SAMPLE_BYTES];
            frame.copy_from_slice(chunk);
            decode(frame)
        })
        .collect()
}
