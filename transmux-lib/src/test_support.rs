//! In-memory stand-ins for codec processes, used by the test suites.
//!
//! Everything here builds real [`CodecHandle`]s over fake channels, so the
//! mixer runs its production code paths without spawning ffmpeg.

use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use crate::codec::{CodecChannels, CodecHandle, Detached, ProcessControl, ProcessExit};
use crate::sample;
use crate::stream::SampleStream;

/// Channels whose output yields `bytes` and whose input discards writes.
pub fn memory_channels(bytes: Vec<u8>) -> CodecChannels {
    CodecChannels {
        input: Box::new(io::sink()),
        output: Box::new(Cursor::new(bytes)),
        diagnostics: Box::new(io::empty()),
    }
}

/// A source stream producing `samples` and then end of stream.
pub fn memory_stream(target: &str, samples: &[f64], gain: f64) -> SampleStream {
    let channels = memory_channels(sample::encode_all(samples));
    let handle = CodecHandle::from_channels(target, channels, Box::new(Detached))
        .expect("in-memory handle");
    SampleStream::new(handle, gain)
}

/// A source whose process is tracked by `process`.
pub fn tracked_stream(
    target: &str,
    samples: &[f64],
    gain: f64,
    process: CountingProcess,
) -> SampleStream {
    let channels = memory_channels(sample::encode_all(samples));
    let handle = CodecHandle::from_channels(target, channels, Box::new(process))
        .expect("in-memory handle");
    SampleStream::new(handle, gain)
}

/// A source that yields `chunk` bytes per read, never a whole sample.
pub fn short_read_stream(target: &str, chunk: usize) -> SampleStream {
    let channels = CodecChannels {
        input: Box::new(io::sink()),
        output: Box::new(ChunkedReader {
            inner: Cursor::new(vec![0u8; 64]),
            chunk,
        }),
        diagnostics: Box::new(io::empty()),
    };
    let handle = CodecHandle::from_channels(target, channels, Box::new(Detached))
        .expect("in-memory handle");
    SampleStream::new(handle, 1.0)
}

/// A source whose reads block until `feed` delivers bytes; dropping the
/// sending side ends the stream.
pub fn stalled_stream(target: &str, feed: Receiver<Vec<u8>>, gain: f64) -> SampleStream {
    let channels = CodecChannels {
        input: Box::new(io::sink()),
        output: Box::new(ChannelReader {
            feed,
            pending: Vec::new(),
        }),
        diagnostics: Box::new(io::empty()),
    };
    let handle = CodecHandle::from_channels(target, channels, Box::new(Detached))
        .expect("in-memory handle");
    SampleStream::new(handle, gain)
}

/// A sink stream writing into `buffer`.
pub fn capture_sink(buffer: &SharedBuffer, process: Box<dyn ProcessControl>) -> SampleStream {
    let channels = CodecChannels {
        input: Box::new(buffer.clone()),
        output: Box::new(Cursor::new(Vec::new())),
        diagnostics: Box::new(io::empty()),
    };
    let handle = CodecHandle::from_channels("capture", channels, process).expect("capture handle");
    SampleStream::new(handle, 1.0)
}

/// A sink stream writing into `buffer` whose output yields `encoded`, like an
/// encoder writing to `pipe:1`.
pub fn encoding_sink(
    buffer: &SharedBuffer,
    encoded: &[u8],
    process: Box<dyn ProcessControl>,
) -> SampleStream {
    let channels = CodecChannels {
        input: Box::new(buffer.clone()),
        output: Box::new(Cursor::new(encoded.to_vec())),
        diagnostics: Box::new(io::empty()),
    };
    let handle = CodecHandle::from_channels("pipe:1", channels, process).expect("encoding handle");
    SampleStream::new(handle, 1.0)
}

/// A sink stream whose every write fails.
pub fn failing_sink() -> SampleStream {
    let channels = CodecChannels {
        input: Box::new(FailingWriter),
        output: Box::new(Cursor::new(Vec::new())),
        diagnostics: Box::new(io::empty()),
    };
    let handle = CodecHandle::from_channels("broken", channels, Box::new(Detached))
        .expect("failing handle");
    SampleStream::new(handle, 1.0)
}

/// Shared byte buffer usable as a sink input channel.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }

    /// Decoded samples written so far.
    pub fn samples(&self) -> Vec<f64> {
        sample::decode_all(&self.bytes.lock().unwrap())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that always fails with a broken pipe.
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "encoder went away"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct ChunkedReader {
    inner: Cursor<Vec<u8>>,
    chunk: usize,
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = buf.len().min(self.chunk);
        self.inner.read(&mut buf[..limit])
    }
}

struct ChannelReader {
    feed: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.feed.recv() {
                Ok(bytes) => self.pending = bytes,
                Err(_) => return Ok(0),
            }
        }
        let count = buf.len().min(self.pending.len());
        buf[..count].copy_from_slice(&self.pending[..count]);
        self.pending.drain(..count);
        Ok(count)
    }
}

/// Process fake counting how often it was terminated.
pub struct CountingProcess {
    terminations: Arc<AtomicUsize>,
    exit: Option<ProcessExit>,
}

impl CountingProcess {
    /// A process that keeps running until terminated.
    pub fn new(terminations: Arc<AtomicUsize>) -> Self {
        Self {
            terminations,
            exit: None,
        }
    }

    /// A process that reports `exit` on the first poll.
    pub fn exiting_with(terminations: Arc<AtomicUsize>, exit: ProcessExit) -> Self {
        Self {
            terminations,
            exit: Some(exit),
        }
    }
}

impl ProcessControl for CountingProcess {
    fn poll_exit(&mut self) -> Option<ProcessExit> {
        self.exit.clone()
    }

    fn terminate(&mut self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.exit.get_or_insert(ProcessExit::Failure("killed".to_string()));
    }
}
