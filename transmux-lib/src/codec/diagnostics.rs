//! Drains codec stderr so a chatty process can never stall on a full pipe.
//!
//! Every line is logged at `trace` and kept in a bounded tail used for error
//! reports; the raw bytes stay available to `CodecHandle::read_error` until
//! they are consumed or pushed out by newer output.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, trace};

use crate::constants::{DIAGNOSTIC_BYTES, DIAGNOSTIC_LINES};

#[derive(Default)]
struct TailState {
    lines: VecDeque<String>,
    unread: VecDeque<u8>,
}

/// Bounded record of what a codec process wrote to stderr.
#[derive(Default)]
pub(crate) struct DiagnosticTail {
    state: Mutex<TailState>,
}

impl DiagnosticTail {
    fn record(&self, bytes: &[u8], line: &mut Vec<u8>, label: &str) {
        let mut state = self.state.lock().unwrap();
        state.unread.extend(bytes.iter().copied());
        let overflow = state.unread.len().saturating_sub(DIAGNOSTIC_BYTES);
        state.unread.drain(..overflow);

        for &byte in bytes {
            // ffmpeg `-stats` rewrites its progress line with `\r`.
            if byte == b'\n' || byte == b'\r' {
                Self::finish_line(&mut state, line, label);
            } else {
                line.push(byte);
            }
        }
    }

    fn finish_line(state: &mut TailState, line: &mut Vec<u8>, label: &str) {
        if line.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(line).trim_end().to_string();
        line.clear();
        if text.is_empty() {
            return;
        }
        trace!("[{}] {}", label, text);
        if state.lines.len() >= DIAGNOSTIC_LINES {
            state.lines.pop_front();
        }
        state.lines.push_back(text);
    }

    /// Move unread stderr bytes into `buf`; returns 0 when nothing is pending.
    pub(crate) fn read_pending(&self, buf: &mut [u8]) -> usize {
        let mut state = self.state.lock().unwrap();
        let count = buf.len().min(state.unread.len());
        for (slot, byte) in buf.iter_mut().zip(state.unread.drain(..count)) {
            *slot = byte;
        }
        count
    }

    /// Recent stderr lines joined with newlines.
    pub(crate) fn text(&self) -> String {
        let state = self.state.lock().unwrap();
        state.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// Start a detached thread copying `reader` into a fresh tail until EOF.
pub(crate) fn spawn_drain(
    label: &str,
    mut reader: Box<dyn Read + Send>,
) -> std::io::Result<(Arc<DiagnosticTail>, JoinHandle<()>)> {
    let tail = Arc::new(DiagnosticTail::default());
    let thread_tail = tail.clone();
    let thread_label = label.to_string();

    let handle = thread::Builder::new()
        .name(format!("codec-stderr:{}", label))
        .spawn(move || {
            let mut chunk = [0u8; 1024];
            let mut line = Vec::new();
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => thread_tail.record(&chunk[..n], &mut line, &thread_label),
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        debug!("[{}] stderr drain stopped: {}", thread_label, err);
                        break;
                    }
                }
            }
            let mut state = thread_tail.state.lock().unwrap();
            DiagnosticTail::finish_line(&mut state, &mut line, &thread_label);
        })?;

    Ok((tail, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn drain_splits_progress_and_newlines() {
        let text = b"Input #0, mp3\nsize=  1kB time=00:00:01\rsize=  2kB time=00:00:02\n".to_vec();
        let (tail, handle) = spawn_drain("test", Box::new(Cursor::new(text))).unwrap();
        handle.join().unwrap();
        assert_eq!(
            tail.text(),
            "Input #0, mp3\nsize=  1kB time=00:00:01\nsize=  2kB time=00:00:02"
        );
    }

    #[test]
    fn unterminated_last_line_is_kept() {
        let (tail, handle) =
            spawn_drain("test", Box::new(Cursor::new(b"fatal: no such file".to_vec()))).unwrap();
        handle.join().unwrap();
        assert_eq!(tail.text(), "fatal: no such file");
    }

    #[test]
    fn pending_bytes_are_consumed_once() {
        let (tail, handle) = spawn_drain("test", Box::new(Cursor::new(b"abc\n".to_vec()))).unwrap();
        handle.join().unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(tail.read_pending(&mut buf), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(tail.read_pending(&mut buf), 2);
        assert_eq!(&buf, b"c\n");
        assert_eq!(tail.read_pending(&mut buf), 0);
    }

    #[test]
    fn line_tail_is_bounded() {
        let mut text = String::new();
        for index in 0..(DIAGNOSTIC_LINES + 10) {
            text.push_str(&format!("line {}\n", index));
        }
        let (tail, handle) = spawn_drain("test", Box::new(Cursor::new(text.into_bytes()))).unwrap();
        handle.join().unwrap();

        let text = tail.text();
        assert_eq!(text.lines().count(), DIAGNOSTIC_LINES);
        assert!(text.starts_with("line 10\n"));
    }
}
