use std::sync::atomic::AtomicUsize;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use super::*;
use crate::codec::{CodecInvocation, Detached, ProcessExit};
use crate::sample;
use crate::test_support::{
    capture_sink, encoding_sink, failing_sink, memory_stream, stalled_stream, tracked_stream,
    CountingProcess, SharedBuffer,
};

fn captured(buffer: &SharedBuffer) -> Option<SampleStream> {
    Some(capture_sink(buffer, Box::new(Detached)))
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let started = Instant::now();
    while !condition() {
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "timed out waiting for {}",
            what
        );
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn two_sources_mix_with_stream_and_master_gain() {
    let buffer = SharedBuffer::default();
    let mixer = Mixer::from_parts(
        vec![
            memory_stream("a", &[1.0, 1.0, 1.0], 1.0),
            memory_stream("b", &[0.5, 0.5], 0.5),
        ],
        captured(&buffer),
        0.5,
        MixerSettings::default(),
    );

    mixer.run();

    assert_eq!(buffer.samples(), vec![0.625, 0.625, 0.5]);
    assert_eq!(mixer.mixed_samples(), 3);
    assert!(!mixer.is_running());
    assert!(mixer.err().is_none());
}

#[test]
fn every_pass_sums_all_active_sources() {
    let buffer = SharedBuffer::default();
    let mixer = Mixer::from_parts(
        vec![
            memory_stream("a", &[0.1, 0.2], 2.0),
            memory_stream("b", &[0.3, 0.4], 1.0),
            memory_stream("c", &[-0.5, 0.5], 0.5),
        ],
        captured(&buffer),
        1.0,
        MixerSettings::default(),
    );

    mixer.run();

    let expected = [
        0.1 * 2.0 + 0.3 + -0.5 * 0.5,
        0.2 * 2.0 + 0.4 + 0.5 * 0.5,
    ];
    assert_eq!(buffer.samples(), expected);
}

#[test]
fn retired_streams_keep_their_error_and_stay_out() {
    let short = Arc::new(memory_stream("short", &[0.25], 1.0));
    let long = Arc::new(memory_stream("long", &[0.25, 0.25, 0.25], 1.0));
    let buffer = SharedBuffer::default();
    let mixer = Mixer::from_parts(Vec::new(), captured(&buffer), 1.0, MixerSettings::default());
    mixer.shared.admit(short.clone());
    mixer.shared.admit(long.clone());

    mixer.run();

    assert_eq!(buffer.samples(), vec![0.5, 0.25, 0.25]);
    assert!(matches!(short.err(), Some(MixError::EndOfStream)));
    assert!(matches!(long.err(), Some(MixError::EndOfStream)));
    assert!(!short.is_running());
    assert!(mixer.streams().is_empty());
    assert_eq!(mixer.retired_streams(), 2);
}

#[test]
fn stream_closed_before_run_is_retired_on_first_pass() {
    let closed = Arc::new(memory_stream("closed", &[1.0, 1.0], 1.0));
    closed.close();
    let buffer = SharedBuffer::default();
    let mixer = Mixer::from_parts(
        vec![memory_stream("open", &[0.5, 0.5], 1.0)],
        captured(&buffer),
        1.0,
        MixerSettings::default(),
    );
    mixer.shared.admit(closed.clone());

    mixer.run();

    assert_eq!(buffer.samples(), vec![0.5, 0.5]);
    assert!(matches!(closed.err(), Some(MixError::NotRunning)));
    assert_eq!(mixer.active_count(), 0);
}

#[test]
fn construction_validates_the_sink_before_spawning() {
    let err = Mixer::new(
        Vec::new(),
        Some(&SinkConfig::new("out.mp3", "", "mp3", "128k")),
        1.0,
    )
    .unwrap_err();
    assert!(matches!(err, MixError::InvalidProfile { field: "codec" }));

    let err = Mixer::with_settings(
        Vec::new(),
        Some(&SinkConfig::new("", "libmp3lame", "mp3", "128k")),
        1.0,
        MixerSettings::default(),
    )
    .unwrap_err();
    assert!(matches!(err, MixError::InvalidTarget));

    let mut config = SinkConfig::new("out.mp3", "libmp3lame", "mp3", "128k");
    config.program = "transmux-no-such-codec-binary".to_string();
    let err = Mixer::new(Vec::new(), Some(&config), 1.0).unwrap_err();
    assert!(matches!(err, MixError::SpawnFailed { .. }));
}

#[test]
fn construction_without_a_sink_keeps_the_initial_streams() {
    let mixer = Mixer::new(
        vec![
            memory_stream("a", &[0.5], 1.0),
            memory_stream("b", &[0.5], 1.0),
        ],
        None,
        0.8,
    )
    .unwrap();

    assert!(mixer.sink().is_none());
    assert_eq!(mixer.active_count(), 2);
    assert_eq!(mixer.streams()[0].target(), "a");
    assert_eq!(mixer.master_volume(), 0.8);
    assert!(!mixer.is_running());
}

#[test]
fn adding_a_stream_that_cannot_start_leaves_the_mix_alone() {
    let mixer = Mixer::from_parts(
        vec![memory_stream("a", &[0.5], 1.0)],
        None,
        1.0,
        MixerSettings::default(),
    );

    let err = mixer.add_stream("", &[], 1.0).unwrap_err();
    assert!(matches!(err, MixError::InvalidTarget));

    let invocation = CodecInvocation::new("transmux-no-such-codec-binary", vec![]);
    let err = mixer
        .add_stream_invocation("input.mp3", &invocation, 1.0)
        .unwrap_err();
    assert!(matches!(err, MixError::SpawnFailed { .. }));
    assert_eq!(mixer.active_count(), 1);
}

#[cfg(unix)]
#[test]
fn stream_added_while_idle_is_mixed_on_the_next_run() {
    use std::io::Write;

    let mut pcm = tempfile::NamedTempFile::new().unwrap();
    pcm.write_all(&sample::encode_all(&[0.25, 0.5])).unwrap();
    pcm.flush().unwrap();
    let path = pcm.path().to_string_lossy().to_string();

    let buffer = SharedBuffer::default();
    let mixer = Mixer::from_parts(Vec::new(), captured(&buffer), 1.0, MixerSettings::default());
    let stream = mixer
        .add_stream_invocation(&path, &CodecInvocation::new("cat", vec![path.clone()]), 2.0)
        .unwrap();
    assert_eq!(mixer.active_count(), 1);
    assert!(!mixer.is_running());

    mixer.run();

    assert_eq!(buffer.samples(), vec![0.5, 1.0]);
    assert!(matches!(stream.err(), Some(MixError::EndOfStream)));
    assert_eq!(mixer.retired_streams(), 1);
}

#[test]
fn encoded_output_stays_readable_after_the_sources_run_out() {
    let buffer = SharedBuffer::default();
    let sink = encoding_sink(&buffer, b"ENCODED-TAIL", Box::new(Detached));
    let mixer = Mixer::from_parts(
        vec![memory_stream("a", &[0.5], 1.0)],
        Some(sink),
        1.0,
        MixerSettings {
            sink_grace_ms: 0,
            ..MixerSettings::default()
        },
    );

    mixer.run();
    assert!(!mixer.is_running());
    assert_eq!(buffer.samples(), vec![0.5]);

    let mut encoded = Vec::new();
    let mut chunk = [0u8; 5];
    loop {
        match mixer.read_encoded(&mut chunk) {
            Ok(n) => encoded.extend_from_slice(&chunk[..n]),
            Err(MixError::EndOfStream) => break,
            Err(other) => panic!("encoded output cut short: {:?}", other),
        }
    }
    assert_eq!(encoded, b"ENCODED-TAIL");
    assert!(!mixer.sink().unwrap().is_running());
    assert!(matches!(
        mixer.read_encoded(&mut chunk),
        Err(MixError::NotRunning)
    ));
}

fn finished_sink(terminations: &Arc<AtomicUsize>) -> Mixer {
    let sink = encoding_sink(
        &SharedBuffer::default(),
        b"ENCODED",
        Box::new(CountingProcess::exiting_with(
            terminations.clone(),
            ProcessExit::Success,
        )),
    );
    let mixer = Mixer::from_parts(
        vec![memory_stream("a", &[0.5], 1.0)],
        Some(sink),
        1.0,
        MixerSettings {
            sink_grace_ms: 0,
            ..MixerSettings::default()
        },
    );
    mixer.run();
    mixer
}

#[test]
fn close_releases_a_finished_sink_once() {
    let terminations = Arc::new(AtomicUsize::new(0));
    let mixer = finished_sink(&terminations);
    assert!(mixer.sink().unwrap().is_running());
    assert_eq!(terminations.load(Ordering::SeqCst), 0);

    mixer.close();
    mixer.close();

    assert_eq!(terminations.load(Ordering::SeqCst), 1);
    assert!(!mixer.sink().unwrap().is_running());
}

#[test]
fn finished_sink_can_be_replaced() {
    let terminations = Arc::new(AtomicUsize::new(0));
    let mixer = finished_sink(&terminations);

    let buffer = SharedBuffer::default();
    let replacement = mixer
        .attach_sink(capture_sink(&buffer, Box::new(Detached)))
        .unwrap();
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
    assert_eq!(mixer.sink().unwrap().id(), replacement.id());

    mixer.shared.admit(Arc::new(memory_stream("b", &[0.25], 1.0)));
    mixer.run();
    assert_eq!(buffer.samples(), vec![0.25]);
}

#[test]
fn sink_is_closed_exactly_once() {
    let terminations = Arc::new(AtomicUsize::new(0));
    let buffer = SharedBuffer::default();
    let sink = capture_sink(
        &buffer,
        Box::new(CountingProcess::new(terminations.clone())),
    );
    let mixer = Mixer::from_parts(
        vec![memory_stream("a", &[0.5], 1.0)],
        Some(sink),
        1.0,
        MixerSettings {
            sink_grace_ms: 0,
            ..MixerSettings::default()
        },
    );

    mixer.run();
    mixer.close();
    mixer.close();

    assert_eq!(buffer.samples(), vec![0.5]);
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
    assert!(!mixer.sink().unwrap().is_running());
}

#[test]
fn failed_sink_write_ends_the_mix() {
    let terminations = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(tracked_stream(
        "a",
        &[1.0, 1.0],
        1.0,
        CountingProcess::new(terminations.clone()),
    ));
    let mixer = Mixer::from_parts(
        Vec::new(),
        Some(failing_sink()),
        1.0,
        MixerSettings::default(),
    );
    mixer.shared.admit(source.clone());

    mixer.run();

    match mixer.err() {
        Some(MixError::SinkWrite(inner)) => assert!(matches!(*inner, MixError::Io(_))),
        other => panic!("expected sink write error, got {:?}", other),
    }
    assert_eq!(mixer.mixed_samples(), 1);
    assert!(!source.is_running());
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
    assert!(mixer.streams().is_empty());
    assert!(!mixer.sink().unwrap().is_running());
}

#[test]
fn adding_to_an_idle_mixer_requires_a_run() {
    let mixer = Mixer::from_parts(Vec::new(), None, 1.0, MixerSettings::default());
    let stream = Arc::new(memory_stream("late", &[1.0], 1.0));
    let err = mixer.add_running_stream(stream).unwrap_err();
    assert!(matches!(err, MixError::NotRunning));
    assert_eq!(mixer.active_count(), 0);
}

#[test]
fn running_admission_is_checked_under_the_streams_lock() {
    let mixer = Mixer::from_parts(Vec::new(), None, 1.0, MixerSettings::default());
    let early = Arc::new(memory_stream("early", &[1.0], 1.0));
    assert!(!mixer.shared.admit_running(early.clone()));
    assert_eq!(mixer.active_count(), 0);

    let guard = super::guard::RunningGuard::acquire(&mixer.shared).unwrap();
    let joined = Arc::new(memory_stream("joined", &[1.0], 1.0));
    assert!(mixer.shared.admit_running(joined.clone()));
    assert_eq!(mixer.active_count(), 1);

    // Ending the run closes whatever was admitted while it was live.
    drop(guard);
    assert!(!joined.is_running());
    assert_eq!(mixer.active_count(), 0);
    assert!(!mixer.shared.admit_running(Arc::new(memory_stream("late", &[1.0], 1.0))));
    assert_eq!(mixer.active_count(), 0);
    assert!(early.is_running());
}

#[test]
fn live_changes_apply_to_the_next_sample() {
    let (feed, stalled) = mpsc::channel();
    let source = Arc::new(stalled_stream("live", stalled, 1.0));
    let buffer = SharedBuffer::default();
    let mixer = Mixer::from_parts(Vec::new(), captured(&buffer), 1.0, MixerSettings::default());
    mixer.shared.admit(source.clone());

    let worker = mixer.spawn_run().unwrap();
    wait_until("mixer to start", || mixer.is_running());

    // A second run while one is active returns immediately.
    mixer.run();
    assert!(mixer.is_running());

    feed.send(sample::encode(0.5).to_vec()).unwrap();
    wait_until("first sample", || mixer.mixed_samples() == 1);

    source.set_volume(0.5);
    mixer.set_master_volume(2.0);
    let late = mixer
        .add_running_stream(Arc::new(memory_stream("late", &[0.125], 1.0)))
        .unwrap();
    assert_eq!(late.target(), "late");

    feed.send(sample::encode(0.5).to_vec()).unwrap();
    drop(feed);
    worker.join().unwrap();

    // The late stream joins either the pass in flight or the one after it.
    let samples = buffer.samples();
    assert_eq!(samples[0], 0.5);
    assert_eq!(samples.iter().sum::<f64>(), 1.25);
    assert!(matches!(late.err(), Some(MixError::EndOfStream)));
    assert!(!mixer.is_running());
}

#[test]
fn close_stops_a_running_mix_without_an_error() {
    let (feed, stalled) = mpsc::channel::<Vec<u8>>();
    let source = Arc::new(stalled_stream("live", stalled, 1.0));
    let mixer = Mixer::from_parts(
        Vec::new(),
        captured(&SharedBuffer::default()),
        1.0,
        MixerSettings::default(),
    );
    mixer.shared.admit(source.clone());

    let worker = mixer.spawn_run().unwrap();
    wait_until("mixer to start", || mixer.is_running());

    mixer.close();
    assert!(!source.is_running());
    // A killed process closes its pipe, which unblocks the pending read.
    drop(feed);
    worker.join().unwrap();

    assert!(!mixer.is_running());
    assert!(mixer.err().is_none());
    assert!(mixer.streams().is_empty());
}

#[test]
fn concurrent_mode_retires_stragglers() {
    let (_feed, stalled) = mpsc::channel::<Vec<u8>>();
    let slow = Arc::new(stalled_stream("slow", stalled, 1.0));
    let buffer = SharedBuffer::default();
    let mixer = Mixer::from_parts(
        vec![memory_stream("fast", &[0.5, 0.5], 1.0)],
        captured(&buffer),
        1.0,
        MixerSettings {
            read_mode: ReadMode::Concurrent {
                deadline_ms: 30,
                straggler: StragglerPolicy::Retire,
            },
            ..MixerSettings::default()
        },
    );
    mixer.shared.admit(slow.clone());

    mixer.run();

    assert_eq!(buffer.samples(), vec![0.5, 0.5]);
    assert!(matches!(
        slow.err(),
        Some(MixError::DeadlineMissed { deadline_ms: 30 })
    ));
    assert_eq!(mixer.retired_streams(), 2);
}

#[test]
fn concurrent_mode_delays_skipped_stragglers() {
    let (feed, stalled) = mpsc::channel();
    let slow = Arc::new(stalled_stream("slow", stalled, 1.0));
    let buffer = SharedBuffer::default();
    let mixer = Mixer::from_parts(
        vec![memory_stream("fast", &[0.25; 20], 1.0)],
        captured(&buffer),
        1.0,
        MixerSettings {
            read_mode: ReadMode::Concurrent {
                deadline_ms: 30,
                straggler: StragglerPolicy::Skip,
            },
            ..MixerSettings::default()
        },
    );
    mixer.shared.admit(slow.clone());

    let worker = mixer.spawn_run().unwrap();
    wait_until("first pass", || mixer.mixed_samples() >= 1);
    feed.send(sample::encode(1.0).to_vec()).unwrap();
    drop(feed);
    worker.join().unwrap();

    let samples = buffer.samples();
    assert_eq!(samples.len(), 20);
    assert_eq!(samples[0], 0.25);
    assert_eq!(samples.iter().sum::<f64>(), 6.0);
    assert!(matches!(slow.err(), Some(MixError::EndOfStream)));
}

#[test]
fn sinkless_mixer_counts_and_accepts_a_sink_later() {
    let mixer = Mixer::from_parts(
        vec![
            memory_stream("a", &[0.5, 0.5], 1.0),
            memory_stream("b", &[0.5], 1.0),
        ],
        None,
        1.0,
        MixerSettings::default(),
    );
    assert!(matches!(
        mixer.read_encoded(&mut [0u8; 8]),
        Err(MixError::NoSink)
    ));

    mixer.run();
    assert_eq!(mixer.mixed_samples(), 2);
    assert!(mixer.err().is_none());

    let buffer = SharedBuffer::default();
    mixer
        .attach_sink(capture_sink(&buffer, Box::new(Detached)))
        .unwrap();
    let err = mixer
        .attach_sink(capture_sink(&SharedBuffer::default(), Box::new(Detached)))
        .unwrap_err();
    assert!(matches!(err, MixError::SinkAttached));

    mixer.shared.admit(Arc::new(memory_stream("c", &[0.75], 1.0)));
    mixer.run();

    assert_eq!(buffer.samples(), vec![0.75]);
    assert_eq!(mixer.mixed_samples(), 3);
}

#[test]
fn master_gain_is_a_gain_control() {
    use crate::tools::fade::GainControl;

    let mixer = Mixer::from_parts(Vec::new(), None, 1.0, MixerSettings::default());
    mixer.set_gain(0.3);
    assert_eq!(mixer.master_volume(), 0.3);
    assert_eq!(GainControl::gain(&mixer), 0.3);
}
