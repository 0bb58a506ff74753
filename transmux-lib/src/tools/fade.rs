//! Stepped gain ramps.

use std::thread;
use std::time::Duration;

use log::debug;

use crate::stream::SampleStream;

/// Anything whose gain can be read and replaced while audio flows.
pub trait GainControl {
    fn set_gain(&self, gain: f64);
    fn gain(&self) -> f64;
}

impl GainControl for SampleStream {
    fn set_gain(&self, gain: f64) {
        self.set_volume(gain);
    }

    fn gain(&self) -> f64 {
        self.volume()
    }
}

/// Ramp the gain of `target` linearly from `from` to `to`.
///
/// Sets `from` immediately, then `steps` further values spaced `step_delay`
/// apart. The last value is exactly `to`. Blocks the calling thread for
/// `steps * step_delay`; zero steps jumps straight to `to`.
pub fn fade_volume<G>(target: &G, from: f64, to: f64, steps: u32, step_delay: Duration)
where
    G: GainControl + ?Sized,
{
    debug!("fading gain {} -> {} over {} step(s)", from, to, steps);
    if steps == 0 {
        target.set_gain(to);
        return;
    }

    target.set_gain(from);
    let delta = (to - from) / steps as f64;
    for step in 1..=steps {
        thread::sleep(step_delay);
        let gain = if step == steps {
            to
        } else {
            from + delta * step as f64
        };
        target.set_gain(gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_stream;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        values: Mutex<Vec<f64>>,
    }

    impl GainControl for Recorder {
        fn set_gain(&self, gain: f64) {
            self.values.lock().unwrap().push(gain);
        }

        fn gain(&self) -> f64 {
            self.values.lock().unwrap().last().copied().unwrap_or(1.0)
        }
    }

    #[test]
    fn fade_steps_linearly_and_lands_on_target() {
        let recorder = Recorder::default();
        fade_volume(&recorder, 0.0, 1.0, 4, Duration::ZERO);
        assert_eq!(
            *recorder.values.lock().unwrap(),
            vec![0.0, 0.25, 0.5, 0.75, 1.0]
        );
    }

    #[test]
    fn fade_ends_exactly_on_target() {
        let recorder = Recorder::default();
        fade_volume(&recorder, 1.0, 0.1, 3, Duration::ZERO);
        assert_eq!(recorder.gain(), 0.1);
        assert_eq!(recorder.values.lock().unwrap().len(), 4);
    }

    #[test]
    fn zero_steps_jumps() {
        let recorder = Recorder::default();
        fade_volume(&recorder, 1.0, 0.2, 0, Duration::from_secs(10));
        assert_eq!(*recorder.values.lock().unwrap(), vec![0.2]);
    }

    #[test]
    fn fade_drives_stream_volume() {
        let stream = memory_stream("a", &[1.0], 1.0);
        fade_volume(&stream, 1.0, 0.5, 2, Duration::ZERO);
        assert_eq!(stream.volume(), 0.5);
        assert_eq!(stream.read_sample().unwrap(), 0.5);
    }
}
