use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

/// Monotonic, high resolution time source in seconds.
///
/// Production builds wrap the audio device's output clock so that readings
/// are unaffected by frame-rate drops. Readings are sampled once per tick.
pub trait ClockSource {
    fn now(&self) -> f64;
}

/// Clock backed by [`Instant`], counting from its construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Manually driven clock. Clones share the same reading, so one handle can
/// drive the timeline while another is held by a simulated audio device.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    pub fn starting_at(seconds: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(seconds.to_bits())),
        }
    }

    /// Moves the clock to `seconds`. Earlier values are ignored so the
    /// reading stays monotonic.
    pub fn set(&self, seconds: f64) {
        if seconds.is_nan() || seconds < self.now() {
            return;
        }
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, delta: f64) {
        if delta > 0.0 {
            self.set(self.now() + delta);
        }
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl<C: ClockSource + ?Sized> ClockSource for Arc<C> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

/// Smooths a coarse hardware clock with the per-frame software delta.
///
/// Platform audio clocks only advance once per mixed buffer. While the
/// hardware reading is stalled the interpolated value keeps moving with
/// the frame delta; once the hardware reading passes it, the interpolated
/// value snaps back onto the hardware clock. The value never decreases.
#[derive(Debug, Clone)]
pub struct DspInterpolator {
    prev_hardware: f64,
    interpolated: f64,
    stall_epsilon: f64,
}

impl DspInterpolator {
    pub fn new(hardware_now: f64, stall_epsilon: f64) -> Self {
        Self {
            prev_hardware: hardware_now,
            interpolated: hardware_now,
            stall_epsilon: stall_epsilon.max(0.0),
        }
    }

    /// Current interpolated device time.
    pub fn now(&self) -> f64 {
        self.interpolated
    }

    /// Feeds one tick worth of readings and returns the new device time.
    pub fn update(&mut self, hardware_now: f64, frame_delta: f64) -> f64 {
        let delta = if frame_delta.is_finite() && frame_delta >= 0.0 {
            frame_delta
        } else {
            tracing::debug!(frame_delta, "ignoring invalid frame delta");
            0.0
        };

        if !hardware_now.is_finite() {
            tracing::debug!(hardware_now, "ignoring invalid hardware clock reading");
            self.interpolated += delta;
            return self.interpolated;
        }

        if (self.prev_hardware - hardware_now).abs() < self.stall_epsilon {
            self.interpolated += delta;
        } else if self.interpolated < hardware_now {
            self.prev_hardware = hardware_now;
            self.interpolated = hardware_now;
        }

        self.interpolated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new();
        let observer = clock.clone();
        clock.advance(1.5);
        assert_eq!(observer.now(), 1.5);
    }

    #[test]
    fn manual_clock_never_goes_backwards() {
        let clock = ManualClock::starting_at(3.0);
        clock.set(2.0);
        clock.advance(-1.0);
        clock.set(f64::NAN);
        assert_eq!(clock.now(), 3.0);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn interpolates_while_hardware_is_stalled() {
        let mut dsp = DspInterpolator::new(10.0, 1e-5);
        assert!((dsp.update(10.0, 0.016) - 10.016).abs() < 1e-9);
        assert!((dsp.update(10.0, 0.016) - 10.032).abs() < 1e-9);
    }

    #[test]
    fn resyncs_once_hardware_moves_past_interpolation() {
        let mut dsp = DspInterpolator::new(10.0, 1e-5);
        dsp.update(10.0, 0.016);
        assert_eq!(dsp.update(10.05, 0.016), 10.05);
    }

    #[test]
    fn holds_when_hardware_lags_behind_interpolation() {
        let mut dsp = DspInterpolator::new(10.0, 1e-5);
        let ahead = dsp.update(10.0, 0.05);
        assert_eq!(dsp.update(10.02, 0.016), ahead);
        assert_eq!(dsp.update(10.08, 0.016), 10.08);
    }

    #[test]
    fn invalid_frame_delta_is_ignored() {
        let mut dsp = DspInterpolator::new(1.0, 1e-5);
        assert_eq!(dsp.update(1.0, f64::NAN), 1.0);
        assert_eq!(dsp.update(1.0, -0.5), 1.0);
    }
}
