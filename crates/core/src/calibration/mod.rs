//! Output latency calibration: the player taps along to a metronome and the
//! mean distance to the nearest beat becomes the audio offset.

use crate::audio::{AudioOutput, SfxCue};

/// Beats on either side of the upcoming beat a tap is compared against.
const TAP_SEARCH_BEATS: i32 = 2;

#[derive(Debug, Clone)]
pub struct Calibration {
    beat_seconds: f64,
    required_taps: usize,
    next_beat_time: Option<f64>,
    offsets: Vec<f64>,
    volume: f32,
}

impl Calibration {
    pub fn new(bpm: f64, required_taps: usize) -> Self {
        let bpm = if bpm.is_finite() && bpm > 0.0 { bpm } else { 120.0 };
        Self {
            beat_seconds: 60.0 / bpm,
            required_taps: required_taps.max(1),
            next_beat_time: None,
            offsets: Vec::new(),
            volume: 1.0,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Starts the metronome with its first beat at `first_beat_time`.
    pub fn start(&mut self, first_beat_time: f64, audio: &mut dyn AudioOutput) {
        self.offsets.clear();
        self.next_beat_time = Some(first_beat_time);
        audio.play_sfx_scheduled(SfxCue::PrepareBeep, first_beat_time, self.volume);
    }

    pub fn is_running(&self) -> bool {
        self.next_beat_time.is_some() && !self.is_finished()
    }

    /// Keeps one beat scheduled ahead of the device clock.
    pub fn update(&mut self, device_now: f64, audio: &mut dyn AudioOutput) {
        let Some(next) = self.next_beat_time.as_mut() else {
            return;
        };
        while device_now >= *next - self.beat_seconds {
            *next += self.beat_seconds;
            audio.play_sfx_scheduled(SfxCue::PrepareBeep, *next, self.volume);
        }
    }

    /// Records a tap at device time `now`. Returns the measured distance,
    /// or `None` once enough taps have been collected.
    pub fn tap(&mut self, now: f64) -> Option<f64> {
        let next = self.next_beat_time?;
        if self.is_finished() || !now.is_finite() {
            return None;
        }

        let offset = (-TAP_SEARCH_BEATS..=TAP_SEARCH_BEATS)
            .map(|beat| (next + beat as f64 * self.beat_seconds - now).abs())
            .fold(f64::INFINITY, f64::min);
        self.offsets.push(offset);
        Some(offset)
    }

    pub fn taps(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_finished(&self) -> bool {
        self.offsets.len() >= self.required_taps
    }

    /// Mean of the collected offsets, available once finished.
    pub fn result(&self) -> Option<f64> {
        if !self.is_finished() {
            return None;
        }
        Some(self.offsets.iter().sum::<f64>() / self.offsets.len() as f64)
    }
}
