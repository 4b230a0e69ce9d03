use serde::{Deserialize, Serialize};

use crate::{audio::AudioOutput, clock::DspInterpolator};

/// Pausable, seekable play time.
///
/// `current = accumulated_time + (is_running ? device_now - run_start_clock : 0)`.
/// `accumulated_time` goes negative during a pre-roll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineState {
    pub accumulated_time: f64,
    pub run_start_clock: f64,
    pub is_running: bool,
}

impl TimelineState {
    pub fn play_time_at(&self, device_now: f64) -> f64 {
        if self.is_running {
            self.accumulated_time + (device_now - self.run_start_clock)
        } else {
            self.accumulated_time
        }
    }
}

/// Converts device clock readings into play time and keeps the music voice
/// phase locked to it.
#[derive(Debug, Clone)]
pub struct TimelineClock {
    state: TimelineState,
    dsp: DspInterpolator,
    start_offset: f64,
    audio_offset: f64,
    schedule_epsilon: f64,
}

impl TimelineClock {
    pub fn new(device_now: f64, stall_epsilon: f64, schedule_epsilon: f64) -> Self {
        Self {
            state: TimelineState {
                accumulated_time: 0.0,
                run_start_clock: device_now,
                is_running: false,
            },
            dsp: DspInterpolator::new(device_now, stall_epsilon),
            start_offset: 0.0,
            audio_offset: 0.0,
            schedule_epsilon,
        }
    }

    /// Music offsets of the loaded level: `start_offset` is where beat zero
    /// sits in the clip, `audio_offset` the calibrated output latency.
    pub fn with_offsets(mut self, start_offset: f64, audio_offset: f64) -> Self {
        self.start_offset = start_offset;
        self.audio_offset = audio_offset;
        self
    }

    pub fn state(&self) -> &TimelineState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_running
    }

    /// Interpolated device time of the current tick.
    pub fn device_time(&self) -> f64 {
        self.dsp.now()
    }

    pub fn current_play_time(&self) -> f64 {
        self.state.play_time_at(self.dsp.now())
    }

    /// Samples the hardware clock for this tick.
    pub fn advance(&mut self, hardware_now: f64, frame_delta: f64) -> f64 {
        self.dsp.update(hardware_now, frame_delta);
        self.current_play_time()
    }

    /// Starts running from the current play time. Returns false when already
    /// running.
    pub fn play(&mut self, audio: &mut dyn AudioOutput) -> bool {
        if self.state.is_running {
            return false;
        }

        self.state.is_running = true;
        self.state.run_start_clock = self.dsp.now();
        audio.stop_music();
        self.schedule_music(audio);
        tracing::debug!(play_time = self.current_play_time(), "timeline playing");
        true
    }

    /// Folds the elapsed run into the accumulated time and stops the music.
    /// Returns false when not running.
    pub fn pause(&mut self, audio: &mut dyn AudioOutput) -> bool {
        if !self.state.is_running {
            return false;
        }

        let now = self.dsp.now();
        self.state.accumulated_time += now - self.state.run_start_clock;
        self.state.run_start_clock = now;
        self.state.is_running = false;
        audio.stop_music();
        tracing::debug!(play_time = self.state.accumulated_time, "timeline paused");
        true
    }

    /// Jumps to `target_time - pre_roll`, keeping the running flag, and
    /// reschedules the music for the new position.
    pub fn seek(&mut self, target_time: f64, pre_roll: f64, audio: &mut dyn AudioOutput) {
        let time = if target_time.is_finite() {
            target_time
        } else {
            tracing::warn!(target_time, "ignoring non-finite seek target");
            self.current_play_time()
        };
        let pre_roll = if pre_roll.is_finite() { pre_roll } else { 0.0 };

        self.state.accumulated_time = time - pre_roll;
        self.state.run_start_clock = self.dsp.now();
        audio.stop_music();
        if self.state.is_running {
            self.schedule_music(audio);
        }
        tracing::debug!(play_time = self.state.accumulated_time, "timeline seek");
    }

    /// Stops and parks the timeline at `play_time`.
    pub fn reset(&mut self, play_time: f64, audio: &mut dyn AudioOutput) {
        self.pause(audio);
        audio.stop_music();
        self.state.accumulated_time = play_time;
        self.state.run_start_clock = self.dsp.now();
    }

    /// Schedules the music so that clip position and play time stay
    /// locked: position `p` sounds at play time `p - start_offset - audio_offset`.
    fn schedule_music(&self, audio: &mut dyn AudioOutput) {
        let Some(length) = audio.music_length() else {
            return;
        };

        let now = self.dsp.now();
        let music_start = now - self.audio_offset - self.start_offset - self.current_play_time();
        if music_start < now {
            // Already underway: start slightly ahead at the matching position.
            let device_time = now + self.schedule_epsilon;
            let position = device_time - music_start;
            if position < length {
                audio.schedule_music(device_time, position);
            }
        } else {
            audio.schedule_music(music_start, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assets::MusicClip,
        audio::{MusicState, SimulatedAudio},
        clock::ManualClock,
    };

    const EPS: f64 = 0.01;

    fn device(length: f64) -> (SimulatedAudio<ManualClock>, crate::audio::SimulatedAudioHandle) {
        let mut audio = SimulatedAudio::new(ManualClock::new());
        audio.load_music(Some(&MusicClip {
            id: "song".to_string(),
            length_seconds: length,
        }));
        let handle = audio.handle();
        (audio, handle)
    }

    /// Music position expected at `device_time` when phase locked.
    fn locked_position(timeline: &TimelineClock, device_time: f64, offsets: f64) -> f64 {
        timeline.current_play_time() + (device_time - timeline.device_time()) + offsets
    }

    #[test]
    fn play_time_advances_only_while_running() {
        let (mut audio, _) = device(60.0);
        let mut timeline = TimelineClock::new(0.0, 1e-5, EPS);

        timeline.advance(1.0, 0.0);
        assert_eq!(timeline.current_play_time(), 0.0);

        assert!(timeline.play(&mut audio));
        assert!(!timeline.play(&mut audio));
        timeline.advance(3.0, 0.0);
        assert_eq!(timeline.current_play_time(), 2.0);

        assert!(timeline.pause(&mut audio));
        timeline.advance(10.0, 0.0);
        assert_eq!(timeline.current_play_time(), 2.0);
        assert!(!timeline.pause(&mut audio));
    }

    #[test]
    fn seek_applies_pre_roll() {
        let (mut audio, _) = device(60.0);
        let mut timeline = TimelineClock::new(0.0, 1e-5, EPS);
        timeline.seek(8.0, 3.0, &mut audio);
        assert_eq!(timeline.current_play_time(), 5.0);
        assert!(!timeline.is_playing());
    }

    #[test]
    fn play_during_pre_roll_schedules_music_in_the_future() {
        let (mut audio, handle) = device(60.0);
        let mut timeline = TimelineClock::new(100.0, 1e-5, EPS).with_offsets(0.5, 0.1);
        timeline.seek(-4.0, 0.0, &mut audio);
        timeline.play(&mut audio);

        match handle.music().unwrap() {
            MusicState::Scheduled { device_time, position } => {
                assert_eq!(position, 0.0);
                assert!((device_time - (100.0 + 4.0 - 0.6)).abs() < 1e-9);
                let expected = locked_position(&timeline, device_time, 0.6);
                assert!(expected.abs() < 1e-9);
            }
            MusicState::Stopped => panic!("music should be scheduled"),
        }
    }

    #[test]
    fn seek_while_playing_keeps_music_phase_locked() {
        let (mut audio, handle) = device(60.0);
        let mut timeline = TimelineClock::new(0.0, 1e-5, EPS).with_offsets(0.25, 0.05);
        timeline.play(&mut audio);
        timeline.advance(2.0, 0.0);
        timeline.seek(20.0, 0.0, &mut audio);

        match handle.music().unwrap() {
            MusicState::Scheduled { device_time, position } => {
                assert!((device_time - (2.0 + EPS)).abs() < 1e-9);
                let expected = locked_position(&timeline, device_time, 0.3);
                assert!((position - expected).abs() < 1e-9);
            }
            MusicState::Stopped => panic!("music should be scheduled"),
        }
    }

    #[test]
    fn does_not_schedule_past_the_end_of_the_clip() {
        let (mut audio, handle) = device(10.0);
        let mut timeline = TimelineClock::new(0.0, 1e-5, EPS);
        timeline.seek(30.0, 0.0, &mut audio);
        timeline.play(&mut audio);
        assert_eq!(handle.music().unwrap(), MusicState::Stopped);
    }

    #[test]
    fn interpolates_across_clock_stalls() {
        let (mut audio, _) = device(60.0);
        let mut timeline = TimelineClock::new(0.0, 1e-5, EPS);
        timeline.play(&mut audio);
        timeline.advance(0.0, 0.016);
        timeline.advance(0.0, 0.016);
        assert!((timeline.current_play_time() - 0.032).abs() < 1e-9);
        timeline.advance(0.05, 0.016);
        assert!((timeline.current_play_time() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn reset_parks_the_timeline() {
        let (mut audio, handle) = device(60.0);
        let mut timeline = TimelineClock::new(0.0, 1e-5, EPS);
        timeline.play(&mut audio);
        timeline.reset(-4.0, &mut audio);
        assert!(!timeline.is_playing());
        assert_eq!(timeline.current_play_time(), -4.0);
        assert_eq!(handle.music().unwrap(), MusicState::Stopped);
    }
}
