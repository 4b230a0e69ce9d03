use crate::beat::BeatMapper;

/// Cues further behind the current beat than this are dropped, not played late.
const STALE_CUE_BEATS: f64 = 1.0;

/// Readings the countdown needs for one tick.
#[derive(Debug, Clone, Copy)]
pub struct PrepareTick {
    pub current_beat: f64,
    pub device_time: f64,
    pub is_playing: bool,
    pub audio_offset: f64,
    pub lead: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareOutcome {
    /// Device times of countdown cues to schedule.
    pub cues: Vec<f64>,
    /// New visible countdown value when it changed this tick.
    pub countdown_changed: Option<Option<u32>>,
}

/// Beat-aligned countdown played during a pre-roll before gameplay
/// resumes at `end_beat`.
#[derive(Debug, Clone)]
pub struct PrepareCountdown {
    countdown_beats: u32,
    end_beat: f64,
    next_cue: u32,
    active: bool,
    displayed: Option<u32>,
}

impl PrepareCountdown {
    pub fn new(countdown_beats: u32) -> Self {
        Self {
            countdown_beats,
            end_beat: 0.0,
            next_cue: 0,
            active: false,
            displayed: None,
        }
    }

    pub fn countdown_beats(&self) -> u32 {
        self.countdown_beats
    }

    /// Arms a countdown that ends on `end_beat`.
    pub fn start(&mut self, end_beat: f64) {
        self.end_beat = end_beat;
        self.next_cue = self.countdown_beats;
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn end_beat(&self) -> f64 {
        self.end_beat
    }

    /// Countdown value currently shown, `1..=countdown_beats`.
    pub fn displayed(&self) -> Option<u32> {
        self.displayed
    }

    /// Re-derives the pending cues for a jump to `current_beat`: cues on
    /// beats already passed are dropped, and the countdown ends if
    /// `end_beat` has been reached.
    pub fn seek(&mut self, current_beat: f64) {
        if !self.active {
            return;
        }
        if current_beat >= self.end_beat {
            self.active = false;
            self.next_cue = 0;
            return;
        }
        let remaining = (self.end_beat - current_beat).floor();
        self.next_cue = self.countdown_beats.min(remaining as u32);
    }

    pub fn update(&mut self, tick: &PrepareTick, mapper: &BeatMapper) -> PrepareOutcome {
        let mut outcome = PrepareOutcome::default();

        if self.active {
            while tick.is_playing && self.next_cue >= 1 {
                let cue_beat = self.end_beat - self.next_cue as f64;
                if cue_beat < tick.current_beat - STALE_CUE_BEATS {
                    self.next_cue -= 1;
                    continue;
                }
                let time_until =
                    mapper.play_time(cue_beat - tick.current_beat) - tick.audio_offset;
                if time_until > tick.audio_offset + tick.lead {
                    break;
                }
                outcome.cues.push((tick.device_time + time_until).max(tick.device_time));
                self.next_cue -= 1;
            }

            if self.end_beat <= tick.current_beat {
                self.active = false;
            }
        }

        let displayed = self.countdown_at(tick.current_beat);
        if displayed != self.displayed {
            self.displayed = displayed;
            outcome.countdown_changed = Some(displayed);
        }

        outcome
    }

    fn countdown_at(&self, current_beat: f64) -> Option<u32> {
        let remaining = (self.end_beat - current_beat).floor() + 1.0;
        if remaining >= 1.0 && remaining <= self.countdown_beats as f64 {
            Some(remaining as u32)
        } else {
            None
        }
    }
}
