use serde::{Deserialize, Serialize};

use crate::{Result, RhythmError};

/// Tempo parameters of a loaded level. Fixed for the whole level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoModel {
    pub bpm: f64,
    pub beats_per_measure: u32,
    pub start_offset_seconds: f64,
    pub audio_latency_offset_seconds: f64,
}

impl TempoModel {
    pub fn new(bpm: f64, beats_per_measure: u32) -> Self {
        Self {
            bpm,
            beats_per_measure,
            start_offset_seconds: 0.0,
            audio_latency_offset_seconds: 0.0,
        }
    }

    pub fn with_start_offset(mut self, seconds: f64) -> Self {
        self.start_offset_seconds = seconds;
        self
    }

    pub fn with_audio_latency_offset(mut self, seconds: f64) -> Self {
        self.audio_latency_offset_seconds = seconds;
        self
    }

    /// Rejects tempos that cannot drive a beat mapping.
    pub fn validate(&self) -> Result<()> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(RhythmError::InvalidTempo { bpm: self.bpm });
        }
        if self.beats_per_measure == 0 {
            return Err(RhythmError::InvalidConfig(
                "beats per measure must be at least one".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pure conversions between play time (seconds) and beats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatMapper {
    tempo: TempoModel,
}

impl BeatMapper {
    /// Builds a mapper, validating the tempo first.
    pub fn new(tempo: TempoModel) -> Result<Self> {
        tempo.validate()?;
        Ok(Self { tempo })
    }

    pub fn tempo(&self) -> &TempoModel {
        &self.tempo
    }

    pub fn beat(&self, play_time: f64) -> f64 {
        play_time * self.tempo.bpm / 60.0
    }

    pub fn play_time(&self, beat: f64) -> f64 {
        beat * 60.0 / self.tempo.bpm
    }

    /// Length of one beat in seconds.
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.tempo.bpm
    }

    pub fn measure(&self, beat: f64) -> i64 {
        (beat / self.tempo.beats_per_measure as f64).floor() as i64
    }

    pub fn beat_in_measure(&self, beat: f64) -> f64 {
        positive_mod(beat, self.tempo.beats_per_measure as f64)
    }
}

/// Modulo whose result always has the sign of `m`.
pub fn positive_mod(x: f64, m: f64) -> f64 {
    ((x % m) + m) % m
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn mapper(bpm: f64) -> BeatMapper {
        BeatMapper::new(TempoModel::new(bpm, 4)).unwrap()
    }

    #[test]
    fn converts_play_time_to_beats() {
        let mapper = mapper(120.0);
        assert_eq!(mapper.beat(1.0), 2.0);
        assert_eq!(mapper.play_time(3.0), 1.5);
        assert_eq!(mapper.seconds_per_beat(), 0.5);
    }

    #[test]
    fn rejects_non_positive_tempo() {
        for bpm in [0.0, -120.0, f64::NAN] {
            let err = BeatMapper::new(TempoModel::new(bpm, 4)).unwrap_err();
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn measures_count_from_zero_and_handle_pre_roll() {
        let mapper = mapper(120.0);
        assert_eq!(mapper.measure(0.0), 0);
        assert_eq!(mapper.measure(4.0), 1);
        assert_eq!(mapper.measure(-0.5), -1);
        assert_eq!(mapper.beat_in_measure(5.5), 1.5);
        assert_eq!(mapper.beat_in_measure(-1.0), 3.0);
    }

    #[test]
    fn positive_mod_is_never_negative() {
        assert_eq!(positive_mod(-7.0, 4.0), 1.0);
        assert_eq!(positive_mod(7.0, 4.0), 3.0);
    }

    proptest! {
        #[test]
        fn beat_and_play_time_are_inverse(play_time in -600.0f64..600.0, bpm in 30.0f64..400.0) {
            let mapper = mapper(bpm);
            let back = mapper.play_time(mapper.beat(play_time));
            prop_assert!((back - play_time).abs() <= 1e-9 * play_time.abs().max(1.0));
        }

        #[test]
        fn beat_in_measure_stays_in_range(beat in -1000.0f64..1000.0) {
            let value = mapper(150.0).beat_in_measure(beat);
            prop_assert!((0.0..=4.0).contains(&value));
        }
    }
}
