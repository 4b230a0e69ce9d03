use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, RhythmError};

/// Timing windows, in seconds, for each judgement tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgementTimeWindows {
    pub perfect: f64,
    pub good: f64,
    pub bad: f64,
    pub miss: f64,
}

impl Default for JudgementTimeWindows {
    fn default() -> Self {
        Self {
            perfect: 0.05,
            good: 0.1,
            bad: 0.2,
            miss: 0.3,
        }
    }
}

impl JudgementTimeWindows {
    /// Windows must be non-negative and nest: perfect <= good <= bad.
    pub fn validate(&self) -> Result<()> {
        let ordered = 0.0 <= self.perfect && self.perfect <= self.good && self.good <= self.bad;
        if !ordered {
            return Err(RhythmError::InvalidConfig(format!(
                "judgement windows must ascend (perfect {}, good {}, bad {})",
                self.perfect, self.good, self.bad
            )));
        }
        Ok(())
    }
}

/// Discrete timing classification of a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Judgement {
    Perfect,
    Good,
    Early,
    Late,
    Miss,
}

impl Judgement {
    /// Score weight used by the accuracy formula.
    pub fn weight(self) -> f64 {
        match self {
            Judgement::Perfect => 1.0,
            Judgement::Good => 0.8,
            Judgement::Early | Judgement::Late => 0.5,
            Judgement::Miss => 0.0,
        }
    }
}

impl fmt::Display for Judgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Judgement::Perfect => "Perfect",
            Judgement::Good => "Good",
            Judgement::Early => "Early",
            Judgement::Late => "Late",
            Judgement::Miss => "Miss",
        };
        f.write_str(label)
    }
}

/// Classifies `input_time - target_time` against the windows.
///
/// Boundaries are inclusive and resolve to the tighter tier. Returns `None`
/// for non-finite inputs, which never count towards the score.
pub fn classify(
    input_time: f64,
    target_time: f64,
    windows: &JudgementTimeWindows,
) -> Option<Judgement> {
    let offset = input_time - target_time;
    if !offset.is_finite() {
        tracing::debug!(input_time, target_time, "ignoring non-finite judgement offset");
        return None;
    }

    let abs_offset = offset.abs();
    let judgement = if abs_offset <= windows.perfect {
        Judgement::Perfect
    } else if abs_offset <= windows.good {
        Judgement::Good
    } else if abs_offset <= windows.bad {
        if offset < 0.0 {
            Judgement::Early
        } else {
            Judgement::Late
        }
    } else {
        Judgement::Miss
    };
    Some(judgement)
}

/// Per-run judgement counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JudgementTally {
    pub respawn_count: u32,
    pub perfect_count: u32,
    pub good_count: u32,
    pub late_count: u32,
    pub early_count: u32,
    pub miss_count: u32,
}

impl JudgementTally {
    pub fn total_judgements(&self) -> u32 {
        self.perfect_count + self.good_count + self.late_count + self.early_count + self.miss_count
    }

    pub fn count(&self, judgement: Judgement) -> u32 {
        match judgement {
            Judgement::Perfect => self.perfect_count,
            Judgement::Good => self.good_count,
            Judgement::Early => self.early_count,
            Judgement::Late => self.late_count,
            Judgement::Miss => self.miss_count,
        }
    }

    /// Weighted score over the maximum possible score, in percent.
    /// Zero before the first judgement.
    pub fn accuracy(&self) -> f64 {
        let total = self.total_judgements();
        if total == 0 {
            return 0.0;
        }

        let score = self.perfect_count as f64 * Judgement::Perfect.weight()
            + self.good_count as f64 * Judgement::Good.weight()
            + (self.late_count + self.early_count) as f64 * Judgement::Late.weight();
        score / total as f64 * 100.0
    }

    /// One star each for accuracy >= 80, >= 90, >= 95, no respawns and no
    /// misses.
    pub fn star_count(&self) -> u32 {
        let accuracy = self.accuracy();
        [
            accuracy >= 80.0,
            accuracy >= 90.0,
            accuracy >= 95.0,
            self.respawn_count == 0,
            self.miss_count == 0,
        ]
        .into_iter()
        .filter(|earned| *earned)
        .count() as u32
    }

    pub fn is_perfect_clear(&self) -> bool {
        self.accuracy() >= 100.0
    }

    fn increment(&mut self, judgement: Judgement) {
        let counter = match judgement {
            Judgement::Perfect => &mut self.perfect_count,
            Judgement::Good => &mut self.good_count,
            Judgement::Early => &mut self.early_count,
            Judgement::Late => &mut self.late_count,
            Judgement::Miss => &mut self.miss_count,
        };
        *counter += 1;
    }
}

/// Owns the run's [`JudgementTally`]. Every counter change goes through
/// this type.
#[derive(Debug, Clone, Default)]
pub struct JudgementEngine {
    windows: JudgementTimeWindows,
    tally: JudgementTally,
    last: Option<Judgement>,
}

impl JudgementEngine {
    pub fn new(windows: JudgementTimeWindows) -> Self {
        Self {
            windows,
            tally: JudgementTally::default(),
            last: None,
        }
    }

    pub fn windows(&self) -> &JudgementTimeWindows {
        &self.windows
    }

    pub fn tally(&self) -> &JudgementTally {
        &self.tally
    }

    /// Most recent judgement added to the tally.
    pub fn last_judgement(&self) -> Option<Judgement> {
        self.last
    }

    pub fn judgement(&self, input_time: f64, target_time: f64) -> Option<Judgement> {
        classify(input_time, target_time, &self.windows)
    }

    pub fn add_judgement(&mut self, judgement: Judgement) -> Judgement {
        self.tally.increment(judgement);
        self.last = Some(judgement);
        judgement
    }

    /// Replaces the counters with a snapshot while keeping the current
    /// respawn count.
    pub fn restore(&mut self, snapshot: &JudgementTally) {
        let respawn_count = self.tally.respawn_count;
        self.tally = *snapshot;
        self.tally.respawn_count = respawn_count;
    }

    pub fn record_respawn(&mut self) -> u32 {
        self.tally.respawn_count += 1;
        self.tally.respawn_count
    }

    /// Starts a fresh run.
    pub fn reset(&mut self) {
        self.tally = JudgementTally::default();
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn windows() -> JudgementTimeWindows {
        JudgementTimeWindows {
            perfect: 0.05,
            good: 0.1,
            bad: 0.2,
            miss: 0.3,
        }
    }

    fn judge_offset(offset: f64) -> Option<Judgement> {
        classify(10.0 + offset, 10.0, &windows())
    }

    #[test]
    fn boundaries_resolve_to_the_tighter_tier() {
        assert_eq!(classify(0.05, 0.0, &windows()), Some(Judgement::Perfect));
        assert_eq!(classify(0.0500001, 0.0, &windows()), Some(Judgement::Good));
        assert_eq!(classify(0.1, 0.0, &windows()), Some(Judgement::Good));
        assert_eq!(classify(0.2, 0.0, &windows()), Some(Judgement::Late));
    }

    #[test]
    fn bad_window_splits_into_early_and_late() {
        assert_eq!(judge_offset(-0.15), Some(Judgement::Early));
        assert_eq!(judge_offset(0.15), Some(Judgement::Late));
        assert_eq!(judge_offset(0.25), Some(Judgement::Miss));
        assert_eq!(judge_offset(-0.25), Some(Judgement::Miss));
    }

    #[test]
    fn non_finite_offsets_are_not_judged() {
        let engine = JudgementEngine::new(windows());
        assert_eq!(engine.judgement(f64::NAN, 1.0), None);
        assert_eq!(engine.judgement(f64::INFINITY, 1.0), None);
        assert_eq!(engine.tally().total_judgements(), 0);
    }

    #[test]
    fn rejects_windows_out_of_order() {
        let bad = JudgementTimeWindows {
            perfect: 0.2,
            good: 0.1,
            ..windows()
        };
        assert!(bad.validate().unwrap_err().is_configuration());
        assert!(windows().validate().is_ok());
    }

    #[test]
    fn accuracy_is_zero_without_judgements() {
        assert_eq!(JudgementTally::default().accuracy(), 0.0);
    }

    #[test]
    fn accuracy_weights_each_tier() {
        let tally = JudgementTally {
            perfect_count: 1,
            good_count: 1,
            late_count: 1,
            early_count: 1,
            miss_count: 1,
            ..Default::default()
        };
        assert!((tally.accuracy() - 56.0).abs() < 1e-9);
    }

    #[test]
    fn flawless_run_earns_five_stars() {
        let tally = JudgementTally {
            perfect_count: 10,
            ..Default::default()
        };
        assert_eq!(tally.accuracy(), 100.0);
        assert_eq!(tally.star_count(), 5);
        assert!(tally.is_perfect_clear());
    }

    #[test]
    fn respawns_and_misses_cost_stars() {
        let tally = JudgementTally {
            perfect_count: 19,
            miss_count: 1,
            respawn_count: 2,
            ..Default::default()
        };
        assert_eq!(tally.star_count(), 3);
        assert!(!tally.is_perfect_clear());
    }

    #[test]
    fn restore_keeps_respawn_count() {
        let mut engine = JudgementEngine::new(windows());
        engine.add_judgement(Judgement::Perfect);
        let snapshot = *engine.tally();
        engine.add_judgement(Judgement::Miss);
        engine.record_respawn();

        engine.restore(&snapshot);

        assert_eq!(engine.tally().perfect_count, 1);
        assert_eq!(engine.tally().miss_count, 0);
        assert_eq!(engine.tally().respawn_count, 1);
    }

    #[test]
    fn remembers_last_judgement() {
        let mut engine = JudgementEngine::new(windows());
        let judgement = engine.judgement(1.12, 1.0).unwrap();
        assert_eq!(engine.add_judgement(judgement), Judgement::Late);
        assert_eq!(engine.last_judgement(), Some(Judgement::Late));
        assert_eq!(engine.tally().count(Judgement::Late), 1);
    }

    fn any_judgement() -> impl Strategy<Value = Judgement> {
        prop_oneof![
            Just(Judgement::Perfect),
            Just(Judgement::Good),
            Just(Judgement::Early),
            Just(Judgement::Late),
            Just(Judgement::Miss),
        ]
    }

    proptest! {
        #[test]
        fn perfect_never_lowers_and_miss_never_raises_accuracy(
            history in proptest::collection::vec(any_judgement(), 0..64)
        ) {
            let mut engine = JudgementEngine::new(windows());
            for judgement in history {
                engine.add_judgement(judgement);
            }
            let before = engine.tally().accuracy();

            let mut perfect = engine.clone();
            perfect.add_judgement(Judgement::Perfect);
            prop_assert!(perfect.tally().accuracy() >= before - 1e-9);

            let mut miss = engine.clone();
            miss.add_judgement(Judgement::Miss);
            prop_assert!(miss.tally().accuracy() <= before + 1e-9);
        }
    }
}
