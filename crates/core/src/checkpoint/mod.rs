use serde::{Deserialize, Serialize};

use crate::judgement::{JudgementEngine, JudgementTally};

/// Progress captured when a checkpoint event performs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    pub beat: f64,
    pub tally: JudgementTally,
}

/// Holds the active respawn point.
#[derive(Debug, Clone, Default)]
pub struct CheckpointManager {
    current: Option<CheckpointSnapshot>,
}

impl CheckpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&CheckpointSnapshot> {
        self.current.as_ref()
    }

    /// Beat the player respawns at. Level start when no checkpoint exists.
    pub fn respawn_beat(&self) -> f64 {
        self.current.map(|snapshot| snapshot.beat).unwrap_or(0.0)
    }

    /// Captures the engine's tally at `beat` and returns the snapshot that
    /// was active before, so the caller can undo the capture later.
    pub fn set_checkpoint(
        &mut self,
        beat: f64,
        engine: &JudgementEngine,
    ) -> Option<CheckpointSnapshot> {
        tracing::debug!(beat, "checkpoint set");
        self.current.replace(CheckpointSnapshot {
            beat,
            tally: *engine.tally(),
        })
    }

    /// Reverts a capture made by [`CheckpointManager::set_checkpoint`]: the
    /// tally goes back to what it was when the checkpoint was captured and
    /// the previous checkpoint becomes active again.
    pub fn revert(&mut self, previous: Option<CheckpointSnapshot>, engine: &mut JudgementEngine) {
        if let Some(snapshot) = self.current {
            engine.restore(&snapshot.tally);
        }
        self.current = previous;
    }

    /// Restores the tally from the active checkpoint. The respawn count is
    /// kept as is.
    pub fn restore_into(&self, engine: &mut JudgementEngine) {
        if let Some(snapshot) = &self.current {
            tracing::debug!(beat = snapshot.beat, "restoring checkpoint tally");
            engine.restore(&snapshot.tally);
        }
    }

    /// Replaces all checkpoint state, used when a level (re)starts.
    pub fn reset(&mut self, initial: Option<CheckpointSnapshot>) {
        self.current = initial;
    }
}
