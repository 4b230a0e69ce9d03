//! Level events and their forward/backward evaluation against the beat.
//!
//! A performed event pushes [`UndoCommand`]s describing how to reverse
//! its effect. Reverting replays them newest first through a single
//! dispatcher, so a backward seek across nested checkpoints unwinds them in
//! the opposite order they were captured.

use serde::{Deserialize, Serialize};

use crate::{
    checkpoint::{CheckpointManager, CheckpointSnapshot},
    judgement::JudgementEngine,
    level::LevelEventRecord,
};

/// Reversal step recorded by a performed event.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoCommand {
    /// Reactivate `previous` and roll the tally back to the reverted
    /// checkpoint's snapshot.
    RestoreCheckpoint { previous: Option<CheckpointSnapshot> },
}

/// Mutable state an event effect can touch.
pub struct EventContext<'a> {
    pub checkpoints: &'a mut CheckpointManager,
    pub judgement: &'a mut JudgementEngine,
}

/// Runtime view of one authored level event.
#[derive(Debug, Clone)]
pub struct LevelEventState {
    appear_beat: f64,
    is_checkpoint: bool,
    performed: bool,
    undo: Vec<UndoCommand>,
}

impl LevelEventState {
    pub fn new(record: &LevelEventRecord) -> Self {
        Self {
            appear_beat: record.appear_beat,
            is_checkpoint: record.is_checkpoint.unwrap_or(false),
            performed: false,
            undo: Vec::new(),
        }
    }

    pub fn appear_beat(&self) -> f64 {
        self.appear_beat
    }

    pub fn is_checkpoint(&self) -> bool {
        self.is_checkpoint
    }

    pub fn is_performed(&self) -> bool {
        self.performed
    }

    /// Number of reversal steps waiting on this event.
    pub fn pending_undo(&self) -> usize {
        self.undo.len()
    }

    fn perform(&mut self, ctx: &mut EventContext<'_>) {
        self.performed = true;
        if self.is_checkpoint {
            let previous = ctx.checkpoints.set_checkpoint(self.appear_beat, ctx.judgement);
            self.undo.push(UndoCommand::RestoreCheckpoint { previous });
        }
    }

    fn revert(&mut self, ctx: &mut EventContext<'_>) {
        self.performed = false;
        while let Some(command) = self.undo.pop() {
            apply_undo(command, ctx);
        }
    }
}

fn apply_undo(command: UndoCommand, ctx: &mut EventContext<'_>) {
    match command {
        UndoCommand::RestoreCheckpoint { previous } => {
            ctx.checkpoints.revert(previous, ctx.judgement);
        }
    }
}

/// A performed-flag change observed during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventTransition {
    Performed { beat: f64, checkpoint: bool },
    Reverted { beat: f64, checkpoint: bool },
}

/// Evaluates every level event against the timeline's beat.
#[derive(Debug, Clone, Default)]
pub struct EventScheduler {
    events: Vec<LevelEventState>,
}

impl EventScheduler {
    /// Builds the scheduler with events ordered by beat. Equal beats keep
    /// their authored order.
    pub fn new(records: &[LevelEventRecord]) -> Self {
        let mut events: Vec<LevelEventState> = records.iter().map(LevelEventState::new).collect();
        events.sort_by(|a, b| a.appear_beat.total_cmp(&b.appear_beat));
        Self { events }
    }

    pub fn events(&self) -> &[LevelEventState] {
        &self.events
    }

    /// Per-tick evaluation during forward play: performs every pending
    /// event whose beat has been reached.
    pub fn update(
        &mut self,
        current_beat: f64,
        ctx: &mut EventContext<'_>,
    ) -> Vec<EventTransition> {
        let mut transitions = Vec::new();
        for event in &mut self.events {
            if !event.performed && event.appear_beat <= current_beat {
                event.perform(ctx);
                transitions.push(EventTransition::Performed {
                    beat: event.appear_beat,
                    checkpoint: event.is_checkpoint,
                });
            }
        }
        transitions
    }

    /// Re-derives every performed flag for `beat` in either direction.
    ///
    /// Events past `beat` are reverted latest first, then events up to
    /// `beat` are performed earliest first. Afterwards
    /// `performed == (appear_beat <= beat)` holds for every event.
    pub fn seek(&mut self, beat: f64, ctx: &mut EventContext<'_>) -> Vec<EventTransition> {
        let mut transitions = self.revert_after(beat, ctx);
        transitions.extend(self.update(beat, ctx));
        transitions
    }

    /// Reverts every performed event, latest first.
    pub fn reset(&mut self, ctx: &mut EventContext<'_>) -> Vec<EventTransition> {
        self.revert_after(f64::NEG_INFINITY, ctx)
    }

    fn revert_after(&mut self, beat: f64, ctx: &mut EventContext<'_>) -> Vec<EventTransition> {
        let mut transitions = Vec::new();
        for event in self.events.iter_mut().rev() {
            if event.performed && event.appear_beat > beat {
                event.revert(ctx);
                transitions.push(EventTransition::Reverted {
                    beat: event.appear_beat,
                    checkpoint: event.is_checkpoint,
                });
            }
        }
        transitions
    }
}
