//! Per-note runtime state: visibility, hit-sound latch and resolution.

use serde::{Deserialize, Serialize};

use crate::{
    assets::{HitType, NoteKind},
    audio::SfxCue,
    beat::BeatMapper,
    judgement::{Judgement, JudgementEngine},
    level::NoteRecord,
};

/// Mutable per-note flags, re-derived on every seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRuntimeState {
    pub was_hit: bool,
    pub can_play_hit_sound: bool,
    pub visible: bool,
}

impl Default for NoteRuntimeState {
    fn default() -> Self {
        Self {
            was_hit: false,
            can_play_hit_sound: true,
            visible: false,
        }
    }
}

/// Lifecycle phase derived from [`NoteRuntimeState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotePhase {
    Upcoming,
    Armed,
    Hit,
    Missed,
}

#[derive(Debug, Clone)]
pub struct NoteRuntime {
    record: NoteRecord,
    kind: NoteKind,
    target_time: f64,
    state: NoteRuntimeState,
    missed: bool,
}

impl NoteRuntime {
    pub fn record(&self) -> &NoteRecord {
        &self.record
    }

    pub fn appear_beat(&self) -> f64 {
        self.record.appear_beat
    }

    pub fn hit_type(&self) -> HitType {
        self.kind.hit_type
    }

    pub fn kind(&self) -> &NoteKind {
        &self.kind
    }

    /// Play time at which the note should be hit.
    pub fn target_time(&self) -> f64 {
        self.target_time
    }

    pub fn state(&self) -> &NoteRuntimeState {
        &self.state
    }

    pub fn phase(&self) -> NotePhase {
        if self.state.was_hit {
            NotePhase::Hit
        } else if self.missed {
            NotePhase::Missed
        } else if self.state.visible {
            NotePhase::Armed
        } else {
            NotePhase::Upcoming
        }
    }
}

/// Timeline readings a tick evaluates notes against.
#[derive(Debug, Clone, Copy)]
pub struct NoteTick {
    pub current_beat: f64,
    pub current_play_time: f64,
    pub device_time: f64,
    pub is_playing: bool,
    pub auto_play: bool,
}

/// Hit sound the tick wants on the audio device.
#[derive(Debug, Clone, PartialEq)]
pub struct HitSoundRequest {
    pub note: usize,
    pub cue: SfxCue,
    pub device_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteTickOutcome {
    pub hit_sounds: Vec<HitSoundRequest>,
    /// First note that passed its bad window un-hit this tick.
    pub missed: Option<usize>,
}

/// Parameters shared by every note of a level.
#[derive(Debug, Clone, Copy)]
pub struct NoteTuning {
    pub base_scroll_speed: f64,
    pub hit_receive_distance: f64,
    pub audio_offset: f64,
    /// Extra look-ahead for hit sounds on top of the audio offset.
    pub hit_sound_lead: f64,
    pub bad_window: f64,
}

/// All notes of the loaded level, in authored order.
#[derive(Debug, Clone)]
pub struct NoteLifecycle {
    notes: Vec<NoteRuntime>,
    mapper: BeatMapper,
    tuning: NoteTuning,
}

impl NoteLifecycle {
    /// Spawns runtime state for `records`; `kinds` is index aligned.
    pub fn spawn(
        records: &[NoteRecord],
        kinds: &[NoteKind],
        mapper: BeatMapper,
        tuning: NoteTuning,
    ) -> Self {
        let notes = records
            .iter()
            .zip(kinds)
            .map(|(record, kind)| NoteRuntime {
                record: record.clone(),
                kind: kind.clone(),
                target_time: mapper.play_time(record.appear_beat),
                state: NoteRuntimeState::default(),
                missed: false,
            })
            .collect();
        Self { notes, mapper, tuning }
    }

    pub fn notes(&self) -> &[NoteRuntime] {
        &self.notes
    }

    pub fn get(&self, index: usize) -> Option<&NoteRuntime> {
        self.notes.get(index)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Notes not yet hit.
    pub fn unresolved_count(&self) -> usize {
        self.notes.iter().filter(|note| !note.state.was_hit).count()
    }

    /// Advances every note for one tick: visibility, hit-sound scheduling and
    /// miss detection.
    pub fn update(&mut self, tick: &NoteTick) -> NoteTickOutcome {
        let mut outcome = NoteTickOutcome::default();
        let tuning = self.tuning;

        for (index, note) in self.notes.iter_mut().enumerate() {
            let beats_ahead = note.record.appear_beat - tick.current_beat;

            let distance = beats_ahead * tuning.base_scroll_speed * note.kind.scroll_speed_rate;
            note.state.visible = !note.state.was_hit && distance <= tuning.hit_receive_distance;

            let time_until = self.mapper.play_time(beats_ahead) - tuning.audio_offset;
            if time_until < tuning.audio_offset + tuning.hit_sound_lead {
                if note.state.can_play_hit_sound {
                    note.state.can_play_hit_sound = false;
                    if tick.is_playing && !note.kind.hit_sound.is_empty() {
                        // Late ticks clamp to now rather than scheduling in the past.
                        let device_time = (tick.device_time + time_until).max(tick.device_time);
                        outcome.hit_sounds.push(HitSoundRequest {
                            note: index,
                            cue: SfxCue::HitSound(note.kind.hit_sound.clone()),
                            device_time,
                        });
                    }
                }
            } else {
                note.state.can_play_hit_sound = true;
            }

            let passed = note.target_time < tick.current_play_time - tuning.bad_window;
            if !note.state.was_hit && !note.missed && !tick.auto_play && passed {
                note.missed = true;
                outcome.missed.get_or_insert(index);
            }
        }

        outcome
    }

    /// Re-derives every note as if time had always been at `current_beat`.
    ///
    /// Notes earlier than `current_beat + resolved_lead_beats` count as
    /// already hit, so they neither re-trigger hit sounds nor block input.
    pub fn seek(&mut self, current_beat: f64, resolved_lead_beats: f64) {
        let cutoff = current_beat + resolved_lead_beats;
        for note in &mut self.notes {
            note.state.was_hit = note.record.appear_beat < cutoff;
            note.state.can_play_hit_sound = !note.state.was_hit;
            note.state.visible = false;
            note.missed = false;
        }
    }

    /// The next actionable note: lowest beat among un-hit notes whose target
    /// time is still after `current_play_time - bad_window`. Ties keep the
    /// first note in authored order.
    pub fn next_note(&self, current_play_time: f64) -> Option<usize> {
        let cutoff = current_play_time - self.tuning.bad_window;
        let mut best: Option<usize> = None;
        for (index, note) in self.notes.iter().enumerate() {
            if note.state.was_hit || note.target_time <= cutoff {
                continue;
            }
            match best {
                Some(current)
                    if self.notes[current].record.appear_beat <= note.record.appear_beat => {}
                _ => best = Some(index),
            }
        }
        best
    }

    /// Resolves a hit on `index` at `play_time`.
    ///
    /// A Miss is recorded but leaves the note armed. Auto-play always
    /// judges Perfect. Returns `None` when the note is already hit or the
    /// timing could not be judged.
    pub fn hit(
        &mut self,
        index: usize,
        play_time: f64,
        auto_play: bool,
        engine: &mut JudgementEngine,
    ) -> Option<Judgement> {
        let note = self.notes.get_mut(index)?;
        if note.state.was_hit {
            return None;
        }

        let judgement = if auto_play {
            Judgement::Perfect
        } else {
            engine.judgement(play_time, note.target_time)?
        };

        if judgement != Judgement::Miss {
            note.state.was_hit = true;
            note.state.visible = false;
        }
        Some(engine.add_judgement(judgement))
    }
}
