use serde::{Deserialize, Serialize};

use crate::beat::TempoModel;

/// Authored note: the beat it must be hit on and the boss note type that
/// renders and sounds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub appear_beat: f64,
    pub note_type: String,
}

impl NoteRecord {
    pub fn new(appear_beat: f64, note_type: impl Into<String>) -> Self {
        Self {
            appear_beat,
            note_type: note_type.into(),
        }
    }
}

/// Authored level event. Only checkpoints carry an effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelEventRecord {
    pub appear_beat: f64,
    #[serde(default)]
    pub is_checkpoint: Option<bool>,
}

impl LevelEventRecord {
    pub fn checkpoint(appear_beat: f64) -> Self {
        Self {
            appear_beat,
            is_checkpoint: Some(true),
        }
    }
}

/// Deserialized level as produced by the external loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Level {
    pub level_uuid: String,
    pub start_offset: f64,
    pub beats_per_measure: u32,
    pub default_bpm: f64,
    pub base_scroll_speed: f64,
    pub boss_id: String,
    pub music_path: String,
    pub level_name: String,
    pub music_name: String,
    pub author_name: String,
    pub background_id: String,
    pub ground_id: String,
    pub pattern: Vec<NoteRecord>,
    pub events: Vec<LevelEventRecord>,
}

impl Default for Level {
    fn default() -> Self {
        Self {
            level_uuid: String::new(),
            start_offset: 0.0,
            beats_per_measure: 4,
            default_bpm: 120.0,
            base_scroll_speed: 5.0,
            boss_id: "Slime".to_string(),
            music_path: String::new(),
            level_name: "Untitled".to_string(),
            music_name: "Untitled".to_string(),
            author_name: "Anonymous".to_string(),
            background_id: "Sky".to_string(),
            ground_id: "Ground".to_string(),
            pattern: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl Level {
    /// Tempo of the level with the player's audio latency applied.
    pub fn tempo(&self, audio_latency_offset_seconds: f64) -> TempoModel {
        TempoModel::new(self.default_bpm, self.beats_per_measure)
            .with_start_offset(self.start_offset)
            .with_audio_latency_offset(audio_latency_offset_seconds)
    }

    /// Beat of the last note, or zero for an empty pattern.
    pub fn max_beat(&self) -> f64 {
        self.pattern
            .iter()
            .map(|note| note.appear_beat)
            .fold(0.0, f64::max)
    }

    pub fn checkpoint_beats(&self) -> Vec<f64> {
        self.events
            .iter()
            .filter(|event| event.is_checkpoint.unwrap_or(false))
            .map(|event| event.appear_beat)
            .collect()
    }
}
