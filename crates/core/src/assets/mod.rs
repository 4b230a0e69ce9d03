use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    beat::BeatMapper,
    level::Level,
    Result, RhythmError,
};

/// Which player action a note expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitType {
    Attack,
    Defend,
}

/// How a boss plays one of its note types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteKind {
    pub hit_type: HitType,
    /// Sound id scheduled on the audio device when the note arrives.
    pub hit_sound: String,
    pub scroll_speed_rate: f64,
}

impl Default for NoteKind {
    fn default() -> Self {
        Self {
            hit_type: HitType::Attack,
            hit_sound: String::new(),
            scroll_speed_rate: 1.0,
        }
    }
}

/// Descriptor for a boss that can be fought in a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossDefinition {
    pub boss_id: String,
    #[serde(default)]
    pub name: String,
    /// Scroll distance between the player's hit point and the point where
    /// the boss releases notes.
    #[serde(default = "default_hit_receive_distance")]
    pub hit_receive_distance: f64,
    pub note_map: HashMap<String, NoteKind>,
}

fn default_hit_receive_distance() -> f64 {
    10.0
}

/// Loaded music clip handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicClip {
    pub id: String,
    pub length_seconds: f64,
}

/// A level whose every reference has been looked up successfully.
#[derive(Debug, Clone)]
pub struct ResolvedLevel {
    pub level: Level,
    pub boss: BossDefinition,
    pub music: Option<MusicClip>,
    pub mapper: BeatMapper,
    /// Note kind of each entry of `level.pattern`, index for index.
    pub note_kinds: Vec<NoteKind>,
}

/// Registry for all assets referenced by levels.
#[derive(Debug, Default, Clone)]
pub struct AssetRegistry {
    bosses: HashMap<String, BossDefinition>,
    music: HashMap<String, MusicClip>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_boss(&mut self, boss: BossDefinition) {
        self.bosses.insert(boss.boss_id.clone(), boss);
    }

    pub fn register_music(&mut self, clip: MusicClip) {
        self.music.insert(clip.id.clone(), clip);
    }

    pub fn boss(&self, id: &str) -> Option<&BossDefinition> {
        self.bosses.get(id)
    }

    pub fn music(&self, id: &str) -> Option<&MusicClip> {
        self.music.get(id)
    }

    /// Resolves every reference of `level`. Nothing is returned unless all
    /// lookups succeed, so a failed load never leaves partial state behind.
    pub fn resolve(&self, level: &Level, audio_offset_seconds: f64) -> Result<ResolvedLevel> {
        let mapper = BeatMapper::new(level.tempo(audio_offset_seconds))?;

        let boss = self
            .boss(&level.boss_id)
            .ok_or_else(|| RhythmError::MissingBoss {
                boss_id: level.boss_id.clone(),
            })?;

        let music = if level.music_path.is_empty() {
            None
        } else {
            let clip = self
                .music(&level.music_path)
                .ok_or_else(|| RhythmError::MissingMusic {
                    music_id: level.music_path.clone(),
                })?;
            Some(clip.clone())
        };

        let note_kinds = level
            .pattern
            .iter()
            .map(|note| {
                boss.note_map
                    .get(&note.note_type)
                    .cloned()
                    .ok_or_else(|| RhythmError::UnknownNoteType {
                        boss_id: boss.boss_id.clone(),
                        note_type: note.note_type.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedLevel {
            level: level.clone(),
            boss: boss.clone(),
            music,
            mapper,
            note_kinds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::NoteRecord;

    fn slime() -> BossDefinition {
        let mut note_map = HashMap::new();
        note_map.insert(
            "slash".to_string(),
            NoteKind {
                hit_type: HitType::Attack,
                hit_sound: "hit_slash".to_string(),
                scroll_speed_rate: 1.0,
            },
        );
        BossDefinition {
            boss_id: "Slime".to_string(),
            name: "Slime".to_string(),
            hit_receive_distance: 10.0,
            note_map,
        }
    }

    fn registry() -> AssetRegistry {
        let mut registry = AssetRegistry::new();
        registry.register_boss(slime());
        registry.register_music(MusicClip {
            id: "$intro".to_string(),
            length_seconds: 90.0,
        });
        registry
    }

    fn level(note_type: &str) -> Level {
        Level {
            boss_id: "Slime".to_string(),
            music_path: "$intro".to_string(),
            pattern: vec![NoteRecord::new(1.0, note_type)],
            ..Default::default()
        }
    }

    #[test]
    fn resolves_registered_assets() {
        let resolved = registry().resolve(&level("slash"), 0.0).unwrap();
        assert_eq!(resolved.note_kinds.len(), 1);
        assert_eq!(resolved.note_kinds[0].hit_type, HitType::Attack);
        assert_eq!(resolved.music.unwrap().length_seconds, 90.0);
    }

    #[test]
    fn errors_on_missing_boss() {
        let mut level = level("slash");
        level.boss_id = "Dragon".to_string();

        let err = registry().resolve(&level, 0.0).unwrap_err();
        assert!(err.is_resource());
        assert!(format!("{err}").contains("Dragon"));
    }

    #[test]
    fn errors_on_missing_music() {
        let mut level = level("slash");
        level.music_path = "missing.ogg".to_string();

        let err = registry().resolve(&level, 0.0).unwrap_err();
        assert!(format!("{err}").contains("missing.ogg"));
    }

    #[test]
    fn errors_on_unknown_note_type() {
        let err = registry().resolve(&level("kick"), 0.0).unwrap_err();
        assert!(err.is_configuration());
        assert!(format!("{err}").contains("kick"));
    }

    #[test]
    fn errors_on_invalid_tempo() {
        let mut level = level("slash");
        level.default_bpm = 0.0;
        assert!(matches!(
            registry().resolve(&level, 0.0),
            Err(RhythmError::InvalidTempo { .. })
        ));
    }

    #[test]
    fn levels_without_music_resolve() {
        let mut level = level("slash");
        level.music_path.clear();
        assert!(registry().resolve(&level, 0.0).unwrap().music.is_none());
    }
}
