use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{judgement::JudgementTimeWindows, Result};

/// Top-level configuration for a play session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub audio: AudioConfig,
    pub judgement: JudgementTimeWindows,
    pub prepare: PrepareConfig,
    pub gameplay: GameplayConfig,
}

impl GameConfig {
    /// Loads the config at `path`, falling back to defaults when the file
    /// does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.judgement.validate()
    }
}

/// Configuration specific to the audio device and clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Calibrated output latency, subtracted when scheduling sounds.
    pub audio_offset_seconds: f64,
    /// How far ahead of "now" the music is restarted mid-clip.
    pub schedule_epsilon_seconds: f64,
    /// Hardware clock movements below this count as a stall.
    pub stall_epsilon_seconds: f64,
    /// Look-ahead for hit sounds and countdown cues on top of the offset.
    pub sfx_lead_seconds: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            audio_offset_seconds: 0.0,
            schedule_epsilon_seconds: 0.01,
            stall_epsilon_seconds: 0.00001,
            sfx_lead_seconds: 0.05,
        }
    }
}

/// Pre-roll inserted before level start and after a respawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareConfig {
    pub countdown_beats: u32,
    pub respawn_extra_seconds: f64,
    pub intro_extra_seconds: f64,
    pub cue_volume: f32,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            countdown_beats: 4,
            respawn_extra_seconds: 1.0,
            intro_extra_seconds: 2.0,
            cue_volume: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameplayConfig {
    pub auto_play: bool,
    /// Inputs further than this many beats from the next note are ignored.
    pub hit_beat_range: f64,
    /// Seconds after the last note before the level counts as cleared.
    pub clear_grace_seconds: f64,
}

impl Default for GameplayConfig {
    fn default() -> Self {
        Self {
            auto_play: false,
            hit_beat_range: 1.0,
            clear_grace_seconds: 1.0,
        }
    }
}
