/// Result alias that carries the custom [`RhythmError`] type.
pub type Result<T> = std::result::Result<T, RhythmError>;

/// Common error type for the core crate.
///
/// Only level loading and persistence can fail. Timeline, judgement and
/// input operations never return errors: missing state is a no-op and
/// timing anomalies are absorbed where they occur.
#[derive(Debug, thiserror::Error)]
pub enum RhythmError {
    /// The level declares a tempo that cannot drive a beat mapping.
    #[error("invalid tempo: {bpm} bpm")]
    InvalidTempo { bpm: f64 },
    /// A note references a note type the boss does not provide.
    #[error("boss `{boss_id}` has no note type `{note_type}`")]
    UnknownNoteType { boss_id: String, note_type: String },
    /// Gameplay tuning that violates its own ordering rules.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// No boss asset is registered under the requested id.
    #[error("boss load failed (id: {boss_id})")]
    MissingBoss { boss_id: String },
    /// No music clip is registered under the requested id.
    #[error("music load failed (id: {music_id})")]
    MissingMusic { music_id: String },
    /// Free-form message for callers that only need a readable string.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialization errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl RhythmError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// True for malformed level or tuning data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidTempo { .. } | Self::UnknownNoteType { .. } | Self::InvalidConfig(_)
        )
    }

    /// True when an asset referenced by the level could not be found.
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::MissingBoss { .. } | Self::MissingMusic { .. })
    }
}

impl From<&str> for RhythmError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for RhythmError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_load_failures() {
        let tempo = RhythmError::InvalidTempo { bpm: 0.0 };
        let boss = RhythmError::MissingBoss {
            boss_id: "Slime".to_string(),
        };

        assert!(tempo.is_configuration());
        assert!(!tempo.is_resource());
        assert!(boss.is_resource());
        assert!(format!("{boss}").contains("Slime"));
    }
}
