//! Core library for the Rhythm Boss game.
//!
//! Synchronisation and judgement for a beat-driven boss fight. A
//! [`Session`] owns one loaded level and drives its subsystems (timeline
//! clock, beat mapping, level events, notes, judgement and checkpoints)
//! from an injected [`ClockSource`] and [`AudioOutput`], so the whole
//! engine runs headless against a manual clock in tests.

pub mod assets;
pub mod audio;
pub mod beat;
pub mod calibration;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod judgement;
pub mod level;
pub mod notes;
pub mod prepare;
pub mod progress;
pub mod session;
pub mod timeline;

pub use assets::{AssetRegistry, BossDefinition, HitType, MusicClip, NoteKind, ResolvedLevel};
pub use audio::{AudioOutput, ScheduledQueue, SfxCue, SimulatedAudio, SimulatedAudioHandle};
pub use beat::{BeatMapper, TempoModel};
pub use calibration::Calibration;
pub use checkpoint::{CheckpointManager, CheckpointSnapshot};
pub use clock::{ClockSource, DspInterpolator, ManualClock, SystemClock};
pub use config::{AudioConfig, GameConfig, GameplayConfig, PrepareConfig};
pub use error::{Result, RhythmError};
pub use events::{EventScheduler, LevelEventState, UndoCommand};
pub use judgement::{Judgement, JudgementEngine, JudgementTally, JudgementTimeWindows};
pub use level::{Level, LevelEventRecord, NoteRecord};
pub use notes::{NoteLifecycle, NotePhase, NoteRuntime};
pub use prepare::PrepareCountdown;
pub use progress::ProgressStore;
pub use session::{Notification, PlaySession, Session, SessionState};
pub use timeline::{TimelineClock, TimelineState};
