//! Play session: owns every rhythm component for one loaded level and
//! drives them in a fixed per-tick order.

use serde::{Deserialize, Serialize};

use crate::{
    assets::{AssetRegistry, HitType, ResolvedLevel},
    audio::{AudioOutput, SfxCue},
    beat::BeatMapper,
    checkpoint::{CheckpointManager, CheckpointSnapshot},
    clock::ClockSource,
    config::GameConfig,
    events::{EventContext, EventScheduler, EventTransition},
    judgement::{Judgement, JudgementEngine, JudgementTally},
    level::Level,
    notes::{NoteLifecycle, NoteTick, NoteTuning},
    prepare::{PrepareCountdown, PrepareTick},
    progress::ProgressStore,
    timeline::TimelineClock,
    Result,
};

/// Push notifications for render/UI collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    Judged { note: usize, judgement: Judgement },
    NoteMissed { note: usize },
    CheckpointReached { beat: f64 },
    CheckpointReverted { beat: f64 },
    PrepareCountdown(Option<u32>),
    Respawned { beat: f64, respawn_count: u32 },
    LevelCleared { tally: JudgementTally },
    ClearRevoked,
}

/// Whether a level is loaded. Operations on `NoLevelLoaded` do nothing.
#[derive(Debug)]
pub enum SessionState {
    NoLevelLoaded,
    Loaded(Box<PlaySession>),
}

/// Every component of one loaded level.
#[derive(Debug)]
pub struct PlaySession {
    resolved: ResolvedLevel,
    timeline: TimelineClock,
    events: EventScheduler,
    notes: NoteLifecycle,
    judgement: JudgementEngine,
    checkpoints: CheckpointManager,
    prepare: PrepareCountdown,
    cleared: bool,
    notifications: Vec<Notification>,
}

impl PlaySession {
    fn new(
        resolved: ResolvedLevel,
        config: &GameConfig,
        device_now: f64,
        audio: &mut dyn AudioOutput,
    ) -> Self {
        let tempo = *resolved.mapper.tempo();
        let timeline = TimelineClock::new(
            device_now,
            config.audio.stall_epsilon_seconds,
            config.audio.schedule_epsilon_seconds,
        )
        .with_offsets(tempo.start_offset_seconds, tempo.audio_latency_offset_seconds);

        let mut session = Self {
            events: EventScheduler::new(&resolved.level.events),
            notes: spawn_notes(&resolved, config),
            judgement: JudgementEngine::new(config.judgement),
            checkpoints: CheckpointManager::new(),
            prepare: PrepareCountdown::new(config.prepare.countdown_beats),
            cleared: false,
            notifications: Vec::new(),
            timeline,
            resolved,
        };
        session.init_game(config, audio);
        session
    }

    /// Parks the level before its intro countdown with a fresh run.
    fn init_game(&mut self, config: &GameConfig, audio: &mut dyn AudioOutput) {
        audio.stop_all_sfx();
        let mapper = self.mapper();
        let pre_roll = mapper.play_time(config.prepare.countdown_beats as f64)
            + config.prepare.intro_extra_seconds;
        self.timeline.reset(-pre_roll, audio);

        self.notes = spawn_notes(&self.resolved, config);
        let mut ctx = EventContext {
            checkpoints: &mut self.checkpoints,
            judgement: &mut self.judgement,
        };
        let transitions = self.events.reset(&mut ctx);
        self.push_transitions(transitions);
        if self.cleared {
            self.notifications.push(Notification::ClearRevoked);
        }

        self.judgement.reset();
        self.checkpoints.reset(Some(CheckpointSnapshot {
            beat: 0.0,
            tally: *self.judgement.tally(),
        }));
        self.prepare.start(0.0);
        self.cleared = false;
    }

    pub fn level(&self) -> &Level {
        &self.resolved.level
    }

    pub fn resolved(&self) -> &ResolvedLevel {
        &self.resolved
    }

    pub fn mapper(&self) -> BeatMapper {
        self.resolved.mapper
    }

    pub fn timeline(&self) -> &TimelineClock {
        &self.timeline
    }

    pub fn current_play_time(&self) -> f64 {
        self.timeline.current_play_time()
    }

    pub fn current_beat(&self) -> f64 {
        self.mapper().beat(self.current_play_time())
    }

    pub fn is_playing(&self) -> bool {
        self.timeline.is_playing()
    }

    pub fn notes(&self) -> &NoteLifecycle {
        &self.notes
    }

    pub fn events(&self) -> &EventScheduler {
        &self.events
    }

    pub fn judgement(&self) -> &JudgementEngine {
        &self.judgement
    }

    pub fn tally(&self) -> &JudgementTally {
        self.judgement.tally()
    }

    pub fn checkpoint(&self) -> Option<&CheckpointSnapshot> {
        self.checkpoints.current()
    }

    pub fn prepare(&self) -> &PrepareCountdown {
        &self.prepare
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    /// Un-hit notes remaining; zero only once every note is hit.
    pub fn boss_hp(&self) -> usize {
        self.notes.unresolved_count()
    }

    pub fn max_boss_hp(&self) -> usize {
        self.notes.len()
    }

    /// Play time after which the level counts as cleared.
    pub fn clear_time(&self, config: &GameConfig) -> f64 {
        let last_note = self.mapper().play_time(self.resolved.level.max_beat());
        last_note + config.gameplay.clear_grace_seconds
    }

    fn play(&mut self, audio: &mut dyn AudioOutput) {
        if self.timeline.play(audio) {
            tracing::info!(play_time = self.current_play_time(), "playing");
        }
    }

    fn pause(&mut self, audio: &mut dyn AudioOutput) {
        audio.stop_all_sfx();
        if self.timeline.pause(audio) {
            tracing::info!(play_time = self.current_play_time(), "paused");
        }
    }

    fn seek(&mut self, time: f64, pre_roll: f64, config: &GameConfig, audio: &mut dyn AudioOutput) {
        audio.stop_all_sfx();
        self.timeline.seek(time, pre_roll, audio);

        let mapper = self.mapper();
        let beat = self.current_beat();
        self.notes.seek(beat, mapper.beat(pre_roll - config.judgement.perfect));
        self.prepare.seek(beat);

        let mut ctx = EventContext {
            checkpoints: &mut self.checkpoints,
            judgement: &mut self.judgement,
        };
        let transitions = self.events.seek(beat + mapper.beat(pre_roll), &mut ctx);
        self.push_transitions(transitions);
        tracing::info!(time, pre_roll, beat, "seek");
    }

    fn goto_checkpoint(&mut self, config: &GameConfig, audio: &mut dyn AudioOutput) {
        let mapper = self.mapper();
        let beat = self.checkpoints.respawn_beat();
        let prepare_time = mapper.play_time(config.prepare.countdown_beats as f64)
            + config.prepare.respawn_extra_seconds;

        self.prepare.start(beat);
        self.seek(mapper.play_time(beat), prepare_time, config, audio);

        self.checkpoints.restore_into(&mut self.judgement);
        let respawn_count = self.judgement.record_respawn();
        tracing::info!(beat, respawn_count, "respawned at checkpoint");
        self.notifications.push(Notification::Respawned { beat, respawn_count });
    }

    fn tick(
        &mut self,
        hardware_now: f64,
        frame_delta: f64,
        config: &GameConfig,
        audio: &mut dyn AudioOutput,
        progress: Option<&ProgressStore>,
    ) {
        self.timeline.advance(hardware_now, frame_delta);
        audio.update();

        let mapper = self.mapper();
        let beat = self.current_beat();
        let play_time = self.current_play_time();
        let device_time = self.timeline.device_time();
        let is_playing = self.is_playing();

        let mut ctx = EventContext {
            checkpoints: &mut self.checkpoints,
            judgement: &mut self.judgement,
        };
        let transitions = self.events.update(beat, &mut ctx);
        self.push_transitions(transitions);

        let prepared = self.prepare.update(
            &PrepareTick {
                current_beat: beat,
                device_time,
                is_playing,
                audio_offset: mapper.tempo().audio_latency_offset_seconds,
                lead: config.audio.sfx_lead_seconds,
            },
            &mapper,
        );
        for cue_time in prepared.cues {
            audio.play_sfx_scheduled(SfxCue::PrepareBeep, cue_time, config.prepare.cue_volume);
        }
        if let Some(countdown) = prepared.countdown_changed {
            self.notifications.push(Notification::PrepareCountdown(countdown));
        }

        let auto_play = config.gameplay.auto_play;
        let outcome = self.notes.update(&NoteTick {
            current_beat: beat,
            current_play_time: play_time,
            device_time,
            is_playing,
            auto_play,
        });
        for request in outcome.hit_sounds {
            audio.play_sfx_scheduled(request.cue, request.device_time, 1.0);
        }

        if auto_play && is_playing {
            self.auto_hit(beat, play_time);
        }

        if let Some(note) = outcome.missed {
            let judgement = self.judgement.add_judgement(Judgement::Miss);
            tracing::debug!(note, "note passed un-hit");
            self.notifications.push(Notification::NoteMissed { note });
            self.notifications.push(Notification::Judged { note, judgement });
            self.goto_checkpoint(config, audio);
        }

        self.update_clear(config, progress);
    }

    fn auto_hit(&mut self, beat: f64, play_time: f64) {
        while let Some(index) = self.notes.next_note(play_time) {
            let Some(note) = self.notes.get(index) else {
                break;
            };
            if note.appear_beat() > beat {
                break;
            }
            match self.notes.hit(index, play_time, true, &mut self.judgement) {
                Some(judgement) => self
                    .notifications
                    .push(Notification::Judged { note: index, judgement }),
                None => break,
            }
        }
    }

    fn input(&mut self, action: HitType, now: f64, config: &GameConfig) -> Option<Judgement> {
        if !self.is_playing() {
            return None;
        }

        let play_time = if now.is_finite() {
            self.timeline.state().play_time_at(now)
        } else {
            tracing::debug!(now, "ignoring non-finite input time");
            self.current_play_time()
        };

        let index = self.notes.next_note(play_time)?;
        let note = self.notes.get(index)?;
        if note.hit_type() != action {
            return None;
        }
        let beat_distance = self.mapper().beat(play_time) - note.appear_beat();
        if beat_distance.abs() >= config.gameplay.hit_beat_range {
            return None;
        }

        let judgement = self
            .notes
            .hit(index, play_time, config.gameplay.auto_play, &mut self.judgement)?;
        self.notifications.push(Notification::Judged { note: index, judgement });
        Some(judgement)
    }

    fn update_clear(&mut self, config: &GameConfig, progress: Option<&ProgressStore>) {
        if self.current_play_time() > self.clear_time(config) {
            if self.cleared {
                return;
            }
            self.cleared = true;
            let tally = *self.judgement.tally();
            tracing::info!(
                level = %self.resolved.level.level_uuid,
                accuracy = tally.accuracy(),
                stars = tally.star_count(),
                "level cleared"
            );
            if let Some(store) = progress {
                if let Err(err) = store.save(&self.resolved.level.level_uuid, &tally) {
                    tracing::warn!(%err, "failed to save player progress");
                }
            }
            self.notifications.push(Notification::LevelCleared { tally });
        } else if self.cleared {
            self.cleared = false;
            self.notifications.push(Notification::ClearRevoked);
        }
    }

    fn push_transitions(&mut self, transitions: Vec<EventTransition>) {
        for transition in transitions {
            match transition {
                EventTransition::Performed { beat, checkpoint: true } => {
                    self.notifications.push(Notification::CheckpointReached { beat });
                }
                EventTransition::Reverted { beat, checkpoint: true } => {
                    self.notifications.push(Notification::CheckpointReverted { beat });
                }
                _ => {}
            }
        }
    }
}

fn spawn_notes(resolved: &ResolvedLevel, config: &GameConfig) -> NoteLifecycle {
    NoteLifecycle::spawn(
        &resolved.level.pattern,
        &resolved.note_kinds,
        resolved.mapper,
        NoteTuning {
            base_scroll_speed: resolved.level.base_scroll_speed,
            hit_receive_distance: resolved.boss.hit_receive_distance,
            audio_offset: resolved.mapper.tempo().audio_latency_offset_seconds,
            hit_sound_lead: config.audio.sfx_lead_seconds,
            bad_window: config.judgement.bad,
        },
    )
}

/// Owning context of a play session: configuration, clock, audio device
/// and the loaded level, passed explicitly instead of global managers.
pub struct Session<C, A> {
    config: GameConfig,
    clock: C,
    audio: A,
    progress: Option<ProgressStore>,
    state: SessionState,
}

impl<C: ClockSource, A: AudioOutput> Session<C, A> {
    pub fn new(config: GameConfig, clock: C, audio: A) -> Self {
        Self {
            config,
            clock,
            audio,
            progress: None,
            state: SessionState::NoLevelLoaded,
        }
    }

    /// Saves the tally through `store` whenever a level is cleared.
    pub fn with_progress_store(mut self, store: ProgressStore) -> Self {
        self.progress = Some(store);
        self
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, SessionState::Loaded(_))
    }

    /// The loaded level's session, if any.
    pub fn play_session(&self) -> Option<&PlaySession> {
        match &self.state {
            SessionState::Loaded(play) => Some(play),
            SessionState::NoLevelLoaded => None,
        }
    }

    /// Resolves and installs `level`. On error the previous state is kept.
    pub fn load_level(&mut self, level: &Level, assets: &AssetRegistry) -> Result<()> {
        let resolved = match assets.resolve(level, self.config.audio.audio_offset_seconds) {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(level = %level.level_uuid, %err, "level load failed");
                return Err(err);
            }
        };

        self.unload();
        self.audio.load_music(resolved.music.as_ref());
        let device_now = self.clock.now();
        let play = PlaySession::new(resolved, &self.config, device_now, &mut self.audio);
        tracing::info!(
            level = %level.level_uuid,
            name = %level.level_name,
            notes = level.pattern.len(),
            events = level.events.len(),
            "level loaded"
        );
        self.state = SessionState::Loaded(Box::new(play));
        Ok(())
    }

    pub fn unload(&mut self) {
        if let SessionState::Loaded(play) = &mut self.state {
            play.pause(&mut self.audio);
            self.audio.stop_music();
            self.audio.load_music(None);
            tracing::debug!(level = %play.level().level_uuid, "level unloaded");
        }
        self.state = SessionState::NoLevelLoaded;
    }

    pub fn play(&mut self) {
        if let SessionState::Loaded(play) = &mut self.state {
            play.play(&mut self.audio);
        }
    }

    pub fn pause(&mut self) {
        if let SessionState::Loaded(play) = &mut self.state {
            play.pause(&mut self.audio);
        }
    }

    /// Returns to the start of the level with a fresh run.
    pub fn stop(&mut self) {
        if let SessionState::Loaded(play) = &mut self.state {
            play.init_game(&self.config, &mut self.audio);
        }
    }

    /// Moves the timeline to `time - pre_roll` and re-derives every note
    /// and event as if play had always been there.
    pub fn seek(&mut self, time: f64, pre_roll: f64) {
        if let SessionState::Loaded(play) = &mut self.state {
            play.seek(time, pre_roll, &self.config, &mut self.audio);
        }
    }

    pub fn seek_beat(&mut self, beat: f64) {
        if let SessionState::Loaded(play) = &mut self.state {
            let time = play.mapper().play_time(beat);
            play.seek(time, 0.0, &self.config, &mut self.audio);
        }
    }

    /// Respawns at the active checkpoint behind a prepare countdown.
    pub fn goto_checkpoint(&mut self) {
        if let SessionState::Loaded(play) = &mut self.state {
            play.goto_checkpoint(&self.config, &mut self.audio);
        }
    }

    /// Runs one engine tick. `frame_delta` is the software frame time used
    /// to interpolate across hardware clock stalls.
    pub fn tick(&mut self, frame_delta: f64) {
        let hardware_now = self.clock.now();
        if let SessionState::Loaded(play) = &mut self.state {
            play.tick(
                hardware_now,
                frame_delta,
                &self.config,
                &mut self.audio,
                self.progress.as_ref(),
            );
        }
    }

    /// Attack input at device time `now`.
    pub fn attack(&mut self, now: f64) -> Option<Judgement> {
        self.input(HitType::Attack, now)
    }

    /// Defend input at device time `now`.
    pub fn defend(&mut self, now: f64) -> Option<Judgement> {
        self.input(HitType::Defend, now)
    }

    fn input(&mut self, action: HitType, now: f64) -> Option<Judgement> {
        match &mut self.state {
            SessionState::Loaded(play) => play.input(action, now, &self.config),
            SessionState::NoLevelLoaded => None,
        }
    }

    /// Interpolated device time of the last tick.
    pub fn device_time(&self) -> Option<f64> {
        self.play_session().map(|play| play.timeline().device_time())
    }

    pub fn current_play_time(&self) -> Option<f64> {
        self.play_session().map(PlaySession::current_play_time)
    }

    pub fn current_beat(&self) -> Option<f64> {
        self.play_session().map(PlaySession::current_beat)
    }

    pub fn is_playing(&self) -> bool {
        self.play_session().is_some_and(PlaySession::is_playing)
    }

    pub fn tally(&self) -> Option<&JudgementTally> {
        self.play_session().map(PlaySession::tally)
    }

    pub fn boss_hp(&self) -> Option<(usize, usize)> {
        self.play_session()
            .map(|play| (play.boss_hp(), play.max_boss_hp()))
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        match &mut self.state {
            SessionState::Loaded(play) => std::mem::take(&mut play.notifications),
            SessionState::NoLevelLoaded => Vec::new(),
        }
    }
}

impl<C, A> std::fmt::Debug for Session<C, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}
