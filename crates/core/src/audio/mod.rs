use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::{assets::MusicClip, clock::ClockSource, Result, RhythmError};

/// Short sound the core asks the device to play at an exact device time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SfxCue {
    /// Hit sound of a note kind, by sound id.
    HitSound(String),
    /// Beat-aligned countdown cue during the prepare window.
    PrepareBeep,
}

/// Audio device seen from the rhythm core.
///
/// Every scheduling call takes device time (the clock the timeline reads),
/// never frame time, so sounds stay sample accurate under frame drops.
pub trait AudioOutput {
    /// Installs the music clip for the loaded level.
    fn load_music(&mut self, clip: Option<&MusicClip>);

    /// Length of the loaded music in seconds.
    fn music_length(&self) -> Option<f64>;

    /// Starts the music at `device_time` from `position` seconds into the
    /// clip, replacing any earlier schedule.
    fn schedule_music(&mut self, device_time: f64, position: f64);

    fn stop_music(&mut self);

    fn play_sfx_scheduled(&mut self, cue: SfxCue, device_time: f64, volume: f32);

    /// Cancels every pending or playing sound effect.
    fn stop_all_sfx(&mut self);

    /// Called once per tick so the device can release finished voices.
    fn update(&mut self) {}
}

/// Queue of values keyed by device time, polled rather than awaited.
#[derive(Debug, Clone)]
pub struct ScheduledQueue<T> {
    entries: Vec<(f64, T)>,
}

impl<T> Default for ScheduledQueue<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> ScheduledQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` after every entry due at or before `time`.
    pub fn push(&mut self, time: f64, value: T) {
        let index = self.entries.partition_point(|(due, _)| *due <= time);
        self.entries.insert(index, (time, value));
    }

    /// Removes and returns every entry due at or before `now`, earliest
    /// first.
    pub fn poll(&mut self, now: f64) -> Vec<(f64, T)> {
        let due = self.entries.partition_point(|(time, _)| *time <= now);
        self.entries.drain(..due).collect()
    }

    pub fn next_due(&self) -> Option<f64> {
        self.entries.first().map(|(time, _)| *time)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every call received by a [`SimulatedAudio`], in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AudioCommand {
    LoadMusic { length_seconds: Option<f64> },
    ScheduleMusic { device_time: f64, position: f64 },
    StopMusic,
    PlaySfx { cue: SfxCue, device_time: f64, volume: f32 },
    StopAllSfx,
}

/// Sound effect that reached its scheduled time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayedCue {
    pub cue: SfxCue,
    pub device_time: f64,
    pub volume: f32,
}

/// Where the simulated music voice currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MusicState {
    Stopped,
    Scheduled { device_time: f64, position: f64 },
}

#[derive(Debug)]
struct SimulatedState {
    music_length: Option<f64>,
    music: MusicState,
    pending: ScheduledQueue<(SfxCue, f32)>,
    played: Vec<PlayedCue>,
    commands: Vec<AudioCommand>,
}

/// In-memory audio device for headless runs and tests.
pub struct SimulatedAudio<C> {
    clock: C,
    shared: Arc<Mutex<SimulatedState>>,
}

impl<C: ClockSource> SimulatedAudio<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            shared: Arc::new(Mutex::new(SimulatedState {
                music_length: None,
                music: MusicState::Stopped,
                pending: ScheduledQueue::new(),
                played: Vec::new(),
                commands: Vec::new(),
            })),
        }
    }

    /// Read-only view that stays valid after the device is moved into a
    /// session.
    pub fn handle(&self) -> SimulatedAudioHandle {
        SimulatedAudioHandle {
            shared: self.shared.clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: ClockSource> AudioOutput for SimulatedAudio<C> {
    fn load_music(&mut self, clip: Option<&MusicClip>) {
        let length_seconds = clip.map(|clip| clip.length_seconds);
        let mut state = self.state();
        state.music_length = length_seconds;
        state.music = MusicState::Stopped;
        state.commands.push(AudioCommand::LoadMusic { length_seconds });
    }

    fn music_length(&self) -> Option<f64> {
        self.state().music_length
    }

    fn schedule_music(&mut self, device_time: f64, position: f64) {
        let mut state = self.state();
        state.music = MusicState::Scheduled { device_time, position };
        state.commands.push(AudioCommand::ScheduleMusic { device_time, position });
    }

    fn stop_music(&mut self) {
        let mut state = self.state();
        state.music = MusicState::Stopped;
        state.commands.push(AudioCommand::StopMusic);
    }

    fn play_sfx_scheduled(&mut self, cue: SfxCue, device_time: f64, volume: f32) {
        let mut state = self.state();
        state.pending.push(device_time, (cue.clone(), volume));
        state.commands.push(AudioCommand::PlaySfx {
            cue,
            device_time,
            volume,
        });
    }

    fn stop_all_sfx(&mut self) {
        let mut state = self.state();
        state.pending.clear();
        state.commands.push(AudioCommand::StopAllSfx);
    }

    fn update(&mut self) {
        let now = self.clock.now();
        let mut state = self.state();
        let due = state.pending.poll(now);
        for (device_time, (cue, volume)) in due {
            state.played.push(PlayedCue {
                cue,
                device_time,
                volume,
            });
        }
    }
}

impl<C> std::fmt::Debug for SimulatedAudio<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedAudio").finish()
    }
}

/// Shared, thread-safe view over a [`SimulatedAudio`] device.
#[derive(Clone)]
pub struct SimulatedAudioHandle {
    shared: Arc<Mutex<SimulatedState>>,
}

impl SimulatedAudioHandle {
    pub fn commands(&self) -> Result<Vec<AudioCommand>> {
        Ok(self.lock()?.commands.clone())
    }

    pub fn played(&self) -> Result<Vec<PlayedCue>> {
        Ok(self.lock()?.played.clone())
    }

    pub fn pending_sfx(&self) -> Result<usize> {
        Ok(self.lock()?.pending.len())
    }

    pub fn music(&self) -> Result<MusicState> {
        Ok(self.lock()?.music)
    }

    /// Drops the command log and played cues, keeping device state.
    pub fn clear_log(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.commands.clear();
        state.played.clear();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimulatedState>> {
        self.shared
            .lock()
            .map_err(|_| RhythmError::msg("simulated audio device has been poisoned"))
    }
}

impl std::fmt::Debug for SimulatedAudioHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedAudioHandle").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn queue_polls_due_entries_in_time_order() {
        let mut queue = ScheduledQueue::new();
        queue.push(2.0, "b");
        queue.push(1.0, "a");
        queue.push(3.0, "c");
        queue.push(2.0, "b2");

        let due: Vec<&str> = queue.poll(2.0).into_iter().map(|(_, v)| v).collect();
        assert_eq!(due, vec!["a", "b", "b2"]);
        assert_eq!(queue.next_due(), Some(3.0));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn plays_scheduled_cues_once_device_time_is_reached() {
        let clock = ManualClock::new();
        let mut audio = SimulatedAudio::new(clock.clone());
        let handle = audio.handle();

        audio.play_sfx_scheduled(SfxCue::PrepareBeep, 0.5, 1.0);
        audio.update();
        assert!(handle.played().unwrap().is_empty());

        clock.set(0.5);
        audio.update();
        let played = handle.played().unwrap();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].cue, SfxCue::PrepareBeep);
        assert_eq!(handle.pending_sfx().unwrap(), 0);
    }

    #[test]
    fn stop_all_sfx_cancels_pending_cues() {
        let clock = ManualClock::new();
        let mut audio = SimulatedAudio::new(clock.clone());
        let handle = audio.handle();

        audio.play_sfx_scheduled(SfxCue::HitSound("slash".to_string()), 1.0, 1.0);
        audio.stop_all_sfx();
        clock.set(2.0);
        audio.update();

        assert!(handle.played().unwrap().is_empty());
        assert_eq!(handle.commands().unwrap().last(), Some(&AudioCommand::StopAllSfx));
    }

    #[test]
    fn tracks_music_schedule() {
        let mut audio = SimulatedAudio::new(ManualClock::new());
        let handle = audio.handle();
        audio.load_music(Some(&MusicClip {
            id: "song".to_string(),
            length_seconds: 30.0,
        }));
        assert_eq!(audio.music_length(), Some(30.0));

        audio.schedule_music(1.0, 0.0);
        assert_eq!(
            handle.music().unwrap(),
            MusicState::Scheduled {
                device_time: 1.0,
                position: 0.0
            }
        );
        audio.stop_music();
        assert_eq!(handle.music().unwrap(), MusicState::Stopped);
    }
}
