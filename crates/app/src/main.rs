use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use rhythm_boss_core::{
    AssetRegistry, AudioOutput, BeatMapper, BossDefinition, Calibration, ClockSource, GameConfig,
    HitType, Level, ManualClock, MusicClip, Notification, ProgressStore, Result, RhythmError,
    Session, SimulatedAudio,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            level,
            assets,
            config,
            progress_dir,
            fps,
            auto_play,
            miss_every,
        } => {
            let mut config = load_config(config.as_deref())?;
            config.gameplay.auto_play |= auto_play;
            let options = SimulateOptions {
                fps,
                miss_every,
                progress_dir,
            };
            let report = run_simulate(&level, &assets, config, &options)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Inspect { level } => run_inspect(&level),
        Commands::Calibrate {
            latency_ms,
            bpm,
            taps,
            config,
        } => run_calibrate(latency_ms, bpm, taps, config.as_deref()),
    }
}

/// Bosses and music clips a level may reference.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct AssetManifest {
    bosses: Vec<BossDefinition>,
    music: Vec<MusicClip>,
}

impl AssetManifest {
    fn into_registry(self) -> AssetRegistry {
        let mut registry = AssetRegistry::new();
        for boss in self.bosses {
            registry.register_boss(boss);
        }
        for clip in self.music {
            registry.register_music(clip);
        }
        registry
    }
}

struct SimulateOptions {
    fps: u32,
    miss_every: Option<u32>,
    progress_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SimulateReport {
    level: String,
    frames: u64,
    perfect: u32,
    good: u32,
    early: u32,
    late: u32,
    miss: u32,
    respawns: u32,
    accuracy: f64,
    stars: u32,
    perfect_clear: bool,
}

/// Plays the level with a scripted player that presses the right action on
/// the first frame at or after each note, skipping every `miss_every`th one.
#[derive(Debug, Default)]
struct ScriptedPlayer {
    miss_every: Option<u32>,
    attempts: u32,
    awaiting_respawn: bool,
}

impl ScriptedPlayer {
    fn act<C: ClockSource, A: AudioOutput>(&mut self, session: &mut Session<C, A>) {
        if self.awaiting_respawn {
            return;
        }
        let Some(play) = session.play_session() else {
            return;
        };
        if !play.is_playing() {
            return;
        }

        let play_time = play.current_play_time();
        let Some(note) = play
            .notes()
            .next_note(play_time)
            .and_then(|index| play.notes().get(index))
        else {
            return;
        };
        if play_time < note.target_time() {
            return;
        }
        let action = note.hit_type();

        self.attempts += 1;
        if self.miss_every.is_some_and(|n| n > 0 && self.attempts % n == 0) {
            tracing::debug!(attempt = self.attempts, "skipping note on purpose");
            self.awaiting_respawn = true;
            return;
        }

        let Some(now) = session.device_time() else {
            return;
        };
        let judged = match action {
            HitType::Attack => session.attack(now),
            HitType::Defend => session.defend(now),
        };
        if judged.is_none() {
            tracing::warn!(play_time, ?action, "input was not judged");
        }
    }

    fn observe(&mut self, notification: &Notification) {
        if matches!(notification, Notification::Respawned { .. }) {
            self.awaiting_respawn = false;
        }
    }
}

fn run_simulate(
    level_path: &Path,
    assets_path: &Path,
    config: GameConfig,
    options: &SimulateOptions,
) -> Result<SimulateReport> {
    let level: Level = read_json(level_path)?;
    let assets = read_json::<AssetManifest>(assets_path)?.into_registry();
    if options.fps == 0 {
        return Err(RhythmError::InvalidConfig("fps must be at least one".to_string()));
    }
    let frame = 1.0 / options.fps as f64;

    let clock = ManualClock::new();
    let mut session = Session::new(config, clock.clone(), SimulatedAudio::new(clock.clone()));
    if let Some(dir) = &options.progress_dir {
        session = session.with_progress_store(ProgressStore::new(dir));
    }
    session.load_level(&level, &assets)?;
    session.play();

    // Generous bound: every respawn costs at most one level length.
    let level_seconds = session
        .play_session()
        .map(|play| play.clear_time(session.config()) - play.current_play_time())
        .unwrap_or_default();
    let attempts = level.pattern.len() as f64 + 2.0;
    let max_frames = ((level_seconds + 10.0) * options.fps as f64 * attempts) as u64;

    let mut player = ScriptedPlayer {
        miss_every: options.miss_every,
        ..Default::default()
    };
    let mut frames = 0;
    let cleared = loop {
        if frames >= max_frames {
            break None;
        }
        clock.advance(frame);
        session.tick(frame);
        frames += 1;

        let mut cleared = None;
        for notification in session.drain_notifications() {
            log_notification(&notification);
            player.observe(&notification);
            if let Notification::LevelCleared { tally } = notification {
                cleared = Some(tally);
            }
        }
        if cleared.is_some() {
            break cleared;
        }

        player.act(&mut session);
        for notification in session.drain_notifications() {
            log_notification(&notification);
        }
    };

    let tally = cleared.ok_or_else(|| {
        RhythmError::msg(format!("level did not clear within {frames} frames"))
    })?;
    Ok(SimulateReport {
        level: level.level_name,
        frames,
        perfect: tally.perfect_count,
        good: tally.good_count,
        early: tally.early_count,
        late: tally.late_count,
        miss: tally.miss_count,
        respawns: tally.respawn_count,
        accuracy: tally.accuracy(),
        stars: tally.star_count(),
        perfect_clear: tally.is_perfect_clear(),
    })
}

fn log_notification(notification: &Notification) {
    match notification {
        Notification::Judged { note, judgement } => tracing::info!(note, %judgement, "judged"),
        Notification::NoteMissed { note } => tracing::info!(note, "note missed"),
        Notification::CheckpointReached { beat } => tracing::info!(beat, "checkpoint"),
        Notification::Respawned { beat, respawn_count } => {
            tracing::info!(beat, respawn_count, "respawn")
        }
        Notification::LevelCleared { .. } => tracing::info!("cleared"),
        other => tracing::debug!(?other, "notification"),
    }
}

fn run_inspect(level_path: &Path) -> Result<()> {
    let level: Level = read_json(level_path)?;
    let mapper = BeatMapper::new(level.tempo(0.0))?;

    println!("{} by {} ({})", level.level_name, level.author_name, level.level_uuid);
    println!(
        "tempo: {} bpm, {} beats per measure, start offset {:.3}s",
        level.default_bpm, level.beats_per_measure, level.start_offset
    );
    println!(
        "boss: {}, {} notes, last note at beat {} ({:.3}s)",
        level.boss_id,
        level.pattern.len(),
        level.max_beat(),
        mapper.play_time(level.max_beat())
    );

    for note in &level.pattern {
        println!(
            "  note {:>8.3} beat  {:>8.3}s  measure {:>3} + {:.3}  {}",
            note.appear_beat,
            mapper.play_time(note.appear_beat),
            mapper.measure(note.appear_beat),
            mapper.beat_in_measure(note.appear_beat),
            note.note_type
        );
    }
    for beat in level.checkpoint_beats() {
        println!("  checkpoint {:>8.3} beat  {:>8.3}s", beat, mapper.play_time(beat));
    }
    Ok(())
}

/// Runs the tap-along calibration against a simulated player whose taps
/// arrive `latency_ms` after each metronome click, and stores the result.
fn run_calibrate(latency_ms: f64, bpm: f64, taps: usize, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?;
    let clock = ManualClock::new();
    let mut audio = SimulatedAudio::new(clock.clone());
    let handle = audio.handle();
    let mut calibration = Calibration::new(bpm, taps).with_volume(config.prepare.cue_volume);

    let frame = 1.0 / 240.0;
    let latency = latency_ms / 1000.0;
    calibration.start(1.0, &mut audio);

    let mut pending_taps: Vec<f64> = Vec::new();
    let mut heard = 0;
    while !calibration.is_finished() {
        if clock.now() > 600.0 {
            return Err(RhythmError::msg("calibration did not finish"));
        }
        clock.advance(frame);
        let now = clock.now();
        calibration.update(now, &mut audio);
        audio.update();

        let played = handle.played()?;
        pending_taps.extend(played[heard..].iter().map(|cue| cue.device_time + latency));
        heard = played.len();

        while let Some(tap_time) = pending_taps.first().copied().filter(|t| *t <= now) {
            pending_taps.remove(0);
            if let Some(offset) = calibration.tap(tap_time) {
                tracing::debug!(offset, "tap");
            }
        }
    }

    let offset = calibration
        .result()
        .ok_or_else(|| RhythmError::msg("calibration produced no result"))?;
    tracing::info!(offset, taps = calibration.taps(), "calibrated audio offset");
    config.audio.audio_offset_seconds = offset;
    if let Some(path) = config_path {
        config.save(path)?;
        tracing::info!(path = %path.display(), "saved config");
    }
    println!("{offset:.4}");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<GameConfig> {
    match path {
        Some(path) => GameConfig::load(path),
        None => Ok(GameConfig::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Headless driver for the Rhythm Boss game core",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a level frame by frame against a simulated clock and audio device.
    Simulate {
        /// Level JSON file.
        #[arg(short, long)]
        level: PathBuf,
        /// Asset manifest listing bosses and music clips.
        #[arg(short, long)]
        assets: PathBuf,
        /// Game config; defaults are used when omitted or missing.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory to write the cleared level's progress into.
        #[arg(long)]
        progress_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 60)]
        fps: u32,
        /// Let the session hit every note itself.
        #[arg(long)]
        auto_play: bool,
        /// Deliberately miss every Nth note.
        #[arg(long)]
        miss_every: Option<u32>,
    },
    /// Print a level's tempo, note timing and checkpoints.
    Inspect {
        /// Level JSON file.
        level: PathBuf,
    },
    /// Measure output latency with a simulated tap-along player.
    Calibrate {
        #[arg(long, default_value_t = 40.0)]
        latency_ms: f64,
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
        #[arg(long, default_value_t = 8)]
        taps: usize,
        /// Config file to store the measured offset in.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    const LEVEL: &str = r#"{
        "levelUuid": "demo",
        "levelName": "Demo",
        "defaultBpm": 120.0,
        "bossId": "Slime",
        "musicPath": "song",
        "pattern": [
            { "appearBeat": 4.0, "noteType": "slash" },
            { "appearBeat": 6.0, "noteType": "guard" },
            { "appearBeat": 8.0, "noteType": "slash" }
        ],
        "events": [ { "appearBeat": 5.0, "isCheckpoint": true } ]
    }"#;

    const ASSETS: &str = r#"{
        "bosses": [{
            "boss_id": "Slime",
            "note_map": {
                "slash": { "hit_type": "Attack", "hit_sound": "hit" },
                "guard": { "hit_type": "Defend", "hit_sound": "block" }
            }
        }],
        "music": [{ "id": "song", "length_seconds": 20.0 }]
    }"#;

    fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
        let level = dir.join("level.json");
        let assets = dir.join("assets.json");
        std::fs::write(&level, LEVEL).unwrap();
        std::fs::write(&assets, ASSETS).unwrap();
        (level, assets)
    }

    fn options(miss_every: Option<u32>, progress_dir: Option<PathBuf>) -> SimulateOptions {
        SimulateOptions {
            fps: 64,
            miss_every,
            progress_dir,
        }
    }

    #[test]
    fn scripted_player_clears_with_a_perfect_run() {
        let dir = tempdir().unwrap();
        let (level, assets) = write_inputs(dir.path());
        let progress = dir.path().join("PlayData");

        let options = options(None, Some(progress.clone()));
        let report = run_simulate(&level, &assets, GameConfig::default(), &options).unwrap();
        assert_eq!(report.perfect, 3);
        assert_eq!(report.respawns, 0);
        assert!(report.perfect_clear);
        assert_eq!(report.stars, 5);
        assert!(progress.join("demo.json").exists());
    }

    #[test]
    fn missing_a_note_costs_a_respawn() {
        let dir = tempdir().unwrap();
        let (level, assets) = write_inputs(dir.path());

        let options = options(Some(3), None);
        let report = run_simulate(&level, &assets, GameConfig::default(), &options).unwrap();
        assert_eq!(report.respawns, 1);
        assert_eq!(report.miss, 0);
        assert_eq!(report.perfect, 3);
        assert_eq!(report.stars, 4);
    }

    #[test]
    fn auto_play_needs_no_input() {
        let dir = tempdir().unwrap();
        let (level, assets) = write_inputs(dir.path());
        let mut config = GameConfig::default();
        config.gameplay.auto_play = true;

        let report = run_simulate(&level, &assets, config, &options(Some(1), None)).unwrap();
        assert_eq!(report.perfect, 3);
        assert_eq!(report.respawns, 0);
    }

    #[test]
    fn calibration_measures_the_simulated_latency() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        run_calibrate(40.0, 120.0, 4, Some(&path)).unwrap();
        let config = GameConfig::load(&path).unwrap();
        assert!((config.audio.audio_offset_seconds - 0.04).abs() < 0.01);
    }
}
