use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lesson_player::content::{ContentSource, settings_or_default};
use lesson_player::model::{PlaybackPolicy, flatten_steps};
use lesson_player::{
    Generation, HttpContentClient, HttpProgressStore, LessonPlayer, LocalProgressCache,
    ManifestLoader, PlayerEvent, ProgressBridge, RecordingElement, SequenceGate, StepId,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::Result;
use crate::script::{ScriptCommand, parse_script};

/// Simulated clock resolution.
const TICK: Duration = Duration::from_secs(1);

/// How long to wait for queued remote writes when a simulation ends.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CommandExecutor {
    config: AppConfig,
}

impl CommandExecutor {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn variants(&self, url: &str, native: bool) -> Result<()> {
        let mut player_config = self.config.player.clone();
        player_config.native_adaptive_playback |= native;
        let client = self.config.remote.build_client()?;
        let loader = ManifestLoader::http(client, &player_config);

        let source = loader.resolve(url, &PlaybackPolicy::default()).await?;
        println!("source: {}", source.url);
        println!("mode:   {:?}", source.mode);
        if source.variants.is_empty() {
            println!("variants: none (single rendition or native playback)");
            return Ok(());
        }
        println!("variants:");
        for variant in &source.variants {
            let bitrate = variant
                .bitrate
                .map(|b| format!("{} kbps", b / 1000))
                .unwrap_or_default();
            println!(
                "  [{}] {:<8} {:>12}  {}",
                variant.id, variant.label, bitrate, variant.uri
            );
        }
        source.teardown();
        Ok(())
    }

    pub async fn steps(&self, json: bool) -> Result<()> {
        let content = self.content()?;
        let lessons = content.fetch_lessons().await?;
        let settings = settings_or_default(&content).await;
        let cache = LocalProgressCache::open(self.config.cache_path())?;

        let gate = SequenceGate::new(flatten_steps(&lessons));
        let statuses = gate.statuses(&cache.completed_steps());
        if json {
            println!("{}", serde_json::to_string_pretty(&statuses)?);
            return Ok(());
        }

        if settings.prevent_seeking {
            println!("(global seeking lock is on)");
        }
        for status in statuses {
            let state = if status.completed {
                "done"
            } else if status.locked {
                "locked"
            } else {
                "open"
            };
            let progress = cache
                .get(&status.step_id)
                .map(|r| format!("{:.1}s watched", r.max_watched))
                .unwrap_or_default();
            println!(
                "{:<7} {:<12} {:<11} {:<40} {}",
                state,
                status.step_id.as_str(),
                status.kind,
                status.title,
                progress
            );
        }
        Ok(())
    }

    pub async fn simulate(&self, step: &str, script: &Path) -> Result<()> {
        let commands = parse_script(&std::fs::read_to_string(script)?)?;
        let client = self.config.remote.build_client()?;
        let player_config = self.config.player.clone();

        let local = LocalProgressCache::open(self.config.cache_path())?;
        let remote = Arc::new(HttpProgressStore::new(
            client.clone(),
            self.config.remote.clone(),
        ));
        let token = CancellationToken::new();
        let (bridge, writer) = ProgressBridge::spawn(
            local,
            remote,
            player_config.remote_write_retry.clone(),
            token.clone(),
        );

        let player = LessonPlayer::bootstrap(
            &self.content()?,
            ManifestLoader::http(client, &player_config),
            bridge,
            Box::new(RecordingElement::new()),
            player_config,
        )
        .await?;

        let mut simulation = Simulation::new(player);
        simulation.run(ScriptCommand::Select(StepId::from(step))).await?;
        for command in commands {
            simulation.run(command).await?;
        }
        simulation.finish()?;

        if tokio::time::timeout(DRAIN_TIMEOUT, writer).await.is_err() {
            warn!("Remote writes still pending, giving up");
            token.cancel();
        }
        Ok(())
    }

    fn content(&self) -> Result<HttpContentClient> {
        let client = self.config.remote.build_client()?;
        Ok(HttpContentClient::new(client, self.config.remote.clone()))
    }
}

/// A player driven by script commands on a simulated clock.
struct Simulation {
    player: LessonPlayer,
    resume: Option<(Generation, Duration)>,
    emitted: usize,
}

impl Simulation {
    fn new(player: LessonPlayer) -> Self {
        Self {
            player,
            resume: None,
            emitted: 0,
        }
    }

    async fn run(&mut self, command: ScriptCommand) -> Result<()> {
        let player = &mut self.player;
        match command {
            ScriptCommand::Select(step) => player.activate(&step).await,
            ScriptCommand::Complete(step) => player.mark_step_complete(&step),
            ScriptCommand::Play => player.play(),
            ScriptCommand::Pause => player.pause(),
            ScriptCommand::Time(position) => player.on_time_update(position),
            ScriptCommand::Seek(position) => player.request_seek(position),
            ScriptCommand::Duration(duration) => player.on_duration(duration),
            ScriptCommand::Answer(answer) => player.submit_answer(answer),
            ScriptCommand::Quality(variant) => player.select_variant(variant),
            ScriptCommand::Switched => player.on_variant_switched(),
            ScriptCommand::Ended => player.on_ended(),
            ScriptCommand::Error(reason) => player.on_element_error(&reason),
            ScriptCommand::Tick(seconds) => {
                for _ in 0..seconds {
                    self.tick()?;
                }
            }
        }
        self.flush()
    }

    fn tick(&mut self) -> Result<()> {
        if let Some((generation, left)) = self.resume.take() {
            let left = left.saturating_sub(TICK);
            if left.is_zero() {
                self.player.resume_after_quiz(generation);
            } else {
                self.resume = Some((generation, left));
            }
        }
        let generation = self.player.generation();
        self.player.tick(generation, TICK);
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        let generation = self.player.generation();
        for event in self.player.drain_events() {
            match &event {
                PlayerEvent::StepActivated { .. } => self.resume = None,
                PlayerEvent::QuizResolved {
                    resume_in: Some(delay),
                    ..
                } => self.resume = Some((generation, *delay)),
                _ => {}
            }
            println!("{}", serde_json::to_string(&event)?);
            self.emitted += 1;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.player.shutdown();
        self.flush()?;
        info!(
            events = self.emitted,
            completed = self.player.completions().len(),
            "Simulation finished"
        );
        Ok(())
    }
}
