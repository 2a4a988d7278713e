//! The player controller: one dispatch method per external event class.
//!
//! Dispatch methods never return errors. Rejections and failures are turned
//! into [`PlayerEvent`]s that the caller drains with
//! [`LessonPlayer::drain_events`].

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{GlobalSettings, PlayerConfig};
use crate::content::{ContentSource, settings_or_default};
use crate::element::MediaElement;
use crate::error::{PlayerError, Result};
use crate::events::PlayerEvent;
use crate::manifest::{ManifestLoader, PlayableSource};
use crate::model::{CompletionSet, ProgressRecord, Step, StepId, StepKind, VideoStep, flatten_steps};
use crate::persistence::ProgressBridge;
use crate::quality::VariantId;
use crate::sequence::{SequenceGate, StepStatus};
use crate::session::{Effects, Generation, PlayerSession, Surface};

/// Async half of a video step activation.
#[derive(Debug, Clone)]
pub struct PendingActivation {
    pub generation: Generation,
    pub step_id: StepId,
    pub video: VideoStep,
    /// Cancelled when the step is left before loading finishes.
    pub token: CancellationToken,
}

/// What the async half produced.
#[derive(Debug)]
pub struct ActivationResult {
    pub source: Result<PlayableSource>,
    pub record: Option<ProgressRecord>,
}

enum ActiveStep {
    /// Overview, assessment and evaluation steps.
    Static(StepId),
    Loading(StepId, CancellationToken),
    Video(Box<PlayerSession>),
    Failed(StepId),
}

impl ActiveStep {
    fn step_id(&self) -> &StepId {
        match self {
            Self::Static(id) | Self::Loading(id, _) | Self::Failed(id) => id,
            Self::Video(session) => session.step_id(),
        }
    }
}

pub struct LessonPlayer {
    config: PlayerConfig,
    gate: SequenceGate,
    settings: GlobalSettings,
    completions: CompletionSet,
    loader: ManifestLoader,
    bridge: ProgressBridge,
    element: Box<dyn MediaElement>,
    generation: Generation,
    active: Option<ActiveStep>,
    events: Vec<PlayerEvent>,
}

impl LessonPlayer {
    pub fn new(
        steps: Vec<Step>,
        settings: GlobalSettings,
        loader: ManifestLoader,
        bridge: ProgressBridge,
        element: Box<dyn MediaElement>,
        config: PlayerConfig,
    ) -> Self {
        let completions = bridge.completed_steps();
        info!(
            steps = steps.len(),
            completed = completions.len(),
            prevent_seeking = settings.prevent_seeking,
            "Lesson player ready"
        );
        Self {
            config,
            gate: SequenceGate::new(steps),
            settings,
            completions,
            loader,
            bridge,
            element,
            generation: Generation::default(),
            active: None,
            events: Vec::new(),
        }
    }

    /// Fetch lessons and settings, then build the player.
    pub async fn bootstrap(
        content: &dyn ContentSource,
        loader: ManifestLoader,
        bridge: ProgressBridge,
        element: Box<dyn MediaElement>,
        config: PlayerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let lessons = content.fetch_lessons().await?;
        let settings = settings_or_default(content).await;
        Ok(Self::new(
            flatten_steps(&lessons),
            settings,
            loader,
            bridge,
            element,
            config,
        ))
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn settings(&self) -> GlobalSettings {
        self.settings
    }

    pub fn completions(&self) -> &CompletionSet {
        &self.completions
    }

    pub fn steps(&self) -> &[Step] {
        self.gate.steps()
    }

    pub fn statuses(&self) -> Vec<StepStatus> {
        self.gate.statuses(&self.completions)
    }

    pub fn active_step(&self) -> Option<&StepId> {
        self.active.as_ref().map(ActiveStep::step_id)
    }

    pub fn next_step(&self) -> Option<&Step> {
        self.gate.next_step(self.active_step()?)
    }

    pub fn session(&self) -> Option<&PlayerSession> {
        match &self.active {
            Some(ActiveStep::Video(session)) => Some(&**session),
            _ => None,
        }
    }

    pub fn drain_events(&mut self) -> Vec<PlayerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Synchronous half of a step selection: gate check, teardown of the
    /// previous step, generation bump.
    ///
    /// Returns the work still to be done for video steps.
    pub fn begin_activation(&mut self, step_id: &StepId) -> Option<PendingActivation> {
        let step = match self.gate.check(step_id, &self.completions) {
            Ok(step) => step.clone(),
            Err(e) => {
                self.reject("select step", e);
                return None;
            }
        };

        self.deactivate();
        self.generation = self.generation.next();
        info!(step = %step.id, kind = step.kind_name(), generation = %self.generation, "Step activated");
        self.events.push(PlayerEvent::StepActivated {
            step_id: step.id.clone(),
            kind: step.kind_name(),
        });

        match step.kind {
            StepKind::Video(video) => {
                let token = CancellationToken::new();
                self.active = Some(ActiveStep::Loading(step.id.clone(), token.clone()));
                Some(PendingActivation {
                    generation: self.generation,
                    step_id: step.id,
                    video,
                    token,
                })
            }
            _ => {
                self.active = Some(ActiveStep::Static(step.id));
                None
            }
        }
    }

    /// Resolve the source and load progress. The future owns everything it
    /// needs so it can run on any task.
    pub fn activation_task(
        &self,
        pending: PendingActivation,
    ) -> impl Future<Output = (Generation, ActivationResult)> + Send + 'static {
        let loader = self.loader.clone();
        let bridge = self.bridge.clone();
        async move {
            let (source, record) = tokio::join!(
                loader.resolve_until(&pending.video.src, &pending.video.policy, &pending.token),
                bridge.load(&pending.step_id)
            );
            (pending.generation, ActivationResult { source, record })
        }
    }

    /// Install the resolved source. Results of a superseded activation are
    /// torn down and dropped.
    pub fn finish_activation(&mut self, generation: Generation, result: ActivationResult) {
        if generation != self.generation {
            debug!(%generation, current = %self.generation, "Discarding stale activation");
            if let Ok(source) = &result.source {
                source.teardown();
            }
            return;
        }
        let step_id = match &self.active {
            Some(ActiveStep::Loading(step_id, _)) => step_id.clone(),
            _ => return,
        };
        let Some(video) = self.gate.find(&step_id).and_then(Step::video).cloned() else {
            return;
        };

        let source = match result.source {
            Ok(source) => source,
            Err(e) => {
                warn!(step = %step_id, error = %e, "Source unavailable");
                self.events.push(PlayerEvent::PlaybackFailed {
                    step_id: step_id.clone(),
                    reason: e.to_string(),
                });
                self.active = Some(ActiveStep::Failed(step_id));
                return;
            }
        };

        if result.record.as_ref().is_some_and(|r| r.completed) {
            self.completions.insert(step_id.clone());
        }
        let mut session = PlayerSession::new(
            generation,
            step_id.clone(),
            &video,
            source,
            result.record.as_ref(),
            self.completions.contains(&step_id),
            self.settings,
            &self.config,
        );
        session.start(&mut Surface {
            element: self.element.as_mut(),
            events: &mut self.events,
        });
        self.active = Some(ActiveStep::Video(Box::new(session)));
    }

    /// Both halves of a selection in one call.
    pub async fn activate(&mut self, step_id: &StepId) {
        if let Some(pending) = self.begin_activation(step_id) {
            let (generation, result) = self.activation_task(pending).await;
            self.finish_activation(generation, result);
        }
    }

    pub fn on_time_update(&mut self, position: f64) {
        if let Some(effects) = self.with_session(|session, s| session.on_time_update(position, s)) {
            self.apply(effects);
        }
    }

    pub fn request_seek(&mut self, position: f64) {
        match self.with_session(|session, s| session.request_seek(position, s)) {
            Some(Ok(effects)) => self.apply(effects),
            Some(Err(e)) => self.reject("seek", e),
            None => self.reject("seek", PlayerError::NoActiveSession),
        }
    }

    pub fn submit_answer(&mut self, answer: usize) {
        match self.with_session(|session, s| session.answer(answer, s)) {
            Some(Ok(())) => {}
            Some(Err(e)) => self.reject("answer quiz", e),
            None => self.reject("answer quiz", PlayerError::NoActiveQuiz),
        }
    }

    pub fn select_variant(&mut self, variant: VariantId) {
        match self.with_session(|session, s| session.select_variant(variant, s)) {
            Some(Ok(())) => {}
            Some(Err(e)) => self.reject("change quality", e),
            None => self.reject("change quality", PlayerError::NoActiveSession),
        }
    }

    pub fn play(&mut self) {
        match self.with_session(|session, s| session.play(s)) {
            Some(Ok(())) => {}
            Some(Err(e)) => self.reject("play", e),
            None => self.reject("play", PlayerError::NoActiveSession),
        }
    }

    pub fn pause(&mut self) {
        match self.with_session(|session, s| session.pause(s)) {
            Some(Ok(effects)) => self.apply(effects),
            Some(Err(e)) => self.reject("pause", e),
            None => self.reject("pause", PlayerError::NoActiveSession),
        }
    }

    pub fn on_duration(&mut self, duration: f64) {
        self.with_session(|session, _| session.on_duration(duration));
    }

    pub fn on_variant_switched(&mut self) {
        self.with_session(|session, s| session.on_variant_switched(s));
    }

    pub fn on_ended(&mut self) {
        if let Some(effects) = self.with_session(|session, s| session.on_ended(s)) {
            self.apply(effects);
        }
    }

    pub fn on_element_error(&mut self, reason: &str) {
        self.with_session(|session, s| session.on_error(reason, s));
    }

    /// Quiz countdown tick armed in `generation`.
    pub fn tick(&mut self, generation: Generation, elapsed: Duration) {
        if !self.is_current(generation) {
            debug!(%generation, "Dropping stale quiz tick");
            return;
        }
        self.with_session(|session, s| session.tick(elapsed, s));
    }

    /// End of the post-quiz hold armed in `generation`.
    pub fn resume_after_quiz(&mut self, generation: Generation) {
        if !self.is_current(generation) {
            debug!(%generation, "Dropping stale quiz resume");
            return;
        }
        self.with_session(|session, s| session.resume_after_quiz(s));
    }

    /// Coarse periodic save while playing.
    pub fn heartbeat(&mut self) {
        if self.session().is_some_and(PlayerSession::heartbeat_due) {
            self.persist();
        }
    }

    /// Record completion of a step the player does not play itself. Locked
    /// steps cannot be completed.
    pub fn mark_step_complete(&mut self, step_id: &StepId) {
        if let Err(e) = self.gate.check(step_id, &self.completions) {
            self.reject("complete step", e);
            return;
        }
        if !self.completions.insert(step_id.clone()) {
            return;
        }
        let previous = self.bridge.local().get(step_id);
        let (position, max_watched) = previous.map_or((0.0, 0.0), |r| (r.position, r.max_watched));
        let record = ProgressRecord::new(step_id.clone(), position, max_watched, true);
        if let Err(e) = self.bridge.save(record) {
            warn!(step = %step_id, error = %e, "Failed to persist completion");
        }
        info!(step = %step_id, "Step marked complete");
        self.events.push(PlayerEvent::StepCompleted {
            step_id: step_id.clone(),
        });
    }

    /// Save and release the active step, of any kind. `active_step` is
    /// `None` afterwards.
    pub fn shutdown(&mut self) {
        self.deactivate();
    }

    fn is_current(&self, generation: Generation) -> bool {
        generation == self.generation
            && self
                .session()
                .is_some_and(|session| session.generation() == generation)
    }

    fn with_session<T>(
        &mut self,
        f: impl FnOnce(&mut PlayerSession, &mut Surface<'_>) -> T,
    ) -> Option<T> {
        let Some(ActiveStep::Video(session)) = self.active.as_mut() else {
            return None;
        };
        let mut surface = Surface {
            element: self.element.as_mut(),
            events: &mut self.events,
        };
        Some(f(session.as_mut(), &mut surface))
    }

    fn apply(&mut self, effects: Effects) {
        if effects.completed
            && let Some(step_id) = self.session().map(|s| s.step_id().clone())
        {
            self.completions.insert(step_id);
        }
        if effects.completed || effects.persist {
            self.persist();
        } else {
            self.touch();
        }
    }

    /// Keep the local record current between full saves.
    fn touch(&mut self) {
        let Some(session) = self.session() else {
            return;
        };
        if session.is_failed() {
            return;
        }
        let record = session.snapshot();
        if let Err(e) = self.bridge.touch(record) {
            warn!(step = %session.step_id(), error = %e, "Local progress update failed");
        }
    }

    fn persist(&mut self) {
        let Some(ActiveStep::Video(session)) = self.active.as_mut() else {
            return;
        };
        if session.is_failed() {
            return;
        }
        let record = session.snapshot();
        match self.bridge.save(record) {
            Ok(stored) => {
                session.mark_saved(stored.position);
                debug!(step = %stored.step_id, position = stored.position, completed = stored.completed, "Progress saved");
                self.events.push(PlayerEvent::ProgressSaved {
                    step_id: stored.step_id,
                    position: stored.position,
                    completed: stored.completed,
                });
            }
            Err(e) => warn!(step = %session.step_id(), error = %e, "Progress write failed"),
        }
    }

    fn deactivate(&mut self) {
        self.persist();
        match self.active.take() {
            Some(ActiveStep::Video(mut session)) => session.teardown(self.element.as_mut()),
            Some(ActiveStep::Loading(step_id, token)) => {
                debug!(step = %step_id, "Cancelling pending source load");
                token.cancel();
            }
            _ => {}
        }
    }

    fn reject(&mut self, action: &'static str, error: PlayerError) {
        debug!(action, error = %error, "Action rejected");
        let event = match error {
            PlayerError::SeekRejected {
                requested,
                position,
                reason,
            } => PlayerEvent::SeekBlocked {
                requested,
                position,
                reason,
            },
            PlayerError::PrerequisiteNotMet { step_id, required } => {
                PlayerEvent::PrerequisiteNotMet {
                    requested: step_id,
                    required,
                }
            }
            other => PlayerEvent::ActionRejected {
                action,
                message: other.to_string(),
            },
        };
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementCommand, RecordingElement};
    use crate::error::SeekRejection;
    use crate::model::{PlaybackPolicy, QuizTrigger};
    use crate::persistence::LocalProgressCache;

    fn video(id: &str, src: &str, policy: PlaybackPolicy) -> Step {
        Step {
            id: StepId::from(id),
            title: id.to_string(),
            kind: StepKind::Video(VideoStep {
                src: src.to_string(),
                duration: Some(100.0),
                policy,
            }),
        }
    }

    fn overview(id: &str) -> Step {
        Step {
            id: StepId::from(id),
            title: id.to_string(),
            kind: StepKind::Overview { content: None },
        }
    }

    fn steps() -> Vec<Step> {
        let locked = PlaybackPolicy {
            seek_locked: true,
            quizzes: vec![QuizTrigger {
                timestamp: 30.0,
                prompt: "Pop Quiz".to_string(),
                options: vec!["Oil Level".to_string(), "Radio".to_string()],
                correct_index: 0,
                response_budget: None,
            }],
            ..PlaybackPolicy::default()
        };
        vec![
            overview("intro"),
            video("lesson", "https://cdn.example/lesson.mp4", locked),
            video("wrapup", "https://cdn.example/wrapup.mp4", PlaybackPolicy::default()),
        ]
    }

    fn player(cache: LocalProgressCache, element: &RecordingElement) -> LessonPlayer {
        let config = PlayerConfig::default();
        LessonPlayer::new(
            steps(),
            GlobalSettings::default(),
            ManifestLoader::http(reqwest::Client::new(), &config),
            ProgressBridge::local_only(cache),
            Box::new(element.clone()),
            config,
        )
    }

    #[tokio::test]
    async fn gate_blocks_until_previous_step_completes() {
        let element = RecordingElement::new();
        let mut player = player(LocalProgressCache::in_memory(), &element);

        player.activate(&StepId::from("lesson")).await;
        assert_eq!(
            player.drain_events(),
            [PlayerEvent::PrerequisiteNotMet {
                requested: StepId::from("lesson"),
                required: StepId::from("intro"),
            }]
        );
        assert!(player.active_step().is_none());

        player.activate(&StepId::from("intro")).await;
        player.mark_step_complete(&StepId::from("intro"));
        player.activate(&StepId::from("lesson")).await;
        assert_eq!(player.active_step(), Some(&StepId::from("lesson")));
        assert!(player.session().is_some());
        assert_eq!(
            player.next_step().map(|s| s.id.as_str()),
            Some("wrapup")
        );
    }

    #[tokio::test]
    async fn completion_persists_and_unlocks_next_step() {
        let cache = LocalProgressCache::in_memory();
        let element = RecordingElement::new();
        let mut player = player(cache.clone(), &element);
        player.mark_step_complete(&StepId::from("intro"));
        player.activate(&StepId::from("lesson")).await;
        player.drain_events();

        player.request_seek(50.0);
        assert!(player.drain_events().contains(&PlayerEvent::SeekBlocked {
            requested: 50.0,
            position: 0.0,
            reason: SeekRejection::BeyondWatched,
        }));

        for t in [10.0, 20.0, 25.0, 40.0, 60.0, 80.0, 89.0] {
            player.on_time_update(t);
        }
        assert!(!player.completions().contains(&StepId::from("lesson")));
        player.on_time_update(91.0);

        let events = player.drain_events();
        assert!(events.contains(&PlayerEvent::StepCompleted {
            step_id: StepId::from("lesson")
        }));
        assert!(player.completions().contains(&StepId::from("lesson")));
        let saved = cache.get(&StepId::from("lesson")).unwrap();
        assert!(saved.completed);
        assert_eq!(saved.max_watched, 91.0);

        player.activate(&StepId::from("wrapup")).await;
        assert_eq!(player.active_step(), Some(&StepId::from("wrapup")));
    }

    #[tokio::test]
    async fn quiz_blocks_controls_through_the_player() {
        let element = RecordingElement::new();
        let mut player = player(LocalProgressCache::in_memory(), &element);
        player.mark_step_complete(&StepId::from("intro"));
        player.activate(&StepId::from("lesson")).await;
        player.play();
        player.on_time_update(29.5);
        player.drain_events();

        player.play();
        player.select_variant(VariantId::Level(0));
        let events = player.drain_events();
        assert!(matches!(
            events.as_slice(),
            [
                PlayerEvent::ActionRejected { action: "play", .. },
                PlayerEvent::ActionRejected { action: "change quality", .. },
            ]
        ));

        let generation = player.generation();
        for _ in 0..15 {
            player.tick(generation, Duration::from_secs(1));
        }
        let events = player.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            PlayerEvent::QuizResolved {
                outcome: crate::session::QuizOutcome::TimedOut,
                ..
            }
        )));
        player.resume_after_quiz(generation);
        assert_eq!(player.drain_events(), [PlayerEvent::PlaybackResumed]);
        assert_eq!(element.commands().last(), Some(&ElementCommand::Play));
    }

    #[tokio::test]
    async fn stale_activation_is_discarded() {
        let element = RecordingElement::new();
        let cache = LocalProgressCache::in_memory();
        cache
            .store(ProgressRecord::new(StepId::from("intro"), 0.0, 0.0, true))
            .unwrap();
        cache
            .store(ProgressRecord::new(StepId::from("lesson"), 100.0, 100.0, true))
            .unwrap();
        let mut player = player(cache, &element);

        let first = player.begin_activation(&StepId::from("lesson")).unwrap();
        let second = player.begin_activation(&StepId::from("wrapup")).unwrap();
        let stale = first.generation;
        assert!(second.generation > stale);

        let (generation, result) = player.activation_task(first).await;
        let token = result.source.as_ref().unwrap().token().clone();
        player.finish_activation(generation, result);
        assert!(token.is_cancelled());
        assert!(player.session().is_none());

        let (generation, result) = player.activation_task(second).await;
        player.finish_activation(generation, result);
        assert_eq!(
            player.session().map(|s| s.step_id().as_str()),
            Some("wrapup")
        );

        // A timer armed for the first activation does nothing now.
        player.drain_events();
        player.tick(stale, Duration::from_secs(1));
        player.resume_after_quiz(stale);
        assert!(player.drain_events().is_empty());
    }

    #[tokio::test]
    async fn switching_steps_saves_and_tears_down() {
        let element = RecordingElement::new();
        let cache = LocalProgressCache::in_memory();
        let mut player = player(cache.clone(), &element);
        player.mark_step_complete(&StepId::from("intro"));
        player.activate(&StepId::from("lesson")).await;
        player.on_time_update(12.0);

        player.activate(&StepId::from("intro")).await;
        assert!(element.commands().contains(&ElementCommand::Detach));
        assert_eq!(
            cache.get(&StepId::from("lesson")).map(|r| r.position),
            Some(12.0)
        );

        player.activate(&StepId::from("lesson")).await;
        assert_eq!(player.session().map(PlayerSession::position), Some(12.0));
        assert_eq!(element.last_seek(), Some(12.0));
    }

    #[tokio::test]
    async fn prevent_seeking_overrides_step_policy() {
        let element = RecordingElement::new();
        let config = PlayerConfig::default();
        let mut player = LessonPlayer::new(
            vec![video("free", "https://cdn.example/free.mp4", PlaybackPolicy::default())],
            GlobalSettings {
                prevent_seeking: true,
            },
            ManifestLoader::http(reqwest::Client::new(), &config),
            ProgressBridge::local_only(LocalProgressCache::in_memory()),
            Box::new(element.clone()),
            config,
        );
        player.activate(&StepId::from("free")).await;
        player.request_seek(40.0);
        assert!(player
            .drain_events()
            .iter()
            .any(|e| matches!(e, PlayerEvent::SeekBlocked { .. })));
    }

    #[tokio::test]
    async fn unreachable_manifest_fails_visibly() {
        let element = RecordingElement::new();
        let config = PlayerConfig::default();
        let mut player = LessonPlayer::new(
            vec![video("hls", "not a url.m3u8", PlaybackPolicy::default())],
            GlobalSettings::default(),
            ManifestLoader::http(reqwest::Client::new(), &config),
            ProgressBridge::local_only(LocalProgressCache::in_memory()),
            Box::new(element.clone()),
            config,
        );
        player.activate(&StepId::from("hls")).await;
        let events = player.drain_events();
        assert!(matches!(
            events.last(),
            Some(PlayerEvent::PlaybackFailed { .. })
        ));
        player.play();
        assert!(matches!(
            player.drain_events().as_slice(),
            [PlayerEvent::ActionRejected { action: "play", .. }]
        ));
    }

    #[tokio::test]
    async fn time_updates_keep_the_local_record_current() {
        let cache = LocalProgressCache::in_memory();
        let element = RecordingElement::new();
        let mut player = player(cache.clone(), &element);
        player.mark_step_complete(&StepId::from("intro"));
        player.activate(&StepId::from("lesson")).await;
        player.play();
        player.drain_events();

        for t in [1.0, 2.0, 5.0, 8.0] {
            player.on_time_update(t);
        }
        let record = cache.get(&StepId::from("lesson")).unwrap();
        assert_eq!(record.position, 8.0);
        assert_eq!(record.max_watched, 8.0);
        assert!(!record.completed);
        // Live updates stay local: no full save was reported.
        assert!(!player
            .drain_events()
            .iter()
            .any(|e| matches!(e, PlayerEvent::ProgressSaved { .. })));
    }

    #[tokio::test]
    async fn locked_steps_cannot_be_marked_complete() {
        let cache = LocalProgressCache::in_memory();
        let element = RecordingElement::new();
        let mut player = player(cache.clone(), &element);

        player.mark_step_complete(&StepId::from("wrapup"));
        assert_eq!(
            player.drain_events(),
            [PlayerEvent::PrerequisiteNotMet {
                requested: StepId::from("wrapup"),
                required: StepId::from("lesson"),
            }]
        );
        assert!(!player.completions().contains(&StepId::from("wrapup")));
        assert!(cache.get(&StepId::from("wrapup")).is_none());

        player.mark_step_complete(&StepId::from("intro"));
        assert!(player.completions().contains(&StepId::from("intro")));
    }

    struct StalledFetcher;

    #[async_trait::async_trait]
    impl crate::manifest::ManifestFetcher for StalledFetcher {
        async fn fetch(&self, _url: &url::Url) -> Result<Vec<u8>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn leaving_a_loading_step_cancels_its_fetch() {
        let element = RecordingElement::new();
        let config = PlayerConfig::default();
        let mut player = LessonPlayer::new(
            vec![video("hls", "https://cdn.example/stalled.m3u8", PlaybackPolicy::default())],
            GlobalSettings::default(),
            ManifestLoader::new(std::sync::Arc::new(StalledFetcher), &config),
            ProgressBridge::local_only(LocalProgressCache::in_memory()),
            Box::new(element.clone()),
            config,
        );

        let pending = player.begin_activation(&StepId::from("hls")).unwrap();
        let token = pending.token.clone();
        let load = tokio::spawn(player.activation_task(pending));

        player.begin_activation(&StepId::from("hls")).unwrap();
        assert!(token.is_cancelled());
        let (generation, result) = tokio::time::timeout(Duration::from_secs(5), load)
            .await
            .expect("cancelled load finishes")
            .unwrap();
        assert!(matches!(result.source, Err(PlayerError::Cancelled)));

        player.finish_activation(generation, result);
        assert!(player.session().is_none());
        assert_eq!(player.active_step(), Some(&StepId::from("hls")));
    }
}
