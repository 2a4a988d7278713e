//! Playback state of the active video step.
//!
//! A [`PlayerSession`] lives for exactly one step activation. Every time
//! change is applied in one order: position, high-water mark, quiz triggers
//! (skipped once the step is complete), completion (skipped while a quiz is
//! pending).

mod completion;
mod governor;
mod quiz;
mod tracker;

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

pub use completion::{CompletionDetector, percent};
pub use governor::{SeekDecision, SeekGovernor, SeekMode};
pub use quiz::{AnswerVerdict, QuizOutcome, QuizScheduler, QuizState};
pub use tracker::WatchTracker;

use crate::config::{GlobalSettings, PlayerConfig};
use crate::element::MediaElement;
use crate::error::{PlayerError, Result};
use crate::events::PlayerEvent;
use crate::manifest::PlayableSource;
use crate::model::{ProgressRecord, StepId, VideoStep};
use crate::quality::{QualitySelector, QualityVariant, VariantId};

/// Step activation counter. Timer callbacks carry the generation they were
/// armed in and are dropped when it is no longer current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Follow-up work a session call asks of the player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
    /// The step crossed its completion threshold.
    pub completed: bool,
    /// Progress should be written now.
    pub persist: bool,
}

/// Where a session sends commands and reports.
pub struct Surface<'a> {
    pub element: &'a mut dyn MediaElement,
    pub events: &'a mut Vec<PlayerEvent>,
}

pub struct PlayerSession {
    generation: Generation,
    step_id: StepId,
    source: PlayableSource,
    quality_locked: bool,
    tracker: WatchTracker,
    governor: SeekGovernor,
    completion: CompletionDetector,
    quiz: QuizScheduler,
    quality: Option<QualitySelector>,
    duration: Option<f64>,
    playing: bool,
    failed: bool,
    resume_delay: Duration,
    resume_after_timeout: bool,
    last_saved: Option<f64>,
}

impl PlayerSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        generation: Generation,
        step_id: StepId,
        video: &VideoStep,
        source: PlayableSource,
        record: Option<&ProgressRecord>,
        already_completed: bool,
        settings: GlobalSettings,
        config: &PlayerConfig,
    ) -> Self {
        let policy = &video.policy;
        let completed = already_completed || record.is_some_and(|r| r.completed);
        let tracker = record
            .map(|r| WatchTracker::seeded(r.position, r.max_watched))
            .unwrap_or_default();
        let mode = SeekMode::for_policy(policy.seek_locked, settings.prevent_seeking, completed);
        let quality_locked = policy.quality_locked || source.quality_locked;
        let quality = if quality_locked {
            None
        } else {
            QualitySelector::new(&source.url, &source.variants)
        };

        Self {
            generation,
            step_id,
            quality_locked,
            tracker,
            governor: SeekGovernor::new(mode),
            completion: CompletionDetector::new(policy.threshold(), completed),
            quiz: QuizScheduler::new(&policy.quizzes, config),
            quality,
            duration: video.duration.filter(|d| d.is_finite() && *d > 0.0),
            playing: false,
            failed: false,
            resume_delay: config.quiz_resume_delay,
            resume_after_timeout: config.resume_after_timeout,
            last_saved: record.map(|r| r.position),
            source,
        }
    }

    /// Attach the source and move to the resume position.
    pub fn start(&mut self, s: &mut Surface<'_>) {
        s.element.attach(&self.source);
        let resume_at = self.tracker.position();
        if resume_at > 0.0 {
            s.element.seek(resume_at);
        }
        info!(
            step = %self.step_id,
            generation = %self.generation,
            resume_at,
            seek_mode = ?self.governor.mode(),
            "Video session started"
        );
        s.events.push(PlayerEvent::SourceReady {
            step_id: self.step_id.clone(),
            mode: self.source.mode,
            variants: self.variants().to_vec(),
            resume_at,
            seek_locked: self.governor.mode() == SeekMode::Restricted,
        });
    }

    pub fn on_time_update(&mut self, position: f64, s: &mut Surface<'_>) -> Effects {
        if self.failed {
            return Effects::default();
        }
        if self.quality.as_ref().is_some_and(QualitySelector::is_switching) {
            debug!(position, "Ignoring time update during quality switch");
            return Effects::default();
        }
        self.advance(position, s)
    }

    pub fn request_seek(&mut self, requested: f64, s: &mut Surface<'_>) -> Result<Effects> {
        self.ensure_playable()?;
        if !requested.is_finite() {
            debug!(requested, "Ignoring non-finite seek");
            return Ok(Effects::default());
        }
        let requested = requested.max(0.0);
        let decision = self.governor.evaluate(
            requested,
            self.tracker.max_watched(),
            self.quiz.is_interrupting(),
        );
        match decision {
            SeekDecision::Granted(target) => {
                s.element.seek(target);
                if let Some(quality) = self.quality.as_mut() {
                    quality.retarget(target);
                }
                Ok(self.advance(target, s))
            }
            SeekDecision::Rejected { reason, snap_to } => {
                if let Some(snap_to) = snap_to {
                    s.element.seek(snap_to);
                    self.tracker.observe(snap_to);
                }
                debug!(requested, %reason, "Seek rejected");
                Err(PlayerError::SeekRejected {
                    requested,
                    position: self.tracker.position(),
                    reason,
                })
            }
        }
    }

    pub fn play(&mut self, s: &mut Surface<'_>) -> Result<()> {
        self.ensure_controls()?;
        if !self.playing {
            s.element.play();
            self.playing = true;
        }
        if let Some(quality) = self.quality.as_mut() {
            quality.set_playing(true);
        }
        Ok(())
    }

    pub fn pause(&mut self, s: &mut Surface<'_>) -> Result<Effects> {
        self.ensure_controls()?;
        if self.playing {
            s.element.pause();
            self.playing = false;
        }
        if let Some(quality) = self.quality.as_mut() {
            quality.set_playing(false);
        }
        Ok(Effects {
            persist: true,
            ..Effects::default()
        })
    }

    /// The element reported its real duration.
    pub fn on_duration(&mut self, duration: f64) {
        if duration.is_finite() && duration > 0.0 {
            self.duration = Some(duration);
        }
    }

    /// Playback reached the end; treated as a last time update at the duration.
    pub fn on_ended(&mut self, s: &mut Surface<'_>) -> Effects {
        if self.failed {
            return Effects::default();
        }
        self.playing = false;
        let end = self.duration.unwrap_or(self.tracker.position());
        let mut effects = self.advance(end, s);
        effects.persist = true;
        effects
    }

    /// The element gave up on the source.
    pub fn on_error(&mut self, reason: &str, s: &mut Surface<'_>) {
        if self.failed {
            return;
        }
        self.failed = true;
        self.playing = false;
        self.teardown(s.element);
        s.events.push(PlayerEvent::PlaybackFailed {
            step_id: self.step_id.clone(),
            reason: reason.to_string(),
        });
    }

    pub fn select_variant(&mut self, id: VariantId, s: &mut Surface<'_>) -> Result<()> {
        self.ensure_controls()?;
        let position = self.tracker.position();
        let playing = self.playing;
        let Some(selector) = self.quality.as_mut() else {
            return Err(if self.quality_locked {
                PlayerError::QualityLocked
            } else {
                PlayerError::UnknownVariant(id.to_string())
            });
        };
        if let Some(variant) = selector.select(id, position, playing)? {
            s.element.switch_variant(variant);
        }
        Ok(())
    }

    /// The element finished loading the requested rendition.
    pub fn on_variant_switched(&mut self, s: &mut Surface<'_>) {
        let Some(done) = self.quality.as_mut().and_then(QualitySelector::complete_switch) else {
            return;
        };
        s.element.seek(done.resume_at);
        self.tracker.observe(done.resume_at);
        if done.was_playing {
            s.element.play();
            self.playing = true;
        }
        info!(variant = %done.target, position = done.resume_at, "Quality switched");
        s.events.push(PlayerEvent::QualityChanged {
            variant: done.target,
            position: done.resume_at,
        });
    }

    pub fn answer(&mut self, answer: usize, s: &mut Surface<'_>) -> Result<()> {
        let QuizState::AwaitingAnswer { quiz, .. } = self.quiz.state() else {
            return Err(PlayerError::NoActiveQuiz);
        };
        match self.quiz.submit(answer)? {
            AnswerVerdict::TryAgain => {
                debug!(quiz, answer, "Incorrect answer, quiz stays open");
                s.events.push(PlayerEvent::QuizRetry { quiz });
            }
            AnswerVerdict::Resolved(outcome) => self.quiz_resolved(quiz, outcome, s),
        }
        Ok(())
    }

    /// One countdown step of an open quiz.
    pub fn tick(&mut self, elapsed: Duration, s: &mut Surface<'_>) {
        let QuizState::AwaitingAnswer { quiz, .. } = self.quiz.state() else {
            return;
        };
        match self.quiz.tick(elapsed) {
            Some(outcome) => self.quiz_resolved(quiz, outcome, s),
            None => {
                if let Some(remaining) = self.quiz.remaining() {
                    s.events.push(PlayerEvent::QuizCountdown { remaining });
                }
            }
        }
    }

    /// End the post-quiz hold and continue playback.
    pub fn resume_after_quiz(&mut self, s: &mut Surface<'_>) -> bool {
        if self.quiz.finish().is_none() {
            return false;
        }
        s.element.play();
        self.playing = true;
        s.events.push(PlayerEvent::PlaybackResumed);
        true
    }

    /// Detach from the element and release the stream.
    pub fn teardown(&mut self, element: &mut dyn MediaElement) {
        self.source.teardown();
        element.detach();
    }

    pub fn snapshot(&self) -> ProgressRecord {
        ProgressRecord::new(
            self.step_id.clone(),
            self.tracker.position(),
            self.tracker.max_watched(),
            self.completion.is_latched(),
        )
    }

    /// A heartbeat write is due while playing with an unsaved position.
    pub fn heartbeat_due(&self) -> bool {
        self.playing && !self.failed && self.last_saved != Some(self.tracker.position())
    }

    pub fn mark_saved(&mut self, position: f64) {
        self.last_saved = Some(position);
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn step_id(&self) -> &StepId {
        &self.step_id
    }

    pub fn position(&self) -> f64 {
        self.tracker.position()
    }

    pub fn max_watched(&self) -> f64 {
        self.tracker.max_watched()
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn seek_mode(&self) -> SeekMode {
        self.governor.mode()
    }

    pub fn quiz_state(&self) -> QuizState {
        self.quiz.state()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_completed(&self) -> bool {
        self.completion.is_latched()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_quiz_consumed(&self, quiz: usize) -> bool {
        self.quiz.is_consumed(quiz)
    }

    /// Selectable variants, Auto first; empty when quality is locked.
    pub fn variants(&self) -> &[QualityVariant] {
        match &self.quality {
            Some(quality) => quality.list_variants(),
            None => &[],
        }
    }

    pub fn active_variant(&self) -> Option<VariantId> {
        self.quality.as_ref().map(QualitySelector::active)
    }

    fn advance(&mut self, position: f64, s: &mut Surface<'_>) -> Effects {
        let mut effects = Effects::default();
        if !self.tracker.observe(position) {
            return effects;
        }
        let position = self.tracker.position();

        if !self.completion.is_latched()
            && let Some(quiz) = self.quiz.check(position)
        {
            self.open_quiz(quiz, s);
        }

        if !self.quiz.is_interrupting() && self.completion.check(position, self.duration) {
            self.governor.unlock();
            info!(step = %self.step_id, position, "Step completed");
            s.events.push(PlayerEvent::StepCompleted {
                step_id: self.step_id.clone(),
            });
            effects.completed = true;
        }
        effects
    }

    fn open_quiz(&mut self, quiz: usize, s: &mut Surface<'_>) {
        s.element.pause();
        self.playing = false;
        let budget = self.quiz.budget_of(quiz);
        if let Some(trigger) = self.quiz.trigger(quiz) {
            info!(step = %self.step_id, quiz, at = trigger.timestamp, "Quiz opened");
            s.events.push(PlayerEvent::QuizOpened {
                step_id: self.step_id.clone(),
                quiz,
                prompt: trigger.prompt.clone(),
                options: trigger.options.clone(),
                budget,
            });
        }
    }

    fn quiz_resolved(&mut self, quiz: usize, outcome: QuizOutcome, s: &mut Surface<'_>) {
        let resumes = match outcome {
            QuizOutcome::Correct | QuizOutcome::Incorrect => true,
            QuizOutcome::TimedOut => self.resume_after_timeout,
        };
        let resume_in = resumes.then_some(self.resume_delay);
        info!(step = %self.step_id, quiz, ?outcome, resumes, "Quiz resolved");
        s.events.push(PlayerEvent::QuizResolved {
            quiz,
            outcome,
            resume_in,
        });
        if !resumes {
            self.quiz.finish();
        }
    }

    fn ensure_playable(&self) -> Result<()> {
        if self.failed {
            return Err(PlayerError::source_unavailable(
                self.source.url.clone(),
                "playback failed",
            ));
        }
        Ok(())
    }

    fn ensure_controls(&self) -> Result<()> {
        self.ensure_playable()?;
        if self.quiz.is_interrupting() {
            return Err(PlayerError::ControlsLocked);
        }
        Ok(())
    }
}
