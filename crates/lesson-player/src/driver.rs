//! Runs a [`LessonPlayer`] on a tokio task.
//!
//! Inputs arrive on a channel, events leave on another. The driver owns every
//! timer: the quiz countdown, the post-quiz resume hold and the progress
//! heartbeat. Timers carry the generation they were armed in, so a step
//! change silently invalidates them.

use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::{PlayerError, Result};
use crate::events::PlayerEvent;
use crate::model::StepId;
use crate::player::{LessonPlayer, PendingActivation};
use crate::quality::VariantId;
use crate::session::Generation;

/// Quiz countdown resolution.
const QUIZ_TICK: Duration = Duration::from_secs(1);

const INPUT_BUFFER: usize = 64;

/// Learner actions and media element notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerInput {
    SelectStep(StepId),
    MarkComplete(StepId),
    Play,
    Pause,
    Seek(f64),
    Answer(usize),
    SelectVariant(VariantId),
    TimeUpdate(f64),
    DurationChanged(f64),
    VariantSwitched,
    Ended,
    ElementError(String),
}

/// Sending side of a running driver.
#[derive(Clone)]
pub struct PlayerHandle {
    inputs: mpsc::Sender<PlayerInput>,
}

impl PlayerHandle {
    pub async fn send(&self, input: PlayerInput) -> Result<()> {
        self.inputs
            .send(input)
            .await
            .map_err(|_| PlayerError::Cancelled)
    }

    pub fn is_closed(&self) -> bool {
        self.inputs.is_closed()
    }
}

pub struct PlayerDriver {
    player: LessonPlayer,
    inputs: mpsc::Receiver<PlayerInput>,
    events: mpsc::UnboundedSender<PlayerEvent>,
    heartbeat_interval: Duration,
    token: CancellationToken,
}

type Countdown = Option<(Generation, Interval)>;
type ResumeHold = Option<(Generation, Pin<Box<Sleep>>)>;

impl PlayerDriver {
    pub fn new(
        player: LessonPlayer,
        heartbeat_interval: Duration,
        token: CancellationToken,
    ) -> (Self, PlayerHandle, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let driver = Self {
            player,
            inputs: input_rx,
            events: event_tx,
            heartbeat_interval,
            token,
        };
        (driver, PlayerHandle { inputs: input_tx }, event_rx)
    }

    pub fn spawn(self) -> JoinHandle<LessonPlayer> {
        tokio::spawn(self.run())
    }

    /// Process inputs until the token is cancelled or every handle is
    /// dropped. Returns the player after a final save, with no step active.
    pub async fn run(self) -> LessonPlayer {
        let Self {
            mut player,
            mut inputs,
            events,
            heartbeat_interval,
            token,
        } = self;

        let mut activations = FuturesUnordered::new();
        let mut countdown: Countdown = None;
        let mut resume: ResumeHold = None;
        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + heartbeat_interval,
            heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Player driver started");
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                input = inputs.recv() => {
                    let Some(input) = input else { break };
                    trace!(?input, "Player input");
                    if let Some(pending) = dispatch(&mut player, input) {
                        activations.push(player.activation_task(pending));
                    }
                }
                Some((generation, result)) = activations.next(), if !activations.is_empty() => {
                    player.finish_activation(generation, result);
                }
                generation = next_tick(&mut countdown) => {
                    player.tick(generation, QUIZ_TICK);
                }
                generation = resume_elapsed(&mut resume) => {
                    player.resume_after_quiz(generation);
                }
                _ = heartbeat.tick() => player.heartbeat(),
            }
            forward(&mut player, &events, &mut countdown, &mut resume, &mut heartbeat);
        }

        player.shutdown();
        forward(&mut player, &events, &mut countdown, &mut resume, &mut heartbeat);
        info!("Player driver stopped");
        player
    }
}

fn dispatch(player: &mut LessonPlayer, input: PlayerInput) -> Option<PendingActivation> {
    match input {
        PlayerInput::SelectStep(step_id) => return player.begin_activation(&step_id),
        PlayerInput::MarkComplete(step_id) => player.mark_step_complete(&step_id),
        PlayerInput::Play => player.play(),
        PlayerInput::Pause => player.pause(),
        PlayerInput::Seek(position) => player.request_seek(position),
        PlayerInput::Answer(answer) => player.submit_answer(answer),
        PlayerInput::SelectVariant(variant) => player.select_variant(variant),
        PlayerInput::TimeUpdate(position) => player.on_time_update(position),
        PlayerInput::DurationChanged(duration) => player.on_duration(duration),
        PlayerInput::VariantSwitched => player.on_variant_switched(),
        PlayerInput::Ended => player.on_ended(),
        PlayerInput::ElementError(reason) => player.on_element_error(&reason),
    }
    None
}

/// Send drained events out and arm or disarm timers they imply.
fn forward(
    player: &mut LessonPlayer,
    events: &mpsc::UnboundedSender<PlayerEvent>,
    countdown: &mut Countdown,
    resume: &mut ResumeHold,
    heartbeat: &mut Interval,
) {
    let generation = player.generation();
    for event in player.drain_events() {
        match &event {
            PlayerEvent::StepActivated { .. } => {
                *countdown = None;
                *resume = None;
                heartbeat.reset();
            }
            PlayerEvent::QuizOpened { .. } => {
                let mut interval = tokio::time::interval_at(Instant::now() + QUIZ_TICK, QUIZ_TICK);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *countdown = Some((generation, interval));
            }
            PlayerEvent::QuizResolved { resume_in, .. } => {
                *countdown = None;
                if let Some(delay) = resume_in {
                    *resume = Some((generation, Box::pin(tokio::time::sleep(*delay))));
                }
            }
            PlayerEvent::PlaybackFailed { .. } => {
                *countdown = None;
                *resume = None;
            }
            _ => {}
        }
        if events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

async fn next_tick(countdown: &mut Countdown) -> Generation {
    match countdown {
        Some((generation, interval)) => {
            interval.tick().await;
            *generation
        }
        None => std::future::pending().await,
    }
}

async fn resume_elapsed(resume: &mut ResumeHold) -> Generation {
    match resume {
        Some((generation, sleep)) => {
            let generation = *generation;
            sleep.as_mut().await;
            *resume = None;
            generation
        }
        None => std::future::pending().await,
    }
}
