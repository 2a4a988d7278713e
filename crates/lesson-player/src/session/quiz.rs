//! Timed quiz interruptions.
//!
//! `Idle -> AwaitingAnswer` when playback reaches an unconsumed trigger,
//! `AwaitingAnswer -> Resolved` on an accepted answer or when the countdown
//! runs out, `Resolved -> Idle` when playback resumes. A trigger is consumed
//! the moment it resolves and never fires again in the same session.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::config::{IncorrectAnswerPolicy, PlayerConfig};
use crate::error::{PlayerError, Result};
use crate::model::QuizTrigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizOutcome {
    Correct,
    Incorrect,
    /// The countdown ran out; counts as no answer.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuizState {
    Idle,
    AwaitingAnswer { quiz: usize, remaining: Duration },
    Resolved { quiz: usize, outcome: QuizOutcome },
}

/// Result of a submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerVerdict {
    Resolved(QuizOutcome),
    /// Wrong, but the quiz stays open.
    TryAgain,
}

#[derive(Debug, Clone)]
struct QuizSlot {
    trigger: QuizTrigger,
    consumed: bool,
}

#[derive(Debug, Clone)]
pub struct QuizScheduler {
    slots: Vec<QuizSlot>,
    state: QuizState,
    tolerance: f64,
    default_budget: Duration,
    on_incorrect: IncorrectAnswerPolicy,
}

impl QuizScheduler {
    pub fn new(triggers: &[QuizTrigger], config: &PlayerConfig) -> Self {
        Self {
            slots: triggers
                .iter()
                .cloned()
                .map(|trigger| QuizSlot {
                    trigger,
                    consumed: false,
                })
                .collect(),
            state: QuizState::Idle,
            tolerance: config.quiz_trigger_tolerance_secs,
            default_budget: config.default_quiz_budget,
            on_incorrect: config.incorrect_answer_policy,
        }
    }

    pub fn state(&self) -> QuizState {
        self.state
    }

    /// A quiz owns the controls, either open or in its post-resolution hold.
    pub fn is_interrupting(&self) -> bool {
        !matches!(self.state, QuizState::Idle)
    }

    pub fn is_consumed(&self, quiz: usize) -> bool {
        self.slots.get(quiz).is_some_and(|s| s.consumed)
    }

    pub fn trigger(&self, quiz: usize) -> Option<&QuizTrigger> {
        self.slots.get(quiz).map(|s| &s.trigger)
    }

    pub fn budget_of(&self, quiz: usize) -> Duration {
        self.trigger(quiz)
            .and_then(|t| t.response_budget)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .filter(|d| !d.is_zero())
            .unwrap_or(self.default_budget)
    }

    /// Open the first unconsumed trigger within tolerance of `position`.
    pub fn check(&mut self, position: f64) -> Option<usize> {
        if self.is_interrupting() {
            return None;
        }
        let quiz = self
            .slots
            .iter()
            .position(|s| !s.consumed && (position - s.trigger.timestamp).abs() < self.tolerance)?;
        let remaining = self.budget_of(quiz);
        debug!(quiz, position, budget_secs = remaining.as_secs_f64(), "Quiz triggered");
        self.state = QuizState::AwaitingAnswer { quiz, remaining };
        Some(quiz)
    }

    /// Advance the countdown. Returns `TimedOut` when it reaches zero.
    pub fn tick(&mut self, elapsed: Duration) -> Option<QuizOutcome> {
        let QuizState::AwaitingAnswer { quiz, remaining } = self.state else {
            return None;
        };
        let remaining = remaining.saturating_sub(elapsed);
        if remaining.is_zero() {
            self.resolve(quiz, QuizOutcome::TimedOut);
            return Some(QuizOutcome::TimedOut);
        }
        self.state = QuizState::AwaitingAnswer { quiz, remaining };
        None
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self.state {
            QuizState::AwaitingAnswer { remaining, .. } => Some(remaining),
            _ => None,
        }
    }

    pub fn submit(&mut self, answer: usize) -> Result<AnswerVerdict> {
        let QuizState::AwaitingAnswer { quiz, .. } = self.state else {
            return Err(PlayerError::NoActiveQuiz);
        };
        let trigger = &self.slots[quiz].trigger;
        if answer >= trigger.options.len() {
            return Err(PlayerError::InvalidAnswer {
                index: answer,
                options: trigger.options.len(),
            });
        }

        if answer == trigger.correct_index {
            self.resolve(quiz, QuizOutcome::Correct);
            return Ok(AnswerVerdict::Resolved(QuizOutcome::Correct));
        }
        match self.on_incorrect {
            IncorrectAnswerPolicy::RetryUntilTimeout => Ok(AnswerVerdict::TryAgain),
            IncorrectAnswerPolicy::CloseAndContinue => {
                self.resolve(quiz, QuizOutcome::Incorrect);
                Ok(AnswerVerdict::Resolved(QuizOutcome::Incorrect))
            }
        }
    }

    /// Leave the post-resolution hold.
    pub fn finish(&mut self) -> Option<QuizOutcome> {
        let QuizState::Resolved { outcome, .. } = self.state else {
            return None;
        };
        self.state = QuizState::Idle;
        Some(outcome)
    }

    fn resolve(&mut self, quiz: usize, outcome: QuizOutcome) {
        self.slots[quiz].consumed = true;
        self.state = QuizState::Resolved { quiz, outcome };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(timestamp: f64, budget: Option<f64>) -> QuizTrigger {
        QuizTrigger {
            timestamp,
            prompt: "What needs to be checked daily?".to_string(),
            options: vec!["Oil Level".to_string(), "Radio".to_string()],
            correct_index: 0,
            response_budget: budget,
        }
    }

    fn scheduler(policy: IncorrectAnswerPolicy) -> QuizScheduler {
        let config = PlayerConfig {
            incorrect_answer_policy: policy,
            ..PlayerConfig::default()
        };
        QuizScheduler::new(&[trigger(10.0, None), trigger(30.0, Some(5.0))], &config)
    }

    #[test]
    fn triggers_within_tolerance_only() {
        let mut quiz = scheduler(IncorrectAnswerPolicy::default());
        assert_eq!(quiz.check(9.0), None);
        assert_eq!(quiz.check(9.3), Some(0));
        assert!(quiz.is_interrupting());
        assert_eq!(quiz.remaining(), Some(Duration::from_secs(15)));
        // Already open, nothing else triggers.
        assert_eq!(quiz.check(30.0), None);
    }

    #[test]
    fn correct_answer_consumes_and_holds_until_finish() {
        let mut quiz = scheduler(IncorrectAnswerPolicy::default());
        quiz.check(10.2);
        assert_eq!(
            quiz.submit(0).unwrap(),
            AnswerVerdict::Resolved(QuizOutcome::Correct)
        );
        assert!(quiz.is_consumed(0));
        assert!(quiz.is_interrupting());
        assert_eq!(quiz.finish(), Some(QuizOutcome::Correct));
        assert!(!quiz.is_interrupting());
        assert_eq!(quiz.check(10.0), None);
    }

    #[test]
    fn wrong_answer_retries_until_timeout() {
        let mut quiz = scheduler(IncorrectAnswerPolicy::RetryUntilTimeout);
        quiz.check(30.0);
        assert_eq!(quiz.submit(1).unwrap(), AnswerVerdict::TryAgain);
        assert!(!quiz.is_consumed(1));
        for _ in 0..4 {
            assert_eq!(quiz.tick(Duration::from_secs(1)), None);
        }
        assert_eq!(quiz.tick(Duration::from_secs(1)), Some(QuizOutcome::TimedOut));
        assert!(quiz.is_consumed(1));
        assert!(matches!(quiz.submit(0), Err(PlayerError::NoActiveQuiz)));
    }

    #[test]
    fn wrong_answer_can_close_the_quiz() {
        let mut quiz = scheduler(IncorrectAnswerPolicy::CloseAndContinue);
        quiz.check(30.0);
        assert_eq!(
            quiz.submit(1).unwrap(),
            AnswerVerdict::Resolved(QuizOutcome::Incorrect)
        );
        assert!(quiz.is_consumed(1));
    }

    #[test]
    fn out_of_range_answers_are_rejected() {
        let mut quiz = scheduler(IncorrectAnswerPolicy::default());
        quiz.check(10.0);
        assert!(matches!(
            quiz.submit(2),
            Err(PlayerError::InvalidAnswer { index: 2, options: 2 })
        ));
        assert!(matches!(quiz.state(), QuizState::AwaitingAnswer { quiz: 0, .. }));
    }

    #[test]
    fn ticks_outside_a_quiz_do_nothing() {
        let mut quiz = scheduler(IncorrectAnswerPolicy::default());
        assert_eq!(quiz.tick(Duration::from_secs(60)), None);
        assert_eq!(quiz.state(), QuizState::Idle);
    }
}
