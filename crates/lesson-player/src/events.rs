use std::time::Duration;

use serde::Serialize;

use crate::error::SeekRejection;
use crate::manifest::StreamMode;
use crate::model::StepId;
use crate::quality::{QualityVariant, VariantId};
use crate::session::QuizOutcome;

/// Everything the player reports back to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// A step became the active one. Video steps follow up with
    /// `SourceReady` or `PlaybackFailed` once their source resolves.
    StepActivated {
        step_id: StepId,
        kind: &'static str,
    },
    SourceReady {
        step_id: StepId,
        mode: StreamMode,
        /// Empty when quality is locked or the source has a single rendition.
        variants: Vec<QualityVariant>,
        resume_at: f64,
        seek_locked: bool,
    },
    PlaybackFailed {
        step_id: StepId,
        reason: String,
    },
    /// The selection was ignored; the previously active step stays active.
    PrerequisiteNotMet {
        requested: StepId,
        required: StepId,
    },
    SeekBlocked {
        requested: f64,
        /// Position after the rejection.
        position: f64,
        reason: SeekRejection,
    },
    /// A control action was refused. The message is meant for the learner.
    ActionRejected {
        action: &'static str,
        message: String,
    },
    QuizOpened {
        step_id: StepId,
        quiz: usize,
        prompt: String,
        options: Vec<String>,
        #[serde(with = "secs")]
        budget: Duration,
    },
    QuizCountdown {
        #[serde(with = "secs")]
        remaining: Duration,
    },
    /// A wrong answer that leaves the quiz open.
    QuizRetry {
        quiz: usize,
    },
    QuizResolved {
        quiz: usize,
        outcome: QuizOutcome,
        /// Delay before playback resumes; `None` means it stays paused.
        #[serde(with = "opt_secs")]
        resume_in: Option<Duration>,
    },
    PlaybackResumed,
    QualityChanged {
        variant: VariantId,
        position: f64,
    },
    StepCompleted {
        step_id: StepId,
    },
    ProgressSaved {
        step_id: StepId,
        position: f64,
        completed: bool,
    },
}

mod secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }
}
