use std::fmt;

use reqwest::StatusCode;

use crate::model::StepId;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Why a seek request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekRejection {
    /// The target lies beyond the furthest position reached so far.
    BeyondWatched,
    /// A quiz interruption owns the playback controls.
    QuizActive,
}

impl fmt::Display for SeekRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeyondWatched => f.write_str("seeking ahead of watched content is disabled"),
            Self::QuizActive => f.write_str("a quiz is in progress"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("source unavailable for `{url}`: {reason}")]
    SourceUnavailable { url: String, reason: String },

    #[error("seek to {requested:.1}s rejected ({reason}); position is {position:.1}s")]
    SeekRejected {
        requested: f64,
        position: f64,
        reason: SeekRejection,
    },

    #[error("progress write for step `{step_id}` failed: {reason}")]
    PersistenceWriteFailed { step_id: StepId, reason: String },

    #[error("step `{step_id}` is locked until `{required}` is completed")]
    PrerequisiteNotMet { step_id: StepId, required: StepId },

    #[error("unknown step `{0}`")]
    UnknownStep(StepId),

    #[error("unknown quality variant `{0}`")]
    UnknownVariant(String),

    #[error("quality selection is locked for this step")]
    QualityLocked,

    #[error("playback controls are disabled while a quiz is open")]
    ControlsLocked,

    #[error("no quiz is awaiting an answer")]
    NoActiveQuiz,

    #[error("answer index {index} is out of range for a quiz with {options} options")]
    InvalidAnswer { index: usize, options: usize },

    #[error("no video step is active")]
    NoActiveSession,

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl PlayerError {
    pub fn source_unavailable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn persistence(step_id: &StepId, reason: impl Into<String>) -> Self {
        Self::PersistenceWriteFailed {
            step_id: step_id.clone(),
            reason: reason.into(),
        }
    }

    /// Whether a failed remote operation is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Network { source } => {
                source.is_connect() || source.is_timeout() || source.is_request() || source.is_body()
            }
            Self::Io { .. } | Self::PersistenceWriteFailed { .. } => true,
            Self::SourceUnavailable { .. }
            | Self::SeekRejected { .. }
            | Self::PrerequisiteNotMet { .. }
            | Self::UnknownStep(_)
            | Self::UnknownVariant(_)
            | Self::QualityLocked
            | Self::ControlsLocked
            | Self::NoActiveQuiz
            | Self::InvalidAnswer { .. }
            | Self::NoActiveSession
            | Self::InvalidUrl { .. }
            | Self::Serialization { .. }
            | Self::Cancelled
            | Self::Internal { .. } => false,
        }
    }

    /// Errors the learner should see as a notice rather than a fault.
    pub fn is_user_notice(&self) -> bool {
        matches!(
            self,
            Self::SeekRejected { .. }
                | Self::PrerequisiteNotMet { .. }
                | Self::QualityLocked
                | Self::ControlsLocked
        )
    }
}
