use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, Result};
use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = concat!("lesson-player/", env!("CARGO_PKG_VERSION"));

/// What to do when a learner picks a wrong quiz answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncorrectAnswerPolicy {
    /// Keep the quiz open; the learner may answer again until the countdown runs out.
    #[default]
    RetryUntilTimeout,
    /// Resolve the quiz as failed and continue playback.
    CloseAndContinue,
}

/// Tunables of the player state machine and its persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Distance in seconds within which a quiz timestamp counts as reached.
    pub quiz_trigger_tolerance_secs: f64,
    /// Response budget for quizzes that do not declare one.
    #[serde(with = "secs")]
    pub default_quiz_budget: Duration,
    /// Pause between a resolved quiz and automatic resumption.
    #[serde(with = "secs")]
    pub quiz_resume_delay: Duration,
    pub incorrect_answer_policy: IncorrectAnswerPolicy,
    /// Resume playback after a quiz times out.
    pub resume_after_timeout: bool,
    /// Interval of the coarse progress heartbeat.
    #[serde(with = "secs")]
    pub heartbeat_interval: Duration,
    /// The playback surface handles adaptive manifests itself.
    pub native_adaptive_playback: bool,
    #[serde(with = "secs")]
    pub manifest_fetch_timeout: Duration,
    /// One reconnect attempt for manifests, no more.
    #[serde(skip, default = "default_manifest_retry")]
    pub manifest_retry: RetryPolicy,
    #[serde(skip, default = "default_remote_write_retry")]
    pub remote_write_retry: RetryPolicy,
}

fn default_manifest_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(2),
        jitter: false,
    }
}

fn default_remote_write_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(250),
        max_delay: Duration::from_secs(4),
        jitter: true,
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            quiz_trigger_tolerance_secs: 0.75,
            default_quiz_budget: Duration::from_secs(15),
            quiz_resume_delay: Duration::from_secs(1),
            incorrect_answer_policy: IncorrectAnswerPolicy::default(),
            resume_after_timeout: true,
            heartbeat_interval: Duration::from_secs(10),
            native_adaptive_playback: false,
            manifest_fetch_timeout: Duration::from_secs(15),
            manifest_retry: default_manifest_retry(),
            remote_write_retry: default_remote_write_retry(),
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=5.0).contains(&self.quiz_trigger_tolerance_secs) {
            return Err(PlayerError::Internal {
                reason: format!(
                    "quiz trigger tolerance {} is outside 0..=5 seconds",
                    self.quiz_trigger_tolerance_secs
                ),
            });
        }
        if self.heartbeat_interval.is_zero() {
            return Err(PlayerError::Internal {
                reason: "heartbeat interval must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Where the collaborators live and how to talk to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(with = "secs")]
    pub request_timeout: Duration,
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4000".to_string(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl RemoteConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Build the shared HTTP client.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.clone())
            .build()?;
        Ok(client)
    }

    /// Join an API path onto the base URL.
    pub fn endpoint(&self, path: &str) -> Result<url::Url> {
        let base = url::Url::parse(&self.base_url)
            .map_err(|e| PlayerError::invalid_url(&self.base_url, e.to_string()))?;
        base.join(path)
            .map_err(|e| PlayerError::invalid_url(path, e.to_string()))
    }
}

/// Global flags served by the settings collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalSettings {
    /// Forces seek locking on every video step.
    pub prevent_seeking: bool,
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
