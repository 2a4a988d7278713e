//! Content and progress data shared by every component.
//!
//! Lesson JSON follows the collaborator's wire format (`lockedSlider`,
//! `popupQuizzes`, clock-string durations); the Rust names follow the
//! player's vocabulary. Both spellings are accepted on input.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default watched percentage at which a video step counts as complete.
pub const DEFAULT_COMPLETION_THRESHOLD: f64 = 90.0;

/// Stable identifier of a step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A container of steps as served by the content collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Flatten lessons into the single ordered step sequence the gate works on.
pub fn flatten_steps(lessons: &[Lesson]) -> Vec<Step> {
    lessons
        .iter()
        .flat_map(|lesson| lesson.steps.iter().cloned())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn video(&self) -> Option<&VideoStep> {
        match &self.kind {
            StepKind::Video(video) => Some(video),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            StepKind::Overview { .. } => "overview",
            StepKind::Video(_) => "video",
            StepKind::Assessment(_) => "assessment",
            StepKind::Evaluation(_) => "evaluation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepKind {
    Overview {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Video(VideoStep),
    Assessment(QuestionSet),
    Evaluation(QuestionSet),
}

/// Questions of an assessment or evaluation. The player never grades them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuestionSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub questions: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStep {
    /// Manifest or progressive file URL.
    pub src: String,
    /// Nominal duration in seconds, used until the element reports metadata.
    #[serde(
        default,
        serialize_with = "clock::serialize",
        deserialize_with = "clock::deserialize"
    )]
    pub duration: Option<f64>,
    #[serde(default, rename = "config", alias = "policy")]
    pub policy: PlaybackPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPolicy {
    #[serde(default, rename = "lockedSlider", alias = "seekLocked")]
    pub seek_locked: bool,
    #[serde(default, rename = "lockedQuality", alias = "qualityLocked")]
    pub quality_locked: bool,
    #[serde(
        default = "default_threshold",
        rename = "completionPercentage",
        alias = "completionThresholdPercent"
    )]
    pub completion_threshold_percent: f64,
    #[serde(default, rename = "popupQuizzes", alias = "quizzes")]
    pub quizzes: Vec<QuizTrigger>,
}

fn default_threshold() -> f64 {
    DEFAULT_COMPLETION_THRESHOLD
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self {
            seek_locked: false,
            quality_locked: false,
            completion_threshold_percent: DEFAULT_COMPLETION_THRESHOLD,
            quizzes: Vec::new(),
        }
    }
}

impl PlaybackPolicy {
    /// Threshold clamped to `0..=100`; non-finite values fall back to the default.
    pub fn threshold(&self) -> f64 {
        if self.completion_threshold_percent.is_finite() {
            self.completion_threshold_percent.clamp(0.0, 100.0)
        } else {
            DEFAULT_COMPLETION_THRESHOLD
        }
    }
}

/// A timed question that interrupts playback.
///
/// The per-session `consumed` flag is owned by the quiz scheduler so that
/// steps stay immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizTrigger {
    #[serde(rename = "time", alias = "timestamp")]
    pub timestamp: f64,
    #[serde(rename = "question", alias = "prompt")]
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(rename = "correct", alias = "correctIndex")]
    pub correct_index: usize,
    /// Response budget in seconds.
    #[serde(
        default,
        rename = "duration",
        alias = "responseBudget",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_budget: Option<f64>,
}

/// Last known playback state of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawProgressRecord")]
pub struct ProgressRecord {
    pub step_id: StepId,
    #[serde(rename = "currentTime")]
    pub position: f64,
    pub max_watched: f64,
    pub completed: bool,
    pub saved_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(step_id: StepId, position: f64, max_watched: f64, completed: bool) -> Self {
        Self {
            step_id,
            position,
            max_watched: max_watched.max(0.0),
            completed,
            saved_at: Utc::now(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProgressRecord {
    #[serde(default, alias = "videoId")]
    step_id: StepId,
    #[serde(default)]
    current_time: f64,
    #[serde(default)]
    max_watched: Option<f64>,
    #[serde(default)]
    completed: bool,
    #[serde(default, alias = "timestamp")]
    saved_at: Option<SavedAt>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SavedAt {
    Millis(i64),
    Timestamp(DateTime<Utc>),
}

impl From<RawProgressRecord> for ProgressRecord {
    fn from(raw: RawProgressRecord) -> Self {
        let saved_at = match raw.saved_at {
            Some(SavedAt::Timestamp(ts)) => ts,
            Some(SavedAt::Millis(ms)) => {
                DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
            }
            None => DateTime::<Utc>::UNIX_EPOCH,
        };
        Self {
            step_id: raw.step_id,
            position: raw.current_time,
            max_watched: raw.max_watched.unwrap_or(raw.current_time),
            completed: raw.completed,
            saved_at,
        }
    }
}

/// Step ids the learner has completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionSet(HashSet<StepId>);

impl CompletionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.0.contains(id)
    }

    /// Returns `true` when the id was not yet present.
    pub fn insert(&mut self, id: StepId) -> bool {
        self.0.insert(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepId> {
        self.0.iter()
    }
}

impl FromIterator<StepId> for CompletionSet {
    fn from_iter<T: IntoIterator<Item = StepId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parses `"10:53"`, `"1:02:03"`, `"95"` or a plain number into seconds.
pub fn parse_clock(input: &str) -> Option<f64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let mut total = 0.0;
    let mut parts = 0;
    for part in input.split(':') {
        let value: f64 = part.trim().parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        total = total * 60.0 + value;
        parts += 1;
    }
    (parts <= 3).then_some(total)
}

mod clock {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(f64),
        Clock(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(secs) => serializer.serialize_f64(*secs),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Seconds(secs)) if secs.is_finite() && secs >= 0.0 => Ok(Some(secs)),
            Some(Raw::Seconds(secs)) => Err(serde::de::Error::custom(format!(
                "invalid duration {secs}"
            ))),
            Some(Raw::Clock(text)) if text.trim().is_empty() => Ok(None),
            Some(Raw::Clock(text)) => parse_clock(&text).map(Some).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid duration string `{text}`"))
            }),
        }
    }
}
