use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};

/// Sample lessons served when no lesson file is given.
const SEED_LESSONS: &str = include_str!("../data/lessons.json");
/// Self-learning course catalogue, served read-only.
const SEED_SELF_LEARNING: &str = include_str!("../data/self_learning.json");

/// Global player settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub prevent_seeking: bool,
}

/// Shared in-memory stores. Lessons and progress are kept as raw JSON so
/// clients may store fields this service does not know about.
#[derive(Clone, Default)]
pub struct AppState {
    inner: Arc<Stores>,
}

#[derive(Default)]
struct Stores {
    lessons: RwLock<Vec<Value>>,
    self_learning: RwLock<Vec<Value>>,
    progress: RwLock<HashMap<String, Value>>,
    settings: RwLock<Settings>,
}

impl AppState {
    pub fn new(lessons: Vec<Value>, settings: Settings) -> Self {
        Self {
            inner: Arc::new(Stores {
                lessons: RwLock::new(lessons),
                self_learning: RwLock::default(),
                progress: RwLock::default(),
                settings: RwLock::new(settings),
            }),
        }
    }

    /// State preloaded with the bundled sample lessons and catalogue.
    pub fn seeded() -> ServerResult<Self> {
        let lessons: Vec<Value> = serde_json::from_str(SEED_LESSONS)?;
        Self::new(lessons, Settings::default()).with_seed_catalogue()
    }

    /// State preloaded with the lessons of a JSON file and the bundled
    /// catalogue.
    pub fn from_file(path: &Path) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let lessons: Vec<Value> = serde_json::from_str(&raw)?;
        info!(path = %path.display(), lessons = lessons.len(), "Loaded lessons");
        Self::new(lessons, Settings::default()).with_seed_catalogue()
    }

    fn with_seed_catalogue(self) -> ServerResult<Self> {
        let courses: Vec<Value> = serde_json::from_str(SEED_SELF_LEARNING)?;
        *self.inner.self_learning.write() = courses;
        Ok(self)
    }

    pub fn self_learning(&self) -> Vec<Value> {
        self.inner.self_learning.read().clone()
    }

    pub fn lessons(&self) -> Vec<Value> {
        self.inner.lessons.read().clone()
    }

    /// Insert or replace a lesson by id. A lesson without an id gets
    /// `lesson-{unix millis}`.
    pub fn upsert_lesson(&self, mut lesson: Value) -> ServerResult<Value> {
        let Some(fields) = lesson.as_object_mut() else {
            return Err(ServerError::BadRequest("lesson must be a JSON object".into()));
        };
        let has_id = fields
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.is_empty());
        if !has_id {
            let id = format!("lesson-{}", Utc::now().timestamp_millis());
            fields.insert("id".to_string(), Value::String(id));
        }

        let id = lesson.get("id").cloned();
        let mut lessons = self.inner.lessons.write();
        match lessons.iter().position(|l| l.get("id") == id.as_ref()) {
            Some(index) => lessons[index] = lesson.clone(),
            None => lessons.push(lesson.clone()),
        }
        let title = lesson.get("title").and_then(|t| t.as_str()).unwrap_or_default();
        info!(id = ?id, title, "Saved lesson");
        Ok(lesson)
    }

    pub fn progress(&self, step_id: &str) -> ServerResult<Value> {
        self.inner
            .progress
            .read()
            .get(step_id)
            .cloned()
            .ok_or_else(|| ServerError::not_found("progress", step_id))
    }

    /// Last write wins.
    pub fn save_progress(&self, step_id: &str, payload: Value) {
        debug!(step = step_id, "Saved progress");
        self.inner.progress.write().insert(step_id.to_string(), payload);
    }

    pub fn settings(&self) -> Settings {
        *self.inner.settings.read()
    }

    /// Apply `preventSeeking` when the body carries a boolean; other fields
    /// are ignored.
    pub fn update_settings(&self, body: &Value) -> Settings {
        let mut settings = self.inner.settings.write();
        if let Some(prevent) = body.get("preventSeeking").and_then(Value::as_bool) {
            settings.prevent_seeking = prevent;
            info!(prevent_seeking = prevent, "Settings updated");
        }
        *settings
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn seed_contains_sample_modules() {
        let state = AppState::seeded().unwrap();
        let ids: Vec<_> = state
            .lessons()
            .iter()
            .filter_map(|l| l.get("id").and_then(Value::as_str).map(str::to_owned))
            .collect();
        assert_eq!(ids, ["module-1", "module-2"]);
    }

    #[test]
    fn seed_contains_self_learning_catalogue() {
        let state = AppState::seeded().unwrap();
        let courses = state.self_learning();
        let ids: Vec<_> = courses.iter().filter_map(|c| c["id"].as_str()).collect();
        assert_eq!(ids, ["sl-001", "sl-002", "sl-003"]);
        assert_eq!(courses[0]["modules"].as_array().map(Vec::len), Some(3));
        assert!(AppState::default().self_learning().is_empty());
    }

    #[test]
    fn upsert_replaces_by_id_and_assigns_missing_ids() {
        let state = AppState::new(vec![json!({"id": "a", "title": "Old"})], Settings::default());

        state.upsert_lesson(json!({"id": "a", "title": "New"})).unwrap();
        assert_eq!(state.lessons(), [json!({"id": "a", "title": "New"})]);

        let created = state.upsert_lesson(json!({"title": "Fresh"})).unwrap();
        let id = created["id"].as_str().unwrap();
        assert!(id.starts_with("lesson-"));
        assert_eq!(state.lessons().len(), 2);

        assert!(matches!(
            state.upsert_lesson(json!([1, 2])),
            Err(ServerError::BadRequest(_))
        ));
    }

    #[test]
    fn settings_only_accept_booleans() {
        let state = AppState::default();
        assert!(!state.update_settings(&json!({"preventSeeking": "yes"})).prevent_seeking);
        assert!(state.update_settings(&json!({"preventSeeking": true})).prevent_seeking);
        assert!(state.update_settings(&json!({"other": 1})).prevent_seeking);
    }

    #[test]
    fn missing_progress_is_not_found() {
        let state = AppState::default();
        assert!(matches!(
            state.progress("m1-step3"),
            Err(ServerError::NotFound { .. })
        ));
        state.save_progress("m1-step3", json!({"currentTime": 4.0}));
        assert_eq!(state.progress("m1-step3").unwrap()["currentTime"], 4.0);
    }
}
