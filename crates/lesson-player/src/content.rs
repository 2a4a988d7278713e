use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{GlobalSettings, RemoteConfig};
use crate::error::{PlayerError, Result};
use crate::model::Lesson;

/// Supplies lessons and the global settings flag.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_lessons(&self) -> Result<Vec<Lesson>>;
    async fn fetch_settings(&self) -> Result<GlobalSettings>;
}

/// Settings are optional: a failed fetch means no override.
pub async fn settings_or_default(content: &dyn ContentSource) -> GlobalSettings {
    match content.fetch_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "Settings unavailable, seeking override disabled");
            GlobalSettings::default()
        }
    }
}

#[derive(Clone)]
pub struct HttpContentClient {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl HttpContentClient {
    pub fn new(client: reqwest::Client, config: RemoteConfig) -> Self {
        Self { client, config }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        operation: &'static str,
    ) -> Result<T> {
        let url = self.config.endpoint(path)?;
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlayerError::http_status(status, url.as_str(), operation));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ContentSource for HttpContentClient {
    async fn fetch_lessons(&self) -> Result<Vec<Lesson>> {
        let lessons: Vec<Lesson> = self.get_json("api/lessons", "fetch lessons").await?;
        debug!(lessons = lessons.len(), "Lessons fetched");
        Ok(lessons)
    }

    async fn fetch_settings(&self) -> Result<GlobalSettings> {
        self.get_json("api/settings", "fetch settings").await
    }
}

/// Content held in memory, for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticContent {
    pub lessons: Vec<Lesson>,
    pub settings: Option<GlobalSettings>,
}

#[async_trait]
impl ContentSource for StaticContent {
    async fn fetch_lessons(&self) -> Result<Vec<Lesson>> {
        Ok(self.lessons.clone())
    }

    async fn fetch_settings(&self) -> Result<GlobalSettings> {
        self.settings.ok_or_else(|| PlayerError::Internal {
            reason: "no settings configured".to_string(),
        })
    }
}
