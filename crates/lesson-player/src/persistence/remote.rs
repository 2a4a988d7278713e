use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::config::RemoteConfig;
use crate::error::{PlayerError, Result};
use crate::model::{ProgressRecord, StepId};

/// Cross-device progress storage.
#[async_trait]
pub trait RemoteProgressStore: Send + Sync {
    /// `Ok(None)` when the store has no record for the step.
    async fn load(&self, step_id: &StepId) -> Result<Option<ProgressRecord>>;
    async fn save(&self, record: &ProgressRecord) -> Result<()>;
}

/// `GET`/`POST /api/progress/{stepId}`.
#[derive(Clone)]
pub struct HttpProgressStore {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl HttpProgressStore {
    pub fn new(client: reqwest::Client, config: RemoteConfig) -> Self {
        Self { client, config }
    }

    fn record_url(&self, step_id: &StepId) -> Result<Url> {
        let mut url = self.config.endpoint("api/progress/")?;
        url.path_segments_mut()
            .map_err(|_| PlayerError::invalid_url(&self.config.base_url, "cannot be a base"))?
            .pop_if_empty()
            .push(step_id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl RemoteProgressStore for HttpProgressStore {
    async fn load(&self, step_id: &StepId) -> Result<Option<ProgressRecord>> {
        let url = self.record_url(step_id)?;
        let response = self.client.get(url.clone()).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(step = %step_id, "No remote progress");
                Ok(None)
            }
            status if status.is_success() => {
                let mut record: ProgressRecord = response.json().await?;
                if record.step_id.is_empty() {
                    record.step_id = step_id.clone();
                }
                Ok(Some(record))
            }
            status => Err(PlayerError::http_status(status, url.as_str(), "load progress")),
        }
    }

    async fn save(&self, record: &ProgressRecord) -> Result<()> {
        let url = self.record_url(&record.step_id)?;
        let response = self.client.post(url.clone()).json(record).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlayerError::http_status(status, url.as_str(), "save progress"));
        }
        Ok(())
    }
}
