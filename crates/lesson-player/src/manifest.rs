//! Resolves a step's media reference into something the element can play.
//!
//! `.m3u8` sources are adaptive: unless the playback surface handles HLS
//! natively, the master playlist is fetched and parsed into switchable
//! variants. Everything else is a progressive file with no variants.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use m3u8_rs::{Playlist, parse_playlist_res};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::model::PlaybackPolicy;
use crate::quality::QualityVariant;
use crate::retry::{RetryPolicy, retry_with_backoff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Adaptive,
    Progressive,
}

impl SourceKind {
    pub fn detect(src: &str) -> Self {
        let path = match Url::parse(src) {
            Ok(url) => url.path().to_owned(),
            Err(_) => src.split(['?', '#']).next().unwrap_or(src).to_owned(),
        };
        if path.to_ascii_lowercase().ends_with(".m3u8") {
            Self::Adaptive
        } else {
            Self::Progressive
        }
    }
}

/// How the element is expected to play a resolved source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// The surface plays the manifest itself and owns rendition choice.
    Native,
    /// Variants were parsed here and are switched through the element.
    Managed,
    /// A single file.
    Progressive,
}

/// A playable source bound to one step activation.
#[derive(Debug, Clone)]
pub struct PlayableSource {
    pub url: String,
    pub mode: StreamMode,
    /// Levels ordered by descending bandwidth; empty unless `mode` is `Managed`.
    pub variants: Vec<QualityVariant>,
    pub quality_locked: bool,
    token: CancellationToken,
}

impl PlayableSource {
    pub fn new(
        url: impl Into<String>,
        mode: StreamMode,
        variants: Vec<QualityVariant>,
        quality_locked: bool,
    ) -> Self {
        Self {
            url: url.into(),
            mode,
            variants,
            quality_locked,
            token: CancellationToken::new(),
        }
    }

    pub fn is_adaptive(&self) -> bool {
        self.mode != StreamMode::Progressive
    }

    /// Token that is cancelled when the source is torn down.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_torn_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop the streaming session. Idempotent.
    pub fn teardown(&self) {
        if !self.token.is_cancelled() {
            debug!(url = %self.url, "Tearing down stream");
            self.token.cancel();
        }
    }
}

/// Fetches manifest bodies.
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

pub struct HttpManifestFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpManifestFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl ManifestFetcher for HttpManifestFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlayerError::http_status(status, url.as_str(), "manifest fetch"));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Parse a manifest body into bandwidth-ordered variants.
///
/// A media playlist is a single rendition and yields no variants.
pub fn parse_variants(body: &[u8], manifest_url: &Url) -> Result<Vec<QualityVariant>> {
    let text = std::str::from_utf8(body).map_err(|e| {
        PlayerError::source_unavailable(manifest_url.as_str(), format!("manifest is not UTF-8: {e}"))
    })?;

    let master = match parse_playlist_res(text.as_bytes()) {
        Ok(Playlist::MasterPlaylist(master)) => master,
        Ok(Playlist::MediaPlaylist(_)) => {
            debug!(url = %manifest_url, "Media playlist has a single rendition");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(PlayerError::source_unavailable(
                manifest_url.as_str(),
                format!("failed to parse manifest: {e}"),
            ));
        }
    };

    let mut streams: Vec<_> = master
        .variants
        .into_iter()
        .filter(|v| !v.is_i_frame)
        .collect();
    if streams.is_empty() {
        return Err(PlayerError::source_unavailable(
            manifest_url.as_str(),
            "master playlist has no variants",
        ));
    }
    streams.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));

    streams
        .into_iter()
        .enumerate()
        .map(|(index, stream)| {
            let uri = manifest_url.join(&stream.uri).map_err(|e| {
                PlayerError::source_unavailable(
                    manifest_url.as_str(),
                    format!("bad variant URI `{}`: {e}", stream.uri),
                )
            })?;
            let resolution = stream.resolution.map(|r| (r.width, r.height));
            Ok(QualityVariant::level(
                index,
                stream.bandwidth,
                resolution,
                uri.to_string(),
            ))
        })
        .collect()
}

/// Turns media references into [`PlayableSource`]s.
#[derive(Clone)]
pub struct ManifestLoader {
    fetcher: Arc<dyn ManifestFetcher>,
    native_adaptive: bool,
    retry: RetryPolicy,
}

impl ManifestLoader {
    pub fn new(fetcher: Arc<dyn ManifestFetcher>, config: &PlayerConfig) -> Self {
        Self {
            fetcher,
            native_adaptive: config.native_adaptive_playback,
            retry: config.manifest_retry.clone(),
        }
    }

    pub fn http(client: reqwest::Client, config: &PlayerConfig) -> Self {
        let fetcher = HttpManifestFetcher::new(client, config.manifest_fetch_timeout);
        Self::new(Arc::new(fetcher), config)
    }

    pub async fn resolve(&self, src: &str, policy: &PlaybackPolicy) -> Result<PlayableSource> {
        self.resolve_until(src, policy, &CancellationToken::new()).await
    }

    /// [`resolve`](Self::resolve) that gives up with `Cancelled` as soon as
    /// `token` fires, including mid-request.
    pub async fn resolve_until(
        &self,
        src: &str,
        policy: &PlaybackPolicy,
        token: &CancellationToken,
    ) -> Result<PlayableSource> {
        let source = |mode, variants| PlayableSource::new(src, mode, variants, policy.quality_locked);

        if SourceKind::detect(src) == SourceKind::Progressive {
            debug!(url = src, "Progressive source");
            return Ok(source(StreamMode::Progressive, Vec::new()));
        }
        if self.native_adaptive {
            debug!(url = src, "Adaptive source handed to native playback");
            return Ok(source(StreamMode::Native, Vec::new()));
        }

        let url = Url::parse(src).map_err(|e| PlayerError::source_unavailable(src, e.to_string()))?;
        let fetcher = &self.fetcher;
        let target = &url;
        let fetch = retry_with_backoff(&self.retry, token, "manifest fetch", move |_| {
            fetcher.fetch(target)
        });
        let body = tokio::select! {
            _ = token.cancelled() => Err(PlayerError::Cancelled),
            body = fetch => body,
        }
        .map_err(|e| match e {
            PlayerError::Cancelled => {
                debug!(url = src, "Manifest fetch cancelled");
                e
            }
            PlayerError::SourceUnavailable { .. } => e,
            other => {
                warn!(url = src, error = %other, "Manifest unreachable");
                PlayerError::source_unavailable(src, other.to_string())
            }
        })?;

        let variants = parse_variants(&body, &url)?;
        info!(url = src, variants = variants.len(), "Adaptive manifest loaded");
        Ok(source(StreamMode::Managed, variants))
    }
}
