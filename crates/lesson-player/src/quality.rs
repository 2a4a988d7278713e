use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlayerError, Result};

/// Identifier of a selectable rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantId {
    /// Let the streaming layer pick the rendition.
    Auto,
    /// Index into the bandwidth-ordered variant list.
    Level(usize),
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Level(index) => write!(f, "{index}"),
        }
    }
}

impl FromStr for VariantId {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") || s == "-1" {
            return Ok(Self::Auto);
        }
        s.parse::<usize>()
            .map(Self::Level)
            .map_err(|_| PlayerError::UnknownVariant(s.to_string()))
    }
}

/// One rendition advertised by an adaptive manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVariant {
    pub id: VariantId,
    pub label: String,
    /// Peak bandwidth in bits per second.
    pub bitrate: Option<u64>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    /// Absolute URI of the rendition playlist.
    pub uri: String,
}

impl QualityVariant {
    pub fn level(index: usize, bitrate: u64, resolution: Option<(u64, u64)>, uri: String) -> Self {
        let (width, height) = resolution.unzip();
        Self {
            id: VariantId::Level(index),
            label: variant_label(height, bitrate),
            bitrate: Some(bitrate),
            width,
            height,
            uri,
        }
    }

    fn auto(manifest_uri: &str) -> Self {
        Self {
            id: VariantId::Auto,
            label: "Auto".to_string(),
            bitrate: None,
            width: None,
            height: None,
            uri: manifest_uri.to_string(),
        }
    }
}

fn variant_label(height: Option<u64>, bitrate: u64) -> String {
    match height {
        Some(height) if height > 0 => format!("{height}p"),
        _ => format!("{} kbps", bitrate / 1000),
    }
}

/// A rendition change that is waiting for the element to confirm it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingSwitch {
    pub target: VariantId,
    pub resume_at: f64,
    pub was_playing: bool,
}

/// Runtime rendition switching for one adaptive source.
#[derive(Debug, Clone)]
pub struct QualitySelector {
    variants: Vec<QualityVariant>,
    active: VariantId,
    pending: Option<PendingSwitch>,
}

impl QualitySelector {
    /// Returns `None` when there is nothing to switch between.
    pub fn new(manifest_uri: &str, levels: &[QualityVariant]) -> Option<Self> {
        if levels.is_empty() {
            return None;
        }
        let mut variants = Vec::with_capacity(levels.len() + 1);
        variants.push(QualityVariant::auto(manifest_uri));
        variants.extend(levels.iter().cloned());
        Some(Self {
            variants,
            active: VariantId::Auto,
            pending: None,
        })
    }

    /// Auto first, then levels by descending bandwidth.
    pub fn list_variants(&self) -> &[QualityVariant] {
        &self.variants
    }

    pub fn active(&self) -> VariantId {
        self.active
    }

    pub fn pending(&self) -> Option<&PendingSwitch> {
        self.pending.as_ref()
    }

    pub fn is_switching(&self) -> bool {
        self.pending.is_some()
    }

    /// Start switching to `id`, remembering where and whether to resume.
    ///
    /// Returns the variant the element should load, or `None` when `id` is
    /// already the active (or already requested) rendition.
    pub fn select(
        &mut self,
        id: VariantId,
        position: f64,
        playing: bool,
    ) -> Result<Option<&QualityVariant>> {
        let index = self
            .variants
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| PlayerError::UnknownVariant(id.to_string()))?;

        let current_target = self.pending.map_or(self.active, |p| p.target);
        if current_target == id {
            return Ok(None);
        }

        // A second request while buffering keeps the original resume point.
        let (resume_at, was_playing) = match self.pending {
            Some(p) => (p.resume_at, p.was_playing),
            None => (position, playing),
        };
        self.pending = Some(PendingSwitch {
            target: id,
            resume_at,
            was_playing,
        });
        debug!(variant = %id, resume_at, was_playing, "Quality switch requested");
        Ok(Some(&self.variants[index]))
    }

    /// Move the resume point of a pending switch, e.g. after a granted seek.
    pub fn retarget(&mut self, position: f64) {
        if let Some(pending) = self.pending.as_mut() {
            pending.resume_at = position;
        }
    }

    /// Follow play/pause requests made while the new rendition loads.
    pub fn set_playing(&mut self, playing: bool) {
        if let Some(pending) = self.pending.as_mut() {
            pending.was_playing = playing;
        }
    }

    /// The element finished loading the new rendition.
    pub fn complete_switch(&mut self) -> Option<PendingSwitch> {
        let pending = self.pending.take()?;
        self.active = pending.target;
        Some(pending)
    }
}
