use std::sync::Arc;

use parking_lot::Mutex;

use crate::manifest::PlayableSource;
use crate::quality::{QualityVariant, VariantId};

/// The rendering surface the player drives.
///
/// Implementations forward commands to the actual video element; they report
/// back through the player's dispatch methods.
pub trait MediaElement: Send {
    fn attach(&mut self, source: &PlayableSource);
    fn detach(&mut self);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: f64);
    fn switch_variant(&mut self, variant: &QualityVariant);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementCommand {
    Attach { url: String },
    Detach,
    Play,
    Pause,
    Seek(f64),
    SwitchVariant(VariantId),
}

/// An element that only remembers what it was told.
///
/// Clones share the same log, so a test can keep one handle while the player
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingElement {
    log: Arc<Mutex<Vec<ElementCommand>>>,
}

impl RecordingElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<ElementCommand> {
        self.log.lock().clone()
    }

    pub fn take_commands(&self) -> Vec<ElementCommand> {
        std::mem::take(&mut *self.log.lock())
    }

    pub fn last_seek(&self) -> Option<f64> {
        self.log.lock().iter().rev().find_map(|c| match c {
            ElementCommand::Seek(position) => Some(*position),
            _ => None,
        })
    }

    fn push(&self, command: ElementCommand) {
        self.log.lock().push(command);
    }
}

impl MediaElement for RecordingElement {
    fn attach(&mut self, source: &PlayableSource) {
        self.push(ElementCommand::Attach {
            url: source.url.clone(),
        });
    }

    fn detach(&mut self) {
        self.push(ElementCommand::Detach);
    }

    fn play(&mut self) {
        self.push(ElementCommand::Play);
    }

    fn pause(&mut self) {
        self.push(ElementCommand::Pause);
    }

    fn seek(&mut self, position: f64) {
        self.push(ElementCommand::Seek(position));
    }

    fn switch_variant(&mut self, variant: &QualityVariant) {
        self.push(ElementCommand::SwitchVariant(variant.id));
    }
}
