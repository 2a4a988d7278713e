use serde::Serialize;

use crate::error::{PlayerError, Result};
use crate::model::{CompletionSet, Step, StepId};

/// Lock state of one step, for list views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStatus {
    pub step_id: StepId,
    pub title: String,
    pub kind: &'static str,
    pub completed: bool,
    pub locked: bool,
}

/// Decides which steps of the flattened sequence may be opened.
///
/// The first step is always open. Any other step opens once its predecessor
/// is completed, or when it was completed itself.
#[derive(Debug, Clone, Default)]
pub struct SequenceGate {
    steps: Vec<Step>,
}

impl SequenceGate {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn position(&self, step_id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == step_id)
    }

    pub fn find(&self, step_id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == step_id)
    }

    /// Returns the step if it may be selected.
    pub fn check(&self, target: &StepId, completed: &CompletionSet) -> Result<&Step> {
        let index = self
            .position(target)
            .ok_or_else(|| PlayerError::UnknownStep(target.clone()))?;
        match self.blocker(index, completed) {
            Some(required) => Err(PlayerError::PrerequisiteNotMet {
                step_id: target.clone(),
                required: required.clone(),
            }),
            None => Ok(&self.steps[index]),
        }
    }

    pub fn is_selectable(&self, target: &StepId, completed: &CompletionSet) -> bool {
        self.check(target, completed).is_ok()
    }

    /// The step after `current`, if any.
    pub fn next_step(&self, current: &StepId) -> Option<&Step> {
        let index = self.position(current)?;
        self.steps.get(index + 1)
    }

    pub fn statuses(&self, completed: &CompletionSet) -> Vec<StepStatus> {
        self.steps
            .iter()
            .enumerate()
            .map(|(index, step)| StepStatus {
                step_id: step.id.clone(),
                title: step.title.clone(),
                kind: step.kind_name(),
                completed: completed.contains(&step.id),
                locked: self.blocker(index, completed).is_some(),
            })
            .collect()
    }

    /// The predecessor that keeps step `index` locked.
    fn blocker(&self, index: usize, completed: &CompletionSet) -> Option<&StepId> {
        if index == 0 || completed.contains(&self.steps[index].id) {
            return None;
        }
        let previous = &self.steps[index - 1].id;
        (!completed.contains(previous)).then_some(previous)
    }
}
