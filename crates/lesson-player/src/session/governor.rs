use serde::Serialize;

use crate::error::SeekRejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeekMode {
    Unrestricted,
    Restricted,
}

impl SeekMode {
    /// Seeking is restricted when either the step or the global override
    /// locks it, until the step is completed.
    pub fn for_policy(seek_locked: bool, prevent_seeking: bool, completed: bool) -> Self {
        if (seek_locked || prevent_seeking) && !completed {
            Self::Restricted
        } else {
            Self::Unrestricted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekDecision {
    Granted(f64),
    Rejected {
        reason: SeekRejection,
        /// Where playback must be moved; `None` leaves it untouched.
        snap_to: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct SeekGovernor {
    mode: SeekMode,
}

impl SeekGovernor {
    pub fn new(mode: SeekMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> SeekMode {
        self.mode
    }

    pub fn evaluate(&self, requested: f64, max_watched: f64, quiz_active: bool) -> SeekDecision {
        if quiz_active {
            return SeekDecision::Rejected {
                reason: SeekRejection::QuizActive,
                snap_to: None,
            };
        }
        match self.mode {
            SeekMode::Unrestricted => SeekDecision::Granted(requested),
            SeekMode::Restricted if requested <= max_watched => SeekDecision::Granted(requested),
            SeekMode::Restricted => SeekDecision::Rejected {
                reason: SeekRejection::BeyondWatched,
                snap_to: Some(max_watched),
            },
        }
    }

    /// Lift the restriction after completion. Returns `true` on the transition.
    pub fn unlock(&mut self) -> bool {
        let was_restricted = self.mode == SeekMode::Restricted;
        self.mode = SeekMode::Unrestricted;
        was_restricted
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(false, false, false, SeekMode::Unrestricted)]
    #[case(true, false, false, SeekMode::Restricted)]
    #[case(false, true, false, SeekMode::Restricted)]
    #[case(true, true, true, SeekMode::Unrestricted)]
    #[case(true, false, true, SeekMode::Unrestricted)]
    fn mode_is_pure_function_of_inputs(
        #[case] seek_locked: bool,
        #[case] prevent_seeking: bool,
        #[case] completed: bool,
        #[case] expected: SeekMode,
    ) {
        assert_eq!(
            SeekMode::for_policy(seek_locked, prevent_seeking, completed),
            expected
        );
    }

    #[test]
    fn restricted_grants_backward_and_snaps_forward() {
        let governor = SeekGovernor::new(SeekMode::Restricted);
        assert_eq!(governor.evaluate(10.0, 30.0, false), SeekDecision::Granted(10.0));
        assert_eq!(governor.evaluate(30.0, 30.0, false), SeekDecision::Granted(30.0));
        assert_eq!(
            governor.evaluate(30.5, 30.0, false),
            SeekDecision::Rejected {
                reason: SeekRejection::BeyondWatched,
                snap_to: Some(30.0),
            }
        );
    }

    #[test]
    fn quiz_blocks_every_seek() {
        let governor = SeekGovernor::new(SeekMode::Unrestricted);
        assert_eq!(
            governor.evaluate(1.0, 30.0, true),
            SeekDecision::Rejected {
                reason: SeekRejection::QuizActive,
                snap_to: None,
            }
        );
    }

    #[test]
    fn unlock_transitions_once() {
        let mut governor = SeekGovernor::new(SeekMode::Restricted);
        assert!(governor.unlock());
        assert!(!governor.unlock());
        assert_eq!(governor.evaluate(99.0, 10.0, false), SeekDecision::Granted(99.0));
    }
}
