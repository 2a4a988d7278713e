/// Latched watched-percentage detector.
#[derive(Debug, Clone, Copy)]
pub struct CompletionDetector {
    threshold: f64,
    latched: bool,
}

impl CompletionDetector {
    /// A step that is already complete starts latched and never fires again.
    pub fn new(threshold_percent: f64, already_completed: bool) -> Self {
        Self {
            threshold: threshold_percent,
            latched: already_completed,
        }
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Returns `true` exactly once, on the first call at or past the threshold.
    pub fn check(&mut self, position: f64, duration: Option<f64>) -> bool {
        if self.latched {
            return false;
        }
        match percent(position, duration) {
            Some(percent) if percent >= self.threshold => {
                self.latched = true;
                true
            }
            _ => false,
        }
    }
}

pub fn percent(position: f64, duration: Option<f64>) -> Option<f64> {
    let duration = duration.filter(|d| d.is_finite() && *d > 0.0)?;
    position
        .is_finite()
        .then(|| position / duration * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_at_threshold() {
        let mut detector = CompletionDetector::new(90.0, false);
        for t in (0..=89).step_by(10).map(f64::from) {
            assert!(!detector.check(t, Some(100.0)), "fired early at {t}");
        }
        assert!(!detector.check(89.0, Some(100.0)));
        assert!(detector.check(91.0, Some(100.0)));
        assert!(!detector.check(95.0, Some(100.0)));
        assert!(!detector.check(100.0, Some(100.0)));
        assert!(detector.is_latched());
    }

    #[test]
    fn exact_threshold_counts() {
        let mut detector = CompletionDetector::new(90.0, false);
        assert!(detector.check(90.0, Some(100.0)));
    }

    #[test]
    fn unknown_duration_never_fires() {
        let mut detector = CompletionDetector::new(0.0, false);
        assert!(!detector.check(50.0, None));
        assert!(!detector.check(50.0, Some(0.0)));
        assert!(!detector.check(50.0, Some(f64::NAN)));
    }

    #[test]
    fn completed_steps_start_latched() {
        let mut detector = CompletionDetector::new(90.0, true);
        assert!(!detector.check(100.0, Some(100.0)));
    }
}
