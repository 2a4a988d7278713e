/// Current position and the furthest position reached in this session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WatchTracker {
    position: f64,
    max_watched: f64,
}

impl WatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a saved record.
    pub fn seeded(position: f64, max_watched: f64) -> Self {
        let position = sanitize(position).unwrap_or(0.0);
        let max_watched = sanitize(max_watched).unwrap_or(0.0).max(position);
        Self {
            position,
            max_watched,
        }
    }

    /// Apply a time update. Returns `false` when the value was ignored.
    pub fn observe(&mut self, position: f64) -> bool {
        let Some(position) = sanitize(position) else {
            return false;
        };
        self.position = position;
        if position > self.max_watched {
            self.max_watched = position;
        }
        true
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn max_watched(&self) -> f64 {
        self.max_watched
    }
}

fn sanitize(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value)
}
