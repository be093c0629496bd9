use serde::{Deserialize, Serialize};

/// Beat transport driving [`crate::LoopUnit::update`]. The beat position
/// never moves backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatClock {
    pub bpm: f64,
    beats: f64,
}

impl BeatClock {
    pub fn new(bpm: f64) -> Self {
        Self { bpm, beats: 0.0 }
    }

    pub fn beats(&self) -> f64 {
        self.beats
    }

    pub fn reset(&mut self) {
        self.beats = 0.0;
    }

    /// Moves the transport forward by `seconds` of wall time.
    pub fn advance(&mut self, seconds: f64) -> f64 {
        let delta = (seconds * self.bpm / 60.0).max(0.0);
        if delta.is_finite() {
            self.beats += delta;
        }
        self.beats
    }
}

impl Default for BeatClock {
    fn default() -> Self {
        Self::new(120.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_in_beats() {
        let mut clock = BeatClock::new(120.0);
        assert_eq!(clock.advance(0.5), 1.0);
        assert_eq!(clock.advance(1.0), 3.0);
    }

    #[test]
    fn never_runs_backwards() {
        let mut clock = BeatClock::new(90.0);
        clock.advance(2.0);
        let before = clock.beats();
        clock.advance(-1.0);
        clock.advance(f64::NAN);
        assert_eq!(clock.beats(), before);

        clock.reset();
        assert_eq!(clock.beats(), 0.0);
    }
}
