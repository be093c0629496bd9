//! Native replacement for the loop map expression.
//!
//! The engine keeps a zero-initialized history of the destination vector and
//! evaluates, per element,
//!
//! ```text
//! del  = length * division
//! y[n] = record * x[n] + (1 - record) * y{-del} + modulation * (uniform(2.0) - 1)
//! ```
//!
//! once for every write to the trigger source `x`. `y{-d}` is the value the
//! map produced `d` evaluations earlier; `d` is clamped to
//! `[1, history_depth]` and fractional delays interpolate linearly.
//!
//! The noise term is not gated by `record`: with `modulation > 0` replayed
//! material keeps drifting on every pass, not only while recording.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::SignalId;

/// Expression whose behaviour [`LoopState`] reproduces, kept as the map's
/// descriptive label.
pub const LOOP_EXPRESSION: &str =
    "del=_%x*_%x;%y=_%x*%x+(1-_%x)*y{-del,100}+_%x*(uniform(2.0)-1)";

/// Signals wired into a loop map, in the operand order of
/// [`LOOP_EXPRESSION`]: length, division, destination, record, trigger
/// source, record, modulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOperands {
    pub length: SignalId,
    pub division: SignalId,
    /// Destination `y`.
    pub recv: SignalId,
    pub record: SignalId,
    /// Trigger source `x`. Only writes to this signal evaluate the map.
    pub send: SignalId,
    pub modulation: SignalId,
}

impl LoopOperands {
    /// Every signal the map reads or writes.
    pub fn signals(&self) -> [SignalId; 6] {
        [
            self.length,
            self.division,
            self.recv,
            self.record,
            self.send,
            self.modulation,
        ]
    }
}

/// Operand values sampled at evaluation time.
#[derive(Debug, Clone, Copy)]
pub struct LoopInputs<'a> {
    pub length: f64,
    pub division: f64,
    pub record: f64,
    pub modulation: f64,
    pub send: &'a [f64],
}

/// Per-map state: the replay history and the modulation noise source.
pub struct LoopState {
    history: Vec<Vec<f64>>,
    head: usize,
    vector_len: usize,
    rng: StdRng,
}

impl LoopState {
    pub fn new(vector_len: usize, history_depth: usize, seed: Option<u64>) -> Self {
        let depth = history_depth.max(1);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            history: vec![vec![0.0; vector_len]; depth],
            head: 0,
            vector_len,
            rng,
        }
    }

    pub fn history_depth(&self) -> usize {
        self.history.len()
    }

    pub fn vector_len(&self) -> usize {
        self.vector_len
    }

    /// Runs one evaluation and records the result in the history.
    pub fn evaluate(&mut self, inputs: &LoopInputs<'_>) -> Vec<f64> {
        let delay = inputs.length * inputs.division;
        let mut output = Vec::with_capacity(self.vector_len);
        for element in 0..self.vector_len {
            let x = inputs.send.get(element).copied().unwrap_or(0.0);
            let replay = self.delayed(delay, element);
            let noise = self.rng.gen_range(0.0..2.0) - 1.0;
            output.push(
                inputs.record * x + (1.0 - inputs.record) * replay + inputs.modulation * noise,
            );
        }

        self.history[self.head].clone_from(&output);
        self.head = (self.head + 1) % self.history.len();
        output
    }

    /// Value of `element` as produced `delay` evaluations ago.
    fn delayed(&self, delay: f64, element: usize) -> f64 {
        let depth = self.history.len();
        let delay = if delay.is_finite() {
            delay.clamp(1.0, depth as f64)
        } else {
            1.0
        };
        let lower = delay.floor() as usize;
        let fraction = delay - lower as f64;
        let near = self.past(lower, element);
        if fraction == 0.0 {
            return near;
        }
        let far = self.past((lower + 1).min(depth), element);
        near + (far - near) * fraction
    }

    /// `lag` in `1..=depth`; 1 is the most recent evaluation.
    fn past(&self, lag: usize, element: usize) -> f64 {
        let depth = self.history.len();
        let index = (self.head + depth - lag) % depth;
        self.history[index][element]
    }
}

impl std::fmt::Debug for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopState")
            .field("history_depth", &self.history.len())
            .field("head", &self.head)
            .field("vector_len", &self.vector_len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(send: &[f64], record: f64, delay: f64) -> LoopInputs<'_> {
        LoopInputs {
            length: delay,
            division: 1.0,
            record,
            modulation: 0.0,
            send,
        }
    }

    #[test]
    fn recording_passes_input_through() {
        let mut state = LoopState::new(2, 100, Some(1));
        let out = state.evaluate(&inputs(&[0.25, -0.5], 1.0, 4.0));
        assert_eq!(out, vec![0.25, -0.5]);
    }

    #[test]
    fn replays_after_delay() {
        let mut state = LoopState::new(1, 100, Some(1));
        for step in 1..=4 {
            state.evaluate(&inputs(&[step as f64], 1.0, 4.0));
        }
        let replay: Vec<f64> = (0..8)
            .map(|_| state.evaluate(&inputs(&[99.0], 0.0, 4.0))[0])
            .collect();
        assert_eq!(replay, vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn history_starts_silent() {
        let mut state = LoopState::new(1, 100, Some(1));
        let out = state.evaluate(&inputs(&[5.0], 0.0, 16.0));
        assert_eq!(out, vec![0.0]);
    }

    #[test]
    fn clamps_delay_to_history_depth() {
        let mut state = LoopState::new(1, 3, Some(1));
        for step in 1..=3 {
            state.evaluate(&inputs(&[step as f64], 1.0, 1.0));
        }
        let out = state.evaluate(&inputs(&[0.0], 0.0, 500.0));
        assert_eq!(out, vec![1.0]);

        let mut state = LoopState::new(1, 3, Some(1));
        state.evaluate(&inputs(&[7.0], 1.0, 1.0));
        let out = state.evaluate(&inputs(&[0.0], 0.0, 0.0));
        assert_eq!(out, vec![7.0]);
    }

    #[test]
    fn interpolates_fractional_delay() {
        let mut state = LoopState::new(1, 10, Some(1));
        state.evaluate(&inputs(&[2.0], 1.0, 1.0));
        state.evaluate(&inputs(&[4.0], 1.0, 1.0));
        let out = state.evaluate(&inputs(&[0.0], 0.0, 1.5));
        assert_eq!(out, vec![3.0]);
    }

    #[test]
    fn modulation_stays_within_weight() {
        let mut state = LoopState::new(4, 100, Some(42));
        for _ in 0..64 {
            let out = state.evaluate(&LoopInputs {
                length: 1.0,
                division: 16.0,
                record: 1.0,
                modulation: 0.1,
                send: &[0.5, 0.5, 0.5, 0.5],
            });
            assert!(out.iter().all(|v| (v - 0.5).abs() <= 0.1));
        }
    }

    #[test]
    fn replay_drifts_under_modulation() {
        let mut state = LoopState::new(1, 4, Some(3));
        let drifted = (0..16).any(|_| {
            let out = state.evaluate(&LoopInputs {
                length: 4.0,
                division: 1.0,
                record: 0.0,
                modulation: 0.5,
                send: &[0.0],
            });
            out[0] != 0.0
        });
        assert!(drifted);
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let run = |seed| {
            let mut state = LoopState::new(1, 8, Some(seed));
            (0..8)
                .map(|_| {
                    state.evaluate(&LoopInputs {
                        length: 1.0,
                        division: 1.0,
                        record: 1.0,
                        modulation: 1.0,
                        send: &[0.0],
                    })[0]
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(9), run(9));
    }
}
