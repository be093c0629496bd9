use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{LooperError, Result, SignalType};

/// Declared range of the `length` control, in beats.
pub const LENGTH_RANGE: (f64, f64) = (0.0, 100.0);
/// Declared range of the `division` control, in pulses per quarter note.
pub const DIVISION_RANGE: (f64, f64) = (1.0, 96.0);

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub looper: LoopConfig,
}

impl AppConfig {
    pub fn from_json_str(source: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.looper.validate()
    }
}

/// Behaviour of the in-process signal graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Number of polls a pushed map waits before it reports ready.
    pub map_ready_latency: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            map_ready_latency: 1,
        }
    }
}

/// Configuration of a single loop unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub element_type: SignalType,
    pub vector_len: usize,
    pub defaults: ControlDefaults,
    /// Depth of the replay history, in steps.
    pub history_depth: usize,
    pub readiness: ReadinessConfig,
    /// Seed for the modulation noise. Entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            element_type: SignalType::Float,
            vector_len: 1,
            defaults: ControlDefaults::default(),
            history_depth: 100,
            readiness: ReadinessConfig::default(),
            seed: None,
        }
    }
}

impl LoopConfig {
    pub fn new(element_type: SignalType, vector_len: usize) -> Self {
        Self {
            element_type,
            vector_len,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.vector_len == 0 {
            return Err(LooperError::InvalidConfig(
                "vector_len must be at least 1".into(),
            ));
        }
        if self.history_depth == 0 {
            return Err(LooperError::InvalidConfig(
                "history_depth must be at least 1".into(),
            ));
        }
        if self.readiness.max_polls == 0 {
            return Err(LooperError::InvalidConfig(
                "readiness.max_polls must be at least 1".into(),
            ));
        }
        check_range("defaults.length", self.defaults.length, LENGTH_RANGE)?;
        check_range("defaults.division", self.defaults.division, DIVISION_RANGE)
    }
}

/// Values written to `length` and `division` once the loop map is ready.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlDefaults {
    pub length: f32,
    pub division: f32,
}

impl Default for ControlDefaults {
    fn default() -> Self {
        Self {
            length: 1.0,
            division: 16.0,
        }
    }
}

/// Bound on the readiness handshake performed during construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub max_polls: u32,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self { max_polls: 500 }
    }
}

fn check_range(field: &str, value: f32, (min, max): (f64, f64)) -> Result<()> {
    let value = f64::from(value);
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(LooperError::InvalidConfig(format!(
            "{field} = {value} is outside [{min}, {max}]"
        )))
    }
}
