use serde::{Deserialize, Serialize};

use crate::{LooperError, Result};

/// Opaque handle to a signal living in the shared graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub(crate) u64);

/// Whether a signal is consumed or produced by its owning device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// Element type carried by every slot of a signal vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    /// 32-bit floating point.
    Float,
    /// 32-bit signed integer.
    Int,
}

/// Declaration used when creating a signal.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub name: String,
    pub direction: Direction,
    pub element_type: SignalType,
    pub length: usize,
    pub unit: Option<String>,
    pub range: Option<(f64, f64)>,
}

impl SignalSpec {
    pub fn new(
        name: impl Into<String>,
        direction: Direction,
        element_type: SignalType,
        length: usize,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            element_type,
            length,
            unit: None,
            range: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }
}

/// Tagged vector value. The tag and the vector length are checked against
/// the destination signal on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalValue {
    Float(Vec<f32>),
    Int(Vec<i32>),
}

impl SignalValue {
    /// A zero vector of the given type and length.
    pub fn zeros(element_type: SignalType, length: usize) -> Self {
        match element_type {
            SignalType::Float => Self::Float(vec![0.0; length]),
            SignalType::Int => Self::Int(vec![0; length]),
        }
    }

    pub fn float(value: f32) -> Self {
        Self::Float(vec![value])
    }

    pub fn int(value: i32) -> Self {
        Self::Int(vec![value])
    }

    /// Builds a value of `element_type` from wide samples. Integer
    /// destinations round to the nearest value.
    pub fn from_f64(element_type: SignalType, samples: &[f64]) -> Self {
        match element_type {
            SignalType::Float => Self::Float(samples.iter().map(|s| *s as f32).collect()),
            SignalType::Int => Self::Int(samples.iter().map(|s| s.round() as i32).collect()),
        }
    }

    pub fn element_type(&self) -> SignalType {
        match self {
            Self::Float(_) => SignalType::Float,
            Self::Int(_) => SignalType::Int,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Float(values) => values.len(),
            Self::Int(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index` widened to `f64`.
    pub fn get(&self, index: usize) -> Option<f64> {
        match self {
            Self::Float(values) => values.get(index).map(|v| f64::from(*v)),
            Self::Int(values) => values.get(index).map(|v| f64::from(*v)),
        }
    }

    /// First element, or zero for an empty vector. Scalar controls are read
    /// through this.
    pub fn scalar(&self) -> f64 {
        self.get(0).unwrap_or(0.0)
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }

    /// Converts into a value shaped like `element_type` × `length`, copying
    /// the overlapping prefix onto `base` and keeping `base` elsewhere.
    pub(crate) fn conform_onto(&self, base: &SignalValue) -> SignalValue {
        let mut samples = base.to_f64_vec();
        for (slot, sample) in samples.iter_mut().zip(self.to_f64_vec()) {
            *slot = sample;
        }
        SignalValue::from_f64(base.element_type(), &samples)
    }
}

/// A signal as stored by the graph.
#[derive(Debug, Clone)]
pub struct Signal {
    id: SignalId,
    device: String,
    spec: SignalSpec,
    value: SignalValue,
}

impl Signal {
    pub(crate) fn new(id: SignalId, device: impl Into<String>, spec: SignalSpec) -> Self {
        let value = SignalValue::zeros(spec.element_type, spec.length);
        Self {
            id,
            device: device.into(),
            spec,
            value,
        }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Name of the device that declared the signal.
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn spec(&self) -> &SignalSpec {
        &self.spec
    }

    pub fn value(&self) -> &SignalValue {
        &self.value
    }

    pub(crate) fn set_value(&mut self, value: SignalValue) -> Result<()> {
        if value.element_type() != self.spec.element_type {
            return Err(LooperError::TypeMismatch {
                signal: self.spec.name.clone(),
                expected: self.spec.element_type,
                found: value.element_type(),
            });
        }
        if value.len() != self.spec.length {
            return Err(LooperError::LengthMismatch {
                signal: self.spec.name.clone(),
                expected: self.spec.length,
                found: value.len(),
            });
        }
        self.value = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(element_type: SignalType, length: usize) -> Signal {
        Signal::new(
            SignalId(1),
            "dev",
            SignalSpec::new("dev/sig", Direction::Out, element_type, length),
        )
    }

    #[test]
    fn starts_zeroed() {
        let sig = signal(SignalType::Int, 3);
        assert_eq!(sig.value(), &SignalValue::Int(vec![0, 0, 0]));
    }

    #[test]
    fn rejects_wrong_type() {
        let mut sig = signal(SignalType::Float, 1);
        let err = sig.set_value(SignalValue::int(1)).unwrap_err();
        assert!(matches!(err, LooperError::TypeMismatch { .. }));
        assert_eq!(sig.value(), &SignalValue::float(0.0));
    }

    #[test]
    fn rejects_wrong_length() {
        let mut sig = signal(SignalType::Float, 2);
        let err = sig.set_value(SignalValue::float(1.0)).unwrap_err();
        assert!(format!("{err}").contains("vector length 2"));
    }

    #[test]
    fn conforms_across_types_and_lengths() {
        let src = SignalValue::Float(vec![1.6, 2.2, 9.0]);
        let base = SignalValue::Int(vec![7, 7]);
        assert_eq!(src.conform_onto(&base), SignalValue::Int(vec![2, 2]));

        let short = SignalValue::Int(vec![4]);
        let base = SignalValue::Float(vec![0.5, 0.5]);
        assert_eq!(short.conform_onto(&base), SignalValue::Float(vec![4.0, 0.5]));
    }

    #[test]
    fn scalar_of_empty_is_zero() {
        assert_eq!(SignalValue::Float(Vec::new()).scalar(), 0.0);
    }
}
