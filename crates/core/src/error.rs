use crate::{MapId, SignalId, SignalType};

/// Result alias that carries the custom [`LooperError`] type.
pub type Result<T> = std::result::Result<T, LooperError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum LooperError {
    /// Free-form failure surfaced to the caller as-is.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration files that fail to parse.
    #[error("invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),
    /// Configuration values outside their accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The handle does not refer to a live signal.
    #[error("unknown signal {0:?}")]
    UnknownSignal(SignalId),
    /// The handle does not refer to a live map.
    #[error("unknown map {0:?}")]
    UnknownMap(MapId),
    /// A signal with this name is already registered in the graph.
    #[error("signal `{0}` already exists")]
    DuplicateSignal(String),
    /// A value was written with an element type the signal does not carry.
    #[error("signal `{signal}` carries {expected:?} values, got {found:?}")]
    TypeMismatch {
        signal: String,
        expected: SignalType,
        found: SignalType,
    },
    /// A value was written with the wrong vector length.
    #[error("signal `{signal}` has vector length {expected}, got {found}")]
    LengthMismatch {
        signal: String,
        expected: usize,
        found: usize,
    },
    /// The engine did not report the map as ready within the poll budget.
    #[error("map {map:?} was not ready after {polls} polls")]
    MapNotReady { map: MapId, polls: u32 },
    /// The shared graph mutex was poisoned by a panicking holder.
    #[error("{0} has been poisoned")]
    Poisoned(&'static str),
}

impl LooperError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for LooperError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for LooperError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
