//! Core library for MapLooper.
//!
//! A [`LoopUnit`] is a live-looping control unit for a network of digital
//! musical instruments. It lives on a [`Device`] attached to a shared
//! [`Network`] graph of named, typed, vector-valued signals. The unit records
//! its input into a delay line evaluated by the graph, replays it with
//! optional stochastic modulation, and binds itself to remote signals by name
//! as they appear.

pub mod bindings;
pub mod config;
pub mod device;
pub mod error;
pub mod graph;
pub mod looper;
pub mod signal;
pub mod transport;
pub mod unit;

pub use bindings::{BindingRegistry, PendingBinding, Route};
pub use config::{AppConfig, ControlDefaults, LoopConfig, NetworkConfig, ReadinessConfig};
pub use device::{Device, Network};
pub use error::{LooperError, Result};
pub use graph::{Graph, Map, MapId, MapKind, MapState, PollSummary};
pub use looper::{LoopInputs, LoopOperands, LoopState, LOOP_EXPRESSION};
pub use signal::{Direction, Signal, SignalId, SignalSpec, SignalType, SignalValue};
pub use transport::BeatClock;
pub use unit::{LoopUnit, TickReport};
