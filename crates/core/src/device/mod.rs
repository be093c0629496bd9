use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    Graph, LoopConfig, LoopOperands, LooperError, MapId, NetworkConfig, PollSummary, Result,
    Route, SignalId, SignalSpec, SignalValue,
};

/// Shared signal graph that every [`Device`] on the network attaches to.
#[derive(Clone)]
pub struct Network {
    graph: Arc<Mutex<Graph>>,
}

impl Network {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            graph: Arc::new(Mutex::new(Graph::new(config))),
        }
    }

    /// Attaches a named device to the network.
    pub fn device(&self, name: impl Into<String>) -> Device {
        Device {
            name: name.into(),
            graph: self.graph.clone(),
        }
    }

    /// Delivers pending graph events. Must be driven by the surrounding
    /// transport loop.
    pub fn poll(&self) -> Result<PollSummary> {
        Ok(self.lock()?.poll())
    }

    pub fn map_count(&self) -> Result<usize> {
        Ok(self.lock()?.map_count())
    }

    pub fn signal_by_name(&self, name: &str) -> Result<Option<SignalId>> {
        Ok(self.lock()?.signal_by_name(name))
    }

    pub fn value(&self, id: SignalId) -> Result<SignalValue> {
        self.lock()?.value(id)
    }

    pub fn set_value(&self, id: SignalId, value: SignalValue) -> Result<()> {
        self.lock()?.set_value(id, value)
    }

    /// Runs `f` with exclusive access to the graph.
    pub fn with_graph<T>(&self, f: impl FnOnce(&mut Graph) -> T) -> Result<T> {
        let mut graph = self.lock()?;
        Ok(f(&mut *graph))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Graph>> {
        lock_graph(&self.graph)
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network").finish()
    }
}

/// A named participant on a [`Network`]. Signals created through a device
/// are tagged with its name.
#[derive(Clone)]
pub struct Device {
    name: String,
    graph: Arc<Mutex<Graph>>,
}

impl Device {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create_signal(&self, spec: SignalSpec) -> Result<SignalId> {
        self.lock()?.create_signal(&self.name, spec)
    }

    pub fn free_signal(&self, id: SignalId) -> Result<()> {
        self.lock()?.free_signal(id)
    }

    pub fn value(&self, id: SignalId) -> Result<SignalValue> {
        self.lock()?.value(id)
    }

    pub fn set_value(&self, id: SignalId, value: SignalValue) -> Result<()> {
        self.lock()?.set_value(id, value)
    }

    pub fn create_loop_map(&self, operands: LoopOperands, config: &LoopConfig) -> Result<MapId> {
        self.lock()?.create_loop_map(operands, config)
    }

    pub fn create_direct_map(&self, source: SignalId, destination: SignalId) -> Result<MapId> {
        self.lock()?.create_direct_map(source, destination)
    }

    pub fn push_map(&self, id: MapId) -> Result<()> {
        self.lock()?.push_map(id)
    }

    pub fn is_map_ready(&self, id: MapId) -> Result<bool> {
        self.lock()?.is_map_ready(id)
    }

    /// Registers a deferred connection; see [`Graph::bind`].
    pub fn bind(&self, remote: &str, local: SignalId, route: Route) -> Result<()> {
        self.lock()?.bind(remote, local, route)
    }

    pub fn poll(&self) -> Result<PollSummary> {
        Ok(self.lock()?.poll())
    }

    /// Runs `f` with exclusive access to the graph.
    pub fn with_graph<T>(&self, f: impl FnOnce(&mut Graph) -> T) -> Result<T> {
        let mut graph = self.lock()?;
        Ok(f(&mut *graph))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Graph>> {
        lock_graph(&self.graph)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").field("name", &self.name).finish()
    }
}

fn lock_graph(graph: &Mutex<Graph>) -> Result<MutexGuard<'_, Graph>> {
    graph
        .lock()
        .map_err(|_| LooperError::Poisoned("signal graph"))
}
