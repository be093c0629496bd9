//! In-process signal graph: typed signals, maps evaluated on write, a
//! readiness handshake for pushed maps and deferred bindings resolved while
//! polling.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::{
    BindingRegistry, LoopConfig, LoopInputs, LoopOperands, LoopState, LooperError,
    NetworkConfig, PendingBinding, Result, Route, Signal, SignalId, SignalSpec, SignalValue,
    LOOP_EXPRESSION,
};

/// Opaque handle to a map owned by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub(crate) u64);

/// Lifecycle of a map. Only ready maps are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    /// Created but not yet pushed.
    Staged,
    /// Pushed, waiting `remaining` more polls.
    Pending { remaining: u32 },
    Ready,
}

#[derive(Debug)]
pub enum MapKind {
    /// One-to-one copy with element conversion.
    Direct {
        source: SignalId,
        destination: SignalId,
    },
    /// The looper delay line.
    Loop {
        operands: LoopOperands,
        state: LoopState,
    },
}

#[derive(Debug)]
pub struct Map {
    id: MapId,
    kind: MapKind,
    state: MapState,
}

impl Map {
    pub fn id(&self) -> MapId {
        self.id
    }

    pub fn kind(&self) -> &MapKind {
        &self.kind
    }

    pub fn state(&self) -> MapState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == MapState::Ready
    }

    /// Source whose writes evaluate the map.
    pub fn trigger(&self) -> SignalId {
        match &self.kind {
            MapKind::Direct { source, .. } => *source,
            MapKind::Loop { operands, .. } => operands.send,
        }
    }

    pub fn destination(&self) -> SignalId {
        match &self.kind {
            MapKind::Direct { destination, .. } => *destination,
            MapKind::Loop { operands, .. } => operands.recv,
        }
    }

    /// Textual form of the map, in the expression language the loop map
    /// reproduces.
    pub fn expression(&self) -> &'static str {
        match &self.kind {
            MapKind::Direct { .. } => "y=x",
            MapKind::Loop { .. } => LOOP_EXPRESSION,
        }
    }

    fn references(&self, signal: SignalId) -> bool {
        match &self.kind {
            MapKind::Direct {
                source,
                destination,
            } => *source == signal || *destination == signal,
            MapKind::Loop { operands, .. } => operands.signals().contains(&signal),
        }
    }
}

/// What a call to [`Graph::poll`] accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Appearance events delivered.
    pub appeared: usize,
    /// Maps that became ready.
    pub maps_ready: usize,
    /// Deferred bindings turned into maps.
    pub bindings_resolved: usize,
}

/// The shared graph every device on a [`crate::Network`] talks to.
#[derive(Debug)]
pub struct Graph {
    config: NetworkConfig,
    next_id: u64,
    signals: BTreeMap<SignalId, Signal>,
    names: HashMap<String, SignalId>,
    maps: BTreeMap<MapId, Map>,
    appeared: VecDeque<SignalId>,
    bindings: BindingRegistry,
}

impl Graph {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            next_id: 1,
            signals: BTreeMap::new(),
            names: HashMap::new(),
            maps: BTreeMap::new(),
            appeared: VecDeque::new(),
            bindings: BindingRegistry::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn create_signal(&mut self, device: &str, spec: SignalSpec) -> Result<SignalId> {
        if self.names.contains_key(&spec.name) {
            return Err(LooperError::DuplicateSignal(spec.name));
        }
        if spec.length == 0 {
            return Err(LooperError::msg(format!(
                "signal `{}` needs a vector length of at least 1",
                spec.name
            )));
        }

        let id = SignalId(self.allocate_id());
        debug!(signal = %spec.name, device, length = spec.length, "created signal");
        self.names.insert(spec.name.clone(), id);
        self.signals.insert(id, Signal::new(id, device, spec));
        self.appeared.push_back(id);
        Ok(id)
    }

    /// Removes a signal together with every map and pending binding that
    /// refers to it.
    pub fn free_signal(&mut self, id: SignalId) -> Result<()> {
        let signal = self
            .signals
            .remove(&id)
            .ok_or(LooperError::UnknownSignal(id))?;
        self.names.remove(signal.name());
        self.maps.retain(|_, map| !map.references(id));
        self.appeared.retain(|pending| *pending != id);
        self.bindings.discard_local(id);
        debug!(signal = signal.name(), "freed signal");
        Ok(())
    }

    pub fn signal(&self, id: SignalId) -> Result<&Signal> {
        self.signals.get(&id).ok_or(LooperError::UnknownSignal(id))
    }

    pub fn signal_by_name(&self, name: &str) -> Option<SignalId> {
        self.names.get(name).copied()
    }

    pub fn signals(&self) -> impl Iterator<Item = &Signal> {
        self.signals.values()
    }

    pub fn value(&self, id: SignalId) -> Result<SignalValue> {
        Ok(self.signal(id)?.value().clone())
    }

    /// Writes a value and synchronously evaluates every ready map it
    /// triggers, following chains of maps until each signal has been
    /// written once.
    pub fn set_value(&mut self, id: SignalId, value: SignalValue) -> Result<()> {
        self.signals
            .get_mut(&id)
            .ok_or(LooperError::UnknownSignal(id))?
            .set_value(value)?;
        self.propagate(id)
    }

    pub fn create_direct_map(&mut self, source: SignalId, destination: SignalId) -> Result<MapId> {
        self.signal(source)?;
        self.signal(destination)?;
        Ok(self.insert_map(MapKind::Direct {
            source,
            destination,
        }))
    }

    pub fn create_loop_map(&mut self, operands: LoopOperands, config: &LoopConfig) -> Result<MapId> {
        for id in operands.signals() {
            self.signal(id)?;
        }
        let vector_len = self.signal(operands.recv)?.spec().length;
        let state = LoopState::new(vector_len, config.history_depth, config.seed);
        Ok(self.insert_map(MapKind::Loop { operands, state }))
    }

    /// Commits a staged map. It becomes ready after the configured number of
    /// polls.
    pub fn push_map(&mut self, id: MapId) -> Result<()> {
        let latency = self.config.map_ready_latency;
        let map = self.maps.get_mut(&id).ok_or(LooperError::UnknownMap(id))?;
        if map.state == MapState::Staged {
            map.state = if latency == 0 {
                MapState::Ready
            } else {
                MapState::Pending { remaining: latency }
            };
            debug!(map = ?id, expression = map.expression(), "pushed map");
        }
        Ok(())
    }

    pub fn map(&self, id: MapId) -> Result<&Map> {
        self.maps.get(&id).ok_or(LooperError::UnknownMap(id))
    }

    pub fn is_map_ready(&self, id: MapId) -> Result<bool> {
        Ok(self.map(id)?.is_ready())
    }

    pub fn map_count(&self) -> usize {
        self.maps.len()
    }

    pub fn maps(&self) -> impl Iterator<Item = &Map> {
        self.maps.values()
    }

    /// Registers a deferred connection between `local` and the signal named
    /// `remote`. A signal already known by that name resolves on the next
    /// poll.
    pub fn bind(&mut self, remote: &str, local: SignalId, route: Route) -> Result<()> {
        self.signal(local)?;
        self.bindings.register(remote, PendingBinding { local, route });
        if let Some(existing) = self.signal_by_name(remote) {
            if !self.appeared.contains(&existing) {
                self.appeared.push_back(existing);
            }
        }
        debug!(remote, ?route, "registered deferred binding");
        Ok(())
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    /// Advances pending maps and delivers appearance events, resolving any
    /// bindings that were waiting on them.
    pub fn poll(&mut self) -> PollSummary {
        let mut summary = PollSummary::default();

        for map in self.maps.values_mut() {
            if let MapState::Pending { remaining } = map.state {
                if remaining <= 1 {
                    map.state = MapState::Ready;
                    summary.maps_ready += 1;
                } else {
                    map.state = MapState::Pending {
                        remaining: remaining - 1,
                    };
                }
            }
        }

        while let Some(id) = self.appeared.pop_front() {
            let Some(name) = self.signals.get(&id).map(|s| s.name().to_owned()) else {
                continue;
            };
            summary.appeared += 1;
            for binding in self.bindings.take_matching(&name, id) {
                match self.resolve(id, binding) {
                    Ok(map) => {
                        info!(remote = %name, map = ?map, route = ?binding.route, "resolved deferred binding");
                        summary.bindings_resolved += 1;
                    }
                    Err(err) => warn!(remote = %name, %err, "could not resolve deferred binding"),
                }
            }
        }

        summary
    }

    fn resolve(&mut self, remote: SignalId, binding: PendingBinding) -> Result<MapId> {
        let map = match binding.route {
            Route::FromRemote => self.create_direct_map(remote, binding.local)?,
            Route::ToRemote => self.create_direct_map(binding.local, remote)?,
        };
        self.push_map(map)?;
        Ok(map)
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert_map(&mut self, kind: MapKind) -> MapId {
        let id = MapId(self.allocate_id());
        self.maps.insert(
            id,
            Map {
                id,
                kind,
                state: MapState::Staged,
            },
        );
        id
    }

    fn propagate(&mut self, origin: SignalId) -> Result<()> {
        let mut queue = VecDeque::from([origin]);
        let mut written = HashSet::from([origin]);

        while let Some(source) = queue.pop_front() {
            let triggered: Vec<MapId> = self
                .maps
                .values()
                .filter(|map| map.is_ready() && map.trigger() == source)
                .map(Map::id)
                .collect();

            for map in triggered {
                let (destination, value) = self.evaluate(map)?;
                self.signals
                    .get_mut(&destination)
                    .ok_or(LooperError::UnknownSignal(destination))?
                    .set_value(value)?;
                if written.insert(destination) {
                    queue.push_back(destination);
                }
            }
        }
        Ok(())
    }

    fn evaluate(&mut self, id: MapId) -> Result<(SignalId, SignalValue)> {
        let map = self.maps.get(&id).ok_or(LooperError::UnknownMap(id))?;
        match &map.kind {
            MapKind::Direct {
                source,
                destination,
            } => {
                let value = self
                    .signal(*source)?
                    .value()
                    .conform_onto(self.signal(*destination)?.value());
                Ok((*destination, value))
            }
            MapKind::Loop { operands, .. } => {
                let operands = *operands;
                let send = self.signal(operands.send)?.value().to_f64_vec();
                let length = self.signal(operands.length)?.value().scalar();
                let division = self.signal(operands.division)?.value().scalar();
                let record = self.signal(operands.record)?.value().scalar();
                let modulation = self.signal(operands.modulation)?.value().scalar();
                let base = self.signal(operands.recv)?.value().clone();

                let Some(MapKind::Loop { state, .. }) =
                    self.maps.get_mut(&id).map(|map| &mut map.kind)
                else {
                    return Err(LooperError::UnknownMap(id));
                };
                let samples = state.evaluate(&LoopInputs {
                    length,
                    division,
                    record,
                    modulation,
                    send: &send,
                });
                let value =
                    SignalValue::from_f64(base.element_type(), &samples).conform_onto(&base);
                Ok((operands.recv, value))
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, SignalType};

    fn float_signal(graph: &mut Graph, name: &str, length: usize) -> SignalId {
        graph
            .create_signal(
                "test",
                SignalSpec::new(name, Direction::Out, SignalType::Float, length),
            )
            .unwrap()
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut graph = Graph::default();
        float_signal(&mut graph, "a", 1);
        let err = graph
            .create_signal(
                "other",
                SignalSpec::new("a", Direction::In, SignalType::Int, 1),
            )
            .unwrap_err();
        assert!(matches!(err, LooperError::DuplicateSignal(name) if name == "a"));
    }

    #[test]
    fn maps_wait_for_readiness() {
        let mut graph = Graph::new(NetworkConfig {
            map_ready_latency: 3,
        });
        let a = float_signal(&mut graph, "a", 1);
        let b = float_signal(&mut graph, "b", 1);
        let map = graph.create_direct_map(a, b).unwrap();

        graph.poll();
        assert_eq!(graph.map(map).unwrap().state(), MapState::Staged);

        graph.push_map(map).unwrap();
        graph.set_value(a, SignalValue::float(0.5)).unwrap();
        assert_eq!(graph.value(b).unwrap(), SignalValue::float(0.0));

        graph.poll();
        graph.poll();
        assert!(!graph.is_map_ready(map).unwrap());
        assert_eq!(graph.poll().maps_ready, 1);

        graph.set_value(a, SignalValue::float(0.75)).unwrap();
        assert_eq!(graph.value(b).unwrap(), SignalValue::float(0.75));
    }

    #[test]
    fn propagates_through_chains_without_looping_forever() {
        let mut graph = Graph::new(NetworkConfig {
            map_ready_latency: 0,
        });
        let a = float_signal(&mut graph, "a", 1);
        let b = float_signal(&mut graph, "b", 1);
        let c = float_signal(&mut graph, "c", 1);
        for (src, dst) in [(a, b), (b, c), (c, a)] {
            let map = graph.create_direct_map(src, dst).unwrap();
            graph.push_map(map).unwrap();
        }

        graph.set_value(a, SignalValue::float(0.25)).unwrap();
        assert_eq!(graph.value(c).unwrap(), SignalValue::float(0.25));
    }

    #[test]
    fn freeing_a_signal_drops_its_maps() {
        let mut graph = Graph::default();
        let a = float_signal(&mut graph, "a", 1);
        let b = float_signal(&mut graph, "b", 1);
        graph.create_direct_map(a, b).unwrap();
        assert_eq!(graph.map_count(), 1);

        graph.free_signal(b).unwrap();
        assert_eq!(graph.map_count(), 0);
        assert!(graph.signal_by_name("b").is_none());
        assert!(matches!(
            graph.free_signal(b),
            Err(LooperError::UnknownSignal(_))
        ));
    }

    #[test]
    fn resolves_binding_when_signal_appears() {
        let mut graph = Graph::new(NetworkConfig {
            map_ready_latency: 0,
        });
        let local = float_signal(&mut graph, "loop/input", 1);
        graph.poll();

        graph.bind("ctl/fader", local, Route::FromRemote).unwrap();
        assert_eq!(graph.poll().bindings_resolved, 0);

        let fader = float_signal(&mut graph, "ctl/fader", 1);
        let summary = graph.poll();
        assert_eq!(summary.bindings_resolved, 1);
        assert_eq!(graph.map_count(), 1);

        graph.set_value(fader, SignalValue::float(0.6)).unwrap();
        assert_eq!(graph.value(local).unwrap(), SignalValue::float(0.6));
    }

    #[test]
    fn binding_to_existing_signal_resolves_on_next_poll() {
        let mut graph = Graph::default();
        let remote = float_signal(&mut graph, "synth/pitch", 1);
        let local = float_signal(&mut graph, "loop/output", 1);
        graph.poll();

        graph.bind("synth/pitch", local, Route::ToRemote).unwrap();
        assert_eq!(graph.poll().bindings_resolved, 1);
        let map = graph.maps().next().unwrap();
        assert_eq!(map.trigger(), local);
        assert_eq!(map.destination(), remote);
    }
}
