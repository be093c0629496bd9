use std::collections::HashMap;

use crate::SignalId;

/// Direction of a deferred connection relative to the local signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Remote signal feeds the local one.
    FromRemote,
    /// Local signal feeds the remote one.
    ToRemote,
}

/// A connection waiting for its remote signal to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingBinding {
    pub local: SignalId,
    pub route: Route,
}

/// Pending bindings keyed by the exact remote signal name. Entries are
/// removed when they resolve, so each binding fires at most once.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    pending: HashMap<String, Vec<PendingBinding>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, remote: impl Into<String>, binding: PendingBinding) {
        self.pending.entry(remote.into()).or_default().push(binding);
    }

    /// Removes and returns the bindings waiting on `remote`, except those
    /// whose local signal is `candidate` itself.
    pub fn take_matching(&mut self, remote: &str, candidate: SignalId) -> Vec<PendingBinding> {
        let Some(waiting) = self.pending.get_mut(remote) else {
            return Vec::new();
        };
        let (matched, kept): (Vec<_>, Vec<_>) =
            waiting.drain(..).partition(|binding| binding.local != candidate);
        *waiting = kept;
        if waiting.is_empty() {
            self.pending.remove(remote);
        }
        matched
    }

    /// Drops every binding that targets a freed local signal.
    pub fn discard_local(&mut self, local: SignalId) {
        self.pending.retain(|_, waiting| {
            waiting.retain(|binding| binding.local != local);
            !waiting.is_empty()
        });
    }

    pub fn is_pending(&self, remote: &str) -> bool {
        self.pending.contains_key(remote)
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(local: u64) -> PendingBinding {
        PendingBinding {
            local: SignalId(local),
            route: Route::FromRemote,
        }
    }

    #[test]
    fn takes_each_binding_once() {
        let mut registry = BindingRegistry::new();
        registry.register("synth/pitch", binding(1));

        assert_eq!(registry.take_matching("synth/pitch", SignalId(9)), vec![binding(1)]);
        assert!(registry.take_matching("synth/pitch", SignalId(9)).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn names_match_exactly() {
        let mut registry = BindingRegistry::new();
        registry.register("synth/pitch", binding(1));

        assert!(registry.take_matching("Synth/pitch", SignalId(9)).is_empty());
        assert!(registry.take_matching("synth/*", SignalId(9)).is_empty());
        assert!(registry.is_pending("synth/pitch"));
    }

    #[test]
    fn never_matches_its_own_local_signal() {
        let mut registry = BindingRegistry::new();
        registry.register("loop/input", binding(4));

        assert!(registry.take_matching("loop/input", SignalId(4)).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn discards_bindings_of_freed_signals() {
        let mut registry = BindingRegistry::new();
        registry.register("a", binding(1));
        registry.register("a", binding(2));
        registry.register("b", binding(1));

        registry.discard_local(SignalId(1));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_pending("b"));
    }
}
