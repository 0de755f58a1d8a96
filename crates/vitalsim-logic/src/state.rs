//! Flat name → value state store and capability-scoped read views.
//!
//! The model is schema-less: keys come into existence the first time any
//! component writes them. Iteration order is the key order of a `BTreeMap`,
//! so snapshots print and serialize deterministically.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A set of named values, used for slices, deltas and snapshots.
pub type StateMap = BTreeMap<String, f64>;

/// A declared set of keys (owned, input, output or affected).
pub type KeySet = BTreeSet<String>;

/// Build a [`KeySet`] from anything yielding string-like keys.
pub fn key_set<I, S>(keys: I) -> KeySet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    keys.into_iter().map(Into::into).collect()
}

/// Build a [`StateMap`] from `(key, value)` pairs.
pub fn state_map<I, S>(pairs: I) -> StateMap
where
    I: IntoIterator<Item = (S, f64)>,
    S: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Split `values` into the entries whose keys are in `allowed` and the names
/// of the keys that were not.
pub fn partition_declared(values: StateMap, allowed: &KeySet) -> (StateMap, Vec<String>) {
    let mut kept = StateMap::new();
    let mut discarded = Vec::new();
    for (key, value) in values {
        if allowed.contains(&key) {
            kept.insert(key, value);
        } else {
            discarded.push(key);
        }
    }
    (kept, discarded)
}

/// The authoritative key/value state of a simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateStore {
    values: StateMap,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Full snapshot of every key.
    pub fn as_map(&self) -> &StateMap {
        &self.values
    }

    /// Absolute write. Creates the key if absent.
    pub fn replace(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    /// Additive write. An absent key is created holding exactly `delta`.
    pub fn add(&mut self, key: impl Into<String>, delta: f64) {
        *self.values.entry(key.into()).or_insert(0.0) += delta;
    }

    /// Insert a default only if the key is absent. Returns whether it seeded.
    pub fn seed(&mut self, key: impl Into<String>, value: f64) -> bool {
        use std::collections::btree_map::Entry;
        match self.values.entry(key.into()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn merge_replace(&mut self, values: StateMap) {
        self.values.extend(values);
    }

    /// Add every delta in `deltas`, multiplied by `scale`.
    pub fn merge_add(&mut self, deltas: &StateMap, scale: f64) {
        for (key, delta) in deltas {
            self.add(key.clone(), delta * scale);
        }
    }

    /// Values for those of `keys` currently present.
    pub fn subset<'k>(&self, keys: impl IntoIterator<Item = &'k String>) -> StateMap {
        keys.into_iter()
            .filter_map(|k| self.get(k).map(|v| (k.clone(), v)))
            .collect()
    }
}

impl From<StateMap> for StateStore {
    fn from(values: StateMap) -> Self {
        Self { values }
    }
}

/// Read-only view of a [`StateStore`] restricted to a declared key set.
///
/// Components only ever see the store through one of these. A read outside
/// the declared scope yields `None`, exactly as if the key did not exist.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    store: &'a StateStore,
    scope: &'a KeySet,
}

impl<'a> StateView<'a> {
    pub fn new(store: &'a StateStore, scope: &'a KeySet) -> Self {
        Self { store, scope }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        if !self.scope.contains(key) {
            log::debug!("read of undeclared key {key} denied");
            return None;
        }
        self.store.get(key)
    }

    pub fn get_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn scope(&self) -> &KeySet {
        self.scope
    }

    /// Present values for every declared key.
    pub fn slice(&self) -> StateMap {
        self.store.subset(self.scope)
    }
}
