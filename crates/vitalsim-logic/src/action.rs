//! Named, parameterized perturbations applied on demand.
//!
//! Performing an action adds its delta once. When the action has a positive
//! duration the orchestrator also records a [`LedgerEntry`]; on every later
//! step the delta is recomputed from the current state and added again,
//! scaled by the fraction of the duration still remaining. Repeated
//! performances of the same action stack as independent entries.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::scenario::TIME_TOLERANCE;
use crate::state::{partition_declared, KeySet, StateMap, StateStore, StateView};

/// Free-form keyword parameters passed to [`Action::apply`].
pub type ActionParams = serde_json::Map<String, Value>;

/// Numeric parameter lookup with a default for absent or non-numeric values.
pub fn param_f64(params: &ActionParams, key: &str, default: f64) -> f64 {
    params.get(key).and_then(Value::as_f64).unwrap_or(default)
}

pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> String;

    /// Keys the delta may touch. Other keys in the delta are discarded.
    fn affected_keys(&self) -> KeySet;

    /// Keys the action expects to read.
    fn required_keys(&self) -> KeySet {
        self.affected_keys()
    }

    /// Length of the decaying continuation; `0` means instantaneous only.
    fn duration(&self) -> f64 {
        0.0
    }

    /// Keys reported back to the caller after the action is performed.
    fn observable_keys(&self) -> KeySet {
        self.affected_keys()
    }

    /// Compute the additive delta for the current state.
    fn apply(&self, state: &StateView<'_>, params: &ActionParams) -> Result<StateMap>;
}

/// Everything an action may read: required plus affected keys.
pub fn read_scope(action: &dyn Action) -> KeySet {
    let mut scope = action.required_keys();
    scope.extend(action.affected_keys());
    scope
}

/// Compute `action`'s delta against `store` and add it scaled by `scale`.
///
/// Returns the committed (unscaled) delta.
pub(crate) fn commit_delta(
    action: &dyn Action,
    scope: &KeySet,
    affected: &KeySet,
    params: &ActionParams,
    store: &mut StateStore,
    scale: f64,
) -> Result<StateMap> {
    let delta = {
        let view = StateView::new(store, scope);
        action.apply(&view, params)?
    };
    let (delta, discarded) = partition_declared(delta, affected);
    if !discarded.is_empty() {
        log::warn!(
            "action {} returned undeclared keys {:?}; discarded",
            action.name(),
            discarded
        );
    }
    store.merge_add(&delta, scale);
    Ok(delta)
}

/// One in-progress durable effect.
#[derive(Clone)]
pub struct LedgerEntry {
    action: Arc<dyn Action>,
    scope: KeySet,
    affected: KeySet,
    params: ActionParams,
    duration: f64,
    elapsed_time: f64,
}

impl LedgerEntry {
    pub fn new(action: Arc<dyn Action>, params: ActionParams) -> Self {
        let scope = read_scope(action.as_ref());
        let affected = action.affected_keys();
        let duration = action.duration();
        Self {
            action,
            scope,
            affected,
            params,
            duration,
            elapsed_time: 0.0,
        }
    }

    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }

    pub fn params(&self) -> &ActionParams {
        &self.params
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    /// `(duration - elapsed) / duration`, never negative.
    pub fn remaining_fraction(&self) -> f64 {
        ((self.duration - self.elapsed_time) / self.duration).max(0.0)
    }

    /// Whether the duration has elapsed, within [`TIME_TOLERANCE`].
    pub fn is_finished(&self) -> bool {
        self.elapsed_time >= self.duration - TIME_TOLERANCE
    }
}

impl fmt::Debug for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerEntry")
            .field("action", &self.name())
            .field("elapsed_time", &self.elapsed_time)
            .field("duration", &self.duration)
            .field("params", &self.params)
            .finish()
    }
}

/// In-progress durable action effects, one entry per performance.
#[derive(Debug, Clone, Default)]
pub struct ActionLedger {
    entries: Vec<LedgerEntry>,
}

impl ActionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Advance every entry by `dt`: drop finished ones, add the rest's
    /// recomputed delta scaled by the remaining fraction.
    ///
    /// Stops at the first failing action. Entries before it have already
    /// been advanced and committed.
    pub fn advance(&mut self, store: &mut StateStore, dt: f64) -> Result<()> {
        let mut i = 0;
        while i < self.entries.len() {
            let entry = &mut self.entries[i];
            entry.elapsed_time += dt;
            if entry.is_finished() {
                log::info!("action {} effect ended", entry.name());
                self.entries.remove(i);
                continue;
            }
            let fraction = entry.remaining_fraction();
            commit_delta(
                entry.action.as_ref(),
                &entry.scope,
                &entry.affected,
                &entry.params,
                store,
                fraction,
            )?;
            i += 1;
        }
        Ok(())
    }
}
