//! Solver contract: exclusive write authority over a disjoint key subset.
//!
//! A solver is advanced once per step from the pre-step snapshot. It sees
//! only its own keys and never observes another solver's output until the
//! next step, which is what makes the solve phase safe to run in parallel.

use crate::error::Result;
use crate::state::{KeySet, StateMap, StateView};

pub trait Solver: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Starting values for every owned key.
    fn initial_state(&self) -> StateMap;

    /// Keys this solver exclusively writes. Defaults to the keys of
    /// [`Solver::initial_state`].
    fn owned_keys(&self) -> KeySet {
        self.initial_state().into_keys().collect()
    }

    /// Compute next values for the owned keys.
    ///
    /// Owned keys missing from the result keep their previous value. A key
    /// outside the owned set aborts the step.
    fn solve(&self, local: &StateView<'_>, dt: f64) -> Result<StateMap>;
}
