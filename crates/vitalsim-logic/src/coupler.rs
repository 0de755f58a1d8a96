//! Coupler contract: cross-domain adjustments after all solvers have run.
//!
//! Couplers run sequentially in registration order and commit immediately,
//! so a later coupler observes an earlier one's writes within the same step.

use crate::error::Result;
use crate::state::{KeySet, StateMap, StateView};

pub trait Coupler: Send + Sync {
    fn name(&self) -> &str;

    /// Keys read from the live state.
    fn input_keys(&self) -> KeySet;

    /// Keys this coupler may write. Anything else it returns is discarded.
    fn output_keys(&self) -> KeySet;

    /// Defaults seeded at construction for keys nobody else provides.
    fn initial_state(&self) -> StateMap {
        StateMap::new()
    }

    /// Compute adjustments. The result may cover any subset of the outputs.
    fn couple(&self, inputs: &StateView<'_>, dt: f64) -> Result<StateMap>;
}
