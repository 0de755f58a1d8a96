//! Phased, time-unfolding effect generators.
//!
//! A concrete scenario implements [`ScenarioModel`]: a small phase machine
//! (typically onset → plateau → resolution) whose transitions are driven
//! purely by elapsed time. [`Scenario`] wraps a model with the lifecycle the
//! orchestrator manages: activation, the elapsed-time clock, and expiry.
//!
//! Scenario output is an **absolute replacement** for the affected keys, not
//! a delta. Models may read prior values of their affected keys as a baseline.

use std::fmt;

use crate::error::Result;
use crate::state::{KeySet, StateMap, StateStore, StateView};

/// Duration value meaning "runs until explicitly deactivated".
pub const INDEFINITE: f64 = -1.0;

/// Slack for elapsed-time comparisons. Accumulating a non-binary `dt`
/// (0.1, say) undershoots the exact sum by a few ulps.
pub const TIME_TOLERANCE: f64 = 1e-9;

pub trait ScenarioModel: Send {
    fn name(&self) -> &str;

    fn description(&self) -> String;

    /// Keys the scenario replaces. It may also read them as baselines.
    fn affected_keys(&self) -> KeySet;

    /// Total run time, or [`INDEFINITE`].
    fn duration(&self) -> f64;

    /// Defaults seeded at construction for keys nobody else provides.
    fn initial_state(&self) -> StateMap;

    /// Return to the first phase and clear any accumulated internal state.
    fn reset(&mut self);

    /// Produce absolute values for the affected keys at `elapsed`.
    fn apply(&mut self, state: &StateView<'_>, elapsed: f64, dt: f64) -> Result<StateMap>;
}

/// Lifecycle wrapper around a [`ScenarioModel`].
pub struct Scenario {
    model: Box<dyn ScenarioModel>,
    affected: KeySet,
    is_active: bool,
    elapsed_time: f64,
}

impl Scenario {
    /// Wrap a model. Scenarios start inactive.
    pub fn new(model: impl ScenarioModel + 'static) -> Self {
        Self::from_boxed(Box::new(model))
    }

    pub fn from_boxed(model: Box<dyn ScenarioModel>) -> Self {
        let affected = model.affected_keys();
        Self {
            model,
            affected,
            is_active: false,
            elapsed_time: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn description(&self) -> String {
        self.model.description()
    }

    pub fn duration(&self) -> f64 {
        self.model.duration()
    }

    pub fn affected_keys(&self) -> &KeySet {
        &self.affected
    }

    pub fn initial_state(&self) -> StateMap {
        self.model.initial_state()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    pub fn activate(&mut self) {
        self.model.reset();
        self.elapsed_time = 0.0;
        self.is_active = true;
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// Advance the clock by `dt`, then compute replacement values.
    pub fn update(&mut self, store: &StateStore, dt: f64) -> Result<StateMap> {
        self.elapsed_time += dt;
        let view = StateView::new(store, &self.affected);
        self.model.apply(&view, self.elapsed_time, dt)
    }

    /// Whether a finite duration has been reached, within [`TIME_TOLERANCE`].
    pub fn is_expired(&self) -> bool {
        let duration = self.duration();
        duration > 0.0 && self.elapsed_time >= duration - TIME_TOLERANCE
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name())
            .field("is_active", &self.is_active)
            .field("elapsed_time", &self.elapsed_time)
            .field("duration", &self.duration())
            .finish()
    }
}

/// Fraction of the way through a phase that starts at `start` and lasts
/// `span`, clamped to `[0, 1]`. A non-positive span counts as complete.
pub fn phase_progress(elapsed: f64, start: f64, span: f64) -> f64 {
    if span <= 0.0 {
        return 1.0;
    }
    ((elapsed - start) / span).clamp(0.0, 1.0)
}

/// Linear interpolation from `from` to `to`.
pub fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}
