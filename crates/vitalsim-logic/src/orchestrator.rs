//! The orchestrator owns the live state and the simulation clock.
//!
//! Every step runs the same fixed phase sequence:
//!
//! ```text
//! 1. Solve     each solver reads the pre-step snapshot; outputs are buffered
//! 2. Merge     all buffered solver outputs are committed together
//! 3. Couple    couplers run in order, committing declared outputs immediately
//! 4. Scenario  active scenarios advance and replace their affected keys
//! 5. Decay     ledger entries advance and add their scaled deltas
//! 6. Clock     current_time += dt
//! ```
//!
//! A failure in any phase aborts the step and propagates. This is fail-fast,
//! not transactional: phases already committed in that step stay committed,
//! and the clock does not advance.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::action::{commit_delta, read_scope, Action, ActionLedger, ActionParams, LedgerEntry};
use crate::coupler::Coupler;
use crate::error::{Result, SimError};
use crate::scenario::{Scenario, ScenarioModel};
use crate::solver::Solver;
use crate::state::{partition_declared, KeySet, StateMap, StateStore, StateView};

struct SolverSlot {
    solver: Box<dyn Solver>,
    owned: KeySet,
}

impl SolverSlot {
    fn solve(&self, snapshot: &StateStore, dt: f64) -> Result<StateMap> {
        let view = StateView::new(snapshot, &self.owned);
        let out = self.solver.solve(&view, dt)?;
        if let Some(key) = out.keys().find(|k| !self.owned.contains(*k)) {
            return Err(SimError::UndeclaredSolverWrite {
                solver: self.solver.name().to_string(),
                key: key.clone(),
            });
        }
        Ok(out)
    }
}

struct CouplerSlot {
    coupler: Box<dyn Coupler>,
    inputs: KeySet,
    outputs: KeySet,
}

/// Collects components before validation. See [`Orchestrator::builder`].
pub struct OrchestratorBuilder {
    dt: f64,
    solvers: Vec<Box<dyn Solver>>,
    couplers: Vec<Box<dyn Coupler>>,
    scenarios: Vec<Scenario>,
    actions: Vec<Arc<dyn Action>>,
    baseline: StateMap,
}

impl OrchestratorBuilder {
    pub fn solver(mut self, solver: impl Solver + 'static) -> Self {
        self.solvers.push(Box::new(solver));
        self
    }

    pub fn solvers(mut self, solvers: impl IntoIterator<Item = Box<dyn Solver>>) -> Self {
        self.solvers.extend(solvers);
        self
    }

    pub fn coupler(mut self, coupler: impl Coupler + 'static) -> Self {
        self.couplers.push(Box::new(coupler));
        self
    }

    pub fn couplers(mut self, couplers: impl IntoIterator<Item = Box<dyn Coupler>>) -> Self {
        self.couplers.extend(couplers);
        self
    }

    pub fn scenario(mut self, model: impl ScenarioModel + 'static) -> Self {
        self.scenarios.push(Scenario::new(model));
        self
    }

    pub fn scenarios(mut self, scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        self.scenarios.extend(scenarios);
        self
    }

    pub fn action(mut self, action: impl Action + 'static) -> Self {
        self.actions.push(Arc::new(action));
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Arc<dyn Action>>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Starting values for keys no solver owns, such as a patient's lab
    /// panel. Seeded after solvers and before coupler and scenario defaults.
    pub fn baseline(mut self, values: StateMap) -> Self {
        self.baseline.extend(values);
        self
    }

    /// Validate ownership, seed the state, and warn about keys that will
    /// only come into existence at runtime.
    pub fn build(self) -> Result<Orchestrator> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(SimError::InvalidTimeStep { dt: self.dt });
        }

        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        let mut state = StateStore::new();
        let mut solvers = Vec::with_capacity(self.solvers.len());
        for solver in self.solvers {
            let owned = solver.owned_keys();
            if owned.is_empty() {
                return Err(SimError::EmptyOwnership {
                    solver: solver.name().to_string(),
                });
            }
            for key in &owned {
                if let Some(first) = owners.insert(key.clone(), solver.name().to_string()) {
                    return Err(SimError::OverlappingOwnership {
                        key: key.clone(),
                        first,
                        second: solver.name().to_string(),
                    });
                }
            }
            let (initial, extra) = partition_declared(solver.initial_state(), &owned);
            if !extra.is_empty() {
                log::warn!(
                    "solver {} seeds keys it does not own: {:?}; ignored",
                    solver.name(),
                    extra
                );
            }
            state.merge_replace(initial);
            solvers.push(SolverSlot { solver, owned });
        }

        for (key, value) in self.baseline {
            if !state.seed(key.clone(), value) {
                log::warn!("baseline value for solver-owned key {key} ignored");
            }
        }

        let couplers: Vec<CouplerSlot> = self
            .couplers
            .into_iter()
            .map(|coupler| CouplerSlot {
                inputs: coupler.input_keys(),
                outputs: coupler.output_keys(),
                coupler,
            })
            .collect();

        for slot in &couplers {
            for (key, value) in slot.coupler.initial_state() {
                state.seed(key, value);
            }
        }
        for scenario in &self.scenarios {
            for (key, value) in scenario.initial_state() {
                state.seed(key, value);
            }
        }

        for slot in &couplers {
            for key in slot.outputs.iter().filter(|k| !state.contains(k)) {
                log::warn!(
                    "coupler {} will create new state key: {key}",
                    slot.coupler.name()
                );
            }
        }
        for scenario in &self.scenarios {
            for key in scenario.affected_keys().iter().filter(|k| !state.contains(k)) {
                log::warn!(
                    "scenario {} will create new state key: {key}",
                    scenario.name()
                );
            }
        }
        for action in &self.actions {
            for key in action.required_keys().iter().filter(|k| !state.contains(k)) {
                log::warn!("action {} requires absent key: {key}", action.name());
            }
        }
        warn_duplicate_names("scenario", self.scenarios.iter().map(Scenario::name));
        warn_duplicate_names("action", self.actions.iter().map(|a| a.name()));

        log::info!(
            "orchestrator initialized: {} solvers, {} couplers, {} scenarios, {} actions, {} keys",
            solvers.len(),
            couplers.len(),
            self.scenarios.len(),
            self.actions.len(),
            state.len()
        );

        Ok(Orchestrator {
            state,
            dt: self.dt,
            current_time: 0.0,
            solvers,
            couplers,
            scenarios: self.scenarios,
            active_scenarios: Vec::new(),
            actions: self.actions,
            ledger: ActionLedger::new(),
        })
    }
}

fn warn_duplicate_names<'a>(kind: &str, names: impl Iterator<Item = &'a str>) {
    let mut seen = std::collections::BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            log::warn!("duplicate {kind} name {name}; lookups resolve to the first");
        }
    }
}

/// Owns the live state, the clock, and the active scenario/action ledgers.
///
/// Not internally synchronized: callers serialize access between steps.
pub struct Orchestrator {
    state: StateStore,
    dt: f64,
    current_time: f64,
    solvers: Vec<SolverSlot>,
    couplers: Vec<CouplerSlot>,
    scenarios: Vec<Scenario>,
    /// Indices into `scenarios`, in activation order.
    active_scenarios: Vec<usize>,
    actions: Vec<Arc<dyn Action>>,
    ledger: ActionLedger,
}

impl Orchestrator {
    pub fn builder(dt: f64) -> OrchestratorBuilder {
        OrchestratorBuilder {
            dt,
            solvers: Vec::new(),
            couplers: Vec::new(),
            scenarios: Vec::new(),
            actions: Vec::new(),
            baseline: StateMap::new(),
        }
    }

    /// Solvers only, no couplers, scenarios or actions.
    pub fn new(solvers: Vec<Box<dyn Solver>>, dt: f64) -> Result<Self> {
        Self::builder(dt).solvers(solvers).build()
    }

    /// Advance the simulation by `dt` and return the resulting snapshot.
    pub fn step(&mut self) -> Result<&StateMap> {
        let dt = self.dt;

        let outputs = self.solve_phase(dt)?;
        for out in outputs {
            self.state.merge_replace(out);
        }

        self.couple_phase(dt)?;
        self.scenario_phase(dt)?;
        self.ledger.advance(&mut self.state, dt)?;

        self.current_time += dt;
        log::debug!("{}", self);
        Ok(self.state.as_map())
    }

    #[cfg(not(feature = "parallel"))]
    fn solve_phase(&self, dt: f64) -> Result<Vec<StateMap>> {
        self.solvers
            .iter()
            .map(|slot| slot.solve(&self.state, dt))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn solve_phase(&self, dt: f64) -> Result<Vec<StateMap>> {
        use rayon::prelude::*;
        // Scenarios are not Sync, so capture the store rather than `self`.
        let state = &self.state;
        self.solvers
            .par_iter()
            .map(|slot| slot.solve(state, dt))
            .collect()
    }

    fn couple_phase(&mut self, dt: f64) -> Result<()> {
        for slot in &self.couplers {
            let out = {
                let view = StateView::new(&self.state, &slot.inputs);
                slot.coupler.couple(&view, dt)?
            };
            let (kept, discarded) = partition_declared(out, &slot.outputs);
            if !discarded.is_empty() {
                log::warn!(
                    "coupler {} returned undeclared keys {:?}; discarded",
                    slot.coupler.name(),
                    discarded
                );
            }
            self.state.merge_replace(kept);
        }
        Ok(())
    }

    fn scenario_phase(&mut self, dt: f64) -> Result<()> {
        let active = self.active_scenarios.clone();
        for idx in active {
            let scenario = &mut self.scenarios[idx];
            let values = scenario.update(&self.state, dt)?;
            let (kept, discarded) = partition_declared(values, scenario.affected_keys());
            if !discarded.is_empty() {
                log::warn!(
                    "scenario {} returned undeclared keys {:?}; discarded",
                    scenario.name(),
                    discarded
                );
            }
            self.state.merge_replace(kept);

            if scenario.is_expired() {
                scenario.deactivate();
                log::info!(
                    "scenario {} completed after {:.2}",
                    scenario.name(),
                    scenario.elapsed_time()
                );
                self.active_scenarios.retain(|&i| i != idx);
            }
        }
        Ok(())
    }

    /// Add `deltas` straight into the state, creating absent keys.
    pub fn apply_direct_deltas(&mut self, deltas: &StateMap) -> &StateMap {
        self.state.merge_add(deltas, 1.0);
        log::info!("direct deltas applied: {deltas:?}");
        self.state.as_map()
    }

    /// Activate the first registered scenario called `name`.
    ///
    /// Re-activating an active scenario restarts it from its first phase.
    pub fn apply_scenario(&mut self, name: &str) -> bool {
        let Some(idx) = self.scenarios.iter().position(|s| s.name() == name) else {
            log::warn!("scenario {name} not found");
            return false;
        };
        self.scenarios[idx].activate();
        if !self.active_scenarios.contains(&idx) {
            self.active_scenarios.push(idx);
        }
        log::info!("scenario {name} activated at t={:.2}", self.current_time);
        true
    }

    /// Deactivate the active scenario called `name`. Returns `false` when no
    /// active scenario has that name.
    pub fn deactivate_scenario(&mut self, name: &str) -> bool {
        let Some(pos) = self
            .active_scenarios
            .iter()
            .position(|&i| self.scenarios[i].name() == name)
        else {
            log::warn!("no active scenario named {name}");
            return false;
        };
        let idx = self.active_scenarios.remove(pos);
        self.scenarios[idx].deactivate();
        log::info!("scenario {name} deactivated at t={:.2}", self.current_time);
        true
    }

    /// Apply `action` once and, if it has a duration, record a ledger entry.
    ///
    /// Returns the action's observable keys as they stand afterwards.
    pub fn perform_action(
        &mut self,
        action: Arc<dyn Action>,
        params: &ActionParams,
    ) -> Result<StateMap> {
        let scope = read_scope(action.as_ref());
        let affected = action.affected_keys();
        let delta = commit_delta(
            action.as_ref(),
            &scope,
            &affected,
            params,
            &mut self.state,
            1.0,
        )?;
        log::info!("action {} performed: {delta:?}", action.name());

        if action.duration() > 0.0 {
            self.ledger
                .push(LedgerEntry::new(Arc::clone(&action), params.clone()));
        }
        Ok(self.state.subset(&action.observable_keys()))
    }

    /// Perform the first registered action called `name`; empty map on miss.
    pub fn perform_action_by_name(
        &mut self,
        name: &str,
        params: &ActionParams,
    ) -> Result<StateMap> {
        match self.action(name) {
            Some(action) => self.perform_action(action, params),
            None => {
                log::warn!("action {name} not found");
                Ok(StateMap::new())
            }
        }
    }

    pub fn state(&self) -> &StateMap {
        self.state.as_map()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.state.get(key)
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn solver_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.solvers.iter().map(|slot| slot.solver.name())
    }

    pub fn coupler_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.couplers.iter().map(|slot| slot.coupler.name())
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name() == name)
    }

    pub fn active_scenarios(&self) -> impl Iterator<Item = &Scenario> + '_ {
        self.active_scenarios.iter().map(|&i| &self.scenarios[i])
    }

    pub fn is_scenario_active(&self, name: &str) -> bool {
        self.active_scenarios().any(|s| s.name() == name)
    }

    pub fn actions(&self) -> &[Arc<dyn Action>] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.iter().find(|a| a.name() == name).cloned()
    }

    /// In-progress durable action effects, oldest first.
    pub fn active_actions(&self) -> &[LedgerEntry] {
        self.ledger.entries()
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("current_time", &self.current_time)
            .field("dt", &self.dt)
            .field("solvers", &self.solver_names().collect::<Vec<_>>())
            .field("couplers", &self.coupler_names().collect::<Vec<_>>())
            .field("active_scenarios", &self.active_scenarios().map(Scenario::name).collect::<Vec<_>>())
            .field("ledger", &self.ledger.len())
            .field("keys", &self.state.len())
            .finish()
    }
}

impl fmt::Display for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time={:.2}, State: ", self.current_time)?;
        for (i, (key, value)) in self.state.as_map().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value:.2}")?;
        }
        Ok(())
    }
}
