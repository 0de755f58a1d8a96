//! Integration tests for the step protocol.
//!
//! Exercises: ownership validation → solve/merge → couple → scenario
//! lifecycle → action ledger → scripted runs over the standard catalog.
//!
//! All tests are pure logic with hand-written components.

use std::sync::Arc;

use vitalsim_logic::action::{Action, ActionParams};
use vitalsim_logic::catalog::{standard_orchestrator, HemorrhageScenario};
use vitalsim_logic::config::{EventKind, RunConfig};
use vitalsim_logic::coupler::Coupler;
use vitalsim_logic::observe::History;
use vitalsim_logic::orchestrator::Orchestrator;
use vitalsim_logic::runner::run;
use vitalsim_logic::scenario::{ScenarioModel, INDEFINITE};
use vitalsim_logic::solver::Solver;
use vitalsim_logic::state::{key_set, state_map, KeySet, StateMap, StateView};
use vitalsim_logic::{Result, SimError};

// ── Helpers ────────────────────────────────────────────────────────────

/// `x += dt` every step.
struct Integrator;

impl Solver for Integrator {
    fn name(&self) -> &str {
        "Integrator"
    }
    fn initial_state(&self) -> StateMap {
        state_map([("x", 0.0)])
    }
    fn solve(&self, local: &StateView<'_>, dt: f64) -> Result<StateMap> {
        Ok(state_map([("x", local.get_or("x", 0.0) + dt)]))
    }
}

/// Owns `k`, jumps it from 5 to 10 on the first step.
struct Jumper;

impl Solver for Jumper {
    fn name(&self) -> &str {
        "Jumper"
    }
    fn initial_state(&self) -> StateMap {
        state_map([("k", 5.0)])
    }
    fn solve(&self, _local: &StateView<'_>, _dt: f64) -> Result<StateMap> {
        Ok(state_map([("k", 10.0)]))
    }
}

/// Solver with an arbitrary key set, for ownership checks.
struct Owner {
    name: &'static str,
    keys: Vec<&'static str>,
}

impl Solver for Owner {
    fn name(&self) -> &str {
        self.name
    }
    fn initial_state(&self) -> StateMap {
        self.keys.iter().map(|k| (k.to_string(), 0.0)).collect()
    }
    fn solve(&self, _local: &StateView<'_>, _dt: f64) -> Result<StateMap> {
        Ok(StateMap::new())
    }
}

/// `y = 2x`, plus a stray write to `x` that must be discarded.
struct Doubler;

impl Coupler for Doubler {
    fn name(&self) -> &str {
        "Doubler"
    }
    fn input_keys(&self) -> KeySet {
        key_set(["x"])
    }
    fn output_keys(&self) -> KeySet {
        key_set(["y"])
    }
    fn couple(&self, inputs: &StateView<'_>, _dt: f64) -> Result<StateMap> {
        let x = inputs.get_or("x", 0.0);
        Ok(state_map([("y", x * 2.0), ("x", -1.0)]))
    }
}

/// Copies `k` into `seen` so the test can observe what the coupler read.
struct Witness;

impl Coupler for Witness {
    fn name(&self) -> &str {
        "Witness"
    }
    fn input_keys(&self) -> KeySet {
        key_set(["k"])
    }
    fn output_keys(&self) -> KeySet {
        key_set(["seen"])
    }
    fn initial_state(&self) -> StateMap {
        state_map([("seen", 0.0)])
    }
    fn couple(&self, inputs: &StateView<'_>, _dt: f64) -> Result<StateMap> {
        Ok(state_map([("seen", inputs.get_or("seen", -1.0) + inputs.get_or("k", -1.0))]))
    }
}

/// Holds `level` at a fixed value for `duration`.
struct Plateau {
    duration: f64,
}

impl ScenarioModel for Plateau {
    fn name(&self) -> &str {
        "Plateau"
    }
    fn description(&self) -> String {
        "pins level at 42".into()
    }
    fn affected_keys(&self) -> KeySet {
        key_set(["level"])
    }
    fn duration(&self) -> f64 {
        self.duration
    }
    fn initial_state(&self) -> StateMap {
        state_map([("level", 1.0)])
    }
    fn reset(&mut self) {}
    fn apply(&mut self, _state: &StateView<'_>, _elapsed: f64, _dt: f64) -> Result<StateMap> {
        Ok(state_map([("level", 42.0)]))
    }
}

/// Adds a fixed amount to `dose`, optionally durable.
struct Dose {
    name: &'static str,
    key: &'static str,
    amount: f64,
    duration: f64,
}

impl Action for Dose {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> String {
        format!("adds {} to {}", self.amount, self.key)
    }
    fn affected_keys(&self) -> KeySet {
        key_set([self.key])
    }
    fn duration(&self) -> f64 {
        self.duration
    }
    fn apply(&self, _state: &StateView<'_>, _params: &ActionParams) -> Result<StateMap> {
        Ok(state_map([(self.key, self.amount)]))
    }
}

/// Fails whenever it is applied.
struct Faulty;

impl Action for Faulty {
    fn name(&self) -> &str {
        "Faulty"
    }
    fn description(&self) -> String {
        "always fails".into()
    }
    fn affected_keys(&self) -> KeySet {
        key_set(["x"])
    }
    fn apply(&self, _state: &StateView<'_>, _params: &ActionParams) -> Result<StateMap> {
        Err(SimError::computation("Faulty", "boom"))
    }
}

fn dose(duration: f64) -> Dose {
    Dose {
        name: "Dose",
        key: "dose",
        amount: 10.0,
        duration,
    }
}

fn basic() -> Orchestrator {
    Orchestrator::builder(1.0)
        .solver(Integrator)
        .coupler(Doubler)
        .scenario(Plateau { duration: 5.0 })
        .action(dose(10.0))
        .build()
        .unwrap()
}

/// `z = y + 1`, reading the value another coupler wrote this step.
struct Chain;

impl Coupler for Chain {
    fn name(&self) -> &str {
        "Chain"
    }
    fn input_keys(&self) -> KeySet {
        key_set(["y"])
    }
    fn output_keys(&self) -> KeySet {
        key_set(["z"])
    }
    fn couple(&self, inputs: &StateView<'_>, _dt: f64) -> Result<StateMap> {
        Ok(state_map([("z", inputs.get_or("y", -100.0) + 1.0)]))
    }
}

/// Coupler that always fails.
struct Broken;

impl Coupler for Broken {
    fn name(&self) -> &str {
        "Broken"
    }
    fn input_keys(&self) -> KeySet {
        key_set(["x"])
    }
    fn output_keys(&self) -> KeySet {
        key_set(["x"])
    }
    fn couple(&self, _inputs: &StateView<'_>, _dt: f64) -> Result<StateMap> {
        Err(SimError::computation("Broken", "diverged"))
    }
}

/// Scenario that fails on its first update.
struct Collapse;

impl ScenarioModel for Collapse {
    fn name(&self) -> &str {
        "Collapse"
    }
    fn description(&self) -> String {
        "fails when applied".into()
    }
    fn affected_keys(&self) -> KeySet {
        key_set(["level"])
    }
    fn duration(&self) -> f64 {
        INDEFINITE
    }
    fn initial_state(&self) -> StateMap {
        state_map([("level", 1.0)])
    }
    fn reset(&mut self) {}
    fn apply(&mut self, _state: &StateView<'_>, _elapsed: f64, _dt: f64) -> Result<StateMap> {
        Err(SimError::computation("Collapse", "no baseline"))
    }
}

// ── Construction ──────────────────────────────────────────────────────

#[test]
fn test_overlapping_ownership_rejected() {
    let err = Orchestrator::builder(1.0)
        .solver(Owner {
            name: "A",
            keys: vec!["a", "shared"],
        })
        .solver(Owner {
            name: "B",
            keys: vec!["shared", "b"],
        })
        .build();
    match err {
        Err(SimError::OverlappingOwnership { key, first, second }) => {
            assert_eq!(key, "shared");
            assert_eq!(first, "A");
            assert_eq!(second, "B");
        }
        other => panic!("expected overlap error, got {other:?}"),
    }
}

#[test]
fn test_initial_state_seeded_from_all_components() {
    let orch = basic();
    assert_eq!(orch.get("x"), Some(0.0));
    assert_eq!(orch.get("level"), Some(1.0));
    // Coupler output with no seed is created at runtime.
    assert_eq!(orch.get("y"), None);
    assert_eq!(orch.current_time(), 0.0);
}

// ── Step protocol ─────────────────────────────────────────────────────

#[test]
fn test_integrator_and_coupler_worked_example() {
    let mut orch = basic();
    for _ in 0..3 {
        orch.step().unwrap();
    }
    assert_eq!(orch.get("x"), Some(3.0));
    assert_eq!(orch.get("y"), Some(6.0));
    assert_eq!(orch.current_time(), 3.0);
}

#[test]
fn test_coupler_sees_post_solve_value() {
    let mut orch = Orchestrator::builder(1.0)
        .solver(Jumper)
        .coupler(Witness)
        .build()
        .unwrap();
    orch.step().unwrap();
    assert_eq!(orch.get("k"), Some(10.0));
    // Witness is scoped to `k` only, so `seen` reads as the -1 fallback.
    assert_eq!(orch.get("seen"), Some(9.0));
}

#[test]
fn test_coupler_undeclared_write_discarded() {
    let mut orch = basic();
    orch.step().unwrap();
    // Doubler tried to set x = -1.
    assert_eq!(orch.get("x"), Some(1.0));
}

#[test]
fn test_step_returns_snapshot() {
    let mut orch = basic();
    let snapshot = orch.step().unwrap().clone();
    assert_eq!(&snapshot, orch.state());
    assert_eq!(snapshot.get("y"), Some(&2.0));
}

#[test]
fn test_later_coupler_reads_earlier_coupler_write() {
    let mut orch = Orchestrator::builder(1.0)
        .solver(Integrator)
        .coupler(Doubler)
        .coupler(Chain)
        .build()
        .unwrap();
    orch.step().unwrap();
    assert_eq!(orch.get("x"), Some(1.0));
    assert_eq!(orch.get("y"), Some(2.0));
    assert_eq!(orch.get("z"), Some(3.0));
}

#[test]
fn test_failing_coupler_keeps_committed_phases() {
    let mut orch = Orchestrator::builder(1.0)
        .solver(Integrator)
        .coupler(Doubler)
        .coupler(Broken)
        .build()
        .unwrap();
    let err = orch.step().unwrap_err();
    assert!(matches!(err, SimError::Computation { ref component, .. } if component == "Broken"));
    // Solver merge and the first coupler stay committed; the clock does not move.
    assert_eq!(orch.get("x"), Some(1.0));
    assert_eq!(orch.get("y"), Some(2.0));
    assert_eq!(orch.current_time(), 0.0);
}

#[test]
fn test_failing_scenario_stops_before_decay() {
    let mut orch = Orchestrator::builder(1.0)
        .solver(Integrator)
        .coupler(Doubler)
        .scenario(Collapse)
        .action(dose(10.0))
        .build()
        .unwrap();
    orch.perform_action_by_name("Dose", &ActionParams::new())
        .unwrap();
    assert!(orch.apply_scenario("Collapse"));
    assert!(orch.step().is_err());
    assert_eq!(orch.get("x"), Some(1.0));
    assert_eq!(orch.get("y"), Some(2.0));
    assert_eq!(orch.get("level"), Some(1.0));
    // Ledger never advanced.
    assert_eq!(orch.get("dose"), Some(10.0));
    assert_eq!(orch.active_actions()[0].elapsed_time(), 0.0);
    assert_eq!(orch.current_time(), 0.0);
}

// ── Scenarios ─────────────────────────────────────────────────────────

#[test]
fn test_scenario_expires_after_duration() {
    let mut orch = basic();
    assert!(orch.apply_scenario("Plateau"));
    for _ in 0..4 {
        orch.step().unwrap();
    }
    assert!(orch.is_scenario_active("Plateau"));
    orch.step().unwrap();
    assert!(!orch.is_scenario_active("Plateau"));
    assert_eq!(orch.active_scenarios().count(), 0);
    // Absolute write from the final step survives.
    assert_eq!(orch.get("level"), Some(42.0));
}

#[test]
fn test_scenario_deactivate_and_restart() {
    let mut orch = basic();
    assert!(orch.apply_scenario("Plateau"));
    orch.step().unwrap();
    orch.step().unwrap();
    assert!(orch.deactivate_scenario("Plateau"));
    assert!(!orch.deactivate_scenario("Plateau"));

    orch.apply_direct_deltas(&state_map([("level", -40.0)]));
    orch.step().unwrap();
    assert_eq!(orch.get("level"), Some(2.0));

    assert!(orch.apply_scenario("Plateau"));
    assert_eq!(orch.scenario("Plateau").unwrap().elapsed_time(), 0.0);
    // Activating twice keeps a single active entry.
    assert!(orch.apply_scenario("Plateau"));
    assert_eq!(orch.active_scenarios().count(), 1);
}

#[test]
fn test_indefinite_scenario_runs_until_deactivated() {
    let mut orch = Orchestrator::builder(60.0)
        .solver(Integrator)
        .scenario(HemorrhageScenario::new(1.0, 900.0, false, 7200.0, 3600.0).with_seed(7))
        .build()
        .unwrap();
    assert_eq!(orch.scenario("Hemorrhage").unwrap().duration(), INDEFINITE);
    assert!(orch.apply_scenario("Hemorrhage"));
    for _ in 0..500 {
        orch.step().unwrap();
    }
    assert!(orch.is_scenario_active("Hemorrhage"));
    assert!(orch.deactivate_scenario("Hemorrhage"));
}

// ── Actions ───────────────────────────────────────────────────────────

#[test]
fn test_action_decays_then_leaves_ledger() {
    let mut orch = basic();
    orch.perform_action_by_name("Dose", &ActionParams::new())
        .unwrap();
    assert_eq!(orch.get("dose"), Some(10.0));

    let mut previous = f64::INFINITY;
    for step in 1..=9 {
        let before = orch.get("dose").unwrap();
        orch.step().unwrap();
        let contribution = orch.get("dose").unwrap() - before;
        assert!(contribution > 0.0, "step {step} contributed {contribution}");
        assert!(contribution < previous, "step {step} did not decrease");
        previous = contribution;
        assert_eq!(orch.active_actions().len(), 1);
    }
    let before = orch.get("dose").unwrap();
    orch.step().unwrap();
    assert!(orch.active_actions().is_empty());
    assert_eq!(orch.get("dose"), Some(before));
}

#[test]
fn test_action_creates_unseen_key_exactly() {
    let mut orch = basic();
    let action = Arc::new(Dose {
        name: "Fresh",
        key: "fresh",
        amount: 3.25,
        duration: 0.0,
    });
    let observed = orch.perform_action(action, &ActionParams::new()).unwrap();
    assert_eq!(observed, state_map([("fresh", 3.25)]));
    assert_eq!(orch.get("fresh"), Some(3.25));
    assert!(orch.active_actions().is_empty());
}

#[test]
fn test_repeated_actions_stack() {
    let mut orch = basic();
    orch.perform_action_by_name("Dose", &ActionParams::new())
        .unwrap();
    orch.perform_action_by_name("Dose", &ActionParams::new())
        .unwrap();
    assert_eq!(orch.active_actions().len(), 2);
    assert_eq!(orch.get("dose"), Some(20.0));
    orch.step().unwrap();
    // Each entry adds 10 * 0.9.
    assert!((orch.get("dose").unwrap() - 38.0).abs() < 1e-9);
}

#[test]
fn test_failing_action_propagates() {
    let mut orch = basic();
    let err = orch.perform_action(Arc::new(Faulty), &ActionParams::new());
    assert!(matches!(err, Err(SimError::Computation { .. })));
    assert_eq!(orch.get("x"), Some(0.0));
    assert!(orch.active_actions().is_empty());
}

#[test]
fn test_lookup_misses() {
    let mut orch = basic();
    assert!(!orch.apply_scenario("Unknown"));
    assert!(orch
        .perform_action_by_name("Unknown", &ActionParams::new())
        .unwrap()
        .is_empty());
    orch.step().unwrap();
    assert_eq!(orch.get("x"), Some(1.0));
}

// ── Scripted runs over the catalog ────────────────────────────────────

#[test]
fn test_scripted_sepsis_run() {
    let mut orch = standard_orchestrator(60.0).unwrap();
    let config = RunConfig::new(60.0, 120)
        .at(
            0,
            EventKind::ActivateScenario {
                name: "Sepsis".into(),
            },
        )
        .at(
            30,
            EventKind::PerformAction {
                name: "Epinephrine".into(),
                params: ActionParams::new(),
            },
        )
        .at(
            60,
            EventKind::DeactivateScenario {
                name: "Sepsis".into(),
            },
        );
    let mut history = History::new();
    let summary = run(&mut orch, &config, &mut history).unwrap();

    assert_eq!(summary.steps, 120);
    assert_eq!(summary.missed_lookups, 0);
    assert_eq!(history.len(), 120);
    assert!((summary.final_time - 7200.0).abs() < 1e-6);
    assert!(!orch.is_scenario_active("Sepsis"));

    let crp = history.series("crp");
    assert!(crp[59].1 > crp[0].1, "crp should rise while septic");
    assert!(history
        .frames
        .iter()
        .all(|f| f.state.values().all(|v| v.is_finite())));
}

#[test]
fn test_seeded_hemorrhage_is_deterministic() {
    let build = || {
        Orchestrator::builder(60.0)
            .solver(Integrator)
            .scenario(HemorrhageScenario::default().with_seed(11))
            .build()
            .unwrap()
    };
    let mut a = build();
    let mut b = build();
    a.apply_scenario("Hemorrhage");
    b.apply_scenario("Hemorrhage");
    for _ in 0..60 {
        a.step().unwrap();
        b.step().unwrap();
    }
    assert_eq!(a.state(), b.state());
}

#[test]
fn test_default_run_plan_resolves_every_event() {
    let config = RunConfig::from_json(include_str!("../../../data/default_run.json")).unwrap();
    let mut orch = standard_orchestrator(config.dt).unwrap();
    let mut history = History::new();
    let summary = run(&mut orch, &config, &mut history).unwrap();
    assert_eq!(summary.missed_lookups, 0);
    assert_eq!(summary.steps, config.steps);
    assert!(history
        .frames
        .iter()
        .all(|f| f.state.values().all(|v| v.is_finite())));
}
