//! Property tests: ownership validation and action decay hold for arbitrary
//! key sets, durations and time steps.

use std::collections::BTreeSet;

use proptest::prelude::*;
use vitalsim_logic::action::{Action, ActionParams};
use vitalsim_logic::orchestrator::Orchestrator;
use vitalsim_logic::solver::Solver;
use vitalsim_logic::state::{key_set, state_map, KeySet, StateMap, StateView};
use vitalsim_logic::{Result, SimError};

// ── Helpers ────────────────────────────────────────────────────────────

struct Owner {
    name: String,
    keys: BTreeSet<String>,
}

impl Solver for Owner {
    fn name(&self) -> &str {
        &self.name
    }
    fn initial_state(&self) -> StateMap {
        self.keys.iter().map(|k| (k.clone(), 1.0)).collect()
    }
    fn solve(&self, local: &StateView<'_>, _dt: f64) -> Result<StateMap> {
        Ok(local.slice())
    }
}

struct Pulse {
    duration: f64,
    amount: f64,
}

impl Action for Pulse {
    fn name(&self) -> &str {
        "Pulse"
    }
    fn description(&self) -> String {
        "decaying pulse".into()
    }
    fn affected_keys(&self) -> KeySet {
        key_set(["p"])
    }
    fn duration(&self) -> f64 {
        self.duration
    }
    fn apply(&self, _state: &StateView<'_>, _params: &ActionParams) -> Result<StateMap> {
        Ok(state_map([("p", self.amount)]))
    }
}

fn arb_keys() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[a-f]", 1..4)
}

fn arb_dt() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.25), Just(0.5), Just(1.0), Just(2.0)]
}

// ── Property Tests ────────────────────────────────────────────────────

proptest! {
    /// Construction succeeds exactly when the two key sets are disjoint.
    #[test]
    fn ownership_must_partition(a in arb_keys(), b in arb_keys()) {
        let disjoint = a.is_disjoint(&b);
        let result = Orchestrator::builder(1.0)
            .solver(Owner { name: "A".into(), keys: a })
            .solver(Owner { name: "B".into(), keys: b })
            .build();
        if disjoint {
            prop_assert!(result.is_ok());
        } else {
            let is_overlap = matches!(result, Err(SimError::OverlappingOwnership { .. }));
            prop_assert!(is_overlap);
        }
    }

    /// Solvers that echo their slice leave state unchanged step after step.
    #[test]
    fn echo_solvers_are_stable(a in arb_keys(), steps in 1usize..20) {
        let mut orch = Orchestrator::builder(0.5)
            .solver(Owner { name: "A".into(), keys: a })
            .build()
            .unwrap();
        let initial = orch.state().clone();
        for _ in 0..steps {
            orch.step().unwrap();
        }
        prop_assert_eq!(orch.state(), &initial);
    }

    /// Per-step contributions strictly decrease and the entry leaves the
    /// ledger after exactly `n` steps.
    #[test]
    fn decay_is_monotone_and_bounded(n in 1u32..40, dt in arb_dt(), amount in 0.5f64..100.0) {
        let mut orch = Orchestrator::builder(dt)
            .solver(Owner { name: "A".into(), keys: key_set(["a"]) })
            .action(Pulse { duration: f64::from(n) * dt, amount })
            .build()
            .unwrap();
        orch.perform_action_by_name("Pulse", &ActionParams::new()).unwrap();

        let mut previous = f64::INFINITY;
        for _ in 1..n {
            let before = orch.get("p").unwrap();
            orch.step().unwrap();
            let contribution = orch.get("p").unwrap() - before;
            prop_assert!(contribution > 0.0);
            prop_assert!(contribution < previous);
            previous = contribution;
            prop_assert_eq!(orch.active_actions().len(), 1);
        }
        orch.step().unwrap();
        prop_assert!(orch.active_actions().is_empty());
    }
}
