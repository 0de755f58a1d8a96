//! Concrete physiology built on the orchestration contracts.
//!
//! | Kind | Components |
//! |------|------------|
//! | Solvers | [`FluidsSolver`], [`MedsSolver`], [`FeverSolver`], [`LactateSolver`], [`ElectrolytesSolver`] |
//! | Couplers | [`MedsVitalsCoupler`], [`FeverMetabolicCoupler`], [`PerfusionCoupler`] |
//! | Scenarios | [`FeverScenario`], [`SepsisScenario`], [`HemorrhageScenario`] |
//! | Actions | [`BloodTestAction`], [`medications`], [`fluids`] |
//! | Baseline | [`patient_baseline`] |

mod actions;
mod couplers;
mod scenarios;
mod solvers;

use std::sync::Arc;

pub use actions::{fluids, medications, BloodTestAction, FluidAdministrationAction, MedicationAction};
pub use couplers::{FeverMetabolicCoupler, MedsVitalsCoupler, PerfusionCoupler};
pub use scenarios::{FeverScenario, HemorrhageScenario, SepsisScenario};
pub use solvers::{
    Electrolyte, ElectrolytesSolver, FeverSolver, FluidsSolver, LactateSolver, MedsSolver,
};

use crate::action::Action;
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::state::{state_map, StateMap};

/// Adult values for keys no solver owns: circulating volume (L) and the
/// blood panel read by the Blood Test.
pub fn patient_baseline() -> StateMap {
    state_map([
        ("blood_volume", 5.0),
        ("hemoglobin", 14.0),
        ("hematocrit", 42.0),
        ("platelets", 250.0),
        ("wbc", 7.5),
        ("inr", 1.0),
        ("aptt", 30.0),
        ("crp", 1.0),
        ("glucose", 100.0),
    ])
}

/// Every registered action in the standard catalog, in lookup order.
pub fn standard_actions() -> Vec<Arc<dyn Action>> {
    let mut actions: Vec<Arc<dyn Action>> = vec![Arc::new(BloodTestAction)];
    actions.extend(
        medications()
            .into_iter()
            .map(|m| Arc::new(m) as Arc<dyn Action>),
    );
    actions.extend(fluids().into_iter().map(|f| Arc::new(f) as Arc<dyn Action>));
    actions
}

/// The full catalog wired together: every solver and coupler, all three
/// scenarios (inactive), every action and the patient baseline.
pub fn standard_orchestrator(dt: f64) -> Result<Orchestrator> {
    Orchestrator::builder(dt)
        .solver(FluidsSolver::default())
        .solver(MedsSolver::default())
        .solver(FeverSolver::default())
        .solver(LactateSolver::default())
        .solver(ElectrolytesSolver::default())
        .coupler(MedsVitalsCoupler)
        .coupler(FeverMetabolicCoupler)
        .coupler(PerfusionCoupler)
        .scenario(FeverScenario::default())
        .scenario(SepsisScenario::default())
        .scenario(HemorrhageScenario::default())
        .actions(standard_actions())
        .baseline(patient_baseline())
        .build()
}
