//! Orchestration core for composable physiological simulation.
//!
//! A patient is a flat map of named scalar quantities. Independent
//! components advance it in discrete time steps under a single
//! [`Orchestrator`]: solvers own disjoint slices of state, couplers carry
//! effects across them, scenarios overlay phased perturbations, and actions
//! apply interventions with a decaying tail. Nothing here performs I/O.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`state`] | Shared state store and capability-scoped read views |
//! | [`solver`] | Domain models that own a disjoint set of keys |
//! | [`coupler`] | Cross-domain effects committed after the solve phase |
//! | [`scenario`] | Phased, time-unfolding perturbations with absolute writes |
//! | [`action`] | Instantaneous interventions and the decaying action ledger |
//! | [`orchestrator`] | The step protocol, ownership validation, lookups |
//! | [`catalog`] | Concrete fever, sepsis, hemorrhage, medication and fluid models |
//! | [`config`] | JSON run plans with scheduled interventions |
//! | [`observe`] | Snapshot sinks (logging, in-memory history) |
//! | [`runner`] | Drives an orchestrator through a run plan |
//! | [`error`] | `SimError` and the crate `Result` alias |

pub mod action;
pub mod catalog;
pub mod config;
pub mod coupler;
pub mod error;
pub mod observe;
pub mod orchestrator;
pub mod runner;
pub mod scenario;
pub mod solver;
pub mod state;

pub use action::{Action, ActionParams};
pub use coupler::Coupler;
pub use error::{Result, SimError};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use scenario::{Scenario, ScenarioModel, INDEFINITE};
pub use solver::Solver;
pub use state::{KeySet, StateMap, StateStore, StateView};
