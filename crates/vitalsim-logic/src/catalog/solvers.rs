//! Physiological solvers: fluids, medication levels, core temperature,
//! lactate and serum electrolytes.
//!
//! Each solver owns a small disjoint set of keys. Formulas are deliberately
//! simple first-order models.

use crate::error::Result;
use crate::solver::Solver;
use crate::state::{state_map, StateMap, StateView};

/// Circulating fluid volume (mL) with a constant baseline loss.
#[derive(Debug, Clone, Copy)]
pub struct FluidsSolver {
    pub baseline_volume: f64,
    /// mL lost per unit of time.
    pub loss_rate: f64,
}

impl Default for FluidsSolver {
    fn default() -> Self {
        Self {
            baseline_volume: 2000.0,
            loss_rate: 1.0,
        }
    }
}

impl Solver for FluidsSolver {
    fn name(&self) -> &str {
        "Fluids"
    }

    fn initial_state(&self) -> StateMap {
        state_map([("fluid_volume", self.baseline_volume)])
    }

    fn solve(&self, local: &StateView<'_>, dt: f64) -> Result<StateMap> {
        let volume = local.get_or("fluid_volume", self.baseline_volume);
        let next = (volume - self.loss_rate * dt).max(0.0);
        log::trace!("fluids: volume {volume:.2} -> {next:.2}");
        Ok(state_map([("fluid_volume", next)]))
    }
}

/// Plasma epinephrine with first-order elimination.
#[derive(Debug, Clone, Copy)]
pub struct MedsSolver {
    pub elimination_rate: f64,
}

impl Default for MedsSolver {
    fn default() -> Self {
        Self {
            elimination_rate: 0.05,
        }
    }
}

impl Solver for MedsSolver {
    fn name(&self) -> &str {
        "Meds"
    }

    fn initial_state(&self) -> StateMap {
        state_map([("epinephrine", 0.0)])
    }

    fn solve(&self, local: &StateView<'_>, dt: f64) -> Result<StateMap> {
        let epi = local.get_or("epinephrine", 0.0);
        let next = (epi - self.elimination_rate * epi * dt).max(0.0);
        Ok(state_map([("epinephrine", next)]))
    }
}

/// Core temperature driven by infection, antipyretics and regulation
/// toward baseline.
#[derive(Debug, Clone, Copy)]
pub struct FeverSolver {
    pub baseline_temp: f64,
    pub max_fever: f64,
    pub infection_temp_factor: f64,
    pub antipyretic_effect: f64,
    pub natural_regulation_rate: f64,
}

/// Severe hypothermia floor, °C.
const MIN_TEMPERATURE: f64 = 35.0;

impl Default for FeverSolver {
    fn default() -> Self {
        Self {
            baseline_temp: 37.0,
            max_fever: 41.5,
            infection_temp_factor: 0.03,
            antipyretic_effect: 0.02,
            natural_regulation_rate: 0.01,
        }
    }
}

impl Solver for FeverSolver {
    fn name(&self) -> &str {
        "Fever"
    }

    fn initial_state(&self) -> StateMap {
        state_map([
            ("temperature", self.baseline_temp),
            ("infection_level", 0.0),
            ("antipyretic_level", 0.0),
        ])
    }

    fn solve(&self, local: &StateView<'_>, dt: f64) -> Result<StateMap> {
        let temp = local.get_or("temperature", self.baseline_temp);
        let infection = local.get_or("infection_level", 0.0);
        let antipyretic = local.get_or("antipyretic_level", 0.0);

        let warming = self.infection_temp_factor * infection * dt;
        let cooling = self.antipyretic_effect * antipyretic * dt;
        let regulation = self.natural_regulation_rate * (self.baseline_temp - temp) * dt;
        let next = (temp + warming - cooling + regulation).clamp(MIN_TEMPERATURE, self.max_fever);

        Ok(state_map([
            ("temperature", next),
            ("infection_level", (infection - 0.1 * dt).max(0.0)),
            ("antipyretic_level", (antipyretic - 0.2 * dt).max(0.0)),
        ]))
    }
}

/// Lactate production and clearance as a function of tissue perfusion.
///
/// Perfusion is owned here but driven by
/// [`PerfusionCoupler`](super::PerfusionCoupler), which can see mean
/// arterial pressure.
#[derive(Debug, Clone, Copy)]
pub struct LactateSolver {
    pub baseline_production: f64,
    pub clearance_rate: f64,
    pub perfusion_sensitivity: f64,
}

impl Default for LactateSolver {
    fn default() -> Self {
        Self {
            baseline_production: 0.02,
            clearance_rate: 0.05,
            perfusion_sensitivity: 0.1,
        }
    }
}

impl Solver for LactateSolver {
    fn name(&self) -> &str {
        "Lactate"
    }

    fn initial_state(&self) -> StateMap {
        state_map([("lactate", 0.8), ("perfusion", 100.0)])
    }

    fn solve(&self, local: &StateView<'_>, dt: f64) -> Result<StateMap> {
        let lactate = local.get_or("lactate", 0.8);
        let perfusion = local.get_or("perfusion", 100.0).clamp(0.0, 100.0);

        let production =
            self.baseline_production + self.perfusion_sensitivity * (100.0 - perfusion) / 100.0;
        let clearance = self.clearance_rate * perfusion / 100.0;
        let next = (lactate + (production - clearance * lactate) * dt).max(0.0);

        Ok(state_map([("lactate", next)]))
    }
}

/// Normal serum electrolyte levels with per-ion regulation rates.
#[derive(Debug, Clone, Copy)]
pub struct Electrolyte {
    pub key: &'static str,
    pub normal: f64,
    pub regulation_rate: f64,
}

/// Homeostatic regulation of serum electrolytes toward their normal values.
///
/// Relaxation is exponential, so a large `dt` settles on the normal value
/// instead of overshooting it.
#[derive(Debug, Clone)]
pub struct ElectrolytesSolver {
    pub electrolytes: Vec<Electrolyte>,
}

impl Default for ElectrolytesSolver {
    fn default() -> Self {
        let ion = |key, normal, regulation_rate| Electrolyte {
            key,
            normal,
            regulation_rate,
        };
        Self {
            electrolytes: vec![
                ion("sodium", 140.0, 0.02),
                ion("potassium", 4.0, 0.05),
                ion("chloride", 102.0, 0.03),
                ion("calcium", 9.5, 0.04),
                ion("magnesium", 2.0, 0.03),
                ion("phosphate", 3.5, 0.02),
            ],
        }
    }
}

impl Solver for ElectrolytesSolver {
    fn name(&self) -> &str {
        "Electrolytes"
    }

    fn initial_state(&self) -> StateMap {
        self.electrolytes
            .iter()
            .map(|e| (e.key.to_string(), e.normal))
            .collect()
    }

    fn solve(&self, local: &StateView<'_>, dt: f64) -> Result<StateMap> {
        Ok(self
            .electrolytes
            .iter()
            .map(|e| {
                let level = local.get_or(e.key, e.normal);
                let retained = (-e.regulation_rate * dt).exp();
                (e.key.to_string(), e.normal + (level - e.normal) * retained)
            })
            .collect())
    }
}
