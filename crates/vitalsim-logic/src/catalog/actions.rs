//! Bedside actions: blood tests, medications, IV fluids.

use crate::action::{param_f64, Action, ActionParams};
use crate::error::{Result, SimError};
use crate::state::{key_set, state_map, KeySet, StateMap, StateView};

/// Blood drawn for one test, in liters.
const BLOOD_DRAW_VOLUME: f64 = 0.015;

/// Draws a small blood sample and reports the lab panel.
#[derive(Debug, Clone, Copy, Default)]
pub struct BloodTestAction;

impl Action for BloodTestAction {
    fn name(&self) -> &str {
        "Blood Test"
    }

    fn description(&self) -> String {
        "Perform a blood test to measure hemogram, coagulation, and other blood values".into()
    }

    fn affected_keys(&self) -> KeySet {
        key_set(["blood_volume"])
    }

    fn required_keys(&self) -> KeySet {
        key_set([
            "blood_volume",
            "hemoglobin",
            "platelets",
            "wbc",
            "inr",
            "aptt",
            "crp",
        ])
    }

    fn observable_keys(&self) -> KeySet {
        key_set([
            "hemoglobin",
            "platelets",
            "wbc",
            "inr",
            "aptt",
            "crp",
            "sodium",
            "potassium",
            "chloride",
            "glucose",
            "lactate",
        ])
    }

    fn apply(&self, _state: &StateView<'_>, _params: &ActionParams) -> Result<StateMap> {
        Ok(state_map([("blood_volume", -BLOOD_DRAW_VOLUME)]))
    }
}

/// A medication with fixed per-key effects, scaled by the `dose_multiplier`
/// parameter (default 1.0).
#[derive(Debug, Clone)]
pub struct MedicationAction {
    name: String,
    effects: StateMap,
    duration: f64,
    description: String,
}

impl MedicationAction {
    pub fn new(name: impl Into<String>, effects: StateMap, duration: f64) -> Self {
        let name = name.into();
        let description = format!("Administer {name} to the patient");
        Self {
            name,
            effects,
            duration,
            description,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn effects(&self) -> &StateMap {
        &self.effects
    }
}

impl Action for MedicationAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn affected_keys(&self) -> KeySet {
        self.effects.keys().cloned().collect()
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn apply(&self, _state: &StateView<'_>, params: &ActionParams) -> Result<StateMap> {
        let dose = param_f64(params, "dose_multiplier", 1.0);
        Ok(self
            .effects
            .iter()
            .map(|(key, delta)| (key.clone(), delta * dose))
            .collect())
    }
}

/// Standard medication formulary.
pub fn medications() -> Vec<MedicationAction> {
    vec![
        MedicationAction::new(
            "Epinephrine",
            state_map([
                ("heart_rate", 30.0),
                ("blood_pressure", 20.0),
                ("cardiac_output", 0.5),
            ]),
            10.0,
        )
        .with_description("Administer epinephrine to increase heart rate and blood pressure"),
        MedicationAction::new(
            "Propofol",
            state_map([
                ("blood_pressure", -10.0),
                ("heart_rate", -5.0),
                ("sedation_level", 2.0),
            ]),
            30.0,
        )
        .with_description("Administer propofol for sedation and anesthesia"),
        MedicationAction::new(
            "Norepinephrine",
            state_map([("blood_pressure", 15.0), ("svr", 200.0)]),
            20.0,
        )
        .with_description("Administer norepinephrine to increase blood pressure"),
        MedicationAction::new(
            "Morphine",
            state_map([
                ("pain_level", -3.0),
                ("respiratory_rate", -2.0),
                ("blood_pressure", -5.0),
            ]),
            240.0,
        )
        .with_description("Administer morphine for pain management"),
        MedicationAction::new(
            "Antibiotics",
            state_map([("infection_level", -0.5), ("wbc", -0.2)]),
            720.0,
        )
        .with_description("Administer antibiotics to fight infection"),
    ]
}

/// IV fluid bolus. Adds volume and shifts electrolyte concentrations by
/// mixing the fluid's content with the circulating volume.
#[derive(Debug, Clone)]
pub struct FluidAdministrationAction {
    fluid_type: String,
    name: String,
    /// Liters.
    volume: f64,
    /// mmol/L (g/L for glucose).
    electrolytes: StateMap,
}

impl FluidAdministrationAction {
    pub fn new(fluid_type: impl Into<String>, volume: f64, electrolytes: StateMap) -> Self {
        let fluid_type = fluid_type.into();
        Self {
            name: format!("{fluid_type} Administration"),
            fluid_type,
            volume,
            electrolytes,
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    fn keys(&self) -> KeySet {
        let mut keys = key_set(["blood_volume"]);
        keys.extend(self.electrolytes.keys().cloned());
        keys
    }
}

impl Action for FluidAdministrationAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!(
            "Administer {} mL of {} IV fluid",
            self.volume * 1000.0,
            self.fluid_type
        )
    }

    fn affected_keys(&self) -> KeySet {
        self.keys()
    }

    fn required_keys(&self) -> KeySet {
        self.keys()
    }

    fn apply(&self, state: &StateView<'_>, _params: &ActionParams) -> Result<StateMap> {
        let mut changes = state_map([("blood_volume", self.volume)]);
        let Some(current_volume) = state.get("blood_volume") else {
            return Ok(changes);
        };

        let mixed_volume = current_volume + self.volume;
        if mixed_volume <= 0.0 {
            return Err(SimError::computation(
                &self.name,
                format!("non-positive mixed volume {mixed_volume}"),
            ));
        }
        for (electrolyte, concentration) in &self.electrolytes {
            if let Some(current) = state.get(electrolyte) {
                let mixed = (current * current_volume + concentration * self.volume) / mixed_volume;
                changes.insert(electrolyte.clone(), mixed - current);
            }
        }
        Ok(changes)
    }
}

/// Standard IV fluids, 500 mL each.
pub fn fluids() -> Vec<FluidAdministrationAction> {
    vec![
        FluidAdministrationAction::new(
            "Normal Saline",
            0.5,
            state_map([("sodium", 154.0), ("chloride", 154.0)]),
        ),
        FluidAdministrationAction::new(
            "Lactated Ringer's",
            0.5,
            state_map([
                ("sodium", 130.0),
                ("potassium", 4.0),
                ("calcium", 3.0),
                ("chloride", 109.0),
                ("lactate", 28.0),
            ]),
        ),
        FluidAdministrationAction::new("D5W", 0.5, state_map([("glucose", 50.0)])),
    ]
}
