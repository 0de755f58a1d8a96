//! Cross-domain couplers: medication → vitals, fever → metabolism,
//! arterial pressure → tissue perfusion.

use crate::coupler::Coupler;
use crate::error::Result;
use crate::state::{key_set, state_map, KeySet, StateMap, StateView};

/// Epinephrine raises heart rate and blood pressure, blunted when fluid
/// volume is low.
#[derive(Debug, Clone, Copy, Default)]
pub struct MedsVitalsCoupler;

impl MedsVitalsCoupler {
    /// Per-unit-time `(heart_rate, blood_pressure)` effect.
    fn effects(epinephrine: f64, fluid_volume: f64) -> (f64, f64) {
        if epinephrine <= 0.0 {
            return (0.0, 0.0);
        }
        let factor = if fluid_volume < 1500.0 {
            (fluid_volume / 2000.0).max(0.5)
        } else {
            1.0
        };
        (epinephrine * 2.0 * factor, epinephrine * 0.5 * factor)
    }
}

impl Coupler for MedsVitalsCoupler {
    fn name(&self) -> &str {
        "MedsVitals"
    }

    fn input_keys(&self) -> KeySet {
        key_set(["epinephrine", "heart_rate", "blood_pressure", "fluid_volume"])
    }

    fn output_keys(&self) -> KeySet {
        key_set(["heart_rate", "blood_pressure"])
    }

    fn couple(&self, inputs: &StateView<'_>, dt: f64) -> Result<StateMap> {
        let heart_rate = inputs.get_or("heart_rate", 70.0);
        let blood_pressure = inputs.get_or("blood_pressure", 120.0);
        let (hr_effect, bp_effect) = Self::effects(
            inputs.get_or("epinephrine", 0.0),
            inputs.get_or("fluid_volume", 2000.0),
        );

        let next_hr = heart_rate + hr_effect * dt;
        let next_bp = blood_pressure + bp_effect * dt;
        if (next_hr - heart_rate).abs() > 1.0 || (next_bp - blood_pressure).abs() > 1.0 {
            log::info!(
                "meds affecting vitals: HR {heart_rate:.1} -> {next_hr:.1}, BP {blood_pressure:.1} -> {next_bp:.1}"
            );
        }
        Ok(state_map([("heart_rate", next_hr), ("blood_pressure", next_bp)]))
    }
}

/// Fever pulls heart rate, oxygen saturation and metabolic rate toward
/// temperature-dependent targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeverMetabolicCoupler;

const NORMAL_TEMP: f64 = 37.0;

impl Coupler for FeverMetabolicCoupler {
    fn name(&self) -> &str {
        "FeverMetabolic"
    }

    fn input_keys(&self) -> KeySet {
        key_set([
            "temperature",
            "heart_rate",
            "oxygen_saturation",
            "metabolic_rate",
        ])
    }

    fn output_keys(&self) -> KeySet {
        key_set(["heart_rate", "oxygen_saturation", "metabolic_rate"])
    }

    fn initial_state(&self) -> StateMap {
        state_map([
            ("temperature", NORMAL_TEMP),
            ("heart_rate", 70.0),
            ("oxygen_saturation", 98.0),
            ("metabolic_rate", 1.0),
        ])
    }

    fn couple(&self, inputs: &StateView<'_>, dt: f64) -> Result<StateMap> {
        let temperature = inputs.get_or("temperature", NORMAL_TEMP);
        let heart_rate = inputs.get_or("heart_rate", 70.0);
        let saturation = inputs.get_or("oxygen_saturation", 98.0);
        let metabolic_rate = inputs.get_or("metabolic_rate", 1.0);

        if (temperature - NORMAL_TEMP).abs() < 0.2 {
            return Ok(StateMap::new());
        }

        let delta = temperature.clamp(30.0, 43.0) - NORMAL_TEMP;
        // ~10 bpm and 7% metabolic rate per °C; saturation drops 0.3% per °C.
        let target_hr = (heart_rate + (delta * 10.0).min(40.0)).min(180.0);
        let target_sat = (saturation + (delta * -0.3).max(-10.0)).max(85.0);
        let target_metabolic = (metabolic_rate * (1.0 + delta * 0.07).min(2.0)).min(3.0);

        // Relax toward the targets; at most 10% of the gap per step.
        let alpha = (dt / 60.0).min(0.1);
        let next_hr = heart_rate + (target_hr - heart_rate) * alpha;
        let next_sat = saturation + (target_sat - saturation) * alpha;
        let next_metabolic = metabolic_rate + (target_metabolic - metabolic_rate) * alpha;

        let mut out = StateMap::new();
        if (next_hr - heart_rate).abs() > 0.5 {
            out.insert("heart_rate".into(), next_hr);
        }
        if (next_sat - saturation).abs() > 0.1 {
            out.insert("oxygen_saturation".into(), next_sat.clamp(70.0, 100.0));
        }
        if (next_metabolic - metabolic_rate).abs() > 0.01 {
            out.insert("metabolic_rate".into(), next_metabolic);
        }
        if !out.is_empty() {
            log::info!(
                "fever affecting metabolism at {temperature:.1}°C: {:?}",
                out
            );
        }
        Ok(out)
    }
}

/// Mean arterial pressure drives tissue perfusion: below 65 mmHg perfusion
/// falls in proportion to the deficit, otherwise it recovers toward 100%.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfusionCoupler;

/// Autoregulation floor, mmHg.
const PERFUSION_MAP_THRESHOLD: f64 = 65.0;

impl Coupler for PerfusionCoupler {
    fn name(&self) -> &str {
        "Perfusion"
    }

    fn input_keys(&self) -> KeySet {
        key_set(["blood_pressure", "perfusion"])
    }

    fn output_keys(&self) -> KeySet {
        key_set(["perfusion"])
    }

    fn couple(&self, inputs: &StateView<'_>, dt: f64) -> Result<StateMap> {
        let map = inputs.get_or("blood_pressure", 90.0);
        let perfusion = inputs.get_or("perfusion", 100.0);
        let next = if map < PERFUSION_MAP_THRESHOLD {
            (perfusion - (PERFUSION_MAP_THRESHOLD - map) * 2.0 * dt).clamp(0.0, 100.0)
        } else {
            (perfusion + 5.0 * dt).min(100.0)
        };
        if next < perfusion {
            log::info!("hypotension reducing perfusion: MAP {map:.1}, {perfusion:.1}% -> {next:.1}%");
        }
        Ok(state_map([("perfusion", next)]))
    }
}
