//! Clinical scenarios: fever, sepsis, hemorrhage.
//!
//! Durations are in simulation seconds. Each scenario reads the current
//! value of its affected keys as a baseline and returns absolute targets.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::scenario::{lerp, phase_progress, ScenarioModel, INDEFINITE};
use crate::state::{key_set, state_map, KeySet, StateMap, StateView};

// ── Fever ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeverPhase {
    Onset,
    Peak,
    Resolution,
}

/// Body temperature rises linearly to a peak, holds, then falls back.
#[derive(Debug, Clone)]
pub struct FeverScenario {
    pub peak_temp: f64,
    pub onset_duration: f64,
    pub peak_duration: f64,
    pub resolution_duration: f64,
    pub baseline_temp: f64,
    phase: FeverPhase,
}

impl FeverScenario {
    pub fn new(
        peak_temp: f64,
        onset_duration: f64,
        peak_duration: f64,
        resolution_duration: f64,
    ) -> Self {
        Self {
            peak_temp,
            onset_duration,
            peak_duration,
            resolution_duration,
            baseline_temp: 37.0,
            phase: FeverPhase::Onset,
        }
    }

    fn peak_end(&self) -> f64 {
        self.onset_duration + self.peak_duration
    }
}

impl Default for FeverScenario {
    fn default() -> Self {
        Self::new(39.5, 3600.0, 7200.0, 5400.0)
    }
}

impl ScenarioModel for FeverScenario {
    fn name(&self) -> &str {
        "Fever"
    }

    fn description(&self) -> String {
        format!("Fever scenario that peaks at {}°C", self.peak_temp)
    }

    fn affected_keys(&self) -> KeySet {
        key_set(["body_temperature"])
    }

    fn duration(&self) -> f64 {
        self.onset_duration + self.peak_duration + self.resolution_duration
    }

    fn initial_state(&self) -> StateMap {
        state_map([("body_temperature", self.baseline_temp)])
    }

    fn reset(&mut self) {
        self.phase = FeverPhase::Onset;
    }

    fn apply(&mut self, _state: &StateView<'_>, elapsed: f64, _dt: f64) -> Result<StateMap> {
        let temp = match self.phase {
            FeverPhase::Onset if elapsed <= self.onset_duration => {
                let t = phase_progress(elapsed, 0.0, self.onset_duration);
                lerp(self.baseline_temp, self.peak_temp, t)
            }
            FeverPhase::Onset => {
                self.phase = FeverPhase::Peak;
                self.peak_temp
            }
            FeverPhase::Peak => {
                if elapsed > self.peak_end() {
                    self.phase = FeverPhase::Resolution;
                }
                self.peak_temp
            }
            FeverPhase::Resolution => {
                let t = phase_progress(elapsed, self.peak_end(), self.resolution_duration);
                lerp(self.peak_temp, self.baseline_temp, t)
            }
        };
        Ok(state_map([("body_temperature", temp)]))
    }
}

// ── Sepsis ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SepsisPhase {
    Onset,
    Progression,
    Resolution,
}

/// Share of the total duration spent in the progression phase.
const SEPSIS_PROGRESSION_SHARE: f64 = 0.6;
/// Share of the total duration spent resolving.
const SEPSIS_RESOLUTION_SHARE: f64 = 0.4;

/// Multi-system sepsis: tachycardia, hypotension, fever, tachypnea,
/// leukocytosis (or leukopenia when severe), rising lactate and CRP.
#[derive(Debug, Clone)]
pub struct SepsisScenario {
    severity: f64,
    pub onset_duration: f64,
    pub total_duration: f64,
    phase: SepsisPhase,
}

impl SepsisScenario {
    /// `severity` is clamped to `[0.1, 2.0]`.
    pub fn new(severity: f64, onset_duration: f64, total_duration: f64) -> Self {
        Self {
            severity: severity.clamp(0.1, 2.0),
            onset_duration,
            total_duration,
            phase: SepsisPhase::Onset,
        }
    }

    pub fn severity(&self) -> f64 {
        self.severity
    }

    fn intensity(&mut self, elapsed: f64) -> f64 {
        let progression_span = self.total_duration * SEPSIS_PROGRESSION_SHARE;
        match self.phase {
            SepsisPhase::Onset if elapsed < self.onset_duration => {
                phase_progress(elapsed, 0.0, self.onset_duration) * self.severity
            }
            SepsisPhase::Onset => {
                self.phase = SepsisPhase::Progression;
                self.severity
            }
            SepsisPhase::Progression if elapsed < self.onset_duration + progression_span => {
                let additional =
                    0.2 * phase_progress(elapsed, self.onset_duration, progression_span);
                self.severity + additional * self.severity
            }
            SepsisPhase::Progression => {
                self.phase = SepsisPhase::Resolution;
                self.severity * 1.2
            }
            SepsisPhase::Resolution => {
                let t = phase_progress(
                    elapsed,
                    self.onset_duration + progression_span,
                    self.total_duration * SEPSIS_RESOLUTION_SHARE,
                );
                // Improves by up to half of the peak intensity.
                self.severity * 1.2 * (1.0 - t * 0.5)
            }
        }
    }
}

impl Default for SepsisScenario {
    fn default() -> Self {
        Self::new(1.0, 3600.0, 14400.0)
    }
}

impl ScenarioModel for SepsisScenario {
    fn name(&self) -> &str {
        "Sepsis"
    }

    fn description(&self) -> String {
        let label = if self.severity < 0.7 {
            "Mild"
        } else if self.severity < 1.3 {
            "Moderate"
        } else {
            "Severe"
        };
        format!(
            "{label} sepsis scenario (severity factor: {:.1})",
            self.severity
        )
    }

    fn affected_keys(&self) -> KeySet {
        key_set([
            "heart_rate",
            "systolic_bp",
            "diastolic_bp",
            "body_temperature",
            "respiratory_rate",
            "wbc_count",
            "lactate",
            "crp",
        ])
    }

    fn duration(&self) -> f64 {
        self.total_duration
    }

    fn initial_state(&self) -> StateMap {
        state_map([
            ("heart_rate", 75.0),
            ("systolic_bp", 120.0),
            ("diastolic_bp", 80.0),
            ("body_temperature", 37.0),
            ("respiratory_rate", 14.0),
            ("wbc_count", 7.5),
            ("lactate", 1.0),
            ("crp", 5.0),
        ])
    }

    fn reset(&mut self) {
        self.phase = SepsisPhase::Onset;
    }

    fn apply(&mut self, state: &StateView<'_>, elapsed: f64, _dt: f64) -> Result<StateMap> {
        let intensity = self.intensity(elapsed);

        // Thirty-minute temperature oscillation on top of the fever.
        let oscillation = (elapsed / 1800.0).sin() * 0.3;
        let wbc_base = state.get_or("wbc_count", 7.5);
        let wbc = if self.severity < 1.5 {
            wbc_base + 8.0 * intensity
        } else {
            wbc_base - 2.0 * intensity + 3.0 * (elapsed / 3600.0).sin()
        };

        Ok(state_map([
            ("heart_rate", state.get_or("heart_rate", 75.0) + 30.0 * intensity),
            ("systolic_bp", state.get_or("systolic_bp", 120.0) - 20.0 * intensity),
            ("diastolic_bp", state.get_or("diastolic_bp", 80.0) - 15.0 * intensity),
            (
                "body_temperature",
                state.get_or("body_temperature", 37.0) + 1.5 * intensity + oscillation,
            ),
            (
                "respiratory_rate",
                state.get_or("respiratory_rate", 14.0) + 8.0 * intensity,
            ),
            ("wbc_count", wbc),
            ("lactate", state.get_or("lactate", 1.0) + 3.0 * intensity),
            ("crp", state.get_or("crp", 5.0) + 80.0 * intensity),
        ]))
    }
}

// ── Hemorrhage ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HemorrhagePhase {
    Onset,
    Continued,
    Recovery,
}

/// Blood loss in mL at which compensation gives way to decompensation.
const DECOMPENSATION_LOSS: f64 = 1500.0;

/// Bleeding that worsens over the onset, continues with small random
/// variation, and optionally resolves on its own.
///
/// Without spontaneous recovery the scenario is indefinite and must be
/// deactivated explicitly.
#[derive(Debug, Clone)]
pub struct HemorrhageScenario {
    severity: f64,
    pub onset_duration: f64,
    pub spontaneous_recovery: bool,
    pub recovery_threshold: f64,
    pub recovery_duration: f64,
    seed: u64,
    rng: StdRng,
    phase: HemorrhagePhase,
    blood_lost: f64,
}

impl HemorrhageScenario {
    /// `severity` is clamped to `[0.1, 2.0]`.
    pub fn new(
        severity: f64,
        onset_duration: f64,
        spontaneous_recovery: bool,
        recovery_threshold: f64,
        recovery_duration: f64,
    ) -> Self {
        Self {
            severity: severity.clamp(0.1, 2.0),
            onset_duration,
            spontaneous_recovery,
            recovery_threshold,
            recovery_duration,
            seed: 0,
            rng: StdRng::seed_from_u64(0),
            phase: HemorrhagePhase::Onset,
            blood_lost: 0.0,
        }
    }

    /// Seed for the bleeding variation. Reapplied on every activation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn severity(&self) -> f64 {
        self.severity
    }

    /// Cumulative blood loss in mL since activation.
    pub fn blood_lost(&self) -> f64 {
        self.blood_lost
    }

    /// Bleeding intensity on a 0-10 scale (scaled by severity).
    fn bleeding_intensity(&mut self, elapsed: f64) -> f64 {
        match self.phase {
            HemorrhagePhase::Onset if elapsed < self.onset_duration => {
                phase_progress(elapsed, 0.0, self.onset_duration) * self.severity * 10.0
            }
            HemorrhagePhase::Onset => {
                self.phase = HemorrhagePhase::Continued;
                self.severity * 10.0
            }
            HemorrhagePhase::Continued
                if self.spontaneous_recovery && elapsed >= self.recovery_threshold =>
            {
                self.phase = HemorrhagePhase::Recovery;
                self.severity * 5.0
            }
            HemorrhagePhase::Continued => {
                let variation: f64 = self.rng.gen_range(-1.0..1.0);
                self.severity * (10.0 + variation)
            }
            HemorrhagePhase::Recovery => {
                let t = phase_progress(elapsed, self.recovery_threshold, self.recovery_duration);
                self.severity * 5.0 * (1.0 - t)
            }
        }
    }
}

impl Default for HemorrhageScenario {
    fn default() -> Self {
        Self::new(1.0, 900.0, true, 7200.0, 3600.0)
    }
}

impl ScenarioModel for HemorrhageScenario {
    fn name(&self) -> &str {
        "Hemorrhage"
    }

    fn description(&self) -> String {
        let label = if self.severity < 0.5 {
            "Minimal"
        } else if self.severity < 1.0 {
            "Moderate"
        } else if self.severity < 1.5 {
            "Severe"
        } else {
            "Massive"
        };
        let recovery = if self.spontaneous_recovery {
            "with potential spontaneous recovery"
        } else {
            "without spontaneous recovery"
        };
        format!(
            "{label} hemorrhage (severity: {:.1}) {recovery}",
            self.severity
        )
    }

    fn affected_keys(&self) -> KeySet {
        key_set([
            "heart_rate",
            "systolic_bp",
            "diastolic_bp",
            "blood_pressure",
            "bleeding_rate",
            "hemoglobin",
            "platelets",
            "fluid_volume",
            "hematocrit",
            "inr",
            "urine_output",
        ])
    }

    fn duration(&self) -> f64 {
        if !self.spontaneous_recovery {
            return INDEFINITE;
        }
        self.recovery_threshold + self.recovery_duration
    }

    fn initial_state(&self) -> StateMap {
        state_map([
            ("heart_rate", 75.0),
            ("systolic_bp", 120.0),
            ("diastolic_bp", 80.0),
            ("blood_pressure", 93.0),
            ("bleeding_rate", 0.0),
            ("hemoglobin", 14.0),
            ("hematocrit", 42.0),
            ("platelets", 250.0),
            ("inr", 1.0),
            ("fluid_volume", 5000.0),
            ("urine_output", 60.0),
        ])
    }

    fn reset(&mut self) {
        self.phase = HemorrhagePhase::Onset;
        self.blood_lost = 0.0;
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    fn apply(&mut self, state: &StateView<'_>, elapsed: f64, dt: f64) -> Result<StateMap> {
        let intensity = self.bleeding_intensity(elapsed);

        // 20 mL per second per unit of intensity.
        let step_loss = intensity * 20.0 * dt;
        self.blood_lost += step_loss;
        let lost = self.blood_lost;

        let hr_change = if lost < DECOMPENSATION_LOSS {
            25.0 * lost / DECOMPENSATION_LOSS
        } else {
            let drop = ((lost - DECOMPENSATION_LOSS) / 1000.0).min(1.0);
            25.0 - 50.0 * drop
        };

        let bp_drop = (lost / 2000.0).min(1.0);
        let systolic = state.get_or("systolic_bp", 120.0) - 50.0 * bp_drop;
        let diastolic = state.get_or("diastolic_bp", 80.0) - 30.0 * bp_drop;

        let fluid_volume = state.get_or("fluid_volume", 5000.0);
        let dilution = if fluid_volume > 0.0 {
            1.0 - lost / (fluid_volume + lost)
        } else {
            0.6
        };

        let platelet_drop = (lost / 2000.0).min(0.6);
        let inr_rise = (lost / 3000.0 * self.severity).min(1.0);
        let urine_drop = (lost / DECOMPENSATION_LOSS * self.severity).min(0.9);

        Ok(state_map([
            ("bleeding_rate", intensity),
            ("heart_rate", state.get_or("heart_rate", 75.0) + hr_change),
            ("systolic_bp", systolic),
            ("diastolic_bp", diastolic),
            ("blood_pressure", (systolic + 2.0 * diastolic) / 3.0),
            ("hemoglobin", state.get_or("hemoglobin", 14.0) * dilution),
            ("hematocrit", state.get_or("hematocrit", 42.0) * dilution),
            (
                "platelets",
                state.get_or("platelets", 250.0) * (1.0 - platelet_drop),
            ),
            ("inr", state.get_or("inr", 1.0) + 0.8 * inr_rise),
            ("fluid_volume", fluid_volume - step_loss),
            (
                "urine_output",
                state.get_or("urine_output", 60.0) * (1.0 - urine_drop),
            ),
        ]))
    }
}
