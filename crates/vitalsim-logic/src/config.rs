//! Run plans: a time step, a step count and a schedule of interventions.
//!
//! A [`RunConfig`] is plain JSON so that scripted runs can live next to the
//! harness as data files:
//!
//! ```json
//! {
//!   "dt": 60.0,
//!   "steps": 240,
//!   "log_every": 30,
//!   "events": [
//!     { "at_step": 0, "event": { "type": "activate_scenario", "name": "Sepsis" } },
//!     { "at_step": 60, "event": { "type": "perform_action", "name": "Antibiotics" } }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::action::ActionParams;
use crate::error::{Result, SimError};
use crate::state::StateMap;

fn default_log_every() -> u64 {
    1
}

/// A scripted simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub dt: f64,
    pub steps: u64,
    /// Record every N-th step in a [`LogSink`](crate::observe::LogSink).
    #[serde(default = "default_log_every")]
    pub log_every: u64,
    #[serde(default)]
    pub events: Vec<ScheduledEvent>,
}

/// An intervention applied immediately before step `at_step` (0-based).
///
/// Events with `at_step >= steps` never fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub at_step: u64,
    pub event: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ActivateScenario {
        name: String,
    },
    DeactivateScenario {
        name: String,
    },
    PerformAction {
        name: String,
        #[serde(default)]
        params: ActionParams,
    },
    DirectDeltas {
        deltas: StateMap,
    },
}

impl RunConfig {
    pub fn new(dt: f64, steps: u64) -> Self {
        Self {
            dt,
            steps,
            log_every: default_log_every(),
            events: Vec::new(),
        }
    }

    /// Add an event to the schedule.
    pub fn at(mut self, at_step: u64, event: EventKind) -> Self {
        self.events.push(ScheduledEvent { at_step, event });
        self
    }

    /// Parse and validate a JSON run plan.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(SimError::InvalidTimeStep { dt: self.dt });
        }
        if self.log_every == 0 {
            return Err(SimError::Config("log_every must be at least 1".into()));
        }
        Ok(())
    }

    /// Events scheduled for `step`, in file order.
    pub fn events_at(&self, step: u64) -> impl Iterator<Item = &EventKind> + '_ {
        self.events
            .iter()
            .filter(move |e| e.at_step == step)
            .map(|e| &e.event)
    }

    /// Simulated time covered by the whole run.
    pub fn total_time(&self) -> f64 {
        self.dt * self.steps as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::state_map;

    #[test]
    fn test_parse_tagged_events() {
        let json = r#"{
            "dt": 1.0,
            "steps": 10,
            "events": [
                { "at_step": 0, "event": { "type": "activate_scenario", "name": "Fever" } },
                { "at_step": 3, "event": { "type": "perform_action", "name": "Epinephrine",
                  "params": { "dose_multiplier": 2.0 } } },
                { "at_step": 3, "event": { "type": "direct_deltas", "deltas": { "x": 5.0 } } },
                { "at_step": 8, "event": { "type": "deactivate_scenario", "name": "Fever" } }
            ]
        }"#;
        let config = RunConfig::from_json(json).unwrap();
        assert_eq!(config.log_every, 1);
        assert_eq!(config.events.len(), 4);
        let at_three: Vec<_> = config.events_at(3).collect();
        assert_eq!(at_three.len(), 2);
        assert_eq!(
            at_three[1],
            &EventKind::DirectDeltas {
                deltas: state_map([("x", 5.0)])
            }
        );
        match at_three[0] {
            EventKind::PerformAction { name, params } => {
                assert_eq!(name, "Epinephrine");
                assert_eq!(params["dose_multiplier"], 2.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_time_step() {
        let err = RunConfig::from_json(r#"{ "dt": 0.0, "steps": 1 }"#);
        assert!(matches!(err, Err(SimError::InvalidTimeStep { .. })));
        let err = RunConfig::from_json(r#"{ "dt": -1.0, "steps": 1 }"#);
        assert!(matches!(err, Err(SimError::InvalidTimeStep { .. })));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = RunConfig::from_json(r#"{ "dt": 1.0 }"#);
        assert!(matches!(err, Err(SimError::Config(_))));
        let err = RunConfig::from_json(r#"{ "dt": 1.0, "steps": 1, "log_every": 0 }"#);
        assert!(matches!(err, Err(SimError::Config(_))));
    }

    #[test]
    fn test_builder_round_trips_through_json() {
        let config = RunConfig::new(0.5, 4).at(
            1,
            EventKind::ActivateScenario {
                name: "Sepsis".into(),
            },
        );
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(RunConfig::from_json(&json).unwrap(), config);
        assert_eq!(config.total_time(), 2.0);
    }
}
