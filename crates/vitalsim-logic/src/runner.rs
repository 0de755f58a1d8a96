//! Drives an orchestrator through a [`RunConfig`].

use serde::Serialize;

use crate::config::{EventKind, RunConfig};
use crate::error::Result;
use crate::observe::SnapshotSink;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub steps: u64,
    pub final_time: f64,
    /// Scheduled events whose name resolved to nothing. Deactivating a
    /// scenario that is not active counts as a miss.
    pub missed_lookups: u64,
}

/// Apply one scheduled event. Returns `false` on a lookup miss.
pub fn apply_event(orch: &mut Orchestrator, event: &EventKind) -> Result<bool> {
    let hit = match event {
        EventKind::ActivateScenario { name } => orch.apply_scenario(name),
        EventKind::DeactivateScenario { name } => orch.deactivate_scenario(name),
        EventKind::PerformAction { name, params } => match orch.action(name) {
            Some(action) => {
                orch.perform_action(action, params)?;
                true
            }
            None => {
                log::warn!("scheduled action {name} not found");
                false
            }
        },
        EventKind::DirectDeltas { deltas } => {
            orch.apply_direct_deltas(deltas);
            true
        }
    };
    Ok(hit)
}

/// Run `config.steps` steps, applying each step's scheduled events first
/// and recording the snapshot after it.
///
/// The orchestrator keeps its own `dt`; a differing `config.dt` is logged
/// and ignored. Stops at the first failing step.
pub fn run(
    orch: &mut Orchestrator,
    config: &RunConfig,
    sink: &mut dyn SnapshotSink,
) -> Result<RunSummary> {
    config.validate()?;
    if config.dt != orch.dt() {
        log::warn!(
            "run config dt {} differs from orchestrator dt {}; using {}",
            config.dt,
            orch.dt(),
            orch.dt()
        );
    }
    if let Some(late) = config.events.iter().find(|e| e.at_step >= config.steps) {
        log::warn!(
            "event at step {} is past the end of a {}-step run and will not fire",
            late.at_step,
            config.steps
        );
    }

    let mut missed_lookups = 0;
    for step in 0..config.steps {
        for event in config.events_at(step) {
            if !apply_event(orch, event)? {
                missed_lookups += 1;
            }
        }
        orch.step()?;
        sink.record(orch.current_time(), orch.state());
    }

    let summary = RunSummary {
        steps: config.steps,
        final_time: orch.current_time(),
        missed_lookups,
    };
    log::info!(
        "run finished: {} steps, t={:.2}, {} missed lookups",
        summary.steps,
        summary.final_time,
        summary.missed_lookups
    );
    Ok(summary)
}
