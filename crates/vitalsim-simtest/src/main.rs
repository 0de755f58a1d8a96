//! Vitalsim Headless Simulation Harness
//!
//! Validates the orchestration core and the standard catalog, then drives a
//! scripted run plan end to end. Runs entirely in-process.
//!
//! Usage:
//!   cargo run -p vitalsim-simtest
//!   cargo run -p vitalsim-simtest -- --verbose
//!   cargo run -p vitalsim-simtest -- path/to/run.json

use vitalsim_logic::action::{Action, ActionParams};
use vitalsim_logic::catalog::{self, fluids, medications};
use vitalsim_logic::config::RunConfig;
use vitalsim_logic::observe::{History, LogSink, SnapshotSink};
use vitalsim_logic::runner;
use vitalsim_logic::state::StateMap;
use vitalsim_logic::{Orchestrator, INDEFINITE};

// ── Default run plan ────────────────────────────────────────────────────
const DEFAULT_RUN_JSON: &str = include_str!("../../../data/default_run.json");

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

/// Forwards every snapshot to both the log and the in-memory history.
struct Tee {
    log: LogSink,
    history: History,
}

impl SnapshotSink for Tee {
    fn record(&mut self, time: f64, state: &StateMap) {
        self.log.record(time, state);
        self.history.record(time, state);
    }
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    let plan_path = std::env::args().skip(1).find(|a| !a.starts_with("--"));
    init_logging(verbose);
    println!("=== Vitalsim Simulation Harness ===\n");

    let mut results = Vec::new();

    // 1. Catalog consistency
    results.extend(validate_catalog(verbose));

    // 2. Scenario physiology
    results.extend(validate_scenarios(verbose));

    // 3. Action effects
    results.extend(validate_actions(verbose));

    // 4. Scripted run
    results.extend(validate_run_plan(plan_path.as_deref(), verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    // The fmt subscriber also installs the `log` bridge, so library
    // `log::` records land here.
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("logging already initialised: {e}");
    }
}

fn build(dt: f64, results: &mut Vec<TestResult>) -> Option<Orchestrator> {
    match catalog::standard_orchestrator(dt) {
        Ok(orch) => Some(orch),
        Err(e) => {
            results.push(TestResult {
                name: "catalog_build".into(),
                passed: false,
                detail: format!("standard orchestrator failed to build: {}", e),
            });
            None
        }
    }
}

fn all_finite(state: &StateMap) -> bool {
    state.values().all(|v| v.is_finite())
}

// ── 1. Catalog ──────────────────────────────────────────────────────────

fn validate_catalog(verbose: bool) -> Vec<TestResult> {
    println!("--- Catalog ---");
    let mut results = Vec::new();

    let Some(orch) = build(1.0, &mut results) else {
        return results;
    };
    results.push(TestResult {
        name: "catalog_build".into(),
        passed: true,
        detail: format!(
            "{} solvers, {} couplers, {} scenarios, {} actions, {} keys",
            orch.solver_names().count(),
            orch.coupler_names().count(),
            orch.scenarios().len(),
            orch.actions().len(),
            orch.state().len()
        ),
    });

    // Action names must be unique or lookups shadow each other
    let mut names: Vec<&str> = orch.actions().iter().map(|a| a.name()).collect();
    let total = names.len();
    names.sort_unstable();
    names.dedup();
    results.push(TestResult {
        name: "catalog_unique_actions".into(),
        passed: names.len() == total,
        detail: format!("{} distinct of {} registered", names.len(), total),
    });

    // Every action declares something to touch
    let empty: Vec<&str> = orch
        .actions()
        .iter()
        .filter(|a| a.affected_keys().is_empty())
        .map(|a| a.name())
        .collect();
    results.push(TestResult {
        name: "catalog_actions_affect_keys".into(),
        passed: empty.is_empty(),
        detail: if empty.is_empty() {
            "all actions declare affected keys".into()
        } else {
            format!("no affected keys: {}", empty.join(", "))
        },
    });

    // Medications have durable effects, fluids are instantaneous
    let meds = medications();
    results.push(TestResult {
        name: "catalog_durable_medications".into(),
        passed: meds
            .iter()
            .all(|m| m.duration() > 0.0 && !m.effects().is_empty()),
        detail: format!("{} medications", meds.len()),
    });

    let fluids = fluids();
    let bolus: f64 = fluids.iter().map(|f| f.volume()).sum();
    results.push(TestResult {
        name: "catalog_fluid_volumes".into(),
        passed: fluids.iter().all(|f| f.volume() > 0.0 && f.duration() == 0.0),
        detail: format!("{:.1} L across {} fluids", bolus, fluids.len()),
    });

    // Scenario durations are finite or explicitly indefinite
    for s in orch.scenarios() {
        let duration = s.duration();
        let ok = duration > 0.0 || duration == INDEFINITE;
        results.push(TestResult {
            name: format!("catalog_scenario_{}", s.name().to_lowercase()),
            passed: ok && !s.is_active(),
            detail: if duration == INDEFINITE {
                "indefinite".into()
            } else {
                format!("{:.0} s, {}", duration, s.description())
            },
        });
    }

    if verbose {
        println!("  initial: {}", orch);
    }
    results
}

// ── 2. Scenarios ────────────────────────────────────────────────────────

fn validate_scenarios(verbose: bool) -> Vec<TestResult> {
    println!("--- Scenarios ---");
    let mut results = Vec::new();

    // Fever: peaks near 39.5 °C and returns to baseline
    if let Some(mut orch) = build(60.0, &mut results) {
        orch.apply_scenario("Fever");
        let mut peak = f64::MIN;
        let mut steps = 0;
        while orch.is_scenario_active("Fever") && steps < 1000 {
            if let Err(e) = orch.step() {
                results.push(TestResult {
                    name: "fever_step".into(),
                    passed: false,
                    detail: e.to_string(),
                });
                break;
            }
            peak = peak.max(orch.get("body_temperature").unwrap_or(f64::MIN));
            steps += 1;
        }
        let end = orch.get("body_temperature").unwrap_or(f64::NAN);
        results.push(TestResult {
            name: "fever_peak".into(),
            passed: (peak - 39.5).abs() < 1e-6,
            detail: format!("peak {:.2} °C", peak),
        });
        results.push(TestResult {
            name: "fever_resolves".into(),
            passed: !orch.is_scenario_active("Fever") && (end - 37.0).abs() < 0.1,
            detail: format!("expired after {} steps at {:.2} °C", steps, end),
        });
    }

    // Sepsis: tachycardia and CRP rise during onset
    if let Some(mut orch) = build(60.0, &mut results) {
        let hr0 = orch.get("heart_rate").unwrap_or(0.0);
        let crp0 = orch.get("crp").unwrap_or(0.0);
        orch.apply_scenario("Sepsis");
        let ok = (0..30).all(|_| orch.step().is_ok());
        let hr = orch.get("heart_rate").unwrap_or(0.0);
        let crp = orch.get("crp").unwrap_or(0.0);
        results.push(TestResult {
            name: "sepsis_onset".into(),
            passed: ok && hr > hr0 && crp > crp0 && all_finite(orch.state()),
            detail: format!("HR {:.0} -> {:.0}, CRP {:.1} -> {:.1}", hr0, hr, crp0, crp),
        });
        if verbose {
            println!("  sepsis @30: {}", orch);
        }
    }

    // Hemorrhage: pressure falls, then spontaneous recovery ends it
    if let Some(mut orch) = build(60.0, &mut results) {
        let bp0 = orch.get("blood_pressure").unwrap_or(0.0);
        orch.apply_scenario("Hemorrhage");
        let ok = (0..30).all(|_| orch.step().is_ok());
        let bp = orch.get("blood_pressure").unwrap_or(f64::NAN);
        results.push(TestResult {
            name: "hemorrhage_hypotension".into(),
            passed: ok && bp < bp0,
            detail: format!("MAP {:.1} -> {:.1}", bp0, bp),
        });
        let ok = (30..200).all(|_| orch.step().is_ok());
        results.push(TestResult {
            name: "hemorrhage_expires".into(),
            passed: ok && !orch.is_scenario_active("Hemorrhage"),
            detail: format!("t={:.0} s", orch.current_time()),
        });
    }

    results
}

// ── 3. Actions ──────────────────────────────────────────────────────────

fn validate_actions(verbose: bool) -> Vec<TestResult> {
    println!("--- Actions ---");
    let mut results = Vec::new();
    let params = ActionParams::new();

    let Some(mut orch) = build(1.0, &mut results) else {
        return results;
    };

    // Blood test draws a sample and reports labs present in state
    let before = orch.get("blood_volume").unwrap_or(0.0);
    match orch.perform_action_by_name("Blood Test", &params) {
        Ok(observed) => {
            let after = orch.get("blood_volume").unwrap_or(0.0);
            results.push(TestResult {
                name: "action_blood_test".into(),
                passed: (before - after - 0.015).abs() < 1e-9,
                detail: format!("{} observable labs, drew {:.3} L", observed.len(), before - after),
            });
        }
        Err(e) => results.push(TestResult {
            name: "action_blood_test".into(),
            passed: false,
            detail: e.to_string(),
        }),
    }

    // Epinephrine bolus decays out of the ledger after its duration
    let hr0 = orch.get("heart_rate").unwrap_or(0.0);
    let performed = orch.perform_action_by_name("Epinephrine", &params).is_ok();
    let hr1 = orch.get("heart_rate").unwrap_or(0.0);
    let durable = orch.active_actions().len();
    let ok = (0..10).all(|_| orch.step().is_ok());
    results.push(TestResult {
        name: "action_epinephrine_decay".into(),
        passed: performed && ok && hr1 > hr0 && durable == 1 && orch.active_actions().is_empty(),
        detail: format!("HR {:.0} -> {:.0}, ledger {} -> {}", hr0, hr1, durable, orch.active_actions().len()),
    });

    // Unknown names are quiet misses
    let miss = orch.perform_action_by_name("Leeches", &params);
    results.push(TestResult {
        name: "action_lookup_miss".into(),
        passed: matches!(miss, Ok(ref m) if m.is_empty()) && !orch.apply_scenario("Plague"),
        detail: "unknown action and scenario ignored".into(),
    });

    if verbose {
        println!("  after actions: {}", orch);
    }
    results
}

// ── 4. Run plan ─────────────────────────────────────────────────────────

fn validate_run_plan(path: Option<&str>, verbose: bool) -> Vec<TestResult> {
    println!("--- Run Plan ---");
    let mut results = Vec::new();

    let json = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(s) => s,
            Err(e) => {
                results.push(TestResult {
                    name: "plan_read".into(),
                    passed: false,
                    detail: format!("{}: {}", p, e),
                });
                return results;
            }
        },
        None => DEFAULT_RUN_JSON.to_string(),
    };
    log::info!("run plan: {}", path.unwrap_or("data/default_run.json"));

    let config = match RunConfig::from_json(&json) {
        Ok(c) => c,
        Err(e) => {
            results.push(TestResult {
                name: "plan_parse".into(),
                passed: false,
                detail: e.to_string(),
            });
            return results;
        }
    };
    results.push(TestResult {
        name: "plan_parse".into(),
        passed: true,
        detail: format!(
            "dt={} steps={} events={} ({:.1} h)",
            config.dt,
            config.steps,
            config.events.len(),
            config.total_time() / 3600.0
        ),
    });

    let Some(mut orch) = build(config.dt, &mut results) else {
        return results;
    };
    let mut sink = Tee {
        log: LogSink::new(config.log_every),
        history: History::new(),
    };
    match runner::run(&mut orch, &config, &mut sink) {
        Ok(summary) => {
            results.push(TestResult {
                name: "plan_completes".into(),
                passed: summary.steps == config.steps
                    && (summary.final_time - config.total_time()).abs() < 1e-6,
                detail: format!("{} steps, t={:.0} s", summary.steps, summary.final_time),
            });
            results.push(TestResult {
                name: "plan_lookups".into(),
                passed: summary.missed_lookups == 0,
                detail: format!("{} missed lookups", summary.missed_lookups),
            });
        }
        Err(e) => {
            results.push(TestResult {
                name: "plan_completes".into(),
                passed: false,
                detail: e.to_string(),
            });
            return results;
        }
    }

    let bad = sink
        .history
        .frames
        .iter()
        .filter(|f| !all_finite(&f.state))
        .count();
    results.push(TestResult {
        name: "plan_finite_state".into(),
        passed: bad == 0,
        detail: if bad == 0 {
            format!("{} frames, all finite", sink.history.len())
        } else {
            format!("{} frames with NaN/inf", bad)
        },
    });

    if verbose {
        println!("  final: {}", orch);
    }
    results
}
