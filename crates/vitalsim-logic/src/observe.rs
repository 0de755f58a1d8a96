//! Snapshot sinks. Observers only; nothing they do feeds back into state.

use serde::{Deserialize, Serialize};

use crate::state::StateMap;

/// Receives the state after each completed step.
pub trait SnapshotSink {
    fn record(&mut self, time: f64, state: &StateMap);
}

/// Discards every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl SnapshotSink for NullSink {
    fn record(&mut self, _time: f64, _state: &StateMap) {}
}

/// Logs every `every`-th snapshot at info level.
#[derive(Debug, Clone)]
pub struct LogSink {
    every: u64,
    seen: u64,
}

impl LogSink {
    /// `every` is clamped to at least 1.
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            seen: 0,
        }
    }
}

impl SnapshotSink for LogSink {
    fn record(&mut self, time: f64, state: &StateMap) {
        self.seen += 1;
        if self.seen % self.every != 0 {
            return;
        }
        let rendered: Vec<String> = state.iter().map(|(k, v)| format!("{k}={v:.2}")).collect();
        log::info!("t={time:.2} {}", rendered.join(", "));
    }
}

/// One recorded snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub time: f64,
    pub state: StateMap,
}

/// Keeps every snapshot in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub frames: Vec<Frame>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn last(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Time series of one key. Frames where the key was absent are skipped.
    pub fn series(&self, key: &str) -> Vec<(f64, f64)> {
        self.frames
            .iter()
            .filter_map(|f| f.state.get(key).map(|&v| (f.time, v)))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl SnapshotSink for History {
    fn record(&mut self, time: f64, state: &StateMap) {
        self.frames.push(Frame {
            time,
            state: state.clone(),
        });
    }
}
