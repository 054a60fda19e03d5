//! Process-wide table of concurrently active runs.
//!
//! Each entry is a live-updated, read-only projection of one run,
//! mirrored from its driver task. Entries are destroyed on terminal
//! transitions (or explicit removal) and never persisted.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::types::{PromptId, RunId, RunStatus, RunUsage, ThreadId, ToolActivity};

use super::cancel::RunCanceller;

/// Callback fired when a run reaches a terminal state and leaves the
/// registry. Replaces ad-hoc cross-component refresh broadcasting.
pub type TerminalListener = Arc<dyn Fn(RunId, RunStatus) + Send + Sync>;

/// Caller-supplied metadata for a new registry entry.
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub prompt_id: PromptId,
    pub thread_id: Option<ThreadId>,
    pub model: Option<String>,
}

/// Partial update merged into an entry.
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub thread_id: Option<ThreadId>,
    /// `Some(Some(id))` assigns, `Some(None)` clears.
    pub remote_response_id: Option<Option<String>>,
    pub tool_activity: Option<Vec<ToolActivity>>,
}

impl RunUpdate {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn response_id(id: Option<String>) -> Self {
        Self {
            remote_response_id: Some(id),
            ..Default::default()
        }
    }
}

/// Read-only snapshot of one registry entry, for dashboard views.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub prompt_id: PromptId,
    pub thread_id: Option<ThreadId>,
    pub status: RunStatus,
    pub model: Option<String>,
    pub started_at: DateTime<Utc>,
    pub remote_response_id: Option<String>,
    pub reasoning_text: String,
    pub output_text: String,
    pub tool_activity: Vec<ToolActivity>,
    pub usage: RunUsage,
}

struct RunEntry {
    snapshot: RunSnapshot,
    canceller: Option<Arc<RunCanceller>>,
}

/// Live dashboard of active runs.
///
/// Entries share no mutable state with each other beyond the map; all
/// per-entry mutation happens under the map lock, keyed by run id, so
/// a failed run can never touch another run's entry.
#[derive(Default)]
pub struct CallRegistry {
    runs: RwLock<HashMap<RunId, RunEntry>>,
    terminal_listeners: RwLock<Vec<TerminalListener>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry with status `queued` and return its id.
    pub fn register(&self, meta: RunMetadata) -> RunId {
        let run_id = Uuid::new_v4();
        let entry = RunEntry {
            snapshot: RunSnapshot {
                run_id,
                prompt_id: meta.prompt_id,
                thread_id: meta.thread_id,
                status: RunStatus::Queued,
                model: meta.model,
                started_at: Utc::now(),
                remote_response_id: None,
                reasoning_text: String::new(),
                output_text: String::new(),
                tool_activity: Vec::new(),
                usage: RunUsage::default(),
            },
            canceller: None,
        };
        self.runs.write().unwrap().insert(run_id, entry);
        debug!(%run_id, "run registered");
        run_id
    }

    /// Attach the cancel capability once the run's stream is wired up.
    pub fn attach_canceller(&self, run_id: RunId, canceller: Arc<RunCanceller>) {
        if let Some(entry) = self.runs.write().unwrap().get_mut(&run_id) {
            entry.canceller = Some(canceller);
        }
    }

    /// The cancel capability for a run, if it is still active.
    pub fn canceller(&self, run_id: RunId) -> Option<Arc<RunCanceller>> {
        self.runs
            .read()
            .unwrap()
            .get(&run_id)
            .and_then(|e| e.canceller.clone())
    }

    /// Merge partial fields into an entry. Unknown ids are ignored.
    pub fn update(&self, run_id: RunId, update: RunUpdate) {
        if let Some(entry) = self.runs.write().unwrap().get_mut(&run_id) {
            if let Some(status) = update.status {
                entry.snapshot.status = status;
            }
            if let Some(thread_id) = update.thread_id {
                entry.snapshot.thread_id = Some(thread_id);
            }
            if let Some(response_id) = update.remote_response_id {
                entry.snapshot.remote_response_id = response_id;
            }
            if let Some(tools) = update.tool_activity {
                entry.snapshot.tool_activity = tools;
            }
        }
    }

    /// Append a reasoning delta in arrival order.
    pub fn append_reasoning(&self, run_id: RunId, delta: &str) {
        if let Some(entry) = self.runs.write().unwrap().get_mut(&run_id) {
            entry.snapshot.reasoning_text.push_str(delta);
        }
    }

    /// Append an output delta in arrival order.
    pub fn append_output(&self, run_id: RunId, delta: &str) {
        if let Some(entry) = self.runs.write().unwrap().get_mut(&run_id) {
            entry.snapshot.output_text.push_str(delta);
        }
    }

    /// Add to the running output-token counter.
    pub fn increment_output_tokens(&self, run_id: RunId, n: u64) {
        if let Some(entry) = self.runs.write().unwrap().get_mut(&run_id) {
            entry.snapshot.usage.output_tokens += n;
        }
    }

    /// Add to the running input-token counter.
    pub fn increment_input_tokens(&self, run_id: RunId, n: u64) {
        if let Some(entry) = self.runs.write().unwrap().get_mut(&run_id) {
            entry.snapshot.usage.input_tokens += n;
        }
    }

    /// Delete an entry unconditionally. Idempotent; fires no listeners.
    pub fn remove(&self, run_id: RunId) {
        self.runs.write().unwrap().remove(&run_id);
    }

    /// Remove an entry on a terminal transition and notify observers.
    pub fn finish(&self, run_id: RunId, terminal: RunStatus) {
        debug_assert!(terminal.is_terminal());
        let removed = self.runs.write().unwrap().remove(&run_id).is_some();
        if !removed {
            return;
        }
        debug!(%run_id, status = %terminal, "run finished");
        let listeners = self.terminal_listeners.read().unwrap().clone();
        for listener in listeners {
            listener(run_id, terminal);
        }
    }

    /// Subscribe to terminal transitions.
    pub fn on_run_terminal(&self, listener: TerminalListener) {
        self.terminal_listeners.write().unwrap().push(listener);
    }

    /// Snapshot of one entry.
    pub fn snapshot(&self, run_id: RunId) -> Option<RunSnapshot> {
        self.runs
            .read()
            .unwrap()
            .get(&run_id)
            .map(|e| e.snapshot.clone())
    }

    /// Snapshots of all active runs, for a "show all runs" view.
    pub fn active_runs(&self) -> Vec<RunSnapshot> {
        self.runs
            .read()
            .unwrap()
            .values()
            .map(|e| e.snapshot.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.runs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().unwrap().is_empty()
    }
}
