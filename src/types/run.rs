//! Run lifecycle types and request/response bodies.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RunError;

use super::event::UsageTotals;

/// Local identifier for one tracked run.
pub type RunId = Uuid;

/// Identifier of a prompt node in the authoring tree.
pub type PromptId = Uuid;

/// Remote conversation identifier, assigned by the execution service.
pub type ThreadId = String;

/// Owner of a thread (account or workspace scope).
pub type OwnerId = String;

/// Lifecycle status of a run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    StreamingThinking,
    StreamingOutput,
    ExecutingTools,
    Completed,
    Errored,
    Cancelled,
}

impl RunStatus {
    /// Terminal states admit no further event processing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Cancelled)
    }

    /// States in which the remote response id must be present.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::InProgress
                | Self::StreamingThinking
                | Self::StreamingOutput
                | Self::ExecutingTools
        )
    }
}

/// Status of one tool invocation inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Complete,
}

/// One tool invocation observed on the stream, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolActivity {
    pub name: String,
    pub args: serde_json::Value,
    pub status: ToolStatus,
}

/// Running token usage for a run. Monotone: counters only increase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl RunUsage {
    /// Apply an incremental usage delta.
    pub fn add(&mut self, input: Option<u64>, output: Option<u64>) {
        self.input_tokens += input.unwrap_or(0);
        self.output_tokens += output.unwrap_or(0);
    }

    /// Raise counters to at least the reported final totals.
    pub fn reconcile(&mut self, totals: UsageTotals) {
        self.input_tokens = self.input_tokens.max(totals.input_tokens);
        self.output_tokens = self.output_tokens.max(totals.output_tokens);
    }
}

/// Requested reasoning effort for the model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// Outbound execute request, serialized as the wire body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub prompt_id: PromptId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
    pub user_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_variables: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_in_history: Option<bool>,
}

impl RunRequest {
    pub fn new(prompt_id: PromptId, user_message: impl Into<String>) -> Self {
        Self {
            prompt_id,
            thread_id: None,
            user_message: user_message.into(),
            template_variables: None,
            model: None,
            reasoning_effort: None,
            store_in_history: None,
        }
    }

    pub fn with_thread(mut self, thread_id: ThreadId) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }
}

/// Body of a remote-cancel request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub response_id: String,
}

/// Remote-cancel response. `completed` means the run finished before
/// the cancel landed; that is a no-op, not a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub status: RemoteCancelStatus,
    #[serde(default)]
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCancelStatus {
    Completed,
    Cancelled,
}

/// Question surfaced by a `user_input_required` event. The run is
/// suspended until the caller answers through its [`RunHandle`].
///
/// [`RunHandle`]: crate::client::RunHandle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuestion {
    pub question: String,
    pub variable_name: Option<String>,
    pub description: Option<String>,
    pub call_id: Option<String>,
}

/// Persisted conversation continuity record, owned by the persistence
/// collaborator. At most one active thread exists per
/// `(root_prompt_id, owner_id)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub thread_id: ThreadId,
    pub root_prompt_id: PromptId,
    pub owner_id: OwnerId,
    pub is_active: bool,
    pub last_message_at: DateTime<Utc>,
}

/// Final data for a successfully completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    pub output_text: String,
    pub reasoning_text: String,
    pub usage: RunUsage,
    pub thread_id: Option<ThreadId>,
    pub response_id: Option<String>,
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunResult),
    Cancelled,
    Failed(RunError),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}
