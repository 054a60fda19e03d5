//! Typed events decoded from the execution stream.

use serde::{Deserialize, Serialize};

use crate::error::RunFailure;

/// One event record from the execution stream.
///
/// The wire format is a JSON object whose `type` field selects the
/// variant; payload fields are camelCase. Unknown fields are ignored so
/// the service can grow its payloads without breaking older clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Keep-alive progress signal. Informational only; never times out
    /// the stream.
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        #[serde(default)]
        elapsed_ms: Option<u64>,
    },
    /// Human-readable progress note.
    Progress { message: String },
    /// The server accepted the run for the given prompt.
    #[serde(rename_all = "camelCase")]
    Started {
        #[serde(default)]
        prompt_id: Option<String>,
    },
    /// The upstream model call began; carries the remote response id
    /// used for cancellation.
    #[serde(rename_all = "camelCase")]
    ApiStarted {
        response_id: String,
        #[serde(default)]
        status: Option<String>,
    },
    ThinkingStarted,
    /// Incremental reasoning text.
    ThinkingDelta { delta: String },
    ThinkingDone,
    /// Incremental output text.
    OutputTextDelta { delta: String },
    /// Full output text, emitted once streaming of it finished.
    OutputTextDone { text: String },
    /// Incremental token usage. Values are increments, not totals.
    #[serde(rename_all = "camelCase")]
    UsageDelta {
        #[serde(default)]
        input_tokens: Option<u64>,
        #[serde(default)]
        output_tokens: Option<u64>,
    },
    /// Server-side status note, informational.
    StatusUpdate { status: String },
    /// A tool invocation began.
    ToolStart {
        tool: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    /// A tool invocation finished.
    ToolEnd { tool: String },
    /// All tool calls for the current round resolved; output resumes.
    ToolLoopComplete,
    /// The model needs an answer from the user before it can continue.
    #[serde(rename_all = "camelCase")]
    UserInputRequired {
        question: String,
        #[serde(default)]
        variable_name: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        call_id: Option<String>,
    },
    /// Terminal: the run finished successfully.
    Complete(CompletePayload),
    /// Terminal: the run failed.
    #[serde(rename_all = "camelCase")]
    Error {
        error: String,
        #[serde(default)]
        error_code: Option<String>,
        #[serde(default)]
        prompt_name: Option<String>,
        #[serde(default)]
        retry_after_s: Option<u64>,
    },
}

impl StreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

/// Result fields carried by a `complete` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayload {
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub output_text: Option<String>,
    #[serde(default)]
    pub usage: Option<UsageTotals>,
}

/// Final token totals reported on completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl StreamEvent {
    /// Convert an `error` event into its structured failure.
    ///
    /// Returns `None` for every other variant.
    pub fn into_failure(self) -> Option<RunFailure> {
        match self {
            Self::Error {
                error,
                error_code,
                prompt_name,
                retry_after_s,
            } => Some(RunFailure {
                message: error,
                code: error_code,
                prompt_name,
                retry_after_s,
            }),
            _ => None,
        }
    }
}
