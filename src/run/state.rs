//! Per-run state machine driven by decoded stream events.

use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::error::RunFailure;
use crate::types::{
    CompletePayload, PendingQuestion, PromptId, RunId, RunResult, RunStatus, RunUsage,
    StreamEvent, ThreadId, ToolActivity, ToolStatus,
};

/// Shared holder for the remote response id.
///
/// The id becomes unusable for cancellation the instant a `complete`
/// event is processed, so both the state machine (on terminal events)
/// and the cancellation coordinator clear it through the same
/// atomic take. Whoever takes it first wins; the other side sees `None`.
#[derive(Debug, Clone, Default)]
pub struct ResponseIdSlot(Arc<Mutex<Option<String>>>);

impl ResponseIdSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: String) {
        *self.0.lock().unwrap() = Some(id);
    }

    /// Atomically read and clear the slot.
    pub fn take(&self) -> Option<String> {
        self.0.lock().unwrap().take()
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }
}

/// What applying one event did to the run.
#[derive(Debug)]
pub enum Applied {
    /// Non-terminal event processed.
    Progressed,
    /// The run is suspended waiting for a user answer.
    Suspended(PendingQuestion),
    /// Terminal: the run completed.
    Completed,
    /// Terminal: the run failed.
    Failed(RunFailure),
    /// The run was already terminal; the event was discarded.
    Ignored,
}

/// Lifecycle state of one run. Owned by the driver task; mutated only
/// through [`apply`](Self::apply) and the cancellation path.
#[derive(Debug)]
pub struct RunState {
    pub run_id: RunId,
    pub prompt_id: PromptId,
    pub thread_id: Option<ThreadId>,
    pub status: RunStatus,
    response_id: ResponseIdSlot,
    pub reasoning_text: String,
    pub output_text: String,
    pub final_output_text: Option<String>,
    pub tool_activity: Vec<ToolActivity>,
    pub usage: RunUsage,
    pub remote_status: Option<String>,
    pub pending_question: Option<PendingQuestion>,
    complete: Option<CompletePayload>,
}

impl RunState {
    pub fn new(run_id: RunId, prompt_id: PromptId, thread_id: Option<ThreadId>) -> Self {
        Self {
            run_id,
            prompt_id,
            thread_id,
            status: RunStatus::Queued,
            response_id: ResponseIdSlot::new(),
            reasoning_text: String::new(),
            output_text: String::new(),
            final_output_text: None,
            tool_activity: Vec::new(),
            usage: RunUsage::default(),
            remote_status: None,
            pending_question: None,
            complete: None,
        }
    }

    /// The shared response-id slot, for wiring into a canceller.
    pub fn response_id_slot(&self) -> ResponseIdSlot {
        self.response_id.clone()
    }

    /// Queued → InProgress, once the execute request is on the wire.
    pub fn begin(&mut self) {
        if self.status == RunStatus::Queued {
            self.status = RunStatus::InProgress;
        }
    }

    /// Mark the run locally cancelled. Usually the cancellation
    /// coordinator has already taken the response id; clearing it here
    /// keeps the terminal-implies-cleared invariant on every path.
    pub fn mark_cancelled(&mut self) {
        let _ = self.response_id.take();
        if !self.status.is_terminal() {
            self.status = RunStatus::Cancelled;
        }
    }

    /// Clear the pending question once the caller answered it.
    pub fn resume(&mut self) {
        self.pending_question = None;
    }

    /// Apply one decoded event.
    ///
    /// No-op once a terminal state is reached. Accumulators are
    /// append-only and preserve stream-arrival order.
    pub fn apply(&mut self, event: StreamEvent) -> Applied {
        if self.status.is_terminal() {
            trace!(run_id = %self.run_id, "event after terminal state discarded");
            return Applied::Ignored;
        }

        match event {
            StreamEvent::Heartbeat { elapsed_ms } => {
                trace!(run_id = %self.run_id, ?elapsed_ms, "heartbeat");
                Applied::Progressed
            }
            StreamEvent::Progress { message } => {
                debug!(run_id = %self.run_id, %message, "progress");
                Applied::Progressed
            }
            StreamEvent::Started { .. } => Applied::Progressed,
            StreamEvent::ApiStarted {
                response_id,
                status,
            } => {
                self.response_id.set(response_id);
                self.remote_status = status;
                if self.status == RunStatus::Queued {
                    self.status = RunStatus::InProgress;
                }
                Applied::Progressed
            }
            StreamEvent::ThinkingStarted => {
                self.status = RunStatus::StreamingThinking;
                Applied::Progressed
            }
            StreamEvent::ThinkingDelta { delta } => {
                self.status = RunStatus::StreamingThinking;
                self.reasoning_text.push_str(&delta);
                Applied::Progressed
            }
            StreamEvent::ThinkingDone => Applied::Progressed,
            StreamEvent::OutputTextDelta { delta } => {
                self.status = RunStatus::StreamingOutput;
                self.output_text.push_str(&delta);
                Applied::Progressed
            }
            StreamEvent::OutputTextDone { text } => {
                self.final_output_text = Some(text);
                Applied::Progressed
            }
            StreamEvent::UsageDelta {
                input_tokens,
                output_tokens,
            } => {
                self.usage.add(input_tokens, output_tokens);
                Applied::Progressed
            }
            StreamEvent::StatusUpdate { status } => {
                self.remote_status = Some(status);
                Applied::Progressed
            }
            StreamEvent::ToolStart { tool, args } => {
                self.status = RunStatus::ExecutingTools;
                self.tool_activity.push(ToolActivity {
                    name: tool,
                    args,
                    status: ToolStatus::Running,
                });
                Applied::Progressed
            }
            StreamEvent::ToolEnd { tool } => {
                if let Some(activity) = self
                    .tool_activity
                    .iter_mut()
                    .rev()
                    .find(|a| a.name == tool && a.status == ToolStatus::Running)
                {
                    activity.status = ToolStatus::Complete;
                }
                Applied::Progressed
            }
            StreamEvent::ToolLoopComplete => {
                self.status = RunStatus::StreamingOutput;
                Applied::Progressed
            }
            StreamEvent::UserInputRequired {
                question,
                variable_name,
                description,
                call_id,
            } => {
                let pending = PendingQuestion {
                    question,
                    variable_name,
                    description,
                    call_id,
                };
                self.pending_question = Some(pending.clone());
                Applied::Suspended(pending)
            }
            StreamEvent::Complete(payload) => {
                // Read-and-clear closes the race with a concurrent cancel.
                let _ = self.response_id.take();
                if let Some(thread_id) = &payload.thread_id {
                    self.thread_id = Some(thread_id.clone());
                }
                if let Some(totals) = payload.usage {
                    self.usage.reconcile(totals);
                }
                self.complete = Some(payload);
                self.status = RunStatus::Completed;
                Applied::Completed
            }
            StreamEvent::Error {
                error,
                error_code,
                prompt_name,
                retry_after_s,
            } => {
                let _ = self.response_id.take();
                self.status = RunStatus::Errored;
                Applied::Failed(RunFailure {
                    message: error,
                    code: error_code,
                    prompt_name,
                    retry_after_s,
                })
            }
        }
    }

    /// Final result data for a completed run.
    pub fn into_result(self) -> RunResult {
        let output_text = if self.output_text.is_empty() {
            self.final_output_text
                .or_else(|| {
                    self.complete
                        .as_ref()
                        .and_then(|c| c.output_text.clone())
                })
                .unwrap_or_default()
        } else {
            self.output_text
        };
        RunResult {
            output_text,
            reasoning_text: self.reasoning_text,
            usage: self.usage,
            thread_id: self.thread_id,
            response_id: self.complete.and_then(|c| c.response_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn state() -> RunState {
        RunState::new(Uuid::new_v4(), Uuid::new_v4(), None)
    }

    #[test]
    fn happy_path_accumulates_output() {
        let mut s = state();
        s.begin();
        assert_eq!(s.status, RunStatus::InProgress);

        s.apply(StreamEvent::Started { prompt_id: None });
        s.apply(StreamEvent::ApiStarted {
            response_id: "r1".into(),
            status: None,
        });
        assert_eq!(s.response_id_slot().get().as_deref(), Some("r1"));

        s.apply(StreamEvent::OutputTextDelta { delta: "Hel".into() });
        s.apply(StreamEvent::OutputTextDelta { delta: "lo".into() });
        assert_eq!(s.status, RunStatus::StreamingOutput);

        let applied = s.apply(StreamEvent::Complete(CompletePayload::default()));
        assert!(matches!(applied, Applied::Completed));
        assert_eq!(s.status, RunStatus::Completed);
        assert!(s.response_id_slot().get().is_none());
        assert_eq!(s.into_result().output_text, "Hello");
    }

    #[test]
    fn thinking_then_output_then_tools() {
        let mut s = state();
        s.begin();
        s.apply(StreamEvent::ThinkingDelta { delta: "hmm".into() });
        assert_eq!(s.status, RunStatus::StreamingThinking);
        s.apply(StreamEvent::ThinkingDone);
        s.apply(StreamEvent::OutputTextDelta { delta: "a".into() });
        assert_eq!(s.status, RunStatus::StreamingOutput);
        s.apply(StreamEvent::ToolStart {
            tool: "search".into(),
            args: serde_json::json!({"q": "x"}),
        });
        assert_eq!(s.status, RunStatus::ExecutingTools);
        s.apply(StreamEvent::ToolEnd { tool: "search".into() });
        assert_eq!(s.tool_activity[0].status, ToolStatus::Complete);
        s.apply(StreamEvent::ToolLoopComplete);
        assert_eq!(s.status, RunStatus::StreamingOutput);
        assert_eq!(s.reasoning_text, "hmm");
    }

    #[test]
    fn error_event_is_terminal_and_clears_response_id() {
        let mut s = state();
        s.begin();
        s.apply(StreamEvent::ApiStarted {
            response_id: "r9".into(),
            status: None,
        });
        let applied = s.apply(StreamEvent::Error {
            error: "boom".into(),
            error_code: Some("QUOTA_EXCEEDED".into()),
            prompt_name: None,
            retry_after_s: Some(30),
        });
        match applied {
            Applied::Failed(f) => {
                assert_eq!(f.code.as_deref(), Some("QUOTA_EXCEEDED"));
                assert_eq!(f.retry_after_s, Some(30));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(s.status, RunStatus::Errored);
        assert!(s.response_id_slot().get().is_none());

        // Frozen after terminal.
        let applied = s.apply(StreamEvent::OutputTextDelta { delta: "x".into() });
        assert!(matches!(applied, Applied::Ignored));
        assert_eq!(s.output_text, "");
    }

    #[test]
    fn user_input_required_suspends_without_terminating() {
        let mut s = state();
        s.begin();
        let applied = s.apply(StreamEvent::UserInputRequired {
            question: "which region?".into(),
            variable_name: Some("region".into()),
            description: None,
            call_id: Some("c1".into()),
        });
        assert!(matches!(applied, Applied::Suspended(_)));
        assert!(!s.status.is_terminal());
        assert!(s.pending_question.is_some());
        s.resume();
        assert!(s.pending_question.is_none());
    }

    #[test]
    fn usage_only_increases() {
        let mut s = state();
        s.begin();
        s.apply(StreamEvent::UsageDelta {
            input_tokens: Some(10),
            output_tokens: Some(5),
        });
        s.apply(StreamEvent::UsageDelta {
            input_tokens: None,
            output_tokens: Some(7),
        });
        assert_eq!(s.usage.input_tokens, 10);
        assert_eq!(s.usage.output_tokens, 12);

        s.apply(StreamEvent::Complete(CompletePayload {
            usage: Some(crate::types::UsageTotals {
                input_tokens: 10,
                output_tokens: 12,
            }),
            ..Default::default()
        }));
        assert_eq!(s.usage.output_tokens, 12);
    }
}
