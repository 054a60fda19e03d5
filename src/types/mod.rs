//! Core types: wire events, run lifecycle, requests.

pub mod event;
pub mod run;

pub use event::{CompletePayload, StreamEvent, UsageTotals};
pub use run::{
    CancelRequest, CancelResponse, OwnerId, PendingQuestion, PromptId, ReasoningEffort,
    RemoteCancelStatus, RunId, RunOutcome, RunRequest, RunResult, RunStatus, RunUsage, Thread,
    ThreadId, ToolActivity, ToolStatus,
};
