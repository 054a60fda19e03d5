//! Common imports for working with promptrun.

pub use crate::auth::{AccessToken, CredentialProvider, EnvCredentialProvider, StaticCredentialProvider};
pub use crate::client::{RunClient, RunHandle};
pub use crate::config::RunClientConfig;
pub use crate::error::{Result, RunError, RunFailure};
pub use crate::run::{CallRegistry, CancelOutcome, RunSnapshot};
pub use crate::thread::{PromptStore, ThreadResolver, ThreadStore};
pub use crate::types::{
    PendingQuestion, ReasoningEffort, RunOutcome, RunRequest, RunResult, RunStatus, StreamEvent,
};
