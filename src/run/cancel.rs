//! Two-phase cancellation: local abort first, remote cancel second.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::CredentialProvider;
use crate::types::{CancelRequest, CancelResponse, RemoteCancelStatus, RunId, RunStatus};

use super::registry::CallRegistry;
use super::state::ResponseIdSlot;

/// Outcome of a [`RunCanceller::cancel`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Aborted locally; no remote response existed to cancel.
    LocalOnly,
    /// The remote confirmed the cancellation.
    RemoteCancelled,
    /// The remote reported the run had already finished. Not a failure.
    AlreadyFinished,
    /// The remote call itself failed. The local run is still cancelled,
    /// but server-side generation may continue briefly.
    RemoteFailed { warning: String },
    /// A previous cancel already ran; this call did nothing.
    AlreadyDone,
}

/// Cancel capability bound to one run.
///
/// The response id is captured and cleared before either abort phase,
/// because it becomes unusable for cancellation the instant a
/// `complete` event is processed; the shared [`ResponseIdSlot`] closes
/// that race. Local abort precedes the remote call so the caller sees
/// the run stop immediately, regardless of network latency.
pub struct RunCanceller {
    run_id: RunId,
    slot: ResponseIdSlot,
    token: CancellationToken,
    registry: Arc<CallRegistry>,
    http: reqwest::Client,
    cancel_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for RunCanceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCanceller")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl RunCanceller {
    pub fn new(
        run_id: RunId,
        slot: ResponseIdSlot,
        token: CancellationToken,
        registry: Arc<CallRegistry>,
        http: reqwest::Client,
        cancel_url: String,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            run_id,
            slot,
            token,
            registry,
            http,
            cancel_url,
            credentials,
        }
    }

    /// The token the driver task selects on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the run. Effective at most once; later calls are no-ops.
    pub async fn cancel(&self) -> CancelOutcome {
        if self.token.is_cancelled() {
            return CancelOutcome::AlreadyDone;
        }

        // Capture the response id before aborting anything.
        let captured = self.slot.take();

        // Local abort: instant, independent of the network.
        self.token.cancel();
        self.registry.finish(self.run_id, RunStatus::Cancelled);
        debug!(run_id = %self.run_id, remote = captured.is_some(), "run cancelled locally");

        let Some(response_id) = captured else {
            return CancelOutcome::LocalOnly;
        };

        match self.cancel_remote(&response_id).await {
            Ok(resp) => match resp.status {
                RemoteCancelStatus::Cancelled => CancelOutcome::RemoteCancelled,
                RemoteCancelStatus::Completed => CancelOutcome::AlreadyFinished,
            },
            Err(warning) => {
                warn!(run_id = %self.run_id, %warning, "remote cancel failed");
                CancelOutcome::RemoteFailed { warning }
            }
        }
    }

    async fn cancel_remote(&self, response_id: &str) -> Result<CancelResponse, String> {
        let token = self
            .credentials
            .access_token()
            .await
            .map_err(|e| e.to_string())?;

        let resp = self
            .http
            .post(&self.cancel_url)
            .bearer_auth(&token.token)
            .json(&CancelRequest {
                response_id: response_id.to_string(),
            })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("cancel endpoint returned {status}: {body}"));
        }
        resp.json::<CancelResponse>()
            .await
            .map_err(|e| e.to_string())
    }
}
