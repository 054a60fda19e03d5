//! Run initiator: composes the execute request, opens the stream, and
//! wires the decoder, state machine, registry, and canceller together.

pub mod http;

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::{AccessToken, CredentialProvider};
use crate::config::RunClientConfig;
use crate::decoder::decode_event_stream;
use crate::error::{Result, RunError};
use crate::run::{
    Applied, CallRegistry, CancelOutcome, RunCanceller, RunMetadata, RunState, RunUpdate,
};
use crate::types::{PendingQuestion, RunId, RunOutcome, RunRequest, RunStatus, StreamEvent};

use self::http::{build_client, error_from_response};

/// Client for executing prompts against the run service.
///
/// One client tracks many concurrent runs through a shared
/// [`CallRegistry`]; each run owns its own stream, state machine, and
/// cancellation token, so runs never cross-talk.
pub struct RunClient {
    config: RunClientConfig,
    http: reqwest::Client,
    registry: Arc<CallRegistry>,
    credentials: Arc<dyn CredentialProvider>,
}

impl RunClient {
    pub fn new(config: RunClientConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let http = build_client(&config);
        Self {
            config,
            http,
            registry: Arc::new(CallRegistry::new()),
            credentials,
        }
    }

    /// Use a shared registry (e.g. one dashboard across several clients).
    pub fn with_registry(mut self, registry: Arc<CallRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &Arc<CallRegistry> {
        &self.registry
    }

    /// Start a run and return a handle to it.
    ///
    /// Transport or auth failures before streaming begins surface here
    /// as `Err`; the run never enters `in_progress` and leaves no
    /// registry entry behind.
    pub async fn start_run(&self, request: RunRequest) -> Result<RunHandle> {
        let run_id = self.registry.register(RunMetadata {
            prompt_id: request.prompt_id,
            thread_id: request.thread_id.clone(),
            model: request.model.clone(),
        });

        let stream = match self.open_stream(&request).await {
            Ok(stream) => stream,
            Err(err) => {
                self.registry.remove(run_id);
                return Err(err);
            }
        };

        let mut state = RunState::new(run_id, request.prompt_id, request.thread_id.clone());
        state.begin();
        self.registry
            .update(run_id, RunUpdate::status(RunStatus::InProgress));

        let cancel_token = CancellationToken::new();
        let canceller = Arc::new(RunCanceller::new(
            run_id,
            state.response_id_slot(),
            cancel_token.clone(),
            self.registry.clone(),
            self.http.clone(),
            self.config.cancel_url(),
            self.credentials.clone(),
        ));
        self.registry.attach_canceller(run_id, canceller.clone());

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (question_tx, question_rx) = mpsc::unbounded_channel();
        let (answer_tx, answer_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RunStatus::InProgress);

        let driver = RunDriver {
            state,
            request,
            registry: self.registry.clone(),
            http: self.http.clone(),
            execute_url: self.config.execute_url(),
            credentials: self.credentials.clone(),
            cancel_token,
            question_tx,
            answer_rx,
            status_tx,
        };
        tokio::spawn(async move {
            let outcome = driver.run(stream).await;
            let _ = outcome_tx.send(outcome);
        });

        Ok(RunHandle {
            run_id,
            canceller,
            outcome_rx,
            questions: question_rx,
            answer_tx,
            status_rx,
        })
    }

    async fn open_stream(&self, request: &RunRequest) -> Result<ByteStream> {
        let token = self.credentials.access_token().await?;
        open_stream(&self.http, &self.config.execute_url(), request, &token).await
    }
}

/// Handle to one in-flight run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    canceller: Arc<RunCanceller>,
    outcome_rx: oneshot::Receiver<RunOutcome>,
    questions: mpsc::UnboundedReceiver<PendingQuestion>,
    answer_tx: mpsc::UnboundedSender<String>,
    status_rx: watch::Receiver<RunStatus>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Cancel the run. See [`RunCanceller::cancel`] for the protocol.
    pub async fn cancel(&self) -> CancelOutcome {
        self.canceller.cancel().await
    }

    /// The cancel capability, for storing apart from the handle.
    pub fn canceller(&self) -> Arc<RunCanceller> {
        self.canceller.clone()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<RunStatus> {
        self.status_rx.clone()
    }

    /// Next pending question, if the run suspends on user input.
    pub async fn next_question(&mut self) -> Option<PendingQuestion> {
        self.questions.recv().await
    }

    /// Answer a pending question. The answer re-enters the protocol as
    /// a new outbound message on the same thread.
    pub fn answer(&self, text: impl Into<String>) -> bool {
        self.answer_tx.send(text.into()).is_ok()
    }

    /// Wait for the run to reach a terminal state.
    pub async fn wait(self) -> RunOutcome {
        self.outcome_rx.await.unwrap_or(RunOutcome::Cancelled)
    }
}

type ByteStream = BoxStream<'static, Result<bytes::Bytes>>;

/// POST the execute request and return the response byte stream.
async fn open_stream(
    http: &reqwest::Client,
    url: &str,
    request: &RunRequest,
    token: &AccessToken,
) -> Result<ByteStream> {
    debug!(prompt_id = %request.prompt_id, "opening run stream");
    let resp = http
        .post(url)
        .bearer_auth(&token.token)
        .json(request)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(error_from_response(resp).await);
    }

    Ok(Box::pin(resp.bytes_stream().map(|r| r.map_err(RunError::Network))))
}

/// Owns one run for its lifetime and drives decoded events into the
/// state machine and registry.
struct RunDriver {
    state: RunState,
    request: RunRequest,
    registry: Arc<CallRegistry>,
    http: reqwest::Client,
    execute_url: String,
    credentials: Arc<dyn CredentialProvider>,
    cancel_token: CancellationToken,
    question_tx: mpsc::UnboundedSender<PendingQuestion>,
    answer_rx: mpsc::UnboundedReceiver<String>,
    status_tx: watch::Sender<RunStatus>,
}

impl RunDriver {
    async fn run(mut self, stream: ByteStream) -> RunOutcome {
        let run_id = self.state.run_id;
        let mut events = decode_event_stream(stream);
        let cancel_token = self.cancel_token.clone();

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    self.state.mark_cancelled();
                    return RunOutcome::Cancelled;
                }
                next = events.next() => {
                    // The canceller may have won the race while an event
                    // was in flight; no mutation after abort.
                    if cancel_token.is_cancelled() {
                        self.state.mark_cancelled();
                        return RunOutcome::Cancelled;
                    }
                    match next {
                        None => {
                            self.registry.finish(run_id, RunStatus::Errored);
                            return RunOutcome::Failed(RunError::NoResponse);
                        }
                        Some(Err(err)) => {
                            self.registry.finish(run_id, RunStatus::Errored);
                            return RunOutcome::Failed(err);
                        }
                        Some(Ok(event)) => match self.process(event) {
                            Processed::Continue => {}
                            Processed::Completed => {
                                return RunOutcome::Completed(self.state.into_result());
                            }
                            Processed::Failed(err) => {
                                return RunOutcome::Failed(err);
                            }
                            Processed::Suspended => {
                                match self.await_answer().await {
                                    Ok(Some(new_stream)) => {
                                        events = decode_event_stream(new_stream);
                                    }
                                    Ok(None) => {
                                        self.state.mark_cancelled();
                                        self.registry.finish(run_id, RunStatus::Cancelled);
                                        return RunOutcome::Cancelled;
                                    }
                                    Err(err) => {
                                        self.registry.finish(run_id, RunStatus::Errored);
                                        return RunOutcome::Failed(err);
                                    }
                                }
                            }
                        },
                    }
                }
            }
        }
    }

    /// Apply one event and mirror it into the registry.
    fn process(&mut self, event: StreamEvent) -> Processed {
        let run_id = self.state.run_id;
        let prev_status = self.state.status;

        // Accumulator mirroring needs the delta itself, before the
        // state machine consumes the event.
        match &event {
            StreamEvent::ThinkingDelta { delta } => {
                self.registry.append_reasoning(run_id, delta);
            }
            StreamEvent::OutputTextDelta { delta } => {
                self.registry.append_output(run_id, delta);
            }
            StreamEvent::UsageDelta {
                input_tokens,
                output_tokens,
            } => {
                if let Some(n) = input_tokens {
                    self.registry.increment_input_tokens(run_id, *n);
                }
                if let Some(n) = output_tokens {
                    self.registry.increment_output_tokens(run_id, *n);
                }
            }
            StreamEvent::ApiStarted { response_id, .. } => {
                self.registry
                    .update(run_id, RunUpdate::response_id(Some(response_id.clone())));
            }
            _ => {}
        }
        let mirror_tools = matches!(
            event,
            StreamEvent::ToolStart { .. } | StreamEvent::ToolEnd { .. }
        );

        let applied = self.state.apply(event);

        if self.state.status != prev_status {
            self.registry
                .update(run_id, RunUpdate::status(self.state.status));
            let _ = self.status_tx.send(self.state.status);
        }
        if mirror_tools {
            self.registry.update(
                run_id,
                RunUpdate {
                    tool_activity: Some(self.state.tool_activity.clone()),
                    ..Default::default()
                },
            );
        }

        match applied {
            Applied::Progressed | Applied::Ignored => Processed::Continue,
            Applied::Suspended(question) => {
                debug!(%run_id, "run suspended on user input");
                let _ = self.question_tx.send(question);
                Processed::Suspended
            }
            Applied::Completed => {
                self.registry.finish(run_id, RunStatus::Completed);
                Processed::Completed
            }
            Applied::Failed(failure) => {
                self.registry.finish(run_id, RunStatus::Errored);
                Processed::Failed(RunError::Run(failure))
            }
        }
    }

    /// Block on the caller's answer, then re-enter the protocol as a
    /// new outbound message on the same thread.
    ///
    /// Returns `Ok(None)` when the answer channel closed or the run was
    /// cancelled while suspended.
    async fn await_answer(&mut self) -> Result<Option<ByteStream>> {
        let answer = tokio::select! {
            _ = self.cancel_token.cancelled() => return Ok(None),
            answer = self.answer_rx.recv() => answer,
        };
        let Some(answer) = answer else {
            warn!(run_id = %self.state.run_id, "question abandoned; cancelling run");
            return Ok(None);
        };

        self.state.resume();
        let mut continuation = self.request.clone();
        continuation.user_message = answer;
        continuation.thread_id = self.state.thread_id.clone();

        let token = self.credentials.access_token().await?;
        let stream = open_stream(&self.http, &self.execute_url, &continuation, &token).await?;
        Ok(Some(stream))
    }
}

enum Processed {
    Continue,
    Suspended,
    Completed,
    Failed(RunError),
}
