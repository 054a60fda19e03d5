//! HTTP helpers shared by the run initiator and canceller.

use serde::Deserialize;
use tracing::debug;

use crate::config::RunClientConfig;
use crate::error::RunError;

/// Build the HTTP client for streaming calls.
///
/// Connect timeout only: an open stream must be allowed to idle as
/// long as the server keeps sending heartbeat frames.
pub fn build_client(config: &RunClientConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(10)
        .build()
        .expect("failed to build HTTP client")
}

/// JSON error body shape the execution service uses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: Option<ErrorField>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    retry_after_s: Option<u64>,
}

/// `error` may be a bare string or a nested `{ message }` object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Message(String),
    Object {
        message: Option<String>,
        #[serde(default)]
        code: Option<String>,
    },
}

/// Turn a non-success response into a [`RunError`].
///
/// Reads the full body, attempts structured JSON extraction, and falls
/// back to the raw text. Never fails on an unparsable body.
pub async fn error_from_response(resp: reqwest::Response) -> RunError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    debug!(status, body_len = body.len(), "non-success transport response");

    let (message, code, retry_after_s) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => {
            let (message, nested_code) = match parsed.error {
                Some(ErrorField::Message(m)) => (Some(m), None),
                Some(ErrorField::Object { message, code }) => (message, code),
                None => (None, None),
            };
            (
                message.unwrap_or_else(|| body.clone()),
                parsed.error_code.or(nested_code),
                parsed.retry_after_s,
            )
        }
        Err(_) => (body.clone(), None, None),
    };

    match status {
        401 | 403 => RunError::Authentication(message),
        429 => RunError::RateLimited { retry_after_s },
        _ => match code {
            // A stable error code makes this a structured failure.
            Some(code) => RunError::Run(crate::error::RunFailure {
                message,
                code: Some(code),
                prompt_name: None,
                retry_after_s,
            }),
            None => RunError::Api { status, message },
        },
    }
}
