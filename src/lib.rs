//! Promptrun — streaming run-orchestration client.
//!
//! Client-side machinery for executing prompts against an AI model
//! through the Promptrun execution service: it opens a long-running
//! streaming request, decodes the incrementally delivered event frames,
//! reconstructs run state (reasoning, output, tool calls, usage) in
//! real time, coordinates local and remote cancellation, and tracks
//! many concurrent runs without cross-talk.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use promptrun::prelude::*;
//!
//! # async fn example() -> promptrun::error::Result<()> {
//! let client = RunClient::new(
//!     RunClientConfig::from_env(),
//!     Arc::new(EnvCredentialProvider::new()),
//! );
//! let prompt_id = uuid::Uuid::new_v4();
//! let handle = client
//!     .start_run(RunRequest::new(prompt_id, "Summarize this document"))
//!     .await?;
//! match handle.wait().await {
//!     RunOutcome::Completed(result) => println!("{}", result.output_text),
//!     RunOutcome::Cancelled => println!("cancelled"),
//!     RunOutcome::Failed(err) => eprintln!("{err}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod prelude;
pub mod run;
pub mod thread;
pub mod types;
