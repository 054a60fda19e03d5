//! Credential seam for the external auth collaborator.
//!
//! The run initiator never owns long-lived secrets; it asks a
//! [`CredentialProvider`] for a short-lived bearer token right before
//! each request, so token rotation happens outside this subsystem.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Result, RunError};

/// A short-lived bearer credential.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Whether the token is expired (unknown expiry counts as valid).
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Resolves a bearer token at request time.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken>;
}

/// Fixed-token provider, mainly for tests and local development.
pub struct StaticCredentialProvider {
    token: AccessToken,
}

impl StaticCredentialProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn access_token(&self) -> Result<AccessToken> {
        Ok(self.token.clone())
    }
}

/// Reads the token from an environment variable on every request.
pub struct EnvCredentialProvider {
    var: String,
}

impl EnvCredentialProvider {
    pub const DEFAULT_VAR: &'static str = "PROMPTRUN_API_KEY";

    pub fn new() -> Self {
        Self::from_var(Self::DEFAULT_VAR)
    }

    pub fn from_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn access_token(&self) -> Result<AccessToken> {
        match std::env::var(&self.var) {
            Ok(token) if !token.is_empty() => Ok(AccessToken::new(token)),
            _ => Err(RunError::Authentication(format!(
                "no credential in {}",
                self.var
            ))),
        }
    }
}
