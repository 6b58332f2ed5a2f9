//! Boundary to the service that checks signed challenge responses.
//!
//! The service reports its result as a closed set of outcomes, so callers
//! never have to inspect an error chain to tell a rejected credential apart
//! from an integration failure.

mod http;

pub use http::HttpVerificationService;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identity resolved by a successful verification.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub has_password: bool,
    #[serde(default)]
    pub webauthn_credentials: usize,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
}

impl Principal {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_password(&self) -> bool {
        self.has_password
    }

    #[must_use]
    pub fn has_webauthn_credential(&self) -> bool {
        self.webauthn_credentials > 0
    }

    #[must_use]
    pub fn has_username(&self) -> bool {
        self.username.as_deref().is_some_and(|name| !name.is_empty())
    }

    #[must_use]
    pub fn has_emails(&self) -> bool {
        !self.emails.is_empty()
    }
}

/// Opaque reference to the server-held challenge a client is answering.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionReference(String);

impl SessionReference {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a presented credential did not verify.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CredentialRejection {
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("challenge mismatch")]
    ChallengeMismatch,
    #[error("webauthn session expired")]
    SessionExpired,
    #[error("signature counter regressed")]
    CounterRegression,
    #[error("unknown credential")]
    UnknownCredential,
    #[error("{0}")]
    Other(String),
}

impl CredentialRejection {
    /// Map a machine-readable reason to a rejection.
    #[must_use]
    pub fn from_reason(reason: &str) -> Self {
        match reason.trim() {
            "signature_mismatch" => Self::SignatureMismatch,
            "challenge_mismatch" => Self::ChallengeMismatch,
            "session_expired" => Self::SessionExpired,
            "counter_regression" => Self::CounterRegression,
            "unknown_credential" => Self::UnknownCredential,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug)]
pub enum VerificationOutcome {
    Verified(Principal),
    /// The response does not verify; `principal` is whatever identity the
    /// service could still attribute, if any.
    InvalidCredential {
        cause: CredentialRejection,
        principal: Option<Principal>,
    },
    SystemError(anyhow::Error),
}

/// Challenge issued to the client plus the reference to its server-held state.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestOptions {
    pub session: SessionReference,
    pub options: serde_json::Value,
}

#[async_trait]
pub trait VerificationService<T: Send>: Send + Sync {
    /// Issue a new login challenge.
    async fn generate_request_options(&self, tx: &mut T) -> Result<RequestOptions>;

    /// Verify the client's signed answer to the challenge behind `session`.
    async fn verify_assertion_response(
        &self,
        tx: &mut T,
        session: &SessionReference,
        response: &str,
    ) -> VerificationOutcome;
}
