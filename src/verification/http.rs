//! Verification service reached over HTTP.
//!
//! The remote service owns challenge state and credential storage. It cannot
//! join the caller's database transaction, so the handle is accepted and left
//! untouched.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument, warn};
use url::Url;

use super::{
    CredentialRejection, Principal, RequestOptions, SessionReference, VerificationOutcome,
    VerificationService,
};
use crate::APP_USER_AGENT;

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Serialize)]
struct VerifyRequest<'a> {
    session_data_id: &'a str,
    assertion_response: &'a str,
}

#[derive(Deserialize)]
struct OptionsResponse {
    session_data_id: String,
    options: serde_json::Value,
}

#[derive(Deserialize)]
struct RejectionResponse {
    error: String,
    #[serde(default)]
    principal: Option<Principal>,
}

#[derive(Clone, Debug)]
pub struct HttpVerificationService {
    client: Client,
    base_url: String,
}

impl HttpVerificationService {
    /// Create a client for the verification service at `base_url`.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .with_context(|| format!("Invalid verification service URL: {base_url}"))?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
            .build()
            .context("Error creating reqwest client")?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl<T: Send> VerificationService<T> for HttpVerificationService {
    #[instrument(skip_all)]
    async fn generate_request_options(&self, _tx: &mut T) -> Result<RequestOptions> {
        let response = self
            .client
            .post(self.endpoint("webauthn/login/options"))
            .send()
            .await
            .context("failed to request webauthn login options")?;

        if response.status() != StatusCode::OK {
            return Err(anyhow!(
                "verification service returned {} for login options",
                response.status()
            ));
        }

        let body: OptionsResponse = response
            .json()
            .await
            .context("invalid webauthn login options response")?;

        Ok(RequestOptions {
            session: SessionReference::new(body.session_data_id),
            options: body.options,
        })
    }

    #[instrument(skip(self, _tx, response), fields(session = %session))]
    async fn verify_assertion_response(
        &self,
        _tx: &mut T,
        session: &SessionReference,
        response: &str,
    ) -> VerificationOutcome {
        let request = VerifyRequest {
            session_data_id: session.as_str(),
            assertion_response: response,
        };

        let reply = match self
            .client
            .post(self.endpoint("webauthn/login/verify"))
            .json(&request)
            .send()
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                error!("Error calling verification service: {err}");
                return VerificationOutcome::SystemError(
                    anyhow!(err).context("verification service unavailable"),
                );
            }
        };

        match reply.status() {
            StatusCode::OK => match reply.json::<Principal>().await {
                Ok(principal) => VerificationOutcome::Verified(principal),
                Err(err) => VerificationOutcome::SystemError(
                    anyhow!(err).context("invalid principal in verification response"),
                ),
            },
            StatusCode::UNAUTHORIZED | StatusCode::UNPROCESSABLE_ENTITY => {
                match reply.json::<RejectionResponse>().await {
                    Ok(rejection) => {
                        warn!("Assertion rejected: {}", rejection.error);
                        VerificationOutcome::InvalidCredential {
                            cause: CredentialRejection::from_reason(&rejection.error),
                            principal: rejection.principal,
                        }
                    }
                    Err(err) => VerificationOutcome::SystemError(
                        anyhow!(err).context("invalid rejection in verification response"),
                    ),
                }
            }
            status => {
                error!("Verification service returned {status}");
                VerificationOutcome::SystemError(anyhow!(
                    "verification service returned {status}"
                ))
            }
        }
    }
}
