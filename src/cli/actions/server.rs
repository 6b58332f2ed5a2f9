use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::api;
use crate::audit::PgAuditRecorder;
use crate::config::{FlowConfig, HttpConfig, PasskeyConfig};
use crate::flow::{FlowController, PgFlowStore, PgTransactionSource, PgTx};
use crate::steps::{
    RegisterClientCapabilities, WebauthnGenerateRequestOptions, WebauthnVerifyAssertionResponse,
};
use crate::verification::{HttpVerificationService, VerificationService};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub verifier_url: String,
    pub passkey: PasskeyConfig,
    pub flow: FlowConfig,
    pub http: HttpConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database or verifier cannot be set up, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(args.dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let verifier: Arc<dyn VerificationService<PgTx>> =
        Arc::new(HttpVerificationService::new(&args.verifier_url)?);

    debug!(
        passkey_enabled = args.passkey.enabled(),
        flow_ttl_seconds = args.flow.ttl_seconds(),
        trust_proxy_headers = args.http.trust_proxy_headers(),
        "building flow controller"
    );

    let controller = FlowController::new(
        Arc::new(PgTransactionSource::new(pool)),
        Arc::new(PgFlowStore),
        args.flow,
    )
    .with_action(Arc::new(RegisterClientCapabilities))
    .with_action(Arc::new(WebauthnGenerateRequestOptions::new(
        args.passkey.clone(),
        verifier.clone(),
    )))
    .with_action(Arc::new(WebauthnVerifyAssertionResponse::new(
        args.passkey,
        verifier,
        Arc::new(PgAuditRecorder),
    )));

    info!(verifier = %args.verifier_url, "flow controller ready");

    api::new(args.port, Arc::new(controller), args.http).await
}
