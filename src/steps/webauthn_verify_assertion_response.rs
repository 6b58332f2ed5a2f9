//! Passkey assertion verification.
//!
//! The step reads the session reference stashed by the options step, hands the
//! client's signed response to the verification service and classifies the
//! result:
//!
//! - invalid credential: audited through the step transaction, then reported
//!   as `passkey_invalid` with the stash untouched;
//! - any other verification failure: fatal, nothing audited;
//! - success: the principal is written to the stash and the flow is locked
//!   against reverts.

use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{LOGIN_METHOD_PASSKEY, WEBAUTHN_VERIFY_ASSERTION_RESPONSE, passkey_available};
use crate::audit::{AuditEntry, AuditEventKind, AuditRecorder, detail};
use crate::config::PasskeyConfig;
use crate::flow::{
    Action, ActionName, Disposition, ErrorCode, ExecutionContext, FlowError, InitializationContext,
    InputField, StashKey, StepError,
};
use crate::verification::{Principal, SessionReference, VerificationOutcome, VerificationService};

const ASSERTION_RESPONSE: &str = "assertion_response";

pub struct WebauthnVerifyAssertionResponse<T: Send> {
    config: PasskeyConfig,
    verifier: Arc<dyn VerificationService<T>>,
    audit: Arc<dyn AuditRecorder<T>>,
}

impl<T: Send> WebauthnVerifyAssertionResponse<T> {
    #[must_use]
    pub fn new(
        config: PasskeyConfig,
        verifier: Arc<dyn VerificationService<T>>,
        audit: Arc<dyn AuditRecorder<T>>,
    ) -> Self {
        Self {
            config,
            verifier,
            audit,
        }
    }
}

#[async_trait]
impl<T: Send> Action<T> for WebauthnVerifyAssertionResponse<T> {
    fn name(&self) -> ActionName {
        WEBAUTHN_VERIFY_ASSERTION_RESPONSE
    }

    fn description(&self) -> &'static str {
        "Verify an assertion response for a passkey."
    }

    fn initialize(&self, ctx: &mut InitializationContext<'_>) {
        if !passkey_available(ctx.stash(), &self.config) {
            ctx.suspend();
        }
        ctx.add_input(InputField::json(ASSERTION_RESPONSE).required(true));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_, T>) -> Result<Disposition, FlowError> {
        if !ctx.validate_input() {
            return Ok(ctx.error(ErrorCode::FormDataInvalid));
        }

        let session = ctx
            .stash()
            .text(StashKey::WebauthnSessionDataId)?
            .map(SessionReference::new)
            .ok_or(FlowError::MissingStashValue(StashKey::WebauthnSessionDataId))?;
        let response = ctx
            .input()
            .json_string(ASSERTION_RESPONSE)
            .ok_or_else(|| anyhow!("validated input {ASSERTION_RESPONSE} is absent"))?;

        let outcome = self
            .verifier
            .verify_assertion_response(ctx.tx(), &session, &response)
            .await;

        match outcome {
            VerificationOutcome::Verified(principal) => {
                store_principal(ctx, &principal)?;
                ctx.prevent_revert();
                info!(flow_id = %ctx.flow_id(), principal = %principal.id, "passkey verified");
                Ok(ctx.continue_flow())
            }
            VerificationOutcome::InvalidCredential { cause, principal } => {
                let entry = AuditEntry::new(AuditEventKind::LoginFailure, ctx.http())
                    .with_principal(principal.as_ref())
                    .with_error(&cause)
                    .with_detail(detail("login_method", LOGIN_METHOD_PASSKEY))
                    .with_detail(detail("flow_id", ctx.flow_id()));

                self.audit
                    .record(ctx.tx(), entry)
                    .await
                    .map_err(|err| err.context("could not create audit log"))?;

                warn!(flow_id = %ctx.flow_id(), "passkey rejected: {cause}");
                Ok(Disposition::Error(
                    StepError::new(ErrorCode::PasskeyInvalid).with_cause(cause),
                ))
            }
            VerificationOutcome::SystemError(err) => {
                Err(err.context("failed to verify assertion response").into())
            }
        }
    }
}

fn store_principal<T>(
    ctx: &mut ExecutionContext<'_, T>,
    principal: &Principal,
) -> Result<(), FlowError> {
    let stash = ctx.stash_mut();
    stash.set_text(StashKey::UserId, principal.id.as_str())?;
    stash.set_text(StashKey::LoginMethod, LOGIN_METHOD_PASSKEY)?;
    stash.set_bool(StashKey::UserHasPassword, principal.has_password())?;
    stash.set_bool(
        StashKey::UserHasWebauthnCredential,
        principal.has_webauthn_credential(),
    )?;
    stash.set_bool(StashKey::UserHasUsername, principal.has_username())?;
    stash.set_bool(StashKey::UserHasEmails, principal.has_emails())?;
    Ok(())
}
