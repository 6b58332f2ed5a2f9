use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{WEBAUTHN_GENERATE_REQUEST_OPTIONS, passkey_available};
use crate::config::PasskeyConfig;
use crate::flow::{
    Action, ActionName, Disposition, ExecutionContext, FlowError, InitializationContext, StashKey,
};
use crate::verification::VerificationService;

/// Issues a passkey login challenge and remembers its session reference.
pub struct WebauthnGenerateRequestOptions<T: Send> {
    config: PasskeyConfig,
    verifier: Arc<dyn VerificationService<T>>,
}

impl<T: Send> WebauthnGenerateRequestOptions<T> {
    #[must_use]
    pub fn new(config: PasskeyConfig, verifier: Arc<dyn VerificationService<T>>) -> Self {
        Self { config, verifier }
    }
}

#[async_trait]
impl<T: Send> Action<T> for WebauthnGenerateRequestOptions<T> {
    fn name(&self) -> ActionName {
        WEBAUTHN_GENERATE_REQUEST_OPTIONS
    }

    fn description(&self) -> &'static str {
        "Generate the options needed to sign in with a passkey."
    }

    fn initialize(&self, ctx: &mut InitializationContext<'_>) {
        if !passkey_available(ctx.stash(), &self.config) {
            ctx.suspend();
        }
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_, T>) -> Result<Disposition, FlowError> {
        let request = self
            .verifier
            .generate_request_options(ctx.tx())
            .await
            .context("failed to generate webauthn request options")?;

        ctx.stash_mut()
            .set_text(StashKey::WebauthnSessionDataId, request.session.as_str())?;
        ctx.set_payload(request.options);
        debug!(session = %request.session, "webauthn challenge issued");

        Ok(ctx.continue_flow())
    }
}
