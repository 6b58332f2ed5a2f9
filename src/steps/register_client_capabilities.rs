use async_trait::async_trait;
use tracing::debug;

use super::REGISTER_CLIENT_CAPABILITIES;
use crate::flow::{
    Action, ActionName, Disposition, ErrorCode, ExecutionContext, FlowError, InitializationContext,
    InputField, StashKey,
};

const WEBAUTHN_AVAILABLE: &str = "webauthn_available";

/// Records whether the client can perform WebAuthn ceremonies.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegisterClientCapabilities;

#[async_trait]
impl<T: Send> Action<T> for RegisterClientCapabilities {
    fn name(&self) -> ActionName {
        REGISTER_CLIENT_CAPABILITIES
    }

    fn description(&self) -> &'static str {
        "Register the capabilities of the client."
    }

    fn initialize(&self, ctx: &mut InitializationContext<'_>) {
        if ctx.stash().contains(StashKey::WebauthnAvailable) {
            ctx.suspend();
        }
        ctx.add_input(InputField::boolean(WEBAUTHN_AVAILABLE).required(true));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_, T>) -> Result<Disposition, FlowError> {
        if !ctx.validate_input() {
            return Ok(ctx.error(ErrorCode::FormDataInvalid));
        }

        let available = ctx.input().bool(WEBAUTHN_AVAILABLE).unwrap_or(false);
        ctx.stash_mut()
            .set_bool(StashKey::WebauthnAvailable, available)?;
        debug!(webauthn_available = available, "client capabilities registered");

        Ok(ctx.continue_flow())
    }
}
