//! Login steps of the passkey flow.

mod register_client_capabilities;
mod webauthn_generate_request_options;
mod webauthn_verify_assertion_response;

pub use register_client_capabilities::RegisterClientCapabilities;
pub use webauthn_generate_request_options::WebauthnGenerateRequestOptions;
pub use webauthn_verify_assertion_response::WebauthnVerifyAssertionResponse;

use crate::config::PasskeyConfig;
use crate::flow::{ActionName, Stash, StashKey};

pub const REGISTER_CLIENT_CAPABILITIES: ActionName =
    ActionName::new("register_client_capabilities");
pub const WEBAUTHN_GENERATE_REQUEST_OPTIONS: ActionName =
    ActionName::new("webauthn_generate_request_options");
pub const WEBAUTHN_VERIFY_ASSERTION_RESPONSE: ActionName =
    ActionName::new("webauthn_verify_assertion_response");

/// Value stored under [`StashKey::LoginMethod`] after a passkey login.
pub const LOGIN_METHOD_PASSKEY: &str = "passkey";

/// Passkey steps are offered only when the client reported support and
/// passkeys are enabled. A stash value of the wrong kind counts as absent.
pub(crate) fn passkey_available(stash: &Stash, config: &PasskeyConfig) -> bool {
    config.enabled() && matches!(stash.bool(StashKey::WebauthnAvailable), Ok(Some(true)))
}
