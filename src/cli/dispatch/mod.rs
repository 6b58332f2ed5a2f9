//! Map validated CLI arguments to an action.

use anyhow::{Context, Result};
use secrecy::SecretString;

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{
    ARG_DSN, ARG_FLOW_TTL_SECONDS, ARG_PASSKEY_ENABLED, ARG_PORT, ARG_TRUST_PROXY_HEADERS,
    ARG_VERIFIER_URL,
};
use crate::config::{FlowConfig, HttpConfig, PasskeyConfig};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let verifier_url = matches
        .get_one::<String>(ARG_VERIFIER_URL)
        .cloned()
        .context("missing required argument: --verifier-url")?;

    let passkey = PasskeyConfig::new().with_enabled(
        matches
            .get_one::<bool>(ARG_PASSKEY_ENABLED)
            .copied()
            .unwrap_or(true),
    );
    let flow = FlowConfig::new().with_ttl_seconds(
        matches
            .get_one::<i64>(ARG_FLOW_TTL_SECONDS)
            .copied()
            .unwrap_or_default(),
    );

    let http = HttpConfig::new().with_trust_proxy_headers(
        matches
            .get_one::<bool>(ARG_TRUST_PROXY_HEADERS)
            .copied()
            .unwrap_or(false),
    );

    Ok(Action::Server(Args {
        port,
        dsn: SecretString::from(dsn),
        verifier_url,
        passkey,
        flow,
        http,
    }))
}
