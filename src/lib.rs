//! # Flowgate (resumable authentication flows)
//!
//! `flowgate` drives multi-step authentication flows where every step runs
//! inside a single database transaction owned by the flow controller.
//!
//! ## Flow Model
//!
//! - **Steps:** each step declares whether it is currently offered
//!   (initialization) and what it does when the client submits it (execution).
//! - **Stash:** durable key/value state scoped to one flow instance. Keys form a
//!   closed, versioned set so a step can never write a value of the wrong kind.
//! - **Revert lock:** once a security decision has been committed (for example a
//!   verified passkey assertion) the flow can no longer be rewound past it.
//!
//! ## Failure Classes
//!
//! A step ends in one of four ways: malformed input, an expected and audited
//! credential failure, a fatal protocol/system error, or success. Only success
//! mutates the stash. Fatal errors roll the transaction back and never leak
//! internal detail to the client.

pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod flow;
pub mod steps;
pub mod verification;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
