//! Flow error taxonomy.
//!
//! `ErrorCode` is what a client sees and may branch on. `FlowError` is what the
//! controller and steps propagate; fatal variants map to `technical_error` so
//! their detail never leaves the server.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::stash::{StashKey, StashValueKind};

/// Stable, documented error identifiers returned to clients.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    FormDataInvalid,
    PasskeyInvalid,
    OperationNotPermitted,
    FlowNotFound,
    FlowExpired,
    RevertNotAllowed,
    NothingToRevert,
    TechnicalError,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FormDataInvalid => "form_data_invalid",
            Self::PasskeyInvalid => "passkey_invalid",
            Self::OperationNotPermitted => "operation_not_permitted",
            Self::FlowNotFound => "flow_not_found",
            Self::FlowExpired => "flow_expired",
            Self::RevertNotAllowed => "revert_not_allowed",
            Self::NothingToRevert => "nothing_to_revert",
            Self::TechnicalError => "technical_error",
        }
    }

    /// Human readable message safe to show to a client.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::FormDataInvalid => "Form data invalid.",
            Self::PasskeyInvalid => "The passkey is invalid.",
            Self::OperationNotPermitted => "The operation is not permitted.",
            Self::FlowNotFound => "The flow does not exist.",
            Self::FlowExpired => "The flow has expired.",
            Self::RevertNotAllowed => "The flow can no longer be reverted.",
            Self::NothingToRevert => "There is no step to revert.",
            Self::TechnicalError => "Something went wrong.",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("flow {0} not found")]
    NotFound(Uuid),
    #[error("flow {0} has expired")]
    Expired(Uuid),
    #[error("flow {0} can no longer be reverted")]
    RevertPrevented(Uuid),
    #[error("flow {0} has no step to revert")]
    NothingToRevert(Uuid),
    #[error("{0} is not present in the stash")]
    MissingStashValue(StashKey),
    #[error("stash key {key} holds {expected} values, got {found}")]
    StashKindMismatch {
        key: StashKey,
        expected: StashValueKind,
        found: StashValueKind,
    },
    #[error("stash value for {key} exceeds {max} bytes")]
    StashValueTooLong { key: StashKey, max: usize },
    #[error("unsupported stash version {found}, expected {expected}")]
    StashVersion { found: u32, expected: u32 },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl FlowError {
    /// Client-visible code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::FlowNotFound,
            Self::Expired(_) => ErrorCode::FlowExpired,
            Self::RevertPrevented(_) => ErrorCode::RevertNotAllowed,
            Self::NothingToRevert(_) => ErrorCode::NothingToRevert,
            Self::MissingStashValue(_)
            | Self::StashKindMismatch { .. }
            | Self::StashValueTooLong { .. }
            | Self::StashVersion { .. }
            | Self::Internal(_) => ErrorCode::TechnicalError,
        }
    }

    /// Fatal errors abort the step transaction and hide their detail.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.code() == ErrorCode::TechnicalError
    }
}
