//! Flow-scoped key/value state.
//!
//! Keys are a closed set and every key declares the kind of value it holds, so
//! a write of the wrong kind fails instead of silently changing the shape of
//! the stash. The stash is serialized together with its schema version.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::error::FlowError;

/// Current stash schema version. Bump when keys change meaning.
pub const STASH_VERSION: u32 = 1;

/// Maximum length of a text value in bytes.
pub const MAX_TEXT_LEN: usize = 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StashKey {
    /// The client reported that it can use `WebAuthn`.
    WebauthnAvailable,
    /// Reference to the server-held challenge issued for a passkey login.
    WebauthnSessionDataId,
    /// Authenticated user, set once a credential has been verified.
    UserId,
    /// Method used to authenticate; read by later steps for auditing.
    LoginMethod,
    UserHasPassword,
    UserHasWebauthnCredential,
    UserHasUsername,
    UserHasEmails,
}

impl StashKey {
    pub const ALL: [Self; 8] = [
        Self::WebauthnAvailable,
        Self::WebauthnSessionDataId,
        Self::UserId,
        Self::LoginMethod,
        Self::UserHasPassword,
        Self::UserHasWebauthnCredential,
        Self::UserHasUsername,
        Self::UserHasEmails,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebauthnAvailable => "webauthn_available",
            Self::WebauthnSessionDataId => "webauthn_session_data_id",
            Self::UserId => "user_id",
            Self::LoginMethod => "login_method",
            Self::UserHasPassword => "user_has_password",
            Self::UserHasWebauthnCredential => "user_has_webauthn_credential",
            Self::UserHasUsername => "user_has_username",
            Self::UserHasEmails => "user_has_emails",
        }
    }

    /// Kind of value this key accepts.
    #[must_use]
    pub fn kind(self) -> StashValueKind {
        match self {
            Self::WebauthnSessionDataId | Self::UserId | Self::LoginMethod => StashValueKind::Text,
            Self::WebauthnAvailable
            | Self::UserHasPassword
            | Self::UserHasWebauthnCredential
            | Self::UserHasUsername
            | Self::UserHasEmails => StashValueKind::Bool,
        }
    }
}

impl fmt::Display for StashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StashValueKind {
    Bool,
    Text,
}

impl fmt::Display for StashValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Text => f.write_str("text"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StashValue {
    Bool(bool),
    Text(String),
}

impl StashValue {
    #[must_use]
    pub fn kind(&self) -> StashValueKind {
        match self {
            Self::Bool(_) => StashValueKind::Bool,
            Self::Text(_) => StashValueKind::Text,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Stash {
    version: u32,
    values: BTreeMap<StashKey, StashValue>,
}

impl Default for Stash {
    fn default() -> Self {
        Self::new()
    }
}

impl Stash {
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STASH_VERSION,
            values: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, key: StashKey) -> bool {
        self.values.contains_key(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read a boolean key; `None` when absent.
    ///
    /// # Errors
    /// Returns `StashKindMismatch` if the key does not hold booleans.
    pub fn bool(&self, key: StashKey) -> Result<Option<bool>, FlowError> {
        expect_kind(key, StashValueKind::Bool)?;
        match self.values.get(&key) {
            Some(StashValue::Bool(value)) => Ok(Some(*value)),
            Some(other) => Err(mismatch(key, other.kind())),
            None => Ok(None),
        }
    }

    /// Read a text key; `None` when absent.
    ///
    /// # Errors
    /// Returns `StashKindMismatch` if the key does not hold text.
    pub fn text(&self, key: StashKey) -> Result<Option<&str>, FlowError> {
        expect_kind(key, StashValueKind::Text)?;
        match self.values.get(&key) {
            Some(StashValue::Text(value)) => Ok(Some(value.as_str())),
            Some(other) => Err(mismatch(key, other.kind())),
            None => Ok(None),
        }
    }

    /// Overwrite a boolean key.
    ///
    /// # Errors
    /// Returns `StashKindMismatch` if the key does not hold booleans.
    pub fn set_bool(&mut self, key: StashKey, value: bool) -> Result<(), FlowError> {
        expect_kind(key, StashValueKind::Bool)?;
        self.values.insert(key, StashValue::Bool(value));
        Ok(())
    }

    /// Overwrite a text key.
    ///
    /// # Errors
    /// Returns `StashKindMismatch` if the key does not hold text, or
    /// `StashValueTooLong` if the value exceeds [`MAX_TEXT_LEN`].
    pub fn set_text(&mut self, key: StashKey, value: impl Into<String>) -> Result<(), FlowError> {
        expect_kind(key, StashValueKind::Text)?;
        let value = value.into();
        if value.len() > MAX_TEXT_LEN {
            return Err(FlowError::StashValueTooLong {
                key,
                max: MAX_TEXT_LEN,
            });
        }
        self.values.insert(key, StashValue::Text(value));
        Ok(())
    }

    /// Check a stash loaded from storage against the current schema.
    ///
    /// # Errors
    /// Returns `StashVersion` on a version mismatch or `StashKindMismatch` if a
    /// stored value does not match its key.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.version != STASH_VERSION {
            return Err(FlowError::StashVersion {
                found: self.version,
                expected: STASH_VERSION,
            });
        }
        for (key, value) in &self.values {
            if value.kind() != key.kind() {
                return Err(mismatch(*key, value.kind()));
            }
        }
        Ok(())
    }
}

fn expect_kind(key: StashKey, requested: StashValueKind) -> Result<(), FlowError> {
    if key.kind() == requested {
        Ok(())
    } else {
        Err(FlowError::StashKindMismatch {
            key,
            expected: key.kind(),
            found: requested,
        })
    }
}

fn mismatch(key: StashKey, found: StashValueKind) -> FlowError {
    FlowError::StashKindMismatch {
        key,
        expected: key.kind(),
        found,
    }
}
