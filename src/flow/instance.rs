//! One in-progress flow: its stash, completed steps, and revert lock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::FlowError;
use super::stash::Stash;

/// A completed step and the stash as it was before the step ran.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub action: String,
    pub stash_before: Stash,
    pub completed_at: DateTime<Utc>,
    /// Set on the step that locked the flow against reverts.
    #[serde(default)]
    pub locked_revert: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowInstance {
    id: Uuid,
    stash: Stash,
    history: Vec<StepRecord>,
    revert_allowed: bool,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl FlowInstance {
    #[must_use]
    pub fn new(stash: Stash, ttl: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            stash,
            history: Vec::new(),
            revert_allowed: true,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// Rebuild an instance loaded from storage.
    #[must_use]
    pub fn from_parts(
        id: Uuid,
        stash: Stash,
        history: Vec<StepRecord>,
        revert_allowed: bool,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            stash,
            history,
            revert_allowed,
            created_at,
            expires_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn stash(&self) -> &Stash {
        &self.stash
    }

    #[must_use]
    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    #[must_use]
    pub fn revert_allowed(&self) -> bool {
        self.revert_allowed
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Lock the flow against reverts. There is no way to unlock it.
    ///
    /// The most recent step is marked as the lock point: it and every step
    /// before it can no longer run again.
    pub fn prevent_revert(&mut self) {
        self.revert_allowed = false;
        if let Some(last) = self.history.last_mut() {
            last.locked_revert = true;
        }
    }

    /// Whether `action` already ran at or before the revert lock.
    #[must_use]
    pub fn is_sealed(&self, action: &str) -> bool {
        let Some(lock) = self.history.iter().rposition(|step| step.locked_revert) else {
            return false;
        };
        self.history[..=lock].iter().any(|step| step.action == action)
    }

    /// Record a completed step and adopt its resulting stash.
    pub fn complete_step(&mut self, action: &str, stash: Stash) {
        let stash_before = std::mem::replace(&mut self.stash, stash);
        self.history.push(StepRecord {
            action: action.to_string(),
            stash_before,
            completed_at: Utc::now(),
            locked_revert: false,
        });
    }

    /// Undo the most recent step, restoring the stash it started from.
    ///
    /// # Errors
    /// Returns `RevertPrevented` once the flow is locked, or `NothingToRevert`
    /// when no step has completed yet.
    pub fn revert_last(&mut self) -> Result<StepRecord, FlowError> {
        if !self.revert_allowed {
            return Err(FlowError::RevertPrevented(self.id));
        }
        let record = self
            .history
            .pop()
            .ok_or(FlowError::NothingToRevert(self.id))?;
        self.stash = record.stash_before.clone();
        Ok(record)
    }
}
