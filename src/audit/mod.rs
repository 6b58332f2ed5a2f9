//! Security audit trail.
//!
//! Entries are written through the caller's transaction so they become
//! visible exactly when the rest of the step's work does.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt;
use tracing::{Instrument, debug};
use uuid::Uuid;

use crate::flow::{HttpContext, PgTx};
use crate::verification::Principal;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum AuditEventKind {
    LoginFailure,
}

impl AuditEventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginFailure => "login_failure",
        }
    }
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AuditDetail {
    pub key: String,
    pub value: String,
}

/// Build an audit detail.
pub fn detail(key: &str, value: impl ToString) -> AuditDetail {
    AuditDetail {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Immutable record of a security-relevant event.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub kind: AuditEventKind,
    pub principal_id: Option<String>,
    pub error: Option<String>,
    pub details: Vec<AuditDetail>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// `x-request-id` of the HTTP request that caused the event.
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(kind: AuditEventKind, http: &HttpContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            principal_id: None,
            error: None,
            details: Vec::new(),
            ip_address: http.ip_address.clone(),
            user_agent: http.user_agent.clone(),
            request_id: http.request_id.clone(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_principal(mut self, principal: Option<&Principal>) -> Self {
        self.principal_id = principal.map(|p| p.id.clone());
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: &dyn fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: AuditDetail) -> Self {
        self.details.push(detail);
        self
    }

    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|d| d.key == key)
            .map(|d| d.value.as_str())
    }
}

#[async_trait]
pub trait AuditRecorder<T: Send>: Send + Sync {
    /// Append `entry` using the caller's transaction.
    async fn record(&self, tx: &mut T, entry: AuditEntry) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PgAuditRecorder;

#[async_trait]
impl AuditRecorder<PgTx> for PgAuditRecorder {
    async fn record(&self, tx: &mut PgTx, entry: AuditEntry) -> Result<()> {
        let query = r"
            INSERT INTO flow_audit_logs
                (id, kind, principal_id, error, details, ip_address, user_agent,
                 request_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6::inet, $7, $8, $9)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(entry.id)
            .bind(entry.kind.as_str())
            .bind(entry.principal_id.as_deref())
            .bind(entry.error.as_deref())
            .bind(Json(&entry.details))
            .bind(entry.ip_address.as_deref())
            .bind(entry.user_agent.as_deref())
            .bind(entry.request_id.as_deref())
            .bind(entry.created_at)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to write flow audit log")?;

        debug!(kind = %entry.kind, id = %entry.id, "audit entry recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::Principal;

    #[test]
    fn entry_builder_keeps_detail_order() {
        let http = HttpContext {
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: Some("test-agent".to_string()),
            request_id: Some("01J0000000000000000000000".to_string()),
        };
        let principal = Principal::new("u1");
        let entry = AuditEntry::new(AuditEventKind::LoginFailure, &http)
            .with_principal(Some(&principal))
            .with_error(&"signature mismatch")
            .with_detail(detail("login_method", "passkey"))
            .with_detail(detail("flow_id", Uuid::nil()));

        assert_eq!(entry.principal_id.as_deref(), Some("u1"));
        assert_eq!(entry.error.as_deref(), Some("signature mismatch"));
        assert_eq!(entry.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(entry.request_id.as_deref(), Some("01J0000000000000000000000"));
        assert_eq!(entry.details[0].key, "login_method");
        assert_eq!(entry.details[1].key, "flow_id");
        assert_eq!(entry.detail("login_method"), Some("passkey"));
        assert_eq!(entry.detail("missing"), None);
    }

    #[test]
    fn event_kind_names_are_stable() {
        assert_eq!(AuditEventKind::LoginFailure.to_string(), "login_failure");
    }
}
