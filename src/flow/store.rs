//! Durable flow state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::instance::{FlowInstance, StepRecord};
use super::stash::Stash;
use super::tx::PgTx;

/// Loads and saves flow instances inside the caller's transaction.
#[async_trait]
pub trait FlowStore<T: Send>: Send + Sync {
    /// Load a flow and hold it exclusively until the transaction ends.
    async fn load(&self, tx: &mut T, id: Uuid) -> Result<Option<FlowInstance>>;

    async fn save(&self, tx: &mut T, flow: &FlowInstance) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PgFlowStore;

#[async_trait]
impl FlowStore<PgTx> for PgFlowStore {
    async fn load(&self, tx: &mut PgTx, id: Uuid) -> Result<Option<FlowInstance>> {
        let query = r"
            SELECT id, stash, history, revert_allowed, created_at, expires_at
            FROM flows
            WHERE id = $1
            FOR UPDATE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .instrument(span)
            .await
            .context("failed to load flow")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let Json(stash): Json<Stash> = row.try_get("stash")?;
        stash.validate()?;
        let Json(history): Json<Vec<StepRecord>> = row.try_get("history")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;

        Ok(Some(FlowInstance::from_parts(
            row.try_get("id")?,
            stash,
            history,
            row.try_get("revert_allowed")?,
            created_at,
            expires_at,
        )))
    }

    async fn save(&self, tx: &mut PgTx, flow: &FlowInstance) -> Result<()> {
        // revert_allowed can only ever go from true to false.
        let query = r"
            INSERT INTO flows
                (id, stash, history, revert_allowed, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET stash = EXCLUDED.stash,
                history = EXCLUDED.history,
                revert_allowed = flows.revert_allowed AND EXCLUDED.revert_allowed,
                updated_at = NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(flow.id())
            .bind(Json(flow.stash()))
            .bind(Json(flow.history()))
            .bind(flow.revert_allowed())
            .bind(flow.created_at())
            .bind(flow.expires_at())
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to save flow")?;
        Ok(())
    }
}
