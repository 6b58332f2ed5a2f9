//! Transaction ownership for flow steps.
//!
//! The controller is the only component that begins, commits or rolls back a
//! transaction. Steps and the services they call receive `&mut Tx`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::Instrument;

#[async_trait]
pub trait TransactionSource: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    async fn rollback(&self, tx: Self::Tx) -> Result<()>;
}

pub type PgTx = Transaction<'static, Postgres>;

#[derive(Clone, Debug)]
pub struct PgTransactionSource {
    pool: PgPool,
}

impl PgTransactionSource {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionSource for PgTransactionSource {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        let span = tracing::info_span!("db.begin", db.system = "postgresql");
        self.pool
            .begin()
            .instrument(span)
            .await
            .context("begin flow step transaction")
    }

    async fn commit(&self, tx: PgTx) -> Result<()> {
        tx.commit().await.context("commit flow step transaction")
    }

    async fn rollback(&self, tx: PgTx) -> Result<()> {
        tx.rollback()
            .await
            .context("rollback flow step transaction")
    }
}
