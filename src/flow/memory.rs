//! In-memory flow storage with real commit/rollback semantics.
//!
//! Writes made through a `MemoryTx` are staged on the transaction and only
//! become visible through [`MemoryStore`] after `commit`.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::instance::FlowInstance;
use super::store::FlowStore;
use super::tx::TransactionSource;
use crate::audit::{AuditEntry, AuditRecorder};

#[derive(Debug, Default)]
pub struct MemoryTx {
    flows: HashMap<Uuid, FlowInstance>,
    audit: Vec<AuditEntry>,
}

impl MemoryTx {
    /// Audit entries staged on this transaction.
    #[must_use]
    pub fn staged_audit(&self) -> &[AuditEntry] {
        &self.audit
    }
}

#[derive(Debug, Default)]
struct Committed {
    flows: HashMap<Uuid, FlowInstance>,
    audit: Vec<AuditEntry>,
    commits: usize,
    rollbacks: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Mutex<Committed>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed state of a flow.
    pub async fn flow(&self, id: Uuid) -> Option<FlowInstance> {
        self.committed.lock().await.flows.get(&id).cloned()
    }

    /// Committed audit entries, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.committed.lock().await.audit.clone()
    }

    pub async fn commits(&self) -> usize {
        self.committed.lock().await.commits
    }

    pub async fn rollbacks(&self) -> usize {
        self.committed.lock().await.rollbacks
    }
}

#[async_trait]
impl TransactionSource for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: MemoryTx) -> Result<()> {
        let mut committed = self.committed.lock().await;
        committed.flows.extend(tx.flows);
        committed.audit.extend(tx.audit);
        committed.commits += 1;
        Ok(())
    }

    async fn rollback(&self, _tx: MemoryTx) -> Result<()> {
        self.committed.lock().await.rollbacks += 1;
        Ok(())
    }
}

#[async_trait]
impl FlowStore<MemoryTx> for MemoryStore {
    async fn load(&self, tx: &mut MemoryTx, id: Uuid) -> Result<Option<FlowInstance>> {
        if let Some(flow) = tx.flows.get(&id) {
            return Ok(Some(flow.clone()));
        }
        Ok(self.committed.lock().await.flows.get(&id).cloned())
    }

    async fn save(&self, tx: &mut MemoryTx, flow: &FlowInstance) -> Result<()> {
        tx.flows.insert(flow.id(), flow.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditRecorder<MemoryTx> for MemoryStore {
    async fn record(&self, tx: &mut MemoryTx, entry: AuditEntry) -> Result<()> {
        tx.audit.push(entry);
        Ok(())
    }
}
