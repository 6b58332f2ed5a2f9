//! Object-safe view of the flow controller used by the HTTP handlers.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::flow::{FlowController, FlowError, FlowResponse, HttpContext, Stash, TransactionSource};

#[async_trait]
pub trait FlowService: Send + Sync {
    async fn start(&self) -> Result<FlowResponse, FlowError>;

    async fn describe(&self, flow_id: Uuid) -> Result<FlowResponse, FlowError>;

    async fn execute(
        &self,
        flow_id: Uuid,
        action: &str,
        input: Value,
        http: &HttpContext,
    ) -> Result<FlowResponse, FlowError>;

    async fn back(&self, flow_id: Uuid) -> Result<FlowResponse, FlowError>;

    /// Check that the backing store accepts transactions.
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl<S: TransactionSource> FlowService for FlowController<S> {
    async fn start(&self) -> Result<FlowResponse, FlowError> {
        FlowController::start(self, Stash::new()).await
    }

    async fn describe(&self, flow_id: Uuid) -> Result<FlowResponse, FlowError> {
        FlowController::describe(self, flow_id).await
    }

    async fn execute(
        &self,
        flow_id: Uuid,
        action: &str,
        input: Value,
        http: &HttpContext,
    ) -> Result<FlowResponse, FlowError> {
        FlowController::execute(self, flow_id, action, input, http).await
    }

    async fn back(&self, flow_id: Uuid) -> Result<FlowResponse, FlowError> {
        FlowController::back(self, flow_id).await
    }

    async fn ping(&self) -> Result<()> {
        FlowController::ping(self).await
    }
}
