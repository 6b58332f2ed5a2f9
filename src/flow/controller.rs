//! Flow controller: owns the transaction around every step.
//!
//! Flow Overview:
//! 1) Open a transaction and load the flow under an exclusive lock.
//! 2) Refuse steps that ran before the revert lock, then re-run the step's
//!    initialization; a suspended step is never executed.
//! 3) Execute the step against a working copy of the stash.
//! 4) `Continue` applies the stash, records the step and commits.
//!    `Error` commits side effects such as audit entries but leaves the flow
//!    untouched. `Suspend` and fatal errors roll back.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::action::{Action, ActionName, Disposition, StepError};
use super::context::{ExecutionContext, HttpContext, InitializationContext};
use super::error::{ErrorCode, FlowError};
use super::input::{FieldError, InputData, InputSchema};
use super::instance::FlowInstance;
use super::stash::Stash;
use super::store::FlowStore;
use super::tx::TransactionSource;
use crate::config::FlowConfig;

/// An action the client may submit next.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionDescriptor {
    pub name: ActionName,
    pub description: &'static str,
    pub inputs: InputSchema,
}

/// Client-visible error attached to a flow response.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseError {
    pub code: ErrorCode,
    pub message: &'static str,
    pub field_errors: Vec<FieldError>,
}

impl From<StepError> for ResponseError {
    fn from(error: StepError) -> Self {
        let code = error.code();
        Self {
            code,
            message: code.message(),
            field_errors: error.into_field_errors(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlowResponse {
    pub flow_id: Uuid,
    pub actions: Vec<ActionDescriptor>,
    pub payload: Option<Value>,
    pub error: Option<ResponseError>,
    pub revert_allowed: bool,
}

impl FlowResponse {
    #[must_use]
    pub fn has_action(&self, name: ActionName) -> bool {
        self.actions.iter().any(|action| action.name == name)
    }
}

enum Resolution {
    Commit(FlowResponse),
    Rollback(FlowResponse),
}

pub struct FlowController<S: TransactionSource> {
    source: Arc<S>,
    store: Arc<dyn FlowStore<S::Tx>>,
    actions: Vec<Arc<dyn Action<S::Tx>>>,
    config: FlowConfig,
}

impl<S: TransactionSource> FlowController<S> {
    #[must_use]
    pub fn new(source: Arc<S>, store: Arc<dyn FlowStore<S::Tx>>, config: FlowConfig) -> Self {
        Self {
            source,
            store,
            actions: Vec::new(),
            config,
        }
    }

    /// Register a step. Later registrations with the same name replace earlier ones.
    #[must_use]
    pub fn with_action(mut self, action: Arc<dyn Action<S::Tx>>) -> Self {
        self.actions.retain(|existing| existing.name() != action.name());
        self.actions.push(action);
        self
    }

    /// Create and persist a new flow seeded with `stash`.
    ///
    /// # Errors
    /// Returns a fatal error if the flow cannot be persisted.
    #[instrument(skip_all)]
    pub async fn start(&self, stash: Stash) -> Result<FlowResponse, FlowError> {
        self.start_tx(stash).await.inspect_err(|err| log_fatal("start", err))
    }

    async fn start_tx(&self, stash: Stash) -> Result<FlowResponse, FlowError> {
        let flow = FlowInstance::new(stash, self.config.ttl());
        let mut tx = self.source.begin().await?;
        if let Err(err) = self.store.save(&mut tx, &flow).await {
            self.rollback(tx).await;
            return Err(err.into());
        }
        self.source.commit(tx).await?;

        info!(flow_id = %flow.id(), "flow started");
        Ok(self.respond(&flow, None, None))
    }

    /// Current state of a flow and the actions it offers.
    ///
    /// # Errors
    /// Returns `NotFound` or `Expired` for unusable flows, or a fatal error.
    #[instrument(skip(self))]
    pub async fn describe(&self, flow_id: Uuid) -> Result<FlowResponse, FlowError> {
        self.describe_tx(flow_id)
            .await
            .inspect_err(|err| log_fatal("describe", err))
    }

    async fn describe_tx(&self, flow_id: Uuid) -> Result<FlowResponse, FlowError> {
        let mut tx = self.source.begin().await?;
        let result = self.load_active(&mut tx, flow_id).await;
        self.rollback(tx).await;
        let flow = result?;
        Ok(self.respond(&flow, None, None))
    }

    /// Execute one step of a flow inside a single transaction.
    ///
    /// # Errors
    /// Returns `NotFound` or `Expired` for unusable flows, or a fatal error
    /// raised by the step or the store. The transaction is rolled back in
    /// every error case.
    #[instrument(skip(self, input, http), fields(flow_id = %flow_id))]
    pub async fn execute(
        &self,
        flow_id: Uuid,
        action_name: &str,
        input: Value,
        http: &HttpContext,
    ) -> Result<FlowResponse, FlowError> {
        self.execute_tx(flow_id, action_name, input, http)
            .await
            .inspect_err(|err| log_fatal(action_name, err))
    }

    async fn execute_tx(
        &self,
        flow_id: Uuid,
        action_name: &str,
        input: Value,
        http: &HttpContext,
    ) -> Result<FlowResponse, FlowError> {
        let mut tx = self.source.begin().await?;

        match self
            .execute_in(&mut tx, flow_id, action_name, input, http)
            .await
        {
            Ok(Resolution::Commit(response)) => {
                self.source.commit(tx).await?;
                Ok(response)
            }
            Ok(Resolution::Rollback(response)) => {
                self.rollback(tx).await;
                Ok(response)
            }
            Err(err) => {
                self.rollback(tx).await;
                Err(err)
            }
        }
    }

    /// Revert the most recent step of a flow.
    ///
    /// # Errors
    /// Returns `RevertPrevented` once a step has locked the flow,
    /// `NothingToRevert` for a flow without steps, `NotFound`/`Expired`, or a
    /// fatal error.
    #[instrument(skip(self))]
    pub async fn back(&self, flow_id: Uuid) -> Result<FlowResponse, FlowError> {
        self.back_tx(flow_id)
            .await
            .inspect_err(|err| log_fatal("back", err))
    }

    async fn back_tx(&self, flow_id: Uuid) -> Result<FlowResponse, FlowError> {
        let mut tx = self.source.begin().await?;

        let result = async {
            let mut flow = self.load_active(&mut tx, flow_id).await?;
            let reverted = flow.revert_last()?;
            self.store.save(&mut tx, &flow).await?;
            debug!(step = %reverted.action, "step reverted");
            Ok::<_, FlowError>(flow)
        }
        .await;

        match result {
            Ok(flow) => {
                self.source.commit(tx).await?;
                Ok(self.respond(&flow, None, None))
            }
            Err(err) => {
                self.rollback(tx).await;
                Err(err)
            }
        }
    }

    /// Open and roll back an empty transaction.
    ///
    /// # Errors
    /// Returns an error if the transaction source is unreachable.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let tx = self.source.begin().await?;
        self.source.rollback(tx).await
    }

    async fn execute_in(
        &self,
        tx: &mut S::Tx,
        flow_id: Uuid,
        action_name: &str,
        input: Value,
        http: &HttpContext,
    ) -> Result<Resolution, FlowError> {
        let mut flow = self.load_active(tx, flow_id).await?;

        let Some(action) = self.action(action_name) else {
            debug!("unknown action {action_name}");
            return Ok(Resolution::Rollback(self.not_permitted(&flow)));
        };

        if flow.is_sealed(action_name) {
            debug!("action {action_name} ran before the revert lock");
            return Ok(Resolution::Rollback(self.not_permitted(&flow)));
        }

        let schema = {
            let mut init = InitializationContext::new(flow.stash());
            action.initialize(&mut init);
            if init.is_suspended() {
                debug!("action {action_name} is suspended");
                return Ok(Resolution::Rollback(self.not_permitted(&flow)));
            }
            init.into_inputs()
        };

        let mut ctx = ExecutionContext::new(
            flow.id(),
            &mut *tx,
            http,
            flow.stash().clone(),
            InputData::from_value(input),
            schema,
        );
        let disposition = action.execute(&mut ctx).await?;
        let outcome = ctx.into_outcome();

        match disposition {
            Disposition::Continue => {
                flow.complete_step(action.name().as_str(), outcome.stash);
                if outcome.revert_prevented {
                    flow.prevent_revert();
                }
                self.store.save(tx, &flow).await?;
                info!(action = %action.name(), "step completed");
                Ok(Resolution::Commit(self.respond(
                    &flow,
                    outcome.payload,
                    None,
                )))
            }
            Disposition::Error(step_error) => {
                match step_error.cause() {
                    Some(cause) => warn!(code = %step_error.code(), "step rejected: {cause:#}"),
                    None => warn!(code = %step_error.code(), "step rejected"),
                }
                Ok(Resolution::Commit(self.respond(
                    &flow,
                    None,
                    Some(step_error.into()),
                )))
            }
            Disposition::Suspend => Ok(Resolution::Rollback(self.not_permitted(&flow))),
        }
    }

    async fn load_active(&self, tx: &mut S::Tx, flow_id: Uuid) -> Result<FlowInstance, FlowError> {
        let flow = self
            .store
            .load(tx, flow_id)
            .await?
            .ok_or(FlowError::NotFound(flow_id))?;
        if flow.is_expired(chrono::Utc::now()) {
            return Err(FlowError::Expired(flow_id));
        }
        Ok(flow)
    }

    async fn rollback(&self, tx: S::Tx) {
        if let Err(err) = self.source.rollback(tx).await {
            error!("Failed to roll back flow transaction: {err:#}");
        }
    }

    fn action(&self, name: &str) -> Option<&Arc<dyn Action<S::Tx>>> {
        self.actions
            .iter()
            .find(|action| action.name().as_str() == name)
    }

    /// Actions whose initialization does not suspend them for this flow,
    /// minus those sealed by the revert lock.
    #[must_use]
    pub fn available_actions(&self, flow: &FlowInstance) -> Vec<ActionDescriptor> {
        self.actions
            .iter()
            .filter(|action| !flow.is_sealed(action.name().as_str()))
            .filter_map(|action| {
                let mut init = InitializationContext::new(flow.stash());
                action.initialize(&mut init);
                (!init.is_suspended()).then(|| ActionDescriptor {
                    name: action.name(),
                    description: action.description(),
                    inputs: init.into_inputs(),
                })
            })
            .collect()
    }

    fn not_permitted(&self, flow: &FlowInstance) -> FlowResponse {
        self.respond(
            flow,
            None,
            Some(StepError::new(ErrorCode::OperationNotPermitted).into()),
        )
    }

    fn respond(
        &self,
        flow: &FlowInstance,
        payload: Option<Value>,
        error: Option<ResponseError>,
    ) -> FlowResponse {
        FlowResponse {
            flow_id: flow.id(),
            actions: self.available_actions(flow),
            payload,
            error,
            revert_allowed: flow.revert_allowed(),
        }
    }
}

/// Fatal errors are logged here once; client errors are not logged at all.
fn log_fatal(operation: &str, err: &FlowError) {
    if err.is_fatal() {
        error!("Flow {operation} failed: {err:#}");
    }
}
