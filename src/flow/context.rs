//! Contexts handed to a step during initialization and execution.

use serde_json::Value;
use uuid::Uuid;

use super::action::{Disposition, StepError};
use super::error::ErrorCode;
use super::input::{FieldError, InputData, InputField, InputSchema};
use super::stash::Stash;

/// Request metadata carried into audit records.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HttpContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

/// Read-only view used to decide whether a step is offered.
///
/// Initialization may run many times while the set of next actions is
/// computed, so it only reads the stash.
pub struct InitializationContext<'a> {
    stash: &'a Stash,
    suspended: bool,
    inputs: InputSchema,
}

impl<'a> InitializationContext<'a> {
    #[must_use]
    pub fn new(stash: &'a Stash) -> Self {
        Self {
            stash,
            suspended: false,
            inputs: InputSchema::new(),
        }
    }

    #[must_use]
    pub fn stash(&self) -> &Stash {
        self.stash
    }

    /// Remove the step from the set of currently valid actions.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn add_input(&mut self, field: InputField) {
        self.inputs.add(field);
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    #[must_use]
    pub fn into_inputs(self) -> InputSchema {
        self.inputs
    }
}

/// Everything a step may touch while executing.
///
/// The stash is a working copy: the controller applies it only when the step
/// continues. The transaction handle is borrowed, never owned.
pub struct ExecutionContext<'a, T> {
    flow_id: Uuid,
    tx: &'a mut T,
    http: &'a HttpContext,
    stash: Stash,
    input: InputData,
    schema: InputSchema,
    input_errors: Vec<FieldError>,
    revert_prevented: bool,
    payload: Option<Value>,
}

impl<'a, T> ExecutionContext<'a, T> {
    #[must_use]
    pub fn new(
        flow_id: Uuid,
        tx: &'a mut T,
        http: &'a HttpContext,
        stash: Stash,
        input: InputData,
        schema: InputSchema,
    ) -> Self {
        Self {
            flow_id,
            tx,
            http,
            stash,
            input,
            schema,
            input_errors: Vec::new(),
            revert_prevented: false,
            payload: None,
        }
    }

    #[must_use]
    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    pub fn tx(&mut self) -> &mut T {
        &mut *self.tx
    }

    #[must_use]
    pub fn http(&self) -> &HttpContext {
        self.http
    }

    #[must_use]
    pub fn stash(&self) -> &Stash {
        &self.stash
    }

    pub fn stash_mut(&mut self) -> &mut Stash {
        &mut self.stash
    }

    #[must_use]
    pub fn input(&self) -> &InputData {
        &self.input
    }

    /// Check the submitted input against the declared schema.
    pub fn validate_input(&mut self) -> bool {
        self.input_errors = self.schema.validate(&self.input);
        self.input_errors.is_empty()
    }

    /// Forbid reverting this flow to any point before the current step.
    pub fn prevent_revert(&mut self) {
        self.revert_prevented = true;
    }

    /// Data returned to the client alongside the next actions.
    pub fn set_payload(&mut self, payload: Value) {
        self.payload = Some(payload);
    }

    #[must_use]
    pub fn continue_flow(&self) -> Disposition {
        Disposition::Continue
    }

    /// End the step with a client-visible error.
    #[must_use]
    pub fn error(&self, code: ErrorCode) -> Disposition {
        let mut error = StepError::new(code);
        if code == ErrorCode::FormDataInvalid {
            error = error.with_field_errors(self.input_errors.clone());
        }
        Disposition::Error(error)
    }

    #[must_use]
    pub fn into_outcome(self) -> ExecutionOutcome {
        ExecutionOutcome {
            stash: self.stash,
            revert_prevented: self.revert_prevented,
            payload: self.payload,
        }
    }
}

/// State left behind by a step, consumed by the controller.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub stash: Stash,
    pub revert_prevented: bool,
    pub payload: Option<Value>,
}
