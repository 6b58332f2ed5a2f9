//! The contract every flow step implements.

use async_trait::async_trait;
use std::fmt;

use super::context::{ExecutionContext, InitializationContext};
use super::error::{ErrorCode, FlowError};
use super::input::FieldError;

/// Stable identifier of a step, used in routes and flow history.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ActionName(&'static str);

impl ActionName {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Client-visible error produced by a step, optionally wrapping its cause.
#[derive(Debug)]
pub struct StepError {
    code: ErrorCode,
    cause: Option<anyhow::Error>,
    field_errors: Vec<FieldError>,
}

impl StepError {
    #[must_use]
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            cause: None,
            field_errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    #[must_use]
    pub fn with_field_errors(mut self, field_errors: Vec<FieldError>) -> Self {
        self.field_errors = field_errors;
        self
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_ref()
    }

    #[must_use]
    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    #[must_use]
    pub fn into_field_errors(self) -> Vec<FieldError> {
        self.field_errors
    }
}

/// Terminal outcome of one step execution.
#[derive(Debug)]
pub enum Disposition {
    Continue,
    Error(StepError),
    Suspend,
}

/// A single step of a flow.
///
/// `initialize` must be free of side effects: it decides whether the step is
/// offered and which inputs it requires. `execute` runs inside the
/// controller's transaction and must not commit or roll it back.
#[async_trait]
pub trait Action<T: Send>: Send + Sync {
    fn name(&self) -> ActionName;

    fn description(&self) -> &'static str;

    fn initialize(&self, ctx: &mut InitializationContext<'_>);

    /// Run the step.
    ///
    /// # Errors
    /// Returns a fatal `FlowError` for protocol violations and system failures.
    async fn execute(&self, ctx: &mut ExecutionContext<'_, T>) -> Result<Disposition, FlowError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn step_error_wraps_cause() {
        let error = StepError::new(ErrorCode::PasskeyInvalid).with_cause(anyhow!("bad signature"));
        assert_eq!(error.code(), ErrorCode::PasskeyInvalid);
        assert_eq!(
            error.cause().map(ToString::to_string),
            Some("bad signature".to_string())
        );
    }

    #[test]
    fn action_name_displays_raw_name() {
        const NAME: ActionName = ActionName::new("webauthn_verify_assertion_response");
        assert_eq!(NAME.to_string(), "webauthn_verify_assertion_response");
    }
}
