use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::flow::{
    ActionDescriptor, ErrorCode, FieldError, FlowError, FlowResponse, InputField, ResponseError,
};

/// Inputs submitted to an action, keyed by input name.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[schema(value_type = Object)]
pub struct ActionInput(pub Value);

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InputBody {
    pub name: String,
    /// Either `json` or `boolean`.
    pub kind: String,
    pub required: bool,
}

impl From<&InputField> for InputBody {
    fn from(field: &InputField) -> Self {
        let kind = serde_json::to_value(field.kind)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            name: field.name.to_string(),
            kind,
            required: field.required,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ActionBody {
    pub name: String,
    pub description: String,
    pub inputs: Vec<InputBody>,
}

impl From<&ActionDescriptor> for ActionBody {
    fn from(action: &ActionDescriptor) -> Self {
        Self {
            name: action.name.to_string(),
            description: action.description.to_string(),
            inputs: action.inputs.fields().iter().map(InputBody::from).collect(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldErrorBody {
    pub name: String,
    pub code: String,
}

impl From<&FieldError> for FieldErrorBody {
    fn from(error: &FieldError) -> Self {
        let code = serde_json::to_value(error.code)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            name: error.name.clone(),
            code,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldErrorBody>,
}

impl ErrorBody {
    fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.as_str().to_string(),
            message: code.message().to_string(),
            field_errors: Vec::new(),
        }
    }
}

impl From<&ResponseError> for ErrorBody {
    fn from(error: &ResponseError) -> Self {
        Self {
            code: error.code.as_str().to_string(),
            message: error.message.to_string(),
            field_errors: error.field_errors.iter().map(FieldErrorBody::from).collect(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FlowBody {
    pub flow_id: Uuid,
    pub actions: Vec<ActionBody>,
    #[schema(value_type = Option<Object>)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub revert_allowed: bool,
}

impl From<&FlowResponse> for FlowBody {
    fn from(response: &FlowResponse) -> Self {
        Self {
            flow_id: response.flow_id,
            actions: response.actions.iter().map(ActionBody::from).collect(),
            payload: response.payload.clone(),
            error: response.error.as_ref().map(ErrorBody::from),
            revert_allowed: response.revert_allowed,
        }
    }
}

/// Error-only body for requests that never reached a flow.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FailureBody {
    pub error: ErrorBody,
}

#[must_use]
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::FormDataInvalid => StatusCode::BAD_REQUEST,
        ErrorCode::PasskeyInvalid => StatusCode::UNAUTHORIZED,
        ErrorCode::OperationNotPermitted => StatusCode::FORBIDDEN,
        ErrorCode::FlowNotFound => StatusCode::NOT_FOUND,
        ErrorCode::FlowExpired => StatusCode::GONE,
        ErrorCode::RevertNotAllowed | ErrorCode::NothingToRevert => StatusCode::CONFLICT,
        ErrorCode::TechnicalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Successful controller call: the status follows the step error, if any.
pub struct FlowReply(pub FlowResponse);

impl IntoResponse for FlowReply {
    fn into_response(self) -> Response {
        let status = self
            .0
            .error
            .as_ref()
            .map_or(StatusCode::OK, |error| status_for(error.code));
        (status, Json(FlowBody::from(&self.0))).into_response()
    }
}

/// Failed controller call. Fatal errors are reported generically; the
/// controller has already logged them.
pub struct ApiError(pub FlowError);

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        failure(self.0.code())
    }
}

/// Error-only response for `code`.
pub(crate) fn failure(code: ErrorCode) -> Response {
    (
        status_for(code),
        Json(FailureBody {
            error: ErrorBody::from_code(code),
        }),
    )
        .into_response()
}
