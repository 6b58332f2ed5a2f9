//! Declared step inputs and structural validation.
//!
//! Validation here is purely structural: a JSON input must be well-formed
//! structured data, but what it means is decided by whoever consumes it.

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Json,
    Boolean,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InputField {
    pub name: &'static str,
    pub kind: InputKind,
    pub required: bool,
}

impl InputField {
    #[must_use]
    pub fn json(name: &'static str) -> Self {
        Self::new(name, InputKind::Json)
    }

    #[must_use]
    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, InputKind::Boolean)
    }

    fn new(name: &'static str, kind: InputKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    fn check(&self, value: Option<&Value>) -> Option<FieldError> {
        let value = match value {
            None | Some(Value::Null) => {
                return self
                    .required
                    .then(|| FieldError::new(self.name, FieldErrorCode::ValueMissing));
            }
            Some(value) => value,
        };

        let valid = match self.kind {
            InputKind::Boolean => value.is_boolean(),
            InputKind::Json => is_structured(value),
        };

        (!valid).then(|| FieldError::new(self.name, FieldErrorCode::ValueInvalid))
    }
}

fn is_structured(value: &Value) -> bool {
    match value {
        Value::Object(_) | Value::Array(_) => true,
        Value::String(text) => matches!(
            serde_json::from_str::<Value>(text),
            Ok(Value::Object(_) | Value::Array(_))
        ),
        _ => false,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorCode {
    ValueMissing,
    ValueInvalid,
    PayloadInvalid,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldError {
    pub name: String,
    pub code: FieldErrorCode,
}

impl FieldError {
    fn new(name: &str, code: FieldErrorCode) -> Self {
        Self {
            name: name.to_string(),
            code,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct InputSchema {
    fields: Vec<InputField>,
}

impl InputSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field declaration.
    pub fn add(&mut self, field: InputField) {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == field.name) {
            *existing = field;
        } else {
            self.fields.push(field);
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[InputField] {
        &self.fields
    }

    /// Validate `data` against the declared fields. Empty means valid.
    #[must_use]
    pub fn validate(&self, data: &InputData) -> Vec<FieldError> {
        if !data.well_formed {
            return vec![FieldError::new("", FieldErrorCode::PayloadInvalid)];
        }
        self.fields
            .iter()
            .filter_map(|field| field.check(data.values.get(field.name)))
            .collect()
    }
}

/// Raw input submitted by the client for one step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputData {
    values: Map<String, Value>,
    well_formed: bool,
}

impl InputData {
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self {
                values,
                well_formed: true,
            },
            Value::Null => Self {
                values: Map::new(),
                well_formed: true,
            },
            _ => Self {
                values: Map::new(),
                well_formed: false,
            },
        }
    }

    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    /// JSON field as text: strings are returned as submitted, structured
    /// values are re-serialized.
    #[must_use]
    pub fn json_string(&self, name: &str) -> Option<String> {
        match self.values.get(name)? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}
