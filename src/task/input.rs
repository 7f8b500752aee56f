//! Input contracts.
//!
//! The engine never validates input itself; callers run `InputContract::apply`
//! before invoking it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::context::InputMap;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("missing required input field: {0}")]
    MissingField(String),
}

/// One accepted invocation parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InputField {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            default: None,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: Option<Value>) -> Self {
        Self {
            name: name.into(),
            required: false,
            default,
            description: None,
        }
    }
}

/// Structural description of accepted parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputContract {
    pub fields: Vec<InputField>,
}

impl InputContract {
    pub fn new(fields: Vec<InputField>) -> Self {
        Self { fields }
    }

    /// Fill defaults and check required fields. Unknown fields pass through.
    pub fn apply(&self, mut input: InputMap) -> Result<InputMap, InputError> {
        for field in &self.fields {
            let present = input.get(&field.name).is_some_and(|v| !v.is_null());
            if present {
                continue;
            }
            match (&field.default, field.required) {
                (Some(default), _) => {
                    input.insert(field.name.clone(), default.clone());
                }
                (None, true) => return Err(InputError::MissingField(field.name.clone())),
                (None, false) => {}
            }
        }
        Ok(input)
    }
}
