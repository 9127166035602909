//! Field extraction over untrusted JSON values.
//!
//! Every accessor distinguishes a missing field from a field of the wrong
//! type. Nothing here panics on malformed input.

use crate::error::{DecodeError, DecodeResult};
use serde_json::{Map, Value};

/// Returns the JSON type name of a value, for error messages.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_u64() => "non-negative integer",
        Value::Number(n) if n.is_i64() => "negative integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A JSON object being decoded, tagged with its location in the message.
pub(crate) struct Fields<'a> {
    map: &'a Map<String, Value>,
    context: String,
}

impl<'a> Fields<'a> {
    /// Views `value` as an object, failing if it is anything else.
    pub(crate) fn object(value: &'a Value, context: impl Into<String>) -> DecodeResult<Self> {
        let context = context.into();
        match value {
            Value::Object(map) => Ok(Self { map, context }),
            other => Err(DecodeError::malformed(
                context,
                format!("expected object, found {}", type_name(other)),
            )),
        }
    }

    pub(crate) fn context(&self) -> &str {
        &self.context
    }

    fn required(&self, name: &str) -> DecodeResult<&'a Value> {
        self.map
            .get(name)
            .ok_or_else(|| DecodeError::missing(name, self.context.clone()))
    }

    fn wrong_type(&self, name: &str, expected: &'static str, found: &Value) -> DecodeError {
        DecodeError::WrongType {
            field: name.to_string(),
            context: self.context.clone(),
            expected,
            found: type_name(found),
        }
    }

    /// Reads a required string field.
    pub(crate) fn str(&self, name: &str) -> DecodeResult<&'a str> {
        let value = self.required(name)?;
        value
            .as_str()
            .ok_or_else(|| self.wrong_type(name, "string", value))
    }

    /// Reads an optional string field. `null` counts as absent.
    pub(crate) fn opt_str(&self, name: &str) -> DecodeResult<Option<&'a str>> {
        match self.map.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.wrong_type(name, "string", other)),
        }
    }

    /// Reads a required non-negative integer field.
    pub(crate) fn u64(&self, name: &str) -> DecodeResult<u64> {
        let value = self.required(name)?;
        value
            .as_u64()
            .ok_or_else(|| self.wrong_type(name, "non-negative integer", value))
    }

    /// Reads a required array field.
    pub(crate) fn array(&self, name: &str) -> DecodeResult<&'a [Value]> {
        let value = self.required(name)?;
        value
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| self.wrong_type(name, "array", value))
    }

    /// Reads a required field of any type.
    pub(crate) fn any(&self, name: &str) -> DecodeResult<&'a Value> {
        self.required(name)
    }
}
