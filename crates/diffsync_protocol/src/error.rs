//! Error types for message decoding.

use thiserror::Error;

/// Result type for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors that can occur while decoding a wire message.
///
/// Messages arrive from the network, so every decode step is fallible and
/// reports *which* field failed and *how*.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The input is not valid JSON.
    #[error("invalid JSON: {message}")]
    Syntax {
        /// Parser message.
        message: String,
    },

    /// A required field is absent.
    #[error("missing field `{field}` in {context}")]
    MissingField {
        /// Name of the missing field.
        field: String,
        /// Where the field was expected (e.g. `edits[1]`).
        context: String,
    },

    /// A field is present but has the wrong JSON type.
    #[error("field `{field}` in {context}: expected {expected}, found {found}")]
    WrongType {
        /// Name of the offending field.
        field: String,
        /// Where the field was found.
        context: String,
        /// Expected type.
        expected: &'static str,
        /// Actual JSON type.
        found: &'static str,
    },

    /// The structure is well-typed but not meaningful.
    #[error("malformed {context}: {message}")]
    Malformed {
        /// Where the problem was found.
        context: String,
        /// Description of the problem.
        message: String,
    },

    /// The `msgType` discriminator is not recognized.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// A diff names an operation this protocol does not define.
    #[error("unknown diff operation `{op}` in {context}")]
    UnknownOperation {
        /// The unrecognized operation name.
        op: String,
        /// Where the diff was found.
        context: String,
    },
}

impl DecodeError {
    /// Creates a missing field error.
    pub fn missing(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Creates a malformed structure error.
    pub fn malformed(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Returns the name of the field involved, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            DecodeError::MissingField { field, .. } | DecodeError::WrongType { field, .. } => {
                Some(field)
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Syntax {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DecodeError::missing("checksum", "edits[0]");
        assert_eq!(err.to_string(), "missing field `checksum` in edits[0]");
        assert_eq!(err.field(), Some("checksum"));

        let err = DecodeError::UnknownMessageType("sideways".into());
        assert!(err.to_string().contains("sideways"));
        assert_eq!(err.field(), None);
    }

    #[test]
    fn syntax_from_serde() {
        let err: DecodeError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, DecodeError::Syntax { .. }));
    }
}
