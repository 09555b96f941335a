//! Errors raised by the bridge's boundary operations
//!
//! Every variant carries `who`, the name of the operation (or of the native
//! function being called) the way the host interpreter reports violations.

use thiserror::Error;

use crate::objects::{ObjectType, Value};

/// Result type for bridge operations.
pub type FfiResult<T> = Result<T, FfiError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FfiError {
    #[error("{who}: wrong number of arguments: required {}, but got {got}", arity_text(.min, .max))]
    WrongArgCount {
        who: String,
        min: usize,
        max: Option<usize>,
        got: usize,
    },

    #[error("{who}: expected {expected}, but got {} {got}, as argument {}", .got_type.name(), .position + 1)]
    WrongType {
        who: String,
        position: usize,
        expected: String,
        got_type: ObjectType,
        got: String,
    },

    #[error("{who}: {message} {irritant}")]
    InvalidArgument {
        who: String,
        message: String,
        irritant: String,
        position: Option<usize>,
    },

    #[error("{who}: operating system does not support this feature")]
    Unsupported { who: String },

    #[error("{who}: {message}")]
    Procedure { who: String, message: String },
}

impl FfiError {
    pub fn wrong_arg_count(who: &str, min: usize, max: Option<usize>, got: usize) -> Self {
        Self::WrongArgCount {
            who: who.to_string(),
            min,
            max,
            got,
        }
    }

    pub fn wrong_type(who: &str, position: usize, expected: impl Into<String>, got: &Value) -> Self {
        Self::WrongType {
            who: who.to_string(),
            position,
            expected: expected.into(),
            got_type: got.get_type(),
            got: got.to_string(),
        }
    }

    pub fn invalid_argument(
        who: &str,
        message: impl Into<String>,
        irritant: impl ToString,
        position: Option<usize>,
    ) -> Self {
        Self::InvalidArgument {
            who: who.to_string(),
            message: message.into(),
            irritant: irritant.to_string(),
            position,
        }
    }

    pub fn unsupported(who: &str) -> Self {
        Self::Unsupported { who: who.to_string() }
    }

    pub fn procedure(who: &str, message: impl Into<String>) -> Self {
        Self::Procedure {
            who: who.to_string(),
            message: message.into(),
        }
    }

    /// Operation or function name the error is attributed to.
    pub fn who(&self) -> &str {
        match self {
            Self::WrongArgCount { who, .. }
            | Self::WrongType { who, .. }
            | Self::InvalidArgument { who, .. }
            | Self::Unsupported { who }
            | Self::Procedure { who, .. } => who,
        }
    }

    /// Zero-based position of the offending argument, when one is known.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::WrongType { position, .. } => Some(*position),
            Self::InvalidArgument { position, .. } => *position,
            _ => None,
        }
    }
}

fn arity_text(min: &usize, max: &Option<usize>) -> String {
    match *max {
        Some(max) if max == *min => min.to_string(),
        Some(max) => format!("{} to {}", min, max),
        None => format!("at least {}", min),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_messages() {
        let err = FfiError::wrong_arg_count("lookup-symbol", 2, Some(2), 3);
        assert_eq!(
            err.to_string(),
            "lookup-symbol: wrong number of arguments: required 2, but got 3"
        );

        let err = FfiError::wrong_arg_count("error-code", 0, Some(1), 2);
        assert!(err.to_string().contains("required 0 to 1"));

        let err = FfiError::wrong_arg_count("call-native", 4, None, 1);
        assert!(err.to_string().contains("at least 4"));
    }

    #[test]
    fn test_wrong_type_is_one_based_in_message() {
        let err = FfiError::wrong_type("puts", 4, "string", &Value::int(42));
        assert_eq!(err.position(), Some(4));
        assert_eq!(err.to_string(), "puts: expected string, but got exact integer 42, as argument 5");
    }

    #[test]
    fn test_wrong_type_names_the_object_type() {
        let err = FfiError::wrong_type("call-native", 2, "symbol", &Value::string("cdecl"));
        assert!(matches!(err, FfiError::WrongType { got_type: ObjectType::String, .. }));
        assert_eq!(
            err.to_string(),
            "call-native: expected symbol, but got string \"cdecl\", as argument 3"
        );

        let err = FfiError::wrong_type("strlen", 0, "string", &Value::Null);
        assert!(err.to_string().contains("but got null #<null>"));
    }

    #[test]
    fn test_unsupported_message() {
        let err = FfiError::unsupported("platform-last-error");
        assert_eq!(err.who(), "platform-last-error");
        assert!(err
            .to_string()
            .ends_with("operating system does not support this feature"));
    }
}
