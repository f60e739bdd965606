//! Error types for VQPy.

use std::fmt;

/// The main error type for VQPy operations.
#[derive(Debug)]
pub enum Error {
    /// A lock was poisoned (internal error)
    LockPoisoned,

    /// I/O error
    Io(std::io::Error),

    /// Serialization/deserialization error
    Serialization(String),

    /// Query text could not be tokenized or parsed
    Parse(String),

    /// Query program failed semantic analysis
    Compile(String),

    /// An abstract function reachable from a query has no bound model
    UnboundModel(String),

    /// A bound model failed while running
    Model {
        /// Model name as declared in the program
        name: String,
        /// Failure reported by the model
        message: String,
    },

    /// A model returned a value of the wrong type
    TypeMismatch {
        /// Model name as declared in the program
        name: String,
        /// Declared return type
        expected: String,
        /// Type of the returned value
        found: String,
    },

    /// Invalid operation
    InvalidOperation(String),

    /// Not found
    NotFound,
}

impl Error {
    /// Convenience constructor for model failures.
    pub fn model<N: Into<String>, M: fmt::Display>(name: N, message: M) -> Self {
        Error::Model {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::LockPoisoned => write!(f, "Lock poisoned"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Parse(msg) => write!(f, "Parse error: {}", msg),
            Error::Compile(msg) => write!(f, "Compile error: {}", msg),
            Error::UnboundModel(name) => write!(f, "No model bound for abstract function '{}'", name),
            Error::Model { name, message } => write!(f, "Model '{}' failed: {}", name, message),
            Error::TypeMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "Model '{}' returned {} but is declared to return {}",
                name, found, expected
            ),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
            Error::NotFound => write!(f, "Not found"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// A specialized `Result` type for VQPy operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::UnboundModel("is_car".to_string());
        assert_eq!(
            err.to_string(),
            "No model bound for abstract function 'is_car'"
        );

        let err = Error::model("plate", "timeout");
        assert_eq!(err.to_string(), "Model 'plate' failed: timeout");
    }

    #[test]
    fn test_io_source() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(std::error::Error::source(&err).is_some());
    }
}
