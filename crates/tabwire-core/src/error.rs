//! Error types for the worker.
//!
//! Errors fall into two tiers. Recoverable errors become an `error` response
//! on the wire and the command loop continues. Fatal errors end the loop and
//! close the connection; see [`WorkerError::is_fatal`].

use thiserror::Error;

/// Main error type for the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    // Transport errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Frame of {len} bytes exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Protocol errors
    #[error("{context} json message does not contain a {field} entry!")]
    MissingField {
        context: &'static str,
        field: &'static str,
    },

    #[error("{message}")]
    InvalidField { field: &'static str, message: String },

    // Absent variables. Each lookup keeps the wording hosts already match on.
    #[error("Variable {name} is not defined")]
    VariableNotFound { name: String },

    #[error("variable {name} is not set!")]
    VariableNotSet { name: String },

    #[error("{name} does not exist!")]
    VariableMissing { name: String },

    #[error("Variable {name} is not a {expected} object")]
    WrongType { name: String, expected: &'static str },

    // Shared memory handle errors
    #[error("IPC handle exists already.")]
    HandleAlreadyOpen,

    #[error("No handle exists")]
    NoHandle,

    #[error("Shared memory error: {message}")]
    SharedMemory { message: String },

    // Payload errors
    #[error("Dataset error: {message}")]
    Dataset { message: String },

    #[error("Encoding error: {message}")]
    Encoding { message: String },

    #[error("Figure error: {message}")]
    Figure { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return WorkerError::ConnectionClosed;
        }
        WorkerError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<arrow::error::ArrowError> for WorkerError {
    fn from(err: arrow::error::ArrowError) -> Self {
        WorkerError::Dataset {
            message: err.to_string(),
        }
    }
}

impl From<base64::DecodeError> for WorkerError {
    fn from(err: base64::DecodeError) -> Self {
        WorkerError::Encoding {
            message: format!("invalid base64: {}", err),
        }
    }
}

impl WorkerError {
    /// Whether this error must terminate the connection.
    ///
    /// Transport failures, unparsable control frames and a second open of
    /// the shared memory handle are fatal. Everything else is reported to
    /// the host as an `error` response.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkerError::Io { .. }
                | WorkerError::ConnectionClosed
                | WorkerError::FrameTooLarge { .. }
                | WorkerError::InvalidUtf8
                | WorkerError::Json { .. }
                | WorkerError::HandleAlreadyOpen
        )
    }

    pub(crate) fn encoding(message: impl Into<String>) -> Self {
        WorkerError::Encoding {
            message: message.into(),
        }
    }

    pub(crate) fn dataset(message: impl Into<String>) -> Self {
        WorkerError::Dataset {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkerError::MissingField {
            context: "execute script",
            field: "script",
        };
        assert_eq!(
            err.to_string(),
            "execute script json message does not contain a script entry!"
        );
        assert_eq!(WorkerError::NoHandle.to_string(), "No handle exists");
        let missing = WorkerError::VariableMissing { name: "fig".into() };
        assert_eq!(missing.to_string(), "fig does not exist!");
        let not_set = WorkerError::VariableNotSet { name: "v".into() };
        assert_eq!(not_set.to_string(), "variable v is not set!");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(WorkerError::ConnectionClosed.is_fatal());
        assert!(WorkerError::HandleAlreadyOpen.is_fatal());
        assert!(!WorkerError::NoHandle.is_fatal());
        assert!(!WorkerError::VariableNotFound { name: "x".into() }.is_fatal());
        assert!(!WorkerError::VariableMissing { name: "x".into() }.is_fatal());
        assert!(!WorkerError::dataset("bad csv").is_fatal());
    }

    #[test]
    fn test_unexpected_eof_maps_to_connection_closed() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(WorkerError::from(io), WorkerError::ConnectionClosed));
    }
}
