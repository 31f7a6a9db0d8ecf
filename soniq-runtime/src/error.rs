//! Error taxonomy for query execution
//!
//! Every user-visible error carries a [`SourceLocation`]: the position and
//! expression fragment the parser attached to the AST node that raised it.
//! Iterator flow errors are internal misuse of the streaming protocol, not
//! user errors; they share the taxonomy so they unwind the same way.

use soniq_backend::BackendError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Source position attached to AST nodes and surfaced on errors
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceLocation {
    /// Module file, when known
    pub file: Option<Arc<str>>,
    /// 1-based line; 0 when unknown
    pub line: u32,
    /// 1-based column; 0 when unknown
    pub column: u32,
    /// The expression text fragment this node was parsed from
    pub fragment: Arc<str>,
}

impl SourceLocation {
    /// Location with position but no fragment
    pub fn at(line: u32, column: u32) -> Self {
        Self {
            file: None,
            line,
            column,
            fragment: Arc::from(""),
        }
    }

    /// Location with position and the originating expression fragment
    pub fn with_fragment(line: u32, column: u32, fragment: impl Into<Arc<str>>) -> Self {
        Self {
            file: None,
            line,
            column,
            fragment: fragment.into(),
        }
    }

    /// Unknown location (synthesized nodes, tests)
    pub fn unknown() -> Self {
        Self::default()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column)?,
            None => write!(f, "{}:{}", self.line, self.column)?,
        }
        if !self.fragment.is_empty() {
            write!(f, " in `{}`", self.fragment)?;
        }
        Ok(())
    }
}

/// Runtime errors
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    /// Static or dynamic type violation
    #[error("type error: {message} at {location}")]
    Type {
        message: String,
        location: SourceLocation,
    },

    /// Dynamic evaluation fault (empty where a singleton is required,
    /// division by zero, overflow, duplicate object key, ...)
    #[error("dynamic error: {message} at {location}")]
    Dynamic {
        message: String,
        location: SourceLocation,
    },

    /// A sort or group key evaluated to a non-atomic item
    #[error("non-atomic key: {message} at {location}")]
    NonAtomicKey {
        message: String,
        location: SourceLocation,
    },

    /// A value of an unusable type reached an operation (binary sort keys,
    /// mixed key types across rows, ...)
    #[error("unexpected type: {message} at {location}")]
    UnexpectedType {
        message: String,
        location: SourceLocation,
    },

    /// Invalid argument to a function or operator
    #[error("invalid argument: {message} at {location}")]
    InvalidArgument {
        message: String,
        location: SourceLocation,
    },

    /// No function with this name and arity
    #[error("function not found: {name}#{arity} at {location}")]
    FunctionNotFound {
        name: String,
        arity: usize,
        location: SourceLocation,
    },

    /// Streaming protocol misuse; an engine bug, not a user error
    #[error("iterator flow error: {message} at {location}")]
    IteratorFlow {
        message: String,
        location: SourceLocation,
    },

    /// User-declared tabular schema does not match the data
    #[error("schema mismatch: {message} at {location}")]
    SchemaMismatch {
        message: String,
        location: SourceLocation,
    },

    /// Cooperative cancellation was requested
    #[error("query cancelled at {location}")]
    Cancelled { location: SourceLocation },

    /// Iterator cannot rewind under `reset`
    #[error("iterator is not rewindable at {location}")]
    NotRewindable { location: SourceLocation },

    /// Value-level fault from soniq-core, with the raising location
    #[error("{source} at {location}")]
    Core {
        source: soniq_core::Error,
        location: SourceLocation,
    },
}

impl RuntimeError {
    pub fn type_error(message: impl Into<String>, location: SourceLocation) -> Self {
        RuntimeError::Type {
            message: message.into(),
            location,
        }
    }

    pub fn dynamic(message: impl Into<String>, location: SourceLocation) -> Self {
        RuntimeError::Dynamic {
            message: message.into(),
            location,
        }
    }

    pub fn non_atomic_key(message: impl Into<String>, location: SourceLocation) -> Self {
        RuntimeError::NonAtomicKey {
            message: message.into(),
            location,
        }
    }

    pub fn unexpected_type(message: impl Into<String>, location: SourceLocation) -> Self {
        RuntimeError::UnexpectedType {
            message: message.into(),
            location,
        }
    }

    pub fn invalid_argument(message: impl Into<String>, location: SourceLocation) -> Self {
        RuntimeError::InvalidArgument {
            message: message.into(),
            location,
        }
    }

    pub fn iterator_flow(message: impl Into<String>, location: SourceLocation) -> Self {
        RuntimeError::IteratorFlow {
            message: message.into(),
            location,
        }
    }

    pub fn schema_mismatch(message: impl Into<String>, location: SourceLocation) -> Self {
        RuntimeError::SchemaMismatch {
            message: message.into(),
            location,
        }
    }

    pub fn core(source: soniq_core::Error, location: SourceLocation) -> Self {
        RuntimeError::Core { source, location }
    }

    /// The source location this error was raised at
    pub fn location(&self) -> &SourceLocation {
        match self {
            RuntimeError::Type { location, .. }
            | RuntimeError::Dynamic { location, .. }
            | RuntimeError::NonAtomicKey { location, .. }
            | RuntimeError::UnexpectedType { location, .. }
            | RuntimeError::InvalidArgument { location, .. }
            | RuntimeError::FunctionNotFound { location, .. }
            | RuntimeError::IteratorFlow { location, .. }
            | RuntimeError::SchemaMismatch { location, .. }
            | RuntimeError::Cancelled { location }
            | RuntimeError::NotRewindable { location }
            | RuntimeError::Core { location, .. } => location,
        }
    }

    /// Recover the innermost runtime error from a backend failure.
    ///
    /// Registered callbacks run engine code; when one fails the backend
    /// wraps the error opaquely. Unwrapping preserves the original fault
    /// and its location instead of reporting a generic task failure.
    pub fn from_backend(err: BackendError, location: SourceLocation) -> Self {
        match err {
            BackendError::Udf(inner) => match inner.downcast::<RuntimeError>() {
                Ok(runtime) => *runtime,
                Err(other) => RuntimeError::Dynamic {
                    message: format!("distributed task failed: {}", other),
                    location,
                },
            },
            BackendError::TypeMismatch {
                column,
                expected,
                found,
            } => RuntimeError::SchemaMismatch {
                message: format!(
                    "column '{}' expected {} but found {}",
                    column, expected, found
                ),
                location,
            },
            other => RuntimeError::Dynamic {
                message: format!("backend error: {}", other),
                location,
            },
        }
    }
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        let loc = SourceLocation::with_fragment(3, 7, "$x + 1");
        assert_eq!(loc.to_string(), "3:7 in `$x + 1`");
    }

    #[test]
    fn test_backend_unwrap_preserves_inner_error() {
        let inner = RuntimeError::type_error("boom", SourceLocation::at(1, 2));
        let wrapped = BackendError::Udf(Box::new(inner));
        let recovered = RuntimeError::from_backend(wrapped, SourceLocation::unknown());
        match recovered {
            RuntimeError::Type { message, location } => {
                assert_eq!(message, "boom");
                assert_eq!(location.line, 1);
            }
            other => panic!("expected type error, got {:?}", other),
        }
    }
}
