//! Error types for the backend interface

use thiserror::Error;

/// Opaque error produced by a registered row callback.
///
/// Callbacks run engine code the backend knows nothing about; the error is
/// carried through unchanged so the engine can recover the innermost fault
/// by downcasting.
pub type UdfError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// Referenced column does not exist in the frame schema
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// Referenced struct field does not exist in a struct column
    #[error("field not found: {field} in column {column}")]
    FieldNotFound { column: String, field: String },

    /// A cell does not match its declared column type
    #[error("schema mismatch in column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    /// A column name occurs twice in a schema
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    /// A row has the wrong number of cells for its schema
    #[error("row width {found} does not match schema width {expected}")]
    RowWidth { expected: usize, found: usize },

    /// A registered callback failed; the original error is preserved
    #[error("task failed: {0}")]
    Udf(#[source] UdfError),
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;
