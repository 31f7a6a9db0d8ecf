//! Error types for soniq-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
///
/// Covers faults raised by the leaf value machinery: lexical parsing of
/// atomic values, numeric tower conversions, and binary codecs. The runtime
/// crate wraps these into its full error taxonomy with source metadata.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A lexical form does not parse as the requested atomic type
    #[error("invalid {type_name} literal: {lexical}")]
    InvalidLexical {
        /// Atomic type name (e.g. "dateTime", "dayTimeDuration")
        type_name: &'static str,
        /// The offending lexical form
        lexical: String,
    },

    /// Year-month and day-time durations mixed where one family is required
    #[error("incompatible duration types: {0} and {1}")]
    IncompatibleDurations(&'static str, &'static str),

    /// A numeric value exceeds the range of the requested representation
    #[error("numeric overflow converting {0} to {1}")]
    NumericOverflow(String, &'static str),

    /// Binary codec failure (hex or base64)
    #[error("invalid {encoding} data: {detail}")]
    InvalidBinary {
        /// "hexBinary" or "base64Binary"
        encoding: &'static str,
        detail: String,
    },
}

impl Error {
    /// Create an invalid-lexical error
    pub fn invalid_lexical(type_name: &'static str, lexical: impl Into<String>) -> Self {
        Error::InvalidLexical {
            type_name,
            lexical: lexical.into(),
        }
    }

    /// Create an invalid-binary error
    pub fn invalid_binary(encoding: &'static str, detail: impl Into<String>) -> Self {
        Error::InvalidBinary {
            encoding,
            detail: detail.into(),
        }
    }
}
