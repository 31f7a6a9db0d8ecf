//! # soniq-core
//!
//! Leaf value machinery for the soniq JSONiq engine.
//!
//! This crate provides:
//! - Temporal atomic types (dateTime, date, time, the three durations)
//! - The numeric promotion lattice (integer ≤ decimal ≤ double)
//! - Binary codecs (hexBinary, base64Binary)
//! - The core error type wrapped by the runtime's error taxonomy

pub mod binary;
pub mod error;
pub mod numeric;
pub mod temporal;

pub use binary::{decode_base64, decode_hex, encode_base64, encode_hex};
pub use error::{Error, Result};
pub use numeric::{compare_f64, decimal_to_f64, parse_integer_lexical, NumericType, ParsedInteger};
pub use temporal::{
    Date, DateTime, DayTimeDuration, Duration, Time, YearMonthDuration, MILLIS_PER_MONTH,
};
