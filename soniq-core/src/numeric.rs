//! Numeric tower support
//!
//! JSONiq numerics form a promotion lattice `integer ≤ decimal ≤ double`.
//! Binary operations promote both operands to the least upper bound before
//! comparing or computing.

use crate::error::{Error, Result};
use bigdecimal::BigDecimal;
use num_traits::ToPrimitive;
use std::cmp::Ordering;
use std::str::FromStr;

/// The three JSONiq numeric types, ordered by the promotion lattice
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NumericType {
    Integer,
    Decimal,
    Double,
}

impl NumericType {
    /// Least upper bound of two numeric types
    pub fn join(self, other: NumericType) -> NumericType {
        self.max(other)
    }

    /// JSONiq type name
    pub fn name(self) -> &'static str {
        match self {
            NumericType::Integer => "integer",
            NumericType::Decimal => "decimal",
            NumericType::Double => "double",
        }
    }
}

/// Result of parsing an integer literal
///
/// Literals that fit the machine integer domain stay integers; anything
/// beyond it is represented exactly as a decimal.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedInteger {
    Integer(i64),
    Decimal(BigDecimal),
}

/// Parse an integer literal lexical form.
///
/// Attempts a machine integer first; on overflow the value is represented
/// as a decimal so no precision is lost.
pub fn parse_integer_lexical(lexical: &str) -> Result<ParsedInteger> {
    if let Ok(value) = lexical.parse::<i64>() {
        return Ok(ParsedInteger::Integer(value));
    }
    let decimal = BigDecimal::from_str(lexical)
        .map_err(|_| Error::invalid_lexical("integer", lexical))?;
    if !decimal.is_integer() {
        return Err(Error::invalid_lexical("integer", lexical));
    }
    Ok(ParsedInteger::Decimal(decimal))
}

/// Convert a decimal to a double, saturating at infinity for out-of-range
/// magnitudes.
pub fn decimal_to_f64(value: &BigDecimal) -> f64 {
    value.to_f64().unwrap_or(f64::INFINITY)
}

/// Compare doubles with a total order: NaN sorts greater than every number.
pub fn compare_f64(a: f64, b: f64) -> Ordering {
    match a.partial_cmp(&b) {
        Some(ord) => ord,
        None => match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => Ordering::Equal,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_join() {
        use NumericType::*;
        assert_eq!(Integer.join(Integer), Integer);
        assert_eq!(Integer.join(Decimal), Decimal);
        assert_eq!(Decimal.join(Double), Double);
        assert_eq!(Double.join(Integer), Double);
    }

    #[test]
    fn test_integer_lexical_machine_range() {
        assert_eq!(parse_integer_lexical("42").unwrap(), ParsedInteger::Integer(42));
        assert_eq!(
            parse_integer_lexical("-9223372036854775808").unwrap(),
            ParsedInteger::Integer(i64::MIN)
        );
        // A 12-character lexical form still fits the machine domain
        assert_eq!(
            parse_integer_lexical("100000000000").unwrap(),
            ParsedInteger::Integer(100_000_000_000)
        );
    }

    #[test]
    fn test_integer_lexical_overflow_becomes_decimal() {
        let parsed = parse_integer_lexical("9223372036854775808").unwrap();
        match parsed {
            ParsedInteger::Decimal(d) => {
                assert_eq!(d, BigDecimal::from_str("9223372036854775808").unwrap())
            }
            other => panic!("expected decimal, got {:?}", other),
        }
    }

    #[test]
    fn test_integer_lexical_rejects_fractions() {
        assert!(parse_integer_lexical("1.5").is_err());
        assert!(parse_integer_lexical("abc").is_err());
    }

    #[test]
    fn test_compare_f64_nan_greatest() {
        assert_eq!(compare_f64(1.0, f64::NAN), Ordering::Less);
        assert_eq!(compare_f64(f64::NAN, f64::NAN), Ordering::Equal);
        assert_eq!(compare_f64(f64::INFINITY, f64::NAN), Ordering::Less);
    }
}
