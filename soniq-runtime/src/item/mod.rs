//! The item model — the value algebra every iterator streams
//!
//! An [`Item`] is a single JSONiq value: an atomic (null, boolean, string,
//! the numeric tower, temporal types, binaries), a structured value (array,
//! object), or a function item. A *sequence* of items is always a flat list
//! (`Vec<Item>` / `Arc<Vec<Item>>`); sequences never nest and are never
//! themselves items.
//!
//! Items are immutable once constructed and cheap to clone: large payloads
//! sit behind `Arc` or `Box`.

pub mod coerce;
pub mod json;
pub mod ordering;

use crate::error::{Result, RuntimeError, SourceLocation};
use crate::functions::FunctionItem;
use bigdecimal::BigDecimal;
use soniq_core::numeric::NumericType;
use soniq_core::temporal::{Date, DateTime, DayTimeDuration, Duration, Time, YearMonthDuration};
use std::fmt;
use std::sync::Arc;

/// A single JSONiq value
#[derive(Clone, Debug)]
pub enum Item {
    Null,
    Boolean(bool),
    Integer(i64),
    /// Exact decimal; also carries integer literals beyond the machine range
    Decimal(Box<BigDecimal>),
    Double(f64),
    String(Arc<str>),
    HexBinary(Arc<[u8]>),
    Base64Binary(Arc<[u8]>),
    DateTime(Box<DateTime>),
    Date(Box<Date>),
    Time(Box<Time>),
    YearMonthDuration(Box<YearMonthDuration>),
    DayTimeDuration(Box<DayTimeDuration>),
    Duration(Box<Duration>),
    Array(Arc<[Item]>),
    Object(Arc<ObjectItem>),
    Function(Arc<FunctionItem>),
}

impl Item {
    // === constructors ===

    pub fn string(value: impl Into<Arc<str>>) -> Item {
        Item::String(value.into())
    }

    pub fn decimal(value: BigDecimal) -> Item {
        Item::Decimal(Box::new(value))
    }

    pub fn array(members: Vec<Item>) -> Item {
        Item::Array(Arc::from(members.into_boxed_slice()))
    }

    /// Build an object item; fails on a duplicate key
    pub fn object(
        pairs: Vec<(Arc<str>, Item)>,
        location: &SourceLocation,
    ) -> Result<Item> {
        let object = ObjectItem::from_pairs(pairs).map_err(|key| {
            RuntimeError::dynamic(format!("duplicate object key: \"{}\"", key), location.clone())
        })?;
        Ok(Item::Object(Arc::new(object)))
    }

    // === type predicates ===

    pub fn is_null(&self) -> bool {
        matches!(self, Item::Null)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Item::Boolean(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Item::String(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Item::Integer(_) | Item::Decimal(_) | Item::Double(_))
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Item::HexBinary(_) | Item::Base64Binary(_))
    }

    pub fn is_duration(&self) -> bool {
        matches!(
            self,
            Item::YearMonthDuration(_) | Item::DayTimeDuration(_) | Item::Duration(_)
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Item::DateTime(_) | Item::Date(_) | Item::Time(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Item::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Item::Object(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Item::Function(_))
    }

    pub fn is_atomic(&self) -> bool {
        !matches!(self, Item::Array(_) | Item::Object(_) | Item::Function(_))
    }

    // === accessors ===

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Item::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Item::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Item::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Item]> {
        match self {
            Item::Array(members) => Some(members),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectItem> {
        match self {
            Item::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Arc<FunctionItem>> {
        match self {
            Item::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Numeric type of this item within the promotion lattice, if numeric
    pub fn numeric_type(&self) -> Option<NumericType> {
        match self {
            Item::Integer(_) => Some(NumericType::Integer),
            Item::Decimal(_) => Some(NumericType::Decimal),
            Item::Double(_) => Some(NumericType::Double),
            _ => None,
        }
    }

    /// Promote a numeric item to a double
    pub fn numeric_as_f64(&self) -> Option<f64> {
        match self {
            Item::Integer(v) => Some(*v as f64),
            Item::Decimal(d) => Some(soniq_core::decimal_to_f64(d)),
            Item::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Promote a numeric item to an exact decimal; `None` for doubles and
    /// non-numerics
    pub fn numeric_as_decimal(&self) -> Option<BigDecimal> {
        match self {
            Item::Integer(v) => Some(BigDecimal::from(*v)),
            Item::Decimal(d) => Some((**d).clone()),
            _ => None,
        }
    }

    /// JSONiq dynamic type name, as used by typeswitch and the distributed
    /// type inference pass
    pub fn type_name(&self) -> &'static str {
        match self {
            Item::Null => "null",
            Item::Boolean(_) => "boolean",
            Item::Integer(_) => "integer",
            Item::Decimal(_) => "decimal",
            Item::Double(_) => "double",
            Item::String(_) => "string",
            Item::HexBinary(_) => "hexBinary",
            Item::Base64Binary(_) => "base64Binary",
            Item::DateTime(_) => "dateTime",
            Item::Date(_) => "date",
            Item::Time(_) => "time",
            Item::YearMonthDuration(_) => "yearMonthDuration",
            Item::DayTimeDuration(_) => "dayTimeDuration",
            Item::Duration(_) => "duration",
            Item::Array(_) => "array",
            Item::Object(_) => "object",
            Item::Function(_) => "function",
        }
    }

    /// String value of an atomic item (the `string()` cast)
    pub fn string_value(&self) -> Option<String> {
        match self {
            Item::Null => Some("null".to_string()),
            Item::Boolean(b) => Some(b.to_string()),
            Item::Integer(v) => Some(v.to_string()),
            Item::Decimal(d) => Some(d.normalized().to_string()),
            Item::Double(v) => Some(format_double(*v)),
            Item::String(s) => Some(s.to_string()),
            Item::HexBinary(data) => Some(soniq_core::encode_hex(data)),
            Item::Base64Binary(data) => Some(soniq_core::encode_base64(data)),
            Item::DateTime(v) => Some(v.original().to_string()),
            Item::Date(v) => Some(v.original().to_string()),
            Item::Time(v) => Some(v.original().to_string()),
            Item::YearMonthDuration(v) => Some(v.to_canonical_string()),
            Item::DayTimeDuration(v) => Some(v.to_canonical_string()),
            Item::Duration(v) => Some(v.to_canonical_string()),
            Item::Array(_) | Item::Object(_) | Item::Function(_) => None,
        }
    }
}

impl PartialEq for Item {
    /// Value equality with numeric promotion and deep structural equality;
    /// incomparable pairs and function items are unequal.
    fn eq(&self, other: &Self) -> bool {
        ordering::equals(self, other) == Some(true)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::String(s) => write!(f, "\"{}\"", s.escape_default()),
            Item::Array(members) => {
                write!(f, "[")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", m)?;
                }
                write!(f, "]")
            }
            Item::Object(object) => {
                write!(f, "{{")?;
                for (i, (k, v)) in object.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", k.escape_default(), v)?;
                }
                write!(f, "}}")
            }
            Item::Function(func) => match &func.identifier {
                Some(id) => write!(f, "function {}#{}", id.name, id.arity),
                None => write!(f, "function#{}", func.params.len()),
            },
            other => match other.string_value() {
                Some(s) => write!(f, "{}", s),
                None => write!(f, "{}", other.type_name()),
            },
        }
    }
}

/// Format a double the way JSONiq serializes it: integral values without a
/// trailing fraction, specials by name.
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Ordered string-keyed record with unique keys
#[derive(Clone, Debug)]
pub struct ObjectItem {
    keys: Vec<Arc<str>>,
    values: Vec<Item>,
}

impl ObjectItem {
    /// Build from key/value pairs in order; returns the offending key on a
    /// duplicate.
    pub fn from_pairs(pairs: Vec<(Arc<str>, Item)>) -> std::result::Result<Self, Arc<str>> {
        let mut keys = Vec::with_capacity(pairs.len());
        let mut values = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            if keys.iter().any(|k: &Arc<str>| **k == *key) {
                return Err(key);
            }
            keys.push(key);
            values.push(value);
        }
        Ok(Self { keys, values })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[Arc<str>] {
        &self.keys
    }

    pub fn values(&self) -> &[Item] {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&Item> {
        self.keys
            .iter()
            .position(|k| **k == *key)
            .map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Item)> {
        self.keys.iter().zip(self.values.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_predicates_are_total() {
        let items = vec![
            Item::Null,
            Item::Boolean(true),
            Item::Integer(1),
            Item::decimal(BigDecimal::from(1)),
            Item::Double(1.0),
            Item::string("x"),
            Item::array(vec![Item::Integer(1)]),
        ];
        for item in &items {
            // exactly one of the structural classes holds
            let classes = [item.is_atomic(), item.is_array(), item.is_object(), item.is_function()];
            assert_eq!(classes.iter().filter(|b| **b).count(), 1, "{:?}", item);
        }
    }

    #[test]
    fn test_numeric_promotion_equality() {
        assert_eq!(Item::Integer(1), Item::Double(1.0));
        assert_eq!(
            Item::Integer(2),
            Item::decimal(BigDecimal::from_str("2.000").unwrap())
        );
        assert_ne!(Item::Integer(1), Item::string("1"));
    }

    #[test]
    fn test_object_duplicate_key() {
        let pairs = vec![
            (Arc::from("a"), Item::Integer(1)),
            (Arc::from("a"), Item::Integer(2)),
        ];
        assert_eq!(ObjectItem::from_pairs(pairs).unwrap_err().as_ref(), "a");
    }

    #[test]
    fn test_object_preserves_order() {
        let pairs = vec![
            (Arc::from("b"), Item::Integer(1)),
            (Arc::from("a"), Item::Integer(2)),
        ];
        let object = ObjectItem::from_pairs(pairs).unwrap();
        let keys: Vec<&str> = object.keys().iter().map(|k| k.as_ref()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(object.get("a"), Some(&Item::Integer(2)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Item::Integer(3).to_string(), "3");
        assert_eq!(Item::Double(2.5).to_string(), "2.5");
        assert_eq!(Item::Double(2.0).to_string(), "2");
        assert_eq!(Item::string("hi").to_string(), "\"hi\"");
        assert_eq!(
            Item::array(vec![Item::Integer(1), Item::Null]).to_string(),
            "[1, null]"
        );
    }
}
