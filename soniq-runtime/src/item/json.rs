//! JSON text encoding of items
//!
//! Plain JSON values map directly; atomic types JSON cannot express ride in
//! a single-key tag object (`{"$dateTime": "2020-01-01T00:00:00Z"}`). User
//! object keys that begin with `$` are escaped with a second `$` so the tag
//! namespace never collides with data.
//!
//! Round trip holds for every non-function item: `parse(serialize(x)) == x`.
//! Function items do not serialize here; the tuple wire format handles them
//! by identifier (see the tuple module).

use super::Item;
use crate::error::{Result, RuntimeError, SourceLocation};
use bigdecimal::BigDecimal;
use serde_json::{Map, Number, Value};
use soniq_core::temporal::{Date, DateTime, DayTimeDuration, Duration, Time, YearMonthDuration};
use std::str::FromStr;
use std::sync::Arc;

const TAG_DECIMAL: &str = "$decimal";
const TAG_DOUBLE: &str = "$double";
const TAG_DATETIME: &str = "$dateTime";
const TAG_DATE: &str = "$date";
const TAG_TIME: &str = "$time";
const TAG_YM_DURATION: &str = "$yearMonthDuration";
const TAG_DT_DURATION: &str = "$dayTimeDuration";
const TAG_DURATION: &str = "$duration";
const TAG_HEX: &str = "$hexBinary";
const TAG_BASE64: &str = "$base64Binary";

/// Serialize a non-function item to JSON text
pub fn serialize_item(item: &Item) -> Result<String> {
    let value = item_to_json(item)?;
    serde_json::to_string(&value).map_err(|e| {
        RuntimeError::dynamic(format!("serialization failed: {}", e), SourceLocation::unknown())
    })
}

/// Parse an item from JSON text
pub fn parse_item(text: &str) -> Result<Item> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        RuntimeError::dynamic(format!("malformed JSON: {}", e), SourceLocation::unknown())
    })?;
    item_from_json(&value)
}

/// Encode an item as a JSON value
pub fn item_to_json(item: &Item) -> Result<Value> {
    Ok(match item {
        Item::Null => Value::Null,
        Item::Boolean(b) => Value::Bool(*b),
        Item::Integer(v) => Value::Number(Number::from(*v)),
        Item::Double(v) => match Number::from_f64(*v) {
            Some(n) => Value::Number(n),
            // NaN and infinities have no JSON number; tag them
            None => tag(TAG_DOUBLE, super::format_double(*v)),
        },
        Item::Decimal(d) => tag(TAG_DECIMAL, d.normalized().to_string()),
        Item::String(s) => Value::String(s.to_string()),
        Item::DateTime(v) => tag(TAG_DATETIME, v.original()),
        Item::Date(v) => tag(TAG_DATE, v.original()),
        Item::Time(v) => tag(TAG_TIME, v.original()),
        Item::YearMonthDuration(v) => tag(TAG_YM_DURATION, v.to_canonical_string()),
        Item::DayTimeDuration(v) => tag(TAG_DT_DURATION, v.to_canonical_string()),
        Item::Duration(v) => tag(TAG_DURATION, v.to_canonical_string()),
        Item::HexBinary(data) => tag(TAG_HEX, soniq_core::encode_hex(data)),
        Item::Base64Binary(data) => tag(TAG_BASE64, soniq_core::encode_base64(data)),
        Item::Array(members) => {
            let mut out = Vec::with_capacity(members.len());
            for m in members.iter() {
                out.push(item_to_json(m)?);
            }
            Value::Array(out)
        }
        Item::Object(object) => {
            let mut map = Map::with_capacity(object.len());
            for (key, value) in object.iter() {
                map.insert(escape_key(key), item_to_json(value)?);
            }
            Value::Object(map)
        }
        Item::Function(_) => {
            return Err(RuntimeError::invalid_argument(
                "function items cannot be serialized to JSON",
                SourceLocation::unknown(),
            ))
        }
    })
}

/// Decode an item from a JSON value
pub fn item_from_json(value: &Value) -> Result<Item> {
    Ok(match value {
        Value::Null => Item::Null,
        Value::Bool(b) => Item::Boolean(*b),
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Item::Integer(v)
            } else if let Some(v) = n.as_u64() {
                Item::decimal(BigDecimal::from(v))
            } else {
                Item::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Item::string(s.as_str()),
        Value::Array(members) => {
            let mut out = Vec::with_capacity(members.len());
            for m in members {
                out.push(item_from_json(m)?);
            }
            Item::array(out)
        }
        Value::Object(map) => {
            if let Some(item) = decode_tag(map)? {
                return Ok(item);
            }
            let mut pairs = Vec::with_capacity(map.len());
            for (key, v) in map {
                pairs.push((unescape_key(key), item_from_json(v)?));
            }
            Item::object(pairs, &SourceLocation::unknown())?
        }
    })
}

pub(crate) fn tag(name: &str, lexical: impl Into<String>) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(name.to_string(), Value::String(lexical.into()));
    Value::Object(map)
}

/// Decode a single-key tag object, if this map is one
pub(crate) fn decode_tag(map: &Map<String, Value>) -> Result<Option<Item>> {
    if map.len() != 1 {
        return Ok(None);
    }
    let (key, value) = map.iter().next().expect("len checked");
    if !key.starts_with('$') || key.starts_with("$$") {
        return Ok(None);
    }
    let Some(lexical) = value.as_str() else {
        return Err(malformed(key));
    };
    let loc = SourceLocation::unknown();
    let item = match key.as_str() {
        TAG_DECIMAL => Item::decimal(
            BigDecimal::from_str(lexical).map_err(|_| malformed(key))?,
        ),
        TAG_DOUBLE => Item::Double(match lexical {
            "NaN" => f64::NAN,
            "Infinity" => f64::INFINITY,
            "-Infinity" => f64::NEG_INFINITY,
            other => other.parse().map_err(|_| malformed(key))?,
        }),
        TAG_DATETIME => Item::DateTime(Box::new(
            DateTime::parse(lexical).map_err(|e| RuntimeError::core(e, loc.clone()))?,
        )),
        TAG_DATE => Item::Date(Box::new(
            Date::parse(lexical).map_err(|e| RuntimeError::core(e, loc.clone()))?,
        )),
        TAG_TIME => Item::Time(Box::new(
            Time::parse(lexical).map_err(|e| RuntimeError::core(e, loc.clone()))?,
        )),
        TAG_YM_DURATION => Item::YearMonthDuration(Box::new(
            YearMonthDuration::parse(lexical).map_err(|e| RuntimeError::core(e, loc.clone()))?,
        )),
        TAG_DT_DURATION => Item::DayTimeDuration(Box::new(
            DayTimeDuration::parse(lexical).map_err(|e| RuntimeError::core(e, loc.clone()))?,
        )),
        TAG_DURATION => Item::Duration(Box::new(
            Duration::parse(lexical).map_err(|e| RuntimeError::core(e, loc.clone()))?,
        )),
        TAG_HEX => Item::HexBinary(Arc::from(
            soniq_core::decode_hex(lexical)
                .map_err(|e| RuntimeError::core(e, loc.clone()))?
                .into_boxed_slice(),
        )),
        TAG_BASE64 => Item::Base64Binary(Arc::from(
            soniq_core::decode_base64(lexical)
                .map_err(|e| RuntimeError::core(e, loc.clone()))?
                .into_boxed_slice(),
        )),
        _ => return Ok(None),
    };
    Ok(Some(item))
}

fn malformed(tag: &str) -> RuntimeError {
    RuntimeError::dynamic(
        format!("malformed {} encoding", tag),
        SourceLocation::unknown(),
    )
}

pub(crate) fn escape_key(key: &str) -> String {
    if key.starts_with('$') {
        format!("${}", key)
    } else {
        key.to_string()
    }
}

pub(crate) fn unescape_key(key: &str) -> Arc<str> {
    match key.strip_prefix('$') {
        Some(rest) if rest.starts_with('$') => Arc::from(rest),
        _ => Arc::from(key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(item: &Item) {
        let text = serialize_item(item).unwrap();
        let back = parse_item(&text).unwrap();
        assert_eq!(&back, item, "round trip failed through {}", text);
        // and the dynamic type survives
        assert_eq!(back.type_name(), item.type_name());
    }

    #[test]
    fn test_round_trip_atomics() {
        round_trip(&Item::Null);
        round_trip(&Item::Boolean(false));
        round_trip(&Item::Integer(-42));
        round_trip(&Item::Double(2.5));
        round_trip(&Item::Double(f64::NEG_INFINITY));
        round_trip(&Item::decimal(BigDecimal::from_str("123.456000").unwrap()));
        round_trip(&Item::string("hello \"world\""));
        round_trip(&Item::DateTime(Box::new(
            DateTime::parse("2020-01-01T10:00:00Z").unwrap(),
        )));
        round_trip(&Item::Date(Box::new(Date::parse("2020-06-15").unwrap())));
        round_trip(&Item::Time(Box::new(Time::parse("23:59:59").unwrap())));
        round_trip(&Item::YearMonthDuration(Box::new(
            YearMonthDuration::from_months(18),
        )));
        round_trip(&Item::DayTimeDuration(Box::new(
            DayTimeDuration::from_millis(-1500),
        )));
        round_trip(&Item::Duration(Box::new(Duration::from_components(2, 500))));
        round_trip(&Item::HexBinary(Arc::from(
            vec![0xde, 0xad].into_boxed_slice(),
        )));
        round_trip(&Item::Base64Binary(Arc::from(
            vec![1, 2, 3].into_boxed_slice(),
        )));
    }

    #[test]
    fn test_round_trip_structured() {
        let object = Item::object(
            vec![
                (Arc::from("plain"), Item::Integer(1)),
                (Arc::from("$decimal"), Item::string("not a tag")),
                (
                    Arc::from("nested"),
                    Item::array(vec![Item::Null, Item::Double(0.5)]),
                ),
            ],
            &SourceLocation::unknown(),
        )
        .unwrap();
        round_trip(&object);
    }

    #[test]
    fn test_plain_json_parses() {
        let item = parse_item(r#"{"a": 1, "b": [true, null, "x"]}"#).unwrap();
        let object = item.as_object().unwrap();
        assert_eq!(object.get("a"), Some(&Item::Integer(1)));
        assert_eq!(object.get("b").unwrap().as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_integer_double_distinction_survives() {
        let i = parse_item("2").unwrap();
        let d = parse_item("2.0").unwrap();
        assert_eq!(i.type_name(), "integer");
        assert_eq!(d.type_name(), "double");
    }

}
