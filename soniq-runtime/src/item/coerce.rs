//! Sequence-to-scalar coercions

use super::Item;
use crate::error::{Result, RuntimeError, SourceLocation};

/// Effective boolean value of a sequence.
///
/// Rules: empty is false; a single boolean is itself; a single numeric is
/// true iff nonzero and non-NaN; a single string is true iff nonempty; null
/// is false; a single structured item is true. A sequence of more than one
/// item is true when it starts with a structured item and an error
/// otherwise.
pub fn effective_boolean_value(items: &[Item], location: &SourceLocation) -> Result<bool> {
    match items {
        [] => Ok(false),
        [single] => single_item_ebv(single, location),
        [first, ..] => {
            if first.is_array() || first.is_object() {
                Ok(true)
            } else {
                Err(RuntimeError::dynamic(
                    "effective boolean value of a multi-item sequence of atomics",
                    location.clone(),
                ))
            }
        }
    }
}

fn single_item_ebv(item: &Item, location: &SourceLocation) -> Result<bool> {
    match item {
        Item::Null => Ok(false),
        Item::Boolean(b) => Ok(*b),
        Item::Integer(v) => Ok(*v != 0),
        Item::Decimal(d) => Ok(!bigdecimal::Zero::is_zero(d.as_ref())),
        Item::Double(v) => Ok(*v != 0.0 && !v.is_nan()),
        Item::String(s) => Ok(!s.is_empty()),
        Item::Array(_) | Item::Object(_) => Ok(true),
        other => Err(RuntimeError::type_error(
            format!(
                "effective boolean value is not defined for {}",
                other.type_name()
            ),
            location.clone(),
        )),
    }
}

/// Require at most one item, flagging the offender by description.
pub fn at_most_one(
    items: Vec<Item>,
    what: &str,
    location: &SourceLocation,
) -> Result<Option<Item>> {
    let mut iter = items.into_iter();
    let first = iter.next();
    if iter.next().is_some() {
        return Err(RuntimeError::dynamic(
            format!("{} must not contain more than one item", what),
            location.clone(),
        ));
    }
    Ok(first)
}

/// Require exactly one item.
pub fn exactly_one(items: Vec<Item>, what: &str, location: &SourceLocation) -> Result<Item> {
    at_most_one(items, what, location)?.ok_or_else(|| {
        RuntimeError::dynamic(
            format!("{} must not be the empty sequence", what),
            location.clone(),
        )
    })
}
