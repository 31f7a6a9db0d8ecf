//! Ordering and equality semantics over items
//!
//! Two comparison surfaces exist:
//!
//! - [`compare_values`] / [`equals`] — the semantics of value comparisons,
//!   group-key equality, and switch matching. Numeric types compare by
//!   promoted value; null compares lowest against everything; the three
//!   duration types are distinct families; everything else is comparable
//!   only within its own type. `None` means the pair is incomparable and
//!   the caller decides whether that is an error.
//!
//! - [`compare_sort_keys`] — the ordering used by OrderBy key vectors. The
//!   duration family is collapsed through the fixed-month normalization so
//!   a column whose inferred type joined to `duration` stays orderable;
//!   binary keys are rejected outright.

use super::Item;
use crate::error::{Result, RuntimeError, SourceLocation};
use soniq_core::compare_f64;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Sort-key family of an item, after the numeric and duration joins
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortFamily {
    Null,
    Boolean,
    Numeric,
    String,
    DateTime,
    Date,
    Time,
    Duration,
    Binary,
    NonAtomic,
}

/// Classify an item into its sort-key family
pub fn sort_family(item: &Item) -> SortFamily {
    match item {
        Item::Null => SortFamily::Null,
        Item::Boolean(_) => SortFamily::Boolean,
        Item::Integer(_) | Item::Decimal(_) | Item::Double(_) => SortFamily::Numeric,
        Item::String(_) => SortFamily::String,
        Item::DateTime(_) => SortFamily::DateTime,
        Item::Date(_) => SortFamily::Date,
        Item::Time(_) => SortFamily::Time,
        Item::YearMonthDuration(_) | Item::DayTimeDuration(_) | Item::Duration(_) => {
            SortFamily::Duration
        }
        Item::HexBinary(_) | Item::Base64Binary(_) => SortFamily::Binary,
        Item::Array(_) | Item::Object(_) | Item::Function(_) => SortFamily::NonAtomic,
    }
}

/// Compare two items under value-comparison semantics.
///
/// Returns `None` when the pair is incomparable (cross-family atomics,
/// mixed duration types, binaries, functions, unequal structured items).
pub fn compare_values(a: &Item, b: &Item) -> Option<Ordering> {
    use Item::*;
    match (a, b) {
        // null compares lowest against every other value
        (Null, Null) => Some(Ordering::Equal),
        (Null, _) => Some(Ordering::Less),
        (_, Null) => Some(Ordering::Greater),

        (Boolean(x), Boolean(y)) => Some(x.cmp(y)),
        (String(x), String(y)) => Some(x.cmp(y)),

        (DateTime(x), DateTime(y)) => Some(x.cmp(y)),
        (Date(x), Date(y)) => Some(x.cmp(y)),
        (Time(x), Time(y)) => Some(x.cmp(y)),

        (YearMonthDuration(x), YearMonthDuration(y)) => Some(x.cmp(y)),
        (DayTimeDuration(x), DayTimeDuration(y)) => Some(x.cmp(y)),
        (Duration(x), Duration(y)) => Some(x.cmp(y)),

        // structured items: equality is decidable, order is not
        (Array(_), Array(_)) | (Object(_), Object(_)) => match equals(a, b) {
            Some(true) => Some(Ordering::Equal),
            _ => None,
        },

        _ => compare_numerics(a, b),
    }
}

/// Numeric comparison with promotion over the lattice
fn compare_numerics(a: &Item, b: &Item) -> Option<Ordering> {
    use Item::*;
    match (a, b) {
        (Integer(x), Integer(y)) => Some(x.cmp(y)),
        // exact comparison when both sides are decimal-capable
        (Integer(_) | Decimal(_), Integer(_) | Decimal(_)) => {
            let x = a.numeric_as_decimal()?;
            let y = b.numeric_as_decimal()?;
            Some(x.cmp(&y))
        }
        (Integer(_) | Decimal(_) | Double(_), Integer(_) | Decimal(_) | Double(_)) => {
            Some(compare_f64(a.numeric_as_f64()?, b.numeric_as_f64()?))
        }
        _ => None,
    }
}

/// Value equality; `None` when equality itself is undefined (functions).
///
/// Binary items of either kind compare by their byte content; structured
/// items compare deeply.
pub fn equals(a: &Item, b: &Item) -> Option<bool> {
    use Item::*;
    match (a, b) {
        (Function(_), _) | (_, Function(_)) => None,

        (HexBinary(x) | Base64Binary(x), HexBinary(y) | Base64Binary(y)) => Some(x == y),

        (Array(x), Array(y)) => {
            if x.len() != y.len() {
                return Some(false);
            }
            for (mx, my) in x.iter().zip(y.iter()) {
                match equals(mx, my) {
                    Some(true) => {}
                    other => return other.map(|_| false),
                }
            }
            Some(true)
        }
        (Object(x), Object(y)) => {
            if x.len() != y.len() {
                return Some(false);
            }
            for (key, vx) in x.iter() {
                let Some(vy) = y.get(key) else {
                    return Some(false);
                };
                match equals(vx, vy) {
                    Some(true) => {}
                    other => return other.map(|_| false),
                }
            }
            Some(true)
        }

        _ => match compare_values(a, b) {
            Some(ord) => Some(ord == Ordering::Equal),
            // incomparable atomics are simply unequal
            None => Some(false),
        },
    }
}

/// Compare two sort-key items, with the duration family collapsed.
///
/// Both items must be atomic, non-binary, and in the same family after the
/// numeric and duration joins; anything else is an `UnexpectedType` error.
pub fn compare_sort_keys(a: &Item, b: &Item, location: &SourceLocation) -> Result<Ordering> {
    let fa = sort_family(a);
    let fb = sort_family(b);
    if fa == SortFamily::Binary || fb == SortFamily::Binary {
        return Err(RuntimeError::unexpected_type(
            "binary values cannot be used as ordering keys",
            location.clone(),
        ));
    }
    if fa != fb {
        return Err(RuntimeError::unexpected_type(
            format!(
                "ordering keys must share one type: found {} and {}",
                a.type_name(),
                b.type_name()
            ),
            location.clone(),
        ));
    }
    match fa {
        SortFamily::Duration => Ok(duration_millis(a).cmp(&duration_millis(b))),
        _ => compare_values(a, b).ok_or_else(|| {
            RuntimeError::unexpected_type(
                format!(
                    "ordering keys must share one type: found {} and {}",
                    a.type_name(),
                    b.type_name()
                ),
                location.clone(),
            )
        }),
    }
}

/// Reduce any duration item to the fixed-month millisecond normalization
fn duration_millis(item: &Item) -> i64 {
    match item {
        Item::YearMonthDuration(d) => d.normalized_millis(),
        Item::DayTimeDuration(d) => d.normalized_millis(),
        Item::Duration(d) => d.normalized_millis(),
        _ => 0,
    }
}

/// Hash an item consistently with [`equals`]: values that compare equal
/// hash identically, across numeric representations.
pub fn hash_item<H: Hasher>(item: &Item, state: &mut H) {
    match item {
        Item::Null => state.write_u8(0),
        Item::Boolean(b) => {
            state.write_u8(1);
            b.hash(state);
        }
        Item::Integer(_) | Item::Decimal(_) | Item::Double(_) => {
            hash_numeric(item, state);
        }
        Item::String(s) => {
            state.write_u8(4);
            s.hash(state);
        }
        Item::HexBinary(data) | Item::Base64Binary(data) => {
            state.write_u8(5);
            data.hash(state);
        }
        Item::DateTime(v) => {
            state.write_u8(6);
            v.epoch_millis().hash(state);
        }
        Item::Date(v) => {
            state.write_u8(7);
            v.epoch_millis().hash(state);
        }
        Item::Time(v) => {
            state.write_u8(8);
            v.millis_of_day().hash(state);
        }
        Item::YearMonthDuration(v) => {
            state.write_u8(9);
            v.months().hash(state);
        }
        Item::DayTimeDuration(v) => {
            state.write_u8(10);
            v.millis().hash(state);
        }
        Item::Duration(v) => {
            state.write_u8(11);
            v.months().hash(state);
            v.millis().hash(state);
        }
        Item::Array(members) => {
            state.write_u8(12);
            for m in members.iter() {
                hash_item(m, state);
            }
        }
        Item::Object(object) => {
            state.write_u8(13);
            for (k, v) in object.iter() {
                k.hash(state);
                hash_item(v, state);
            }
        }
        Item::Function(f) => {
            // function items are never equal by value; identity hash
            state.write_u8(14);
            (Arc::as_ptr(f) as usize).hash(state);
        }
    }
}

/// Canonical numeric hash: an exact machine integer when the value has one,
/// the promoted double's bits otherwise.
fn hash_numeric<H: Hasher>(item: &Item, state: &mut H) {
    let exact = match item {
        Item::Integer(v) => Some(*v),
        Item::Decimal(d) => {
            use num_traits::ToPrimitive;
            if d.is_integer() {
                d.to_i64()
            } else {
                None
            }
        }
        Item::Double(v) => {
            if v.is_finite() && v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64 {
                Some(*v as i64)
            } else {
                None
            }
        }
        _ => None,
    };
    match exact {
        Some(v) => {
            state.write_u8(2);
            v.hash(state);
        }
        None => {
            state.write_u8(3);
            item.numeric_as_f64().unwrap_or(f64::NAN).to_bits().hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use soniq_core::temporal::{DayTimeDuration, YearMonthDuration};
    use std::collections::hash_map::DefaultHasher;
    use std::str::FromStr;

    fn hash_of(item: &Item) -> u64 {
        let mut h = DefaultHasher::new();
        hash_item(item, &mut h);
        h.finish()
    }

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(
            compare_values(&Item::Integer(3), &Item::Double(3.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(
                &Item::decimal(BigDecimal::from_str("2.5").unwrap()),
                &Item::Double(2.5)
            ),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_null_sorts_lowest() {
        assert_eq!(
            compare_values(&Item::Null, &Item::Integer(-100)),
            Some(Ordering::Less)
        );
        assert_eq!(compare_values(&Item::Null, &Item::Null), Some(Ordering::Equal));
    }

    #[test]
    fn test_cross_family_incomparable() {
        assert_eq!(compare_values(&Item::Integer(1), &Item::string("a")), None);
        assert_eq!(
            compare_values(
                &Item::YearMonthDuration(Box::new(YearMonthDuration::from_months(1))),
                &Item::DayTimeDuration(Box::new(DayTimeDuration::from_millis(1)))
            ),
            None
        );
    }

    #[test]
    fn test_sort_keys_join_durations() {
        let ym = Item::YearMonthDuration(Box::new(YearMonthDuration::from_months(1)));
        let dt = Item::DayTimeDuration(Box::new(DayTimeDuration::from_millis(86_400_000)));
        // one month (30 days) sorts after one day
        assert_eq!(
            compare_sort_keys(&ym, &dt, &SourceLocation::unknown()).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_sort_keys_reject_binary_and_cross_family() {
        let bin = Item::HexBinary(Arc::from(vec![1u8].into_boxed_slice()));
        assert!(compare_sort_keys(&bin, &bin, &SourceLocation::unknown()).is_err());
        assert!(
            compare_sort_keys(&Item::Integer(1), &Item::string("a"), &SourceLocation::unknown())
                .is_err()
        );
    }

    #[test]
    fn test_equal_numerics_hash_identically() {
        let a = Item::Integer(7);
        let b = Item::Double(7.0);
        let c = Item::decimal(BigDecimal::from_str("7.00").unwrap());
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&a), hash_of(&c));
    }

    #[test]
    fn test_deep_equality() {
        let a = Item::array(vec![Item::Integer(1), Item::string("x")]);
        let b = Item::array(vec![Item::Double(1.0), Item::string("x")]);
        assert_eq!(equals(&a, &b), Some(true));
        let c = Item::array(vec![Item::Integer(2), Item::string("x")]);
        assert_eq!(equals(&a, &c), Some(false));
    }
}
