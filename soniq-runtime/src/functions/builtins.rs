//! Built-in function library
//!
//! One representative slice of the standard library per family. Builtins
//! are registered statically by `(name, arity)`; variadic functions
//! (`concat`) appear as multiple fixed-arity entries.

use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::functions::FunctionIdentifier;
use crate::item::coerce::{at_most_one, effective_boolean_value};
use crate::item::ordering::compare_values;
use crate::item::Item;
use crate::iterator::{materialize, BoxedIterator, RuntimeIterator};
use bigdecimal::BigDecimal;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use soniq_core::NumericType;
use std::cmp::Ordering;
use std::sync::Arc;

/// Maximum arity registered for variadic `concat`
const CONCAT_MAX_ARITY: usize = 8;

/// Every builtin the registry knows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Empty,
    Exists,
    Head,
    Tail,
    LowerCase,
    UpperCase,
    StringLength,
    Concat,
    Substring,
    Keys,
    Values,
    Size,
    Not,
    Boolean,
    String,
}

static BUILTIN_TABLE: Lazy<FxHashMap<FunctionIdentifier, BuiltinKind>> = Lazy::new(|| {
    let mut table = FxHashMap::default();
    let mut register = |name: &str, arity: usize, kind: BuiltinKind| {
        table.insert(FunctionIdentifier::new(name, arity), kind);
    };
    register("count", 1, BuiltinKind::Count);
    register("sum", 1, BuiltinKind::Sum);
    register("min", 1, BuiltinKind::Min);
    register("max", 1, BuiltinKind::Max);
    register("avg", 1, BuiltinKind::Avg);
    register("empty", 1, BuiltinKind::Empty);
    register("exists", 1, BuiltinKind::Exists);
    register("head", 1, BuiltinKind::Head);
    register("tail", 1, BuiltinKind::Tail);
    register("lower-case", 1, BuiltinKind::LowerCase);
    register("upper-case", 1, BuiltinKind::UpperCase);
    register("string-length", 1, BuiltinKind::StringLength);
    for arity in 2..=CONCAT_MAX_ARITY {
        register("concat", arity, BuiltinKind::Concat);
    }
    register("substring", 2, BuiltinKind::Substring);
    register("substring", 3, BuiltinKind::Substring);
    register("keys", 1, BuiltinKind::Keys);
    register("values", 1, BuiltinKind::Values);
    register("size", 1, BuiltinKind::Size);
    register("not", 1, BuiltinKind::Not);
    register("boolean", 1, BuiltinKind::Boolean);
    register("string", 1, BuiltinKind::String);
    table
});

impl BuiltinKind {
    /// Arity-exact lookup
    pub fn lookup(name: &str, arity: usize) -> Option<BuiltinKind> {
        BUILTIN_TABLE
            .get(&FunctionIdentifier::new(name, arity))
            .copied()
    }
}

/// Evaluate a builtin over its argument iterators.
///
/// Arguments are materialized here; the calling iterator buffers the
/// result. `count` over a distributed subtree counts without collecting.
pub fn compute(
    kind: BuiltinKind,
    args: &mut [BoxedIterator],
    ctx: &Arc<DynamicContext>,
    location: &SourceLocation,
) -> Result<Vec<Item>> {
    match kind {
        BuiltinKind::Count => {
            if args[0].is_rdd() {
                let n = args[0].rdd(ctx)?.count() as i64;
                return Ok(vec![Item::Integer(n)]);
            }
            let items = materialize(args[0].as_mut(), ctx)?;
            Ok(vec![Item::Integer(items.len() as i64)])
        }
        BuiltinKind::Sum => sum(materialize(args[0].as_mut(), ctx)?, location),
        BuiltinKind::Min => extremum(materialize(args[0].as_mut(), ctx)?, Ordering::Less, location),
        BuiltinKind::Max => {
            extremum(materialize(args[0].as_mut(), ctx)?, Ordering::Greater, location)
        }
        BuiltinKind::Avg => avg(materialize(args[0].as_mut(), ctx)?, location),
        BuiltinKind::Empty => {
            let items = materialize(args[0].as_mut(), ctx)?;
            Ok(vec![Item::Boolean(items.is_empty())])
        }
        BuiltinKind::Exists => {
            let items = materialize(args[0].as_mut(), ctx)?;
            Ok(vec![Item::Boolean(!items.is_empty())])
        }
        BuiltinKind::Head => {
            let items = materialize(args[0].as_mut(), ctx)?;
            Ok(items.into_iter().take(1).collect())
        }
        BuiltinKind::Tail => {
            let items = materialize(args[0].as_mut(), ctx)?;
            Ok(items.into_iter().skip(1).collect())
        }
        BuiltinKind::LowerCase => case_shift(args, ctx, location, str::to_lowercase),
        BuiltinKind::UpperCase => case_shift(args, ctx, location, str::to_uppercase),
        BuiltinKind::StringLength => {
            let arg = single_optional_string(args, ctx, location, "string-length")?;
            let length = arg.map(|s| s.chars().count()).unwrap_or(0);
            Ok(vec![Item::Integer(length as i64)])
        }
        BuiltinKind::Concat => {
            let mut out = String::new();
            for arg in args.iter_mut() {
                let items = materialize(arg.as_mut(), ctx)?;
                if let Some(item) = at_most_one(items, "argument of concat", location)? {
                    out.push_str(&atomic_string(&item, "concat", location)?);
                }
            }
            Ok(vec![Item::string(out)])
        }
        BuiltinKind::Substring => substring(args, ctx, location),
        BuiltinKind::Keys => {
            let items = materialize(args[0].as_mut(), ctx)?;
            let mut out = Vec::new();
            for item in &items {
                match item {
                    Item::Object(object) => {
                        out.extend(object.keys().iter().map(|k| Item::String(k.clone())));
                    }
                    Item::Array(members) => {
                        out.extend((1..=members.len()).map(|i| Item::Integer(i as i64)));
                    }
                    _ => {}
                }
            }
            Ok(out)
        }
        BuiltinKind::Values => {
            let items = materialize(args[0].as_mut(), ctx)?;
            let mut out = Vec::new();
            for item in &items {
                match item {
                    Item::Object(object) => out.extend(object.values().iter().cloned()),
                    Item::Array(members) => out.extend(members.iter().cloned()),
                    _ => {}
                }
            }
            Ok(out)
        }
        BuiltinKind::Size => {
            let items = materialize(args[0].as_mut(), ctx)?;
            match at_most_one(items, "argument of size", location)? {
                None => Ok(vec![]),
                Some(Item::Array(members)) => Ok(vec![Item::Integer(members.len() as i64)]),
                Some(other) => Err(RuntimeError::type_error(
                    format!("size expects an array, not {}", other.type_name()),
                    location.clone(),
                )),
            }
        }
        BuiltinKind::Not => {
            let items = materialize(args[0].as_mut(), ctx)?;
            Ok(vec![Item::Boolean(!effective_boolean_value(
                &items, location,
            )?)])
        }
        BuiltinKind::Boolean => {
            let items = materialize(args[0].as_mut(), ctx)?;
            Ok(vec![Item::Boolean(effective_boolean_value(
                &items, location,
            )?)])
        }
        BuiltinKind::String => {
            let items = materialize(args[0].as_mut(), ctx)?;
            match at_most_one(items, "argument of string", location)? {
                None => Ok(vec![Item::string("")]),
                Some(item) => Ok(vec![Item::string(atomic_string(
                    &item, "string", location,
                )?)]),
            }
        }
    }
}

/// `lower-case` / `upper-case`: the empty sequence maps to the empty string.
fn case_shift(
    args: &mut [BoxedIterator],
    ctx: &Arc<DynamicContext>,
    location: &SourceLocation,
    shift: fn(&str) -> String,
) -> Result<Vec<Item>> {
    let name = "case function";
    match single_optional_string(args, ctx, location, name)? {
        None => Ok(vec![Item::string("")]),
        Some(s) => Ok(vec![Item::string(shift(&s))]),
    }
}

fn single_optional_string(
    args: &mut [BoxedIterator],
    ctx: &Arc<DynamicContext>,
    location: &SourceLocation,
    what: &str,
) -> Result<Option<String>> {
    let items = materialize(args[0].as_mut(), ctx)?;
    match at_most_one(items, what, location)? {
        None => Ok(None),
        Some(Item::String(s)) => Ok(Some(s.to_string())),
        Some(other) => Err(RuntimeError::type_error(
            format!("{} expects a string, not {}", what, other.type_name()),
            location.clone(),
        )),
    }
}

fn atomic_string(item: &Item, what: &str, location: &SourceLocation) -> Result<String> {
    item.string_value().ok_or_else(|| {
        RuntimeError::type_error(
            format!("{} expects an atomic, not {}", what, item.type_name()),
            location.clone(),
        )
    })
}

fn numeric_f64(item: &Item, what: &str, location: &SourceLocation) -> Result<f64> {
    item.numeric_as_f64().ok_or_else(|| {
        RuntimeError::type_error(
            format!("{} expects a numeric, not {}", what, item.type_name()),
            location.clone(),
        )
    })
}

fn substring(
    args: &mut [BoxedIterator],
    ctx: &Arc<DynamicContext>,
    location: &SourceLocation,
) -> Result<Vec<Item>> {
    let Some(source) = single_optional_string(args, ctx, location, "substring")? else {
        return Ok(vec![Item::string("")]);
    };
    let (start_args, len_args) = args.split_at_mut(2);
    let start_items = materialize(start_args[1].as_mut(), ctx)?;
    let start_item = crate::item::coerce::exactly_one(start_items, "substring start", location)?;
    let start = numeric_f64(&start_item, "substring start", location)?.round();

    let end = if let Some(len_iter) = len_args.first_mut() {
        let len_items = materialize(len_iter.as_mut(), ctx)?;
        let len_item = crate::item::coerce::exactly_one(len_items, "substring length", location)?;
        start + numeric_f64(&len_item, "substring length", location)?.round()
    } else {
        f64::INFINITY
    };

    let out: String = source
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let position = (*i + 1) as f64;
            position >= start && position < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(vec![Item::string(out)])
}

/// Numeric sum with promotion; the empty sequence sums to integer zero.
fn sum(items: Vec<Item>, location: &SourceLocation) -> Result<Vec<Item>> {
    if items.is_empty() {
        return Ok(vec![Item::Integer(0)]);
    }
    let target = promoted_type(&items, "sum", location)?;
    match target {
        NumericType::Double => {
            let mut acc = 0.0;
            for item in &items {
                acc += numeric_f64(item, "sum", location)?;
            }
            Ok(vec![Item::Double(acc)])
        }
        NumericType::Decimal => {
            let mut acc = BigDecimal::from(0);
            for item in &items {
                acc += item.numeric_as_decimal().ok_or_else(|| {
                    RuntimeError::type_error("sum expects numerics", location.clone())
                })?;
            }
            Ok(vec![Item::decimal(acc)])
        }
        NumericType::Integer => {
            let mut acc: i64 = 0;
            for item in &items {
                let v = item.as_integer().ok_or_else(|| {
                    RuntimeError::type_error("sum expects numerics", location.clone())
                })?;
                acc = acc.checked_add(v).ok_or_else(|| {
                    RuntimeError::dynamic("integer overflow in sum", location.clone())
                })?;
            }
            Ok(vec![Item::Integer(acc)])
        }
    }
}

fn avg(items: Vec<Item>, location: &SourceLocation) -> Result<Vec<Item>> {
    if items.is_empty() {
        return Ok(vec![]);
    }
    let count = items.len();
    let target = promoted_type(&items, "avg", location)?;
    match target {
        NumericType::Double => {
            let mut acc = 0.0;
            for item in &items {
                acc += numeric_f64(item, "avg", location)?;
            }
            Ok(vec![Item::Double(acc / count as f64)])
        }
        _ => {
            let mut acc = BigDecimal::from(0);
            for item in &items {
                acc += item.numeric_as_decimal().ok_or_else(|| {
                    RuntimeError::type_error("avg expects numerics", location.clone())
                })?;
            }
            Ok(vec![Item::decimal(acc / BigDecimal::from(count as i64))])
        }
    }
}

fn promoted_type(
    items: &[Item],
    what: &str,
    location: &SourceLocation,
) -> Result<NumericType> {
    let mut target = NumericType::Integer;
    for item in items {
        let t = item.numeric_type().ok_or_else(|| {
            RuntimeError::type_error(
                format!("{} expects numerics, found {}", what, item.type_name()),
                location.clone(),
            )
        })?;
        target = target.join(t);
    }
    Ok(target)
}

/// Shared min/max: keep the item winning `direction` under value comparison.
fn extremum(
    items: Vec<Item>,
    direction: Ordering,
    location: &SourceLocation,
) -> Result<Vec<Item>> {
    let mut best: Option<Item> = None;
    for item in items {
        match &best {
            None => best = Some(item),
            Some(current) => {
                let ord = compare_values(&item, current).ok_or_else(|| {
                    RuntimeError::unexpected_type(
                        format!(
                            "cannot compare {} with {}",
                            item.type_name(),
                            current.type_name()
                        ),
                        location.clone(),
                    )
                })?;
                if ord == direction {
                    best = Some(item);
                }
            }
        }
    }
    Ok(best.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_arity_exact() {
        assert_eq!(BuiltinKind::lookup("count", 1), Some(BuiltinKind::Count));
        assert_eq!(BuiltinKind::lookup("count", 2), None);
        assert_eq!(BuiltinKind::lookup("concat", 2), Some(BuiltinKind::Concat));
        assert_eq!(BuiltinKind::lookup("concat", 5), Some(BuiltinKind::Concat));
        assert_eq!(BuiltinKind::lookup("concat", 1), None);
    }

    #[test]
    fn test_sum_promotes() {
        let loc = SourceLocation::unknown();
        let out = sum(vec![Item::Integer(1), Item::Integer(2)], &loc).unwrap();
        assert_eq!(out, vec![Item::Integer(3)]);

        let out = sum(vec![Item::Integer(1), Item::Double(0.5)], &loc).unwrap();
        assert_eq!(out, vec![Item::Double(1.5)]);

        let out = sum(vec![], &loc).unwrap();
        assert_eq!(out, vec![Item::Integer(0)]);
    }

    #[test]
    fn test_sum_rejects_non_numeric() {
        assert!(sum(
            vec![Item::Integer(1), Item::string("x")],
            &SourceLocation::unknown()
        )
        .is_err());
    }

    #[test]
    fn test_extremum() {
        let loc = SourceLocation::unknown();
        let out = extremum(
            vec![Item::Integer(3), Item::Integer(1), Item::Integer(2)],
            Ordering::Less,
            &loc,
        )
        .unwrap();
        assert_eq!(out, vec![Item::Integer(1)]);

        let out = extremum(vec![], Ordering::Greater, &loc).unwrap();
        assert!(out.is_empty());

        assert!(extremum(
            vec![Item::Integer(1), Item::string("a")],
            Ordering::Less,
            &loc
        )
        .is_err());
    }

    #[test]
    fn test_avg() {
        let loc = SourceLocation::unknown();
        let out = avg(vec![Item::Integer(1), Item::Integer(2)], &loc).unwrap();
        match &out[0] {
            Item::Decimal(d) => assert_eq!(d.as_ref(), &(BigDecimal::from(3) / BigDecimal::from(2))),
            other => panic!("expected decimal, got {:?}", other),
        }
    }
}
