//! Arithmetic expressions
//!
//! Operands materialize to at most one atomic each; an empty operand makes
//! the result empty. Numeric pairs promote over the lattice; date/time and
//! duration combinations follow the JSONiq rules (dateTime − dateTime is a
//! dayTimeDuration, dateTime ± duration shifts, durations add within their
//! family and scale by numerics).

use crate::ast::ArithmeticOp;
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::item::coerce::at_most_one;
use crate::item::Item;
use crate::iterator::{materialize, BoxedIterator, IteratorCore, LocalStep};
use bigdecimal::BigDecimal;
use num_traits::ToPrimitive;
use soniq_core::NumericType;
use std::sync::Arc;

pub struct ArithmeticIterator {
    core: IteratorCore,
    op: ArithmeticOp,
    lhs: BoxedIterator,
    rhs: BoxedIterator,
    result: Option<Item>,
}

impl ArithmeticIterator {
    pub fn new(
        op: ArithmeticOp,
        lhs: BoxedIterator,
        rhs: BoxedIterator,
        metadata: SourceLocation,
    ) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            op,
            lhs,
            rhs,
            result: None,
        }
    }
}

impl LocalStep for ArithmeticIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let lhs = at_most_one(
            materialize(self.lhs.as_mut(), ctx)?,
            "left operand",
            &location,
        )?;
        let rhs = at_most_one(
            materialize(self.rhs.as_mut(), ctx)?,
            "right operand",
            &location,
        )?;
        self.result = match (lhs, rhs) {
            (Some(l), Some(r)) => Some(apply(self.op, &l, &r, &location)?),
            _ => None,
        };
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        Ok(self.result.take())
    }

    fn release(&mut self) {
        self.result = None;
    }
}

/// Unary minus over a numeric singleton
pub struct UnaryMinusIterator {
    core: IteratorCore,
    operand: BoxedIterator,
    result: Option<Item>,
}

impl UnaryMinusIterator {
    pub fn new(operand: BoxedIterator, metadata: SourceLocation) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            operand,
            result: None,
        }
    }
}

impl LocalStep for UnaryMinusIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let operand = at_most_one(
            materialize(self.operand.as_mut(), ctx)?,
            "operand of unary minus",
            &location,
        )?;
        self.result = match operand {
            None => None,
            Some(Item::Integer(v)) => Some(Item::Integer(v.checked_neg().ok_or_else(|| {
                RuntimeError::dynamic("integer overflow in negation", location.clone())
            })?)),
            Some(Item::Decimal(d)) => Some(Item::decimal(-d.as_ref().clone())),
            Some(Item::Double(v)) => Some(Item::Double(-v)),
            Some(other) => {
                return Err(RuntimeError::type_error(
                    format!("unary minus is not defined for {}", other.type_name()),
                    location,
                ))
            }
        };
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        Ok(self.result.take())
    }

    fn release(&mut self) {
        self.result = None;
    }
}

fn apply(op: ArithmeticOp, l: &Item, r: &Item, location: &SourceLocation) -> Result<Item> {
    if l.is_numeric() && r.is_numeric() {
        return numeric(op, l, r, location);
    }
    temporal(op, l, r, location)
}

fn numeric(op: ArithmeticOp, l: &Item, r: &Item, location: &SourceLocation) -> Result<Item> {
    let target = l
        .numeric_type()
        .unwrap_or(NumericType::Integer)
        .join(r.numeric_type().unwrap_or(NumericType::Integer));

    // div always leaves the integer domain; idiv always returns to it
    match op {
        ArithmeticOp::Divide if target != NumericType::Double => {
            let ld = decimal_of(l, location)?;
            let rd = decimal_of(r, location)?;
            if is_zero(&rd) {
                return Err(RuntimeError::dynamic("division by zero", location.clone()));
            }
            return Ok(Item::decimal(ld / rd));
        }
        ArithmeticOp::IntegerDivide => return integer_divide(l, r, target, location),
        _ => {}
    }

    match target {
        NumericType::Integer => {
            let (a, b) = (expect_i64(l, location)?, expect_i64(r, location)?);
            let out = match op {
                ArithmeticOp::Add => a.checked_add(b),
                ArithmeticOp::Subtract => a.checked_sub(b),
                ArithmeticOp::Multiply => a.checked_mul(b),
                ArithmeticOp::Modulo => {
                    if b == 0 {
                        return Err(RuntimeError::dynamic("division by zero", location.clone()));
                    }
                    a.checked_rem(b)
                }
                ArithmeticOp::Divide | ArithmeticOp::IntegerDivide => unreachable!(),
            };
            out.map(Item::Integer).ok_or_else(|| {
                RuntimeError::dynamic("integer overflow", location.clone())
            })
        }
        NumericType::Decimal => {
            let (a, b) = (decimal_of(l, location)?, decimal_of(r, location)?);
            let out = match op {
                ArithmeticOp::Add => a + b,
                ArithmeticOp::Subtract => a - b,
                ArithmeticOp::Multiply => a * b,
                ArithmeticOp::Modulo => {
                    if is_zero(&b) {
                        return Err(RuntimeError::dynamic("division by zero", location.clone()));
                    }
                    a % b
                }
                ArithmeticOp::Divide | ArithmeticOp::IntegerDivide => unreachable!(),
            };
            Ok(Item::decimal(out))
        }
        NumericType::Double => {
            let (a, b) = (expect_f64(l, location)?, expect_f64(r, location)?);
            let out = match op {
                ArithmeticOp::Add => a + b,
                ArithmeticOp::Subtract => a - b,
                ArithmeticOp::Multiply => a * b,
                // IEEE semantics: infinities and NaN, no error
                ArithmeticOp::Divide => a / b,
                ArithmeticOp::Modulo => a % b,
                ArithmeticOp::IntegerDivide => unreachable!(),
            };
            Ok(Item::Double(out))
        }
    }
}

fn integer_divide(
    l: &Item,
    r: &Item,
    target: NumericType,
    location: &SourceLocation,
) -> Result<Item> {
    match target {
        NumericType::Integer => {
            let (a, b) = (expect_i64(l, location)?, expect_i64(r, location)?);
            if b == 0 {
                return Err(RuntimeError::dynamic("division by zero", location.clone()));
            }
            a.checked_div(b).map(Item::Integer).ok_or_else(|| {
                RuntimeError::dynamic("integer overflow", location.clone())
            })
        }
        NumericType::Decimal => {
            let (a, b) = (decimal_of(l, location)?, decimal_of(r, location)?);
            if is_zero(&b) {
                return Err(RuntimeError::dynamic("division by zero", location.clone()));
            }
            let quotient = (a / b).with_scale(0);
            quotient.to_i64().map(Item::Integer).ok_or_else(|| {
                RuntimeError::dynamic("integer overflow", location.clone())
            })
        }
        NumericType::Double => {
            let (a, b) = (expect_f64(l, location)?, expect_f64(r, location)?);
            if b == 0.0 {
                return Err(RuntimeError::dynamic("division by zero", location.clone()));
            }
            let quotient = (a / b).trunc();
            if !quotient.is_finite() {
                return Err(RuntimeError::dynamic(
                    "integer division is undefined for non-finite operands",
                    location.clone(),
                ));
            }
            Ok(Item::Integer(quotient as i64))
        }
    }
}

fn temporal(op: ArithmeticOp, l: &Item, r: &Item, location: &SourceLocation) -> Result<Item> {
    use ArithmeticOp::*;
    use Item::*;
    match (l, op, r) {
        // instants
        (DateTime(a), Subtract, DateTime(b)) => {
            Ok(DayTimeDuration(Box::new(a.since(b))))
        }
        (Date(a), Subtract, Date(b)) => Ok(DayTimeDuration(Box::new(
            soniq_core::DayTimeDuration::from_millis(a.epoch_millis() - b.epoch_millis()),
        ))),
        (DateTime(a), Add, DayTimeDuration(d)) => Ok(DateTime(Box::new(a.plus_day_time(d)))),
        (DateTime(a), Subtract, DayTimeDuration(d)) => Ok(DateTime(Box::new(
            a.plus_day_time(&soniq_core::DayTimeDuration::from_millis(-d.millis())),
        ))),
        (DateTime(a), Add, YearMonthDuration(d)) => Ok(DateTime(Box::new(a.plus_months(d.months())))),
        (DateTime(a), Subtract, YearMonthDuration(d)) => {
            Ok(DateTime(Box::new(a.plus_months(-d.months()))))
        }
        (Date(a), Add, DayTimeDuration(d)) => Ok(Date(Box::new(a.plus_day_time(d)))),
        (Date(a), Subtract, DayTimeDuration(d)) => Ok(Date(Box::new(
            a.plus_day_time(&soniq_core::DayTimeDuration::from_millis(-d.millis())),
        ))),
        (Date(a), Add, YearMonthDuration(d)) => Ok(Date(Box::new(a.plus_months(d.months())))),
        (Date(a), Subtract, YearMonthDuration(d)) => {
            Ok(Date(Box::new(a.plus_months(-d.months()))))
        }

        // durations within one family
        (DayTimeDuration(a), Add, DayTimeDuration(b)) => Ok(DayTimeDuration(Box::new(
            soniq_core::DayTimeDuration::from_millis(a.millis() + b.millis()),
        ))),
        (DayTimeDuration(a), Subtract, DayTimeDuration(b)) => Ok(DayTimeDuration(Box::new(
            soniq_core::DayTimeDuration::from_millis(a.millis() - b.millis()),
        ))),
        (YearMonthDuration(a), Add, YearMonthDuration(b)) => Ok(YearMonthDuration(Box::new(
            soniq_core::YearMonthDuration::from_months(a.months() + b.months()),
        ))),
        (YearMonthDuration(a), Subtract, YearMonthDuration(b)) => Ok(YearMonthDuration(Box::new(
            soniq_core::YearMonthDuration::from_months(a.months() - b.months()),
        ))),

        // duration scaling
        (DayTimeDuration(d), Multiply, n) | (n, Multiply, DayTimeDuration(d))
            if n.is_numeric() =>
        {
            let factor = expect_f64(n, location)?;
            Ok(DayTimeDuration(Box::new(
                soniq_core::DayTimeDuration::from_millis(scale(d.millis(), factor, location)?),
            )))
        }
        (YearMonthDuration(d), Multiply, n) | (n, Multiply, YearMonthDuration(d))
            if n.is_numeric() =>
        {
            let factor = expect_f64(n, location)?;
            Ok(YearMonthDuration(Box::new(
                soniq_core::YearMonthDuration::from_months(scale(d.months(), factor, location)?),
            )))
        }
        (DayTimeDuration(d), Divide, n) if n.is_numeric() => {
            let divisor = expect_f64(n, location)?;
            if divisor == 0.0 {
                return Err(RuntimeError::dynamic("division by zero", location.clone()));
            }
            Ok(DayTimeDuration(Box::new(
                soniq_core::DayTimeDuration::from_millis(scale(
                    d.millis(),
                    1.0 / divisor,
                    location,
                )?),
            )))
        }
        (YearMonthDuration(d), Divide, n) if n.is_numeric() => {
            let divisor = expect_f64(n, location)?;
            if divisor == 0.0 {
                return Err(RuntimeError::dynamic("division by zero", location.clone()));
            }
            Ok(YearMonthDuration(Box::new(
                soniq_core::YearMonthDuration::from_months(scale(
                    d.months(),
                    1.0 / divisor,
                    location,
                )?),
            )))
        }

        _ => Err(RuntimeError::type_error(
            format!(
                "operator {} is not defined for {} and {}",
                op.symbol(),
                l.type_name(),
                r.type_name()
            ),
            location.clone(),
        )),
    }
}

fn scale(magnitude: i64, factor: f64, location: &SourceLocation) -> Result<i64> {
    let scaled = magnitude as f64 * factor;
    if !scaled.is_finite() {
        return Err(RuntimeError::dynamic(
            "duration scaling is undefined for non-finite factors",
            location.clone(),
        ));
    }
    Ok(scaled.round() as i64)
}

fn expect_i64(item: &Item, location: &SourceLocation) -> Result<i64> {
    item.as_integer().ok_or_else(|| {
        RuntimeError::type_error(
            format!("expected an integer, found {}", item.type_name()),
            location.clone(),
        )
    })
}

fn expect_f64(item: &Item, location: &SourceLocation) -> Result<f64> {
    item.numeric_as_f64().ok_or_else(|| {
        RuntimeError::type_error(
            format!("expected a numeric, found {}", item.type_name()),
            location.clone(),
        )
    })
}

fn decimal_of(item: &Item, location: &SourceLocation) -> Result<BigDecimal> {
    item.numeric_as_decimal().ok_or_else(|| {
        RuntimeError::type_error(
            format!("expected an exact numeric, found {}", item.type_name()),
            location.clone(),
        )
    })
}

fn is_zero(d: &BigDecimal) -> bool {
    bigdecimal::Zero::is_zero(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use soniq_core::temporal::DateTime as CoreDateTime;
    use std::str::FromStr;

    fn loc() -> SourceLocation {
        SourceLocation::unknown()
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(
            apply(ArithmeticOp::Add, &Item::Integer(2), &Item::Integer(3), &loc()).unwrap(),
            Item::Integer(5)
        );
        assert_eq!(
            apply(ArithmeticOp::Modulo, &Item::Integer(5), &Item::Integer(2), &loc()).unwrap(),
            Item::Integer(1)
        );
        assert!(apply(
            ArithmeticOp::Add,
            &Item::Integer(i64::MAX),
            &Item::Integer(1),
            &loc()
        )
        .is_err());
    }

    #[test]
    fn test_div_leaves_integer_domain() {
        let out = apply(ArithmeticOp::Divide, &Item::Integer(1), &Item::Integer(2), &loc()).unwrap();
        assert_eq!(out, Item::decimal(BigDecimal::from_str("0.5").unwrap()));

        let out =
            apply(ArithmeticOp::IntegerDivide, &Item::Integer(7), &Item::Integer(2), &loc())
                .unwrap();
        assert_eq!(out, Item::Integer(3));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(
            apply(ArithmeticOp::Divide, &Item::Integer(1), &Item::Integer(0), &loc()).is_err()
        );
        assert!(apply(
            ArithmeticOp::Divide,
            &Item::decimal(BigDecimal::from(1)),
            &Item::decimal(BigDecimal::from(0)),
            &loc()
        )
        .is_err());
        // doubles follow IEEE
        let out =
            apply(ArithmeticOp::Divide, &Item::Double(1.0), &Item::Double(0.0), &loc()).unwrap();
        assert_eq!(out, Item::Double(f64::INFINITY));
    }

    #[test]
    fn test_promotion() {
        let out = apply(ArithmeticOp::Add, &Item::Integer(1), &Item::Double(0.5), &loc()).unwrap();
        assert_eq!(out, Item::Double(1.5));

        let out = apply(
            ArithmeticOp::Multiply,
            &Item::decimal(BigDecimal::from_str("1.5").unwrap()),
            &Item::Integer(2),
            &loc(),
        )
        .unwrap();
        assert_eq!(out, Item::decimal(BigDecimal::from(3)));
    }

    #[test]
    fn test_datetime_difference() {
        let a = Item::DateTime(Box::new(CoreDateTime::parse("2020-01-02T00:00:00").unwrap()));
        let b = Item::DateTime(Box::new(CoreDateTime::parse("2020-01-01T00:00:00").unwrap()));
        let out = apply(ArithmeticOp::Subtract, &a, &b, &loc()).unwrap();
        match out {
            Item::DayTimeDuration(d) => assert_eq!(d.millis(), 86_400_000),
            other => panic!("expected dayTimeDuration, got {:?}", other),
        }
    }

    #[test]
    fn test_mixing_numeric_and_string_is_type_error() {
        assert!(matches!(
            apply(ArithmeticOp::Add, &Item::Integer(1), &Item::string("a"), &loc()),
            Err(RuntimeError::Type { .. })
        ));
    }
}
