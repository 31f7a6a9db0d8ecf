//! Comparison expressions
//!
//! Value comparisons (`eq`, `lt`, ...) require singleton operands and yield
//! one boolean. General comparisons (`=`, `<`, ...) match existentially
//! over the cartesian product of both operand sequences; an empty operand
//! yields false. Either way, comparing across type families (beyond
//! numeric promotion and null) is a type error; binary items support
//! equality only.

use crate::ast::{ComparisonKind, ComparisonOp};
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::item::coerce::exactly_one;
use crate::item::ordering::compare_values;
use crate::item::Item;
use crate::iterator::{materialize, BoxedIterator, IteratorCore, LocalStep};
use std::cmp::Ordering;
use std::sync::Arc;

pub struct ComparisonIterator {
    core: IteratorCore,
    op: ComparisonOp,
    kind: ComparisonKind,
    lhs: BoxedIterator,
    rhs: BoxedIterator,
    result: Option<Item>,
}

impl ComparisonIterator {
    pub fn new(
        op: ComparisonOp,
        kind: ComparisonKind,
        lhs: BoxedIterator,
        rhs: BoxedIterator,
        metadata: SourceLocation,
    ) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            op,
            kind,
            lhs,
            rhs,
            result: None,
        }
    }
}

impl LocalStep for ComparisonIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let lhs = materialize(self.lhs.as_mut(), ctx)?;
        let rhs = materialize(self.rhs.as_mut(), ctx)?;

        let value = match self.kind {
            ComparisonKind::Value => {
                let l = exactly_one(lhs, "left operand of a value comparison", &location)?;
                let r = exactly_one(rhs, "right operand of a value comparison", &location)?;
                compare_pair(self.op, &l, &r, &location)?
            }
            ComparisonKind::General => {
                let mut matched = false;
                'outer: for l in &lhs {
                    for r in &rhs {
                        if compare_pair(self.op, l, r, &location)? {
                            matched = true;
                            break 'outer;
                        }
                    }
                }
                matched
            }
        };
        self.result = Some(Item::Boolean(value));
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        Ok(self.result.take())
    }

    fn release(&mut self) {
        self.result = None;
    }
}

/// One pairwise comparison under value-comparison semantics
pub fn compare_pair(
    op: ComparisonOp,
    l: &Item,
    r: &Item,
    location: &SourceLocation,
) -> Result<bool> {
    // binary items: equality on bytes, no order
    if l.is_binary() && r.is_binary() {
        return match op {
            ComparisonOp::Eq | ComparisonOp::Ne => {
                let equal = crate::item::ordering::equals(l, r) == Some(true);
                Ok((op == ComparisonOp::Eq) == equal)
            }
            _ => Err(RuntimeError::unexpected_type(
                "binary values support equality comparison only",
                location.clone(),
            )),
        };
    }

    let ord = compare_values(l, r).ok_or_else(|| {
        RuntimeError::type_error(
            format!("cannot compare {} with {}", l.type_name(), r.type_name()),
            location.clone(),
        )
    })?;
    Ok(match op {
        ComparisonOp::Eq => ord == Ordering::Equal,
        ComparisonOp::Ne => ord != Ordering::Equal,
        ComparisonOp::Lt => ord == Ordering::Less,
        ComparisonOp::Le => ord != Ordering::Greater,
        ComparisonOp::Gt => ord == Ordering::Greater,
        ComparisonOp::Ge => ord != Ordering::Less,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairwise() {
        let loc = SourceLocation::unknown();
        assert!(compare_pair(ComparisonOp::Lt, &Item::Integer(1), &Item::Double(1.5), &loc).unwrap());
        assert!(compare_pair(ComparisonOp::Eq, &Item::Null, &Item::Null, &loc).unwrap());
        assert!(!compare_pair(ComparisonOp::Eq, &Item::Null, &Item::Integer(0), &loc).unwrap());
        assert!(compare_pair(ComparisonOp::Lt, &Item::Null, &Item::Integer(0), &loc).unwrap());
    }

    #[test]
    fn test_cross_family_is_type_error() {
        assert!(compare_pair(
            ComparisonOp::Eq,
            &Item::Integer(1),
            &Item::string("1"),
            &SourceLocation::unknown()
        )
        .is_err());
    }

    #[test]
    fn test_binary_equality_only() {
        let loc = SourceLocation::unknown();
        let a = Item::HexBinary(Arc::from(vec![1u8, 2].into_boxed_slice()));
        let b = Item::Base64Binary(Arc::from(vec![1u8, 2].into_boxed_slice()));
        assert!(compare_pair(ComparisonOp::Eq, &a, &b, &loc).unwrap());
        assert!(compare_pair(ComparisonOp::Lt, &a, &b, &loc).is_err());
    }
}
