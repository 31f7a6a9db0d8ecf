//! Range expression: `a to b`
//!
//! A lazy inclusive sequence of integers; empty when the start exceeds the
//! end. Operands must be integer singletons.

use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::item::coerce::exactly_one;
use crate::item::Item;
use crate::iterator::{materialize, BoxedIterator, IteratorCore, LocalStep};
use std::sync::Arc;

pub struct RangeIterator {
    core: IteratorCore,
    start_expr: BoxedIterator,
    end_expr: BoxedIterator,
    current: i64,
    end: i64,
}

impl RangeIterator {
    pub fn new(start_expr: BoxedIterator, end_expr: BoxedIterator, metadata: SourceLocation) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            start_expr,
            end_expr,
            current: 1,
            end: 0,
        }
    }

    fn integer_operand(
        iter: &mut BoxedIterator,
        ctx: &Arc<DynamicContext>,
        side: &str,
        location: &SourceLocation,
    ) -> Result<i64> {
        let items = materialize(iter.as_mut(), ctx)?;
        let item = exactly_one(items, side, location)?;
        item.as_integer().ok_or_else(|| {
            RuntimeError::unexpected_type(
                format!("{} of a range must be an integer, found {}", side, item.type_name()),
                location.clone(),
            )
        })
    }
}

impl LocalStep for RangeIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        self.current = Self::integer_operand(&mut self.start_expr, ctx, "start", &location)?;
        self.end = Self::integer_operand(&mut self.end_expr, ctx, "end", &location)?;
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        if self.current > self.end {
            return Ok(None);
        }
        let item = Item::Integer(self.current);
        self.current += 1;
        Ok(Some(item))
    }

    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Globals;
    use crate::expr::primary::LiteralIterator;
    use crate::options::RuntimeOptions;

    fn ctx() -> Arc<DynamicContext> {
        DynamicContext::root(Arc::new(Globals::new(RuntimeOptions::default()))).into_arc()
    }

    fn literal(item: Item) -> BoxedIterator {
        Box::new(LiteralIterator::new(item, SourceLocation::unknown()))
    }

    #[test]
    fn test_inclusive_range() {
        let mut range = RangeIterator::new(
            literal(Item::Integer(2)),
            literal(Item::Integer(4)),
            SourceLocation::unknown(),
        );
        let items = materialize(&mut range, &ctx()).unwrap();
        assert_eq!(
            items,
            vec![Item::Integer(2), Item::Integer(3), Item::Integer(4)]
        );
    }

    #[test]
    fn test_empty_when_start_exceeds_end() {
        let mut range = RangeIterator::new(
            literal(Item::Integer(5)),
            literal(Item::Integer(4)),
            SourceLocation::unknown(),
        );
        assert!(materialize(&mut range, &ctx()).unwrap().is_empty());
    }

    #[test]
    fn test_non_integer_operand_rejected() {
        let mut range = RangeIterator::new(
            literal(Item::Double(1.0)),
            literal(Item::Integer(4)),
            SourceLocation::unknown(),
        );
        assert!(materialize(&mut range, &ctx()).is_err());
    }
}
