//! Logical expressions: short-circuit and/or, not
//!
//! Operands coerce through the effective boolean value. The right operand
//! is not evaluated when the left already decides.

use crate::context::DynamicContext;
use crate::error::{Result, SourceLocation};
use crate::item::coerce::effective_boolean_value;
use crate::item::Item;
use crate::iterator::{materialize, BoxedIterator, IteratorCore, LocalStep};
use std::sync::Arc;

/// `and` / `or`, selected by `stop_on`: `and` stops (false) on a false
/// left operand, `or` stops (true) on a true one.
pub struct LogicalIterator {
    core: IteratorCore,
    stop_on: bool,
    lhs: BoxedIterator,
    rhs: BoxedIterator,
    result: Option<Item>,
}

impl LogicalIterator {
    pub fn and(lhs: BoxedIterator, rhs: BoxedIterator, metadata: SourceLocation) -> Self {
        Self::new(false, lhs, rhs, metadata)
    }

    pub fn or(lhs: BoxedIterator, rhs: BoxedIterator, metadata: SourceLocation) -> Self {
        Self::new(true, lhs, rhs, metadata)
    }

    fn new(stop_on: bool, lhs: BoxedIterator, rhs: BoxedIterator, metadata: SourceLocation) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            stop_on,
            lhs,
            rhs,
            result: None,
        }
    }
}

impl LocalStep for LogicalIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let left = effective_boolean_value(&materialize(self.lhs.as_mut(), ctx)?, &location)?;
        let value = if left == self.stop_on {
            self.stop_on
        } else {
            effective_boolean_value(&materialize(self.rhs.as_mut(), ctx)?, &location)?
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

/// `not` over the effective boolean value
pub struct NotIterator {
    core: IteratorCore,
    operand: BoxedIterator,
    result: Option<Item>,
}

impl NotIterator {
    pub fn new(operand: BoxedIterator, metadata: SourceLocation) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            operand,
            result: None,
        }
    }
}

impl LocalStep for NotIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let value = effective_boolean_value(&materialize(self.operand.as_mut(), ctx)?, &location)?;
        self.result = Some(Item::Boolean(!value));
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        Ok(self.result.take())
    }

    fn release(&mut self) {
        self.result = None;
    }
}
