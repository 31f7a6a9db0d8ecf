//! Comma expression — sequence concatenation
//!
//! Streams each child in order. A hybrid node: when any child prefers
//! distributed evaluation the whole concatenation does, and materializes
//! as the union of the children's partitioned collections.

use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::item::Item;
use crate::iterator::{
    materialize, BoxedIterator, ExecutionKind, IteratorState, RuntimeIterator,
};
use soniq_backend::Rdd;
use std::sync::Arc;

pub struct CommaExpressionIterator {
    metadata: SourceLocation,
    children: Vec<BoxedIterator>,
    state: IteratorState,
    ctx: Option<Arc<DynamicContext>>,
    /// index of the child currently open, when local streaming
    current: usize,
    current_open: bool,
    /// children that have completed a lifecycle need reset, not open
    opened_once: Vec<bool>,
}

impl CommaExpressionIterator {
    pub fn new(children: Vec<BoxedIterator>, metadata: SourceLocation) -> Self {
        let opened_once = vec![false; children.len()];
        Self {
            metadata,
            children,
            state: IteratorState::Created,
            ctx: None,
            current: 0,
            current_open: false,
            opened_once,
        }
    }

    /// Advance `current` past exhausted children, opening as we go
    fn settle(&mut self) -> Result<()> {
        let ctx = self
            .ctx
            .clone()
            .ok_or_else(|| {
                RuntimeError::iterator_flow("iterator consumed before open", self.metadata.clone())
            })?;
        loop {
            if self.current >= self.children.len() {
                return Ok(());
            }
            if !self.current_open {
                if self.opened_once[self.current] {
                    self.children[self.current].reset(&ctx)?;
                } else {
                    self.children[self.current].open(&ctx)?;
                    self.opened_once[self.current] = true;
                }
                self.current_open = true;
            }
            if self.children[self.current].has_next() {
                return Ok(());
            }
            self.children[self.current].close();
            self.current_open = false;
            self.current += 1;
        }
    }
}

impl RuntimeIterator for CommaExpressionIterator {
    fn metadata(&self) -> &SourceLocation {
        &self.metadata
    }

    fn state(&self) -> IteratorState {
        self.state
    }

    fn execution_kind(&self) -> ExecutionKind {
        if self.children.iter().any(|c| c.is_rdd()) {
            ExecutionKind::RddCapable
        } else {
            ExecutionKind::LocalOnly
        }
    }

    fn open(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        if self.is_rdd() {
            return Err(RuntimeError::iterator_flow(
                "open() on a distributed sequence; use rdd()",
                self.metadata.clone(),
            ));
        }
        if self.state != IteratorState::Created {
            return Err(RuntimeError::iterator_flow(
                "open() called out of lifecycle",
                self.metadata.clone(),
            ));
        }
        self.ctx = Some(ctx.clone());
        self.current = 0;
        self.current_open = false;
        self.state = IteratorState::Open;
        self.settle()
    }

    fn has_next(&self) -> bool {
        self.state == IteratorState::Open
            && self.current < self.children.len()
            && self.children[self.current].has_next()
    }

    fn next(&mut self) -> Result<Item> {
        if let Some(ctx) = &self.ctx {
            ctx.check_cancelled(&self.metadata)?;
        }
        if !self.has_next() {
            return Err(RuntimeError::iterator_flow(
                "next() called on an exhausted sequence",
                self.metadata.clone(),
            ));
        }
        let item = self.children[self.current].next()?;
        self.settle()?;
        Ok(item)
    }

    fn close(&mut self) {
        if self.current_open {
            if let Some(child) = self.children.get_mut(self.current) {
                child.close();
            }
            self.current_open = false;
        }
        self.ctx = None;
        self.state = IteratorState::Closed;
    }

    fn reset(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        self.close();
        self.current = 0;
        self.state = IteratorState::Created;
        self.open(ctx)
    }

    fn rdd(&mut self, ctx: &Arc<DynamicContext>) -> Result<Rdd<Item>> {
        let mut union: Option<Rdd<Item>> = None;
        for child in &mut self.children {
            let part = if child.is_rdd() {
                child.rdd(ctx)?
            } else {
                let items = materialize(child.as_mut(), ctx)?;
                Rdd::single_partition(items)
            };
            union = Some(match union {
                None => part,
                Some(acc) => acc.union(&part),
            });
        }
        Ok(union.unwrap_or_else(|| Rdd::single_partition(Vec::new())))
    }
}
