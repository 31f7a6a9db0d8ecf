//! Primary expressions: literals, variable references, the context item

use crate::context::{DynamicContext, SequenceBinding};
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::item::Item;
use crate::iterator::{ExecutionKind, IteratorCore, IteratorState, LocalStep, RuntimeIterator};
use soniq_backend::Rdd;
use std::sync::Arc;

/// A single pre-built item (all literal kinds reduce to this)
pub struct LiteralIterator {
    core: IteratorCore,
    item: Item,
    done: bool,
}

impl LiteralIterator {
    pub fn new(item: Item, metadata: SourceLocation) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            item,
            done: false,
        }
    }
}

impl LocalStep for LiteralIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, _ctx: &Arc<DynamicContext>) -> Result<()> {
        self.done = false;
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        Ok(Some(self.item.clone()))
    }

    fn release(&mut self) {}
}

/// Variable reference; hybrid when annotated for distributed evaluation
pub struct VariableReferenceIterator {
    metadata: SourceLocation,
    var: Arc<str>,
    kind: ExecutionKind,
    state: IteratorState,
    ctx: Option<Arc<DynamicContext>>,
    buffer: Arc<Vec<Item>>,
    index: usize,
}

impl VariableReferenceIterator {
    pub fn new(var: Arc<str>, kind: ExecutionKind, metadata: SourceLocation) -> Self {
        Self {
            metadata,
            var,
            kind,
            state: IteratorState::Created,
            ctx: None,
            buffer: Arc::new(Vec::new()),
            index: 0,
        }
    }
}

impl RuntimeIterator for VariableReferenceIterator {
    fn metadata(&self) -> &SourceLocation {
        &self.metadata
    }

    fn state(&self) -> IteratorState {
        self.state
    }

    fn execution_kind(&self) -> ExecutionKind {
        self.kind
    }

    fn open(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        if self.state != IteratorState::Created {
            return Err(RuntimeError::iterator_flow(
                "open() called out of lifecycle",
                self.metadata.clone(),
            ));
        }
        // a partitioned binding read locally is collected here: consumers
        // tolerate either representation
        self.buffer = ctx.sequence(&self.var, &self.metadata)?;
        self.index = 0;
        self.ctx = Some(ctx.clone());
        self.state = IteratorState::Open;
        Ok(())
    }

    fn has_next(&self) -> bool {
        self.state == IteratorState::Open && self.index < self.buffer.len()
    }

    fn next(&mut self) -> Result<Item> {
        if let Some(ctx) = &self.ctx {
            ctx.check_cancelled(&self.metadata)?;
        }
        if !self.has_next() {
            return Err(RuntimeError::iterator_flow(
                "next() called on an exhausted variable reference",
                self.metadata.clone(),
            ));
        }
        let item = self.buffer[self.index].clone();
        self.index += 1;
        Ok(item)
    }

    fn close(&mut self) {
        self.buffer = Arc::new(Vec::new());
        self.index = 0;
        self.ctx = None;
        self.state = IteratorState::Closed;
    }

    fn reset(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        self.state = IteratorState::Created;
        self.open(ctx)
    }

    fn rdd(&mut self, ctx: &Arc<DynamicContext>) -> Result<Rdd<Item>> {
        match ctx.lookup(&self.var) {
            Some(SequenceBinding::Rdd(rdd)) => Ok(rdd.clone()),
            Some(SequenceBinding::Sequence(items)) => {
                Ok(ctx.session().parallelize(items.as_ref().clone()))
            }
            Some(SequenceBinding::Count(_)) => Err(RuntimeError::iterator_flow(
                format!("variable ${} was projected to its count only", self.var),
                self.metadata.clone(),
            )),
            None => Err(RuntimeError::dynamic(
                format!("variable ${} is not bound", self.var),
                self.metadata.clone(),
            )),
        }
    }
}

/// `$$` — the context item set by predicate evaluation
pub struct ContextItemIterator {
    core: IteratorCore,
    done: bool,
}

impl ContextItemIterator {
    pub fn new(metadata: SourceLocation) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            done: false,
        }
    }
}

impl LocalStep for ContextItemIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, _ctx: &Arc<DynamicContext>) -> Result<()> {
        self.done = false;
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let ctx = self.core.ctx().cloned().ok_or_else(|| {
            RuntimeError::iterator_flow("iterator consumed before open", self.core.metadata.clone())
        })?;
        match ctx.context_item() {
            Some(item) => Ok(Some(item.clone())),
            None => Err(RuntimeError::dynamic(
                "context item is not bound",
                self.core.metadata.clone(),
            )),
        }
    }

    fn release(&mut self) {}
}
