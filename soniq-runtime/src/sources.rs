//! External item sources
//!
//! Storage connectors live outside the core; they hand the runtime a
//! factory conforming to [`ItemSource`]. A source reads locally as a
//! materialized sequence and, when it is partition-backed, doubles as a
//! partitioned collection. The [`CollectionIterator`] is the hybrid
//! iterator over a source: it streams locally or reports RDD capability
//! per its execution-mode annotation.

use crate::ast::ExecutionMode;
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::item::Item;
use crate::iterator::{ExecutionKind, IteratorState, RuntimeIterator};
use soniq_backend::{Rdd, Session};
use std::fmt;
use std::sync::Arc;

/// Factory interface storage connectors implement
pub trait ItemSource: fmt::Debug + Send + Sync {
    /// Name the AST refers to this source by
    fn name(&self) -> &str;

    /// Read the whole source locally
    fn items(&self) -> Result<Vec<Item>>;

    /// Whether a local stream over this source can rewind
    fn rewindable(&self) -> bool {
        true
    }

    /// Whether this source is partition-backed
    fn distributed(&self) -> bool {
        false
    }

    /// The source as a partitioned collection; `None` for local-only
    /// sources
    fn as_rdd(&self, _session: &Session) -> Option<Rdd<Item>> {
        None
    }

    /// The source as a typed frame, for connectors that know their own
    /// schema (Parquet-style); `None` otherwise. Schemaless sources go
    /// through the tabular conversion instead.
    fn as_frame(&self, _session: &Session) -> Option<soniq_backend::Frame> {
        None
    }
}

/// In-memory source, local or distributed; the reference implementation
/// used by tests and embedding code
#[derive(Debug, Clone)]
pub struct InMemorySource {
    name: Arc<str>,
    items: Vec<Item>,
    distributed: bool,
    rewindable: bool,
}

impl InMemorySource {
    pub fn new(name: impl Into<Arc<str>>, items: Vec<Item>) -> Self {
        Self {
            name: name.into(),
            items,
            distributed: false,
            rewindable: true,
        }
    }

    /// A source that reports partition backing
    pub fn distributed(name: impl Into<Arc<str>>, items: Vec<Item>) -> Self {
        Self {
            name: name.into(),
            items,
            distributed: true,
            rewindable: true,
        }
    }

    /// A forward-only source, for exercising `NotRewindable`
    pub fn forward_only(name: impl Into<Arc<str>>, items: Vec<Item>) -> Self {
        Self {
            name: name.into(),
            items,
            distributed: false,
            rewindable: false,
        }
    }
}

impl ItemSource for InMemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn items(&self) -> Result<Vec<Item>> {
        Ok(self.items.clone())
    }

    fn rewindable(&self) -> bool {
        self.rewindable
    }

    fn distributed(&self) -> bool {
        self.distributed
    }

    fn as_rdd(&self, session: &Session) -> Option<Rdd<Item>> {
        self.distributed
            .then(|| session.parallelize(self.items.clone()))
    }
}

/// Hybrid iterator over an item source
pub struct CollectionIterator {
    metadata: SourceLocation,
    source: Arc<dyn ItemSource>,
    mode: ExecutionMode,
    state: IteratorState,
    ctx: Option<Arc<DynamicContext>>,
    buffer: Vec<Item>,
    index: usize,
}

impl CollectionIterator {
    pub fn new(source: Arc<dyn ItemSource>, mode: ExecutionMode, metadata: SourceLocation) -> Self {
        Self {
            metadata,
            source,
            mode,
            state: IteratorState::Created,
            ctx: None,
            buffer: Vec::new(),
            index: 0,
        }
    }

    fn load(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        self.buffer = self.source.items()?;
        self.index = 0;
        self.ctx = Some(ctx.clone());
        self.state = IteratorState::Open;
        Ok(())
    }
}

impl RuntimeIterator for CollectionIterator {
    fn metadata(&self) -> &SourceLocation {
        &self.metadata
    }

    fn state(&self) -> IteratorState {
        self.state
    }

    fn execution_kind(&self) -> ExecutionKind {
        match self.mode {
            ExecutionMode::Rdd | ExecutionMode::DataFrame => ExecutionKind::RddCapable,
            ExecutionMode::Local => ExecutionKind::LocalOnly,
            // no annotation: probe the source's capability
            ExecutionMode::Unset => {
                if self.source.distributed() {
                    ExecutionKind::RddCapable
                } else {
                    ExecutionKind::LocalOnly
                }
            }
        }
    }

    fn open(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        if self.is_rdd() {
            return Err(RuntimeError::iterator_flow(
                "open() on a distributed collection; use rdd()",
                self.metadata.clone(),
            ));
        }
        if self.state != IteratorState::Created {
            return Err(RuntimeError::iterator_flow(
                "open() called out of lifecycle",
                self.metadata.clone(),
            ));
        }
        self.load(ctx)
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
                "next() called on an exhausted collection",
                self.metadata.clone(),
            ));
        }
        let item = self.buffer[self.index].clone();
        self.index += 1;
        Ok(item)
    }

    fn close(&mut self) {
        self.buffer = Vec::new();
        self.index = 0;
        self.ctx = None;
        self.state = IteratorState::Closed;
    }

    fn reset(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        if !self.source.rewindable() {
            return Err(RuntimeError::NotRewindable {
                location: self.metadata.clone(),
            });
        }
        self.load(ctx)
    }

    fn rdd(&mut self, ctx: &Arc<DynamicContext>) -> Result<Rdd<Item>> {
        match self.source.as_rdd(ctx.session()) {
            Some(rdd) => Ok(rdd),
            // annotated distributed but only locally readable: distribute
            None => Ok(ctx.session().parallelize(self.source.items()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Globals;
    use crate::options::RuntimeOptions;
    use crate::iterator::materialize;

    fn ctx() -> Arc<DynamicContext> {
        DynamicContext::root(Arc::new(Globals::new(RuntimeOptions::default()))).into_arc()
    }

    #[test]
    fn test_local_source_streams() {
        let source = Arc::new(InMemorySource::new(
            "c",
            vec![Item::Integer(1), Item::Integer(2)],
        ));
        let mut iter =
            CollectionIterator::new(source, ExecutionMode::Local, SourceLocation::unknown());
        let items = materialize(&mut iter, &ctx()).unwrap();
        assert_eq!(items, vec![Item::Integer(1), Item::Integer(2)]);
    }

    #[test]
    fn test_distributed_source_rejects_local_iteration() {
        let source = Arc::new(InMemorySource::distributed("c", vec![Item::Integer(1)]));
        let mut iter =
            CollectionIterator::new(source, ExecutionMode::Rdd, SourceLocation::unknown());
        assert!(iter.is_rdd());
        assert!(iter.open(&ctx()).is_err());
        let rdd = iter.rdd(&ctx()).unwrap();
        assert_eq!(rdd.collect(), vec![Item::Integer(1)]);
    }

    #[test]
    fn test_forward_only_rejects_reset() {
        let ctx = ctx();
        let source = Arc::new(InMemorySource::forward_only("c", vec![Item::Integer(1)]));
        let mut iter =
            CollectionIterator::new(source, ExecutionMode::Local, SourceLocation::unknown());
        iter.open(&ctx).unwrap();
        assert!(matches!(
            iter.reset(&ctx),
            Err(RuntimeError::NotRewindable { .. })
        ));
        iter.close();
    }

    #[test]
    fn test_unset_mode_probes_capability() {
        let local = CollectionIterator::new(
            Arc::new(InMemorySource::new("a", vec![])),
            ExecutionMode::Unset,
            SourceLocation::unknown(),
        );
        assert!(!local.is_rdd());

        let dist = CollectionIterator::new(
            Arc::new(InMemorySource::distributed("b", vec![])),
            ExecutionMode::Unset,
            SourceLocation::unknown(),
        );
        assert!(dist.is_rdd());
    }
}
