//! The runtime iterator protocol
//!
//! Every expression implements [`RuntimeIterator`]: a pull-based stream of
//! items with an `open/has_next/next/close` lifecycle, `reset` for rewind,
//! and capability methods for distributed evaluation. The protocol is
//! synchronous; `next` on an I/O-backed iterator may block.
//!
//! Purely local iterators implement the lighter [`LocalStep`] instead: the
//! blanket impl supplies state tracking, one-item lookahead (so `has_next`
//! stays a pure query), flow-error detection, and the cancellation check at
//! each `next`.
//!
//! Hybrid nodes — those whose subtree may prefer distributed evaluation —
//! implement `RuntimeIterator` directly and decide at `open` time: when a
//! child reports `is_rdd`, local `next` becomes a flow error and consumers
//! must take the partitioned collection via `rdd`.

use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::item::Item;
use soniq_backend::Rdd;
use std::sync::Arc;

/// How a subtree prefers to evaluate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionKind {
    /// Streams items locally only
    LocalOnly,
    /// Can materialize as a partitioned item collection
    RddCapable,
    /// Can materialize as a typed tabular stream (FLWOR pipelines)
    DataFrameCapable,
}

/// Lifecycle state shared by all iterators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IteratorState {
    Created,
    Open,
    Closed,
}

/// The streaming contract every expression implements
pub trait RuntimeIterator {
    /// Source metadata for errors
    fn metadata(&self) -> &SourceLocation;

    /// Current lifecycle state
    fn state(&self) -> IteratorState;

    /// Distributed-evaluation preference of this subtree
    fn execution_kind(&self) -> ExecutionKind {
        ExecutionKind::LocalOnly
    }

    /// Whether consumers must use `rdd` instead of local iteration
    fn is_rdd(&self) -> bool {
        !matches!(self.execution_kind(), ExecutionKind::LocalOnly)
    }

    /// Bind to a dynamic context; once per lifecycle (`reset` re-opens)
    fn open(&mut self, ctx: &Arc<DynamicContext>) -> Result<()>;

    /// Pure query; stable until `next` advances the stream
    fn has_next(&self) -> bool;

    /// The next item; a flow error when `has_next` is false
    fn next(&mut self) -> Result<Item>;

    /// Release resources; idempotent, safe on partially consumed streams
    fn close(&mut self);

    /// Rewind under a possibly new context; `NotRewindable` for
    /// forward-only sources
    fn reset(&mut self, ctx: &Arc<DynamicContext>) -> Result<()>;

    /// The subtree as a partitioned collection; defined when `is_rdd`
    fn rdd(&mut self, _ctx: &Arc<DynamicContext>) -> Result<Rdd<Item>> {
        Err(RuntimeError::iterator_flow(
            "rdd() called on a local-only iterator",
            self.metadata().clone(),
        ))
    }

    /// Whether this subtree can produce a typed tabular stream (FLWOR
    /// expressions over projectable variables)
    fn is_dataframe(&self) -> bool {
        matches!(self.execution_kind(), ExecutionKind::DataFrameCapable)
    }

    /// The subtree as a frame carrying `projection`; defined when
    /// `is_dataframe`
    fn dataframe(
        &mut self,
        _ctx: &Arc<DynamicContext>,
        _projection: &crate::ast::VariableDependencyMap,
    ) -> Result<soniq_backend::Frame> {
        Err(RuntimeError::iterator_flow(
            "dataframe() called on an iterator without tabular capability",
            self.metadata().clone(),
        ))
    }
}

/// Boxed iterator for dynamic dispatch
pub type BoxedIterator = Box<dyn RuntimeIterator>;

/// Lifecycle plumbing shared by local iterators
#[derive(Debug)]
pub struct IteratorCore {
    pub metadata: SourceLocation,
    state: IteratorState,
    lookahead: Option<Item>,
    ctx: Option<Arc<DynamicContext>>,
}

impl IteratorCore {
    pub fn new(metadata: SourceLocation) -> Self {
        Self {
            metadata,
            state: IteratorState::Created,
            lookahead: None,
            ctx: None,
        }
    }

    pub fn state(&self) -> IteratorState {
        self.state
    }

    pub fn ctx(&self) -> Option<&Arc<DynamicContext>> {
        self.ctx.as_ref()
    }
}

/// Implemented by purely local iterators; the blanket impl below supplies
/// the full [`RuntimeIterator`] lifecycle.
pub trait LocalStep {
    fn core(&self) -> &IteratorCore;
    fn core_mut(&mut self) -> &mut IteratorCore;

    /// Prepare to produce items under `ctx` (open children, reset state)
    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()>;

    /// Produce the next item, or `None` when exhausted
    fn step(&mut self) -> Result<Option<Item>>;

    /// Release child resources; must be safe after a failed `init`
    fn release(&mut self);

    /// Forward-only sources return false and reject `reset`
    fn rewindable(&self) -> bool {
        true
    }
}

fn open_local<T: LocalStep + ?Sized>(it: &mut T, ctx: &Arc<DynamicContext>) -> Result<()> {
    it.core_mut().ctx = Some(ctx.clone());
    it.init(ctx)?;
    it.core_mut().state = IteratorState::Open;
    let first = it.step()?;
    it.core_mut().lookahead = first;
    Ok(())
}

impl<T: LocalStep> RuntimeIterator for T {
    fn metadata(&self) -> &SourceLocation {
        &self.core().metadata
    }

    fn state(&self) -> IteratorState {
        self.core().state()
    }

    fn open(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        match self.core().state {
            IteratorState::Created => open_local(self, ctx),
            IteratorState::Open => Err(RuntimeError::iterator_flow(
                "open() called on an open iterator",
                self.core().metadata.clone(),
            )),
            IteratorState::Closed => Err(RuntimeError::iterator_flow(
                "open() called on a closed iterator; use reset()",
                self.core().metadata.clone(),
            )),
        }
    }

    fn has_next(&self) -> bool {
        self.core().lookahead.is_some()
    }

    fn next(&mut self) -> Result<Item> {
        if self.core().state != IteratorState::Open {
            return Err(RuntimeError::iterator_flow(
                "next() called on an iterator that is not open",
                self.core().metadata.clone(),
            ));
        }
        if let Some(ctx) = self.core().ctx.clone() {
            ctx.check_cancelled(&self.core().metadata)?;
        }
        match self.core_mut().lookahead.take() {
            Some(item) => {
                let following = self.step()?;
                self.core_mut().lookahead = following;
                Ok(item)
            }
            None => Err(RuntimeError::iterator_flow(
                "next() called on an exhausted iterator",
                self.core().metadata.clone(),
            )),
        }
    }

    fn close(&mut self) {
        if self.core().state == IteratorState::Closed {
            return;
        }
        self.release();
        let core = self.core_mut();
        core.lookahead = None;
        core.ctx = None;
        core.state = IteratorState::Closed;
    }

    fn reset(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        if !self.rewindable() {
            return Err(RuntimeError::NotRewindable {
                location: self.core().metadata.clone(),
            });
        }
        self.release();
        self.core_mut().lookahead = None;
        self.core_mut().state = IteratorState::Created;
        open_local(self, ctx)
    }
}

// ============================================================================
// Consumption helpers
// ============================================================================

/// Open on first use, reset on reuse.
///
/// Composite iterators re-run their children when they are themselves
/// reset; a child that already completed a lifecycle must rewind instead
/// of re-opening.
pub fn open_or_reset(iter: &mut dyn RuntimeIterator, ctx: &Arc<DynamicContext>) -> Result<()> {
    match iter.state() {
        IteratorState::Created => iter.open(ctx),
        IteratorState::Closed => iter.reset(ctx),
        IteratorState::Open => Err(RuntimeError::iterator_flow(
            "iterator is already open",
            iter.metadata().clone(),
        )),
    }
}

/// Drain an iterator completely under `ctx`.
///
/// `open` and `close` are balanced on every path, including errors; a
/// subtree preferring distributed evaluation is collected instead of
/// streamed.
pub fn materialize(iter: &mut dyn RuntimeIterator, ctx: &Arc<DynamicContext>) -> Result<Vec<Item>> {
    if iter.is_rdd() {
        return Ok(iter.rdd(ctx)?.collect());
    }
    if let Err(e) = open_or_reset(iter, ctx) {
        // a failed open may still have opened children; close unwinds them
        iter.close();
        return Err(e);
    }
    let result = drain_open(iter);
    iter.close();
    result
}

fn drain_open(iter: &mut dyn RuntimeIterator) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    while iter.has_next() {
        items.push(iter.next()?);
    }
    Ok(items)
}

/// First item of a stream, or `None` when it is empty
pub fn materialize_first(
    iter: &mut dyn RuntimeIterator,
    ctx: &Arc<DynamicContext>,
) -> Result<Option<Item>> {
    if iter.is_rdd() {
        return Ok(iter.rdd(ctx)?.take(1).into_iter().next());
    }
    if let Err(e) = open_or_reset(iter, ctx) {
        iter.close();
        return Err(e);
    }
    let result = if iter.has_next() { iter.next().map(Some) } else { Ok(None) };
    iter.close();
    result
}

/// Streaming adapter over a child iterator that may prefer distributed
/// evaluation: local children are opened and forwarded, distributed ones
/// are collected once. The child lives in the parent struct; every call
/// takes it by reference so borrows stay local.
#[derive(Debug, Default)]
pub struct ChildStream {
    opened: bool,
    collected: Option<std::vec::IntoIter<Item>>,
}

impl ChildStream {
    /// Start consuming `child` under `ctx`
    pub fn start(child: &mut dyn RuntimeIterator, ctx: &Arc<DynamicContext>) -> Result<ChildStream> {
        if child.is_rdd() {
            let items = child.rdd(ctx)?.collect();
            return Ok(ChildStream {
                opened: false,
                collected: Some(items.into_iter()),
            });
        }
        open_or_reset(child, ctx)?;
        Ok(ChildStream {
            opened: true,
            collected: None,
        })
    }

    /// Next item of the child, or `None` when exhausted
    pub fn next(&mut self, child: &mut dyn RuntimeIterator) -> Result<Option<Item>> {
        if let Some(collected) = &mut self.collected {
            return Ok(collected.next());
        }
        if !self.opened {
            return Ok(None);
        }
        if child.has_next() {
            child.next().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Close the child if this stream opened it
    pub fn finish(&mut self, child: &mut dyn RuntimeIterator) {
        if self.opened {
            child.close();
            self.opened = false;
        }
        self.collected = None;
    }
}

/// At most one item; more than one is an error described by `what`
pub fn materialize_at_most_one(
    iter: &mut dyn RuntimeIterator,
    ctx: &Arc<DynamicContext>,
    what: &str,
) -> Result<Option<Item>> {
    let location = iter.metadata().clone();
    let items = materialize(iter, ctx)?;
    crate::item::coerce::at_most_one(items, what, &location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Globals;
    use crate::options::RuntimeOptions;

    /// Minimal local iterator over a fixed list
    struct FixedItems {
        core: IteratorCore,
        items: Vec<Item>,
        index: usize,
    }

    impl FixedItems {
        fn new(items: Vec<Item>) -> Self {
            Self {
                core: IteratorCore::new(SourceLocation::unknown()),
                items,
                index: 0,
            }
        }
    }

    impl LocalStep for FixedItems {
        fn core(&self) -> &IteratorCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut IteratorCore {
            &mut self.core
        }
        fn init(&mut self, _ctx: &Arc<DynamicContext>) -> Result<()> {
            self.index = 0;
            Ok(())
        }
        fn step(&mut self) -> Result<Option<Item>> {
            let item = self.items.get(self.index).cloned();
            self.index += 1;
            Ok(item)
        }
        fn release(&mut self) {}
    }

    fn ctx() -> Arc<DynamicContext> {
        DynamicContext::root(Arc::new(Globals::new(RuntimeOptions::default()))).into_arc()
    }

    #[test]
    fn test_lifecycle() {
        let ctx = ctx();
        let mut iter = FixedItems::new(vec![Item::Integer(1), Item::Integer(2)]);
        iter.open(&ctx).unwrap();
        assert!(iter.has_next());
        // has_next is stable between calls
        assert!(iter.has_next());
        assert_eq!(iter.next().unwrap(), Item::Integer(1));
        assert_eq!(iter.next().unwrap(), Item::Integer(2));
        assert!(!iter.has_next());
        assert!(matches!(
            iter.next(),
            Err(RuntimeError::IteratorFlow { .. })
        ));
        iter.close();
        // close is idempotent
        iter.close();
    }

    #[test]
    fn test_double_open_is_flow_error() {
        let ctx = ctx();
        let mut iter = FixedItems::new(vec![]);
        iter.open(&ctx).unwrap();
        assert!(matches!(
            iter.open(&ctx),
            Err(RuntimeError::IteratorFlow { .. })
        ));
    }

    #[test]
    fn test_reset_rewinds() {
        let ctx = ctx();
        let mut iter = FixedItems::new(vec![Item::Integer(5)]);
        iter.open(&ctx).unwrap();
        assert_eq!(iter.next().unwrap(), Item::Integer(5));
        iter.reset(&ctx).unwrap();
        assert_eq!(iter.next().unwrap(), Item::Integer(5));
        iter.close();
    }

    #[test]
    fn test_open_after_close_requires_reset() {
        let ctx = ctx();
        let mut iter = FixedItems::new(vec![]);
        iter.open(&ctx).unwrap();
        iter.close();
        assert!(matches!(
            iter.open(&ctx),
            Err(RuntimeError::IteratorFlow { .. })
        ));
        iter.reset(&ctx).unwrap();
        iter.close();
    }

    #[test]
    fn test_cancellation_surfaces_from_next() {
        let ctx = ctx();
        let mut iter = FixedItems::new(vec![Item::Integer(1), Item::Integer(2)]);
        iter.open(&ctx).unwrap();
        ctx.globals().cancel();
        assert!(matches!(iter.next(), Err(RuntimeError::Cancelled { .. })));
        iter.close();
    }

    #[test]
    fn test_materialize_balances_lifecycle() {
        let ctx = ctx();
        let mut iter = FixedItems::new(vec![Item::Integer(1)]);
        let items = materialize(&mut iter, &ctx).unwrap();
        assert_eq!(items, vec![Item::Integer(1)]);
        // the iterator ended closed; a fresh open is rejected
        assert!(iter.open(&ctx).is_err());
    }
}
