//! Dynamic context: the lexical chain of variable frames
//!
//! A [`DynamicContext`] is one immutable frame: local bindings, the optional
//! focus (context item, position, size), and a parent pointer. Clauses that
//! bind variables push one child frame per tuple; frames are dropped when
//! the producing clause advances. Shared state (options, backend session,
//! the cancellation flag) lives in [`Globals`], carried by every frame.
//!
//! A binding is either a materialized sequence, a reference to a
//! partitioned collection (large bindings stay distributed until a consumer
//! actually needs the items), or a pre-computed count when projection
//! determined only the cardinality is used downstream.

use crate::error::{Result, RuntimeError, SourceLocation};
use crate::flwor::tuple::{FlworTuple, TupleField};
use crate::item::Item;
use crate::options::RuntimeOptions;
use rustc_hash::FxHashMap;
use soniq_backend::{Rdd, Session};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Query-wide shared state
#[derive(Debug)]
pub struct Globals {
    pub options: RuntimeOptions,
    pub session: Arc<Session>,
    cancel: AtomicBool,
}

impl Globals {
    pub fn new(options: RuntimeOptions) -> Self {
        let session = Arc::new(Session::with_partitions(options.partitions));
        Self {
            options,
            session,
            cancel: AtomicBool::new(false),
        }
    }

    /// Request cooperative cancellation; iterators surface `Cancelled` at
    /// their next loop boundary.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// A variable binding
#[derive(Clone, Debug)]
pub enum SequenceBinding {
    /// Materialized sequence
    Sequence(Arc<Vec<Item>>),
    /// Reference to a partitioned collection
    Rdd(Rdd<Item>),
    /// Only the cardinality, from count projection
    Count(i64),
}

/// One frame of the lexical chain
#[derive(Clone, Debug)]
pub struct DynamicContext {
    parent: Option<Arc<DynamicContext>>,
    globals: Arc<Globals>,
    bindings: FxHashMap<Arc<str>, SequenceBinding>,
    context_item: Option<Item>,
    position: Option<i64>,
    size: Option<i64>,
}

impl DynamicContext {
    /// The root frame of a query
    pub fn root(globals: Arc<Globals>) -> DynamicContext {
        DynamicContext {
            parent: None,
            globals,
            bindings: FxHashMap::default(),
            context_item: None,
            position: None,
            size: None,
        }
    }

    /// An empty child frame
    pub fn child(parent: &Arc<DynamicContext>) -> DynamicContext {
        DynamicContext {
            parent: Some(parent.clone()),
            globals: parent.globals.clone(),
            bindings: FxHashMap::default(),
            context_item: None,
            position: None,
            size: None,
        }
    }

    pub fn into_arc(self) -> Arc<DynamicContext> {
        Arc::new(self)
    }

    pub fn globals(&self) -> &Arc<Globals> {
        &self.globals
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.globals.session
    }

    // === binding ===

    pub fn bind(&mut self, name: Arc<str>, binding: SequenceBinding) {
        self.bindings.insert(name, binding);
    }

    pub fn bind_sequence(&mut self, name: Arc<str>, items: Vec<Item>) {
        self.bind(name, SequenceBinding::Sequence(Arc::new(items)));
    }

    pub fn bind_shared(&mut self, name: Arc<str>, items: Arc<Vec<Item>>) {
        self.bind(name, SequenceBinding::Sequence(items));
    }

    pub fn bind_rdd(&mut self, name: Arc<str>, rdd: Rdd<Item>) {
        self.bind(name, SequenceBinding::Rdd(rdd));
    }

    pub fn bind_count(&mut self, name: Arc<str>, count: i64) {
        self.bind(name, SequenceBinding::Count(count));
    }

    /// Bind every field of a FLWOR tuple into this frame
    pub fn bind_tuple(&mut self, tuple: &FlworTuple) {
        for (name, field) in tuple.iter() {
            match field {
                TupleField::Sequence(items) => self.bind_shared(name.clone(), items.clone()),
                TupleField::Count(n) => self.bind_count(name.clone(), *n),
            }
        }
    }

    /// Set the focus for predicate evaluation
    pub fn set_focus(&mut self, item: Item, position: i64, size: i64) {
        self.context_item = Some(item);
        self.position = Some(position);
        self.size = Some(size);
    }

    // === lookup ===

    /// Walk the chain for a binding
    pub fn lookup(&self, name: &str) -> Option<&SequenceBinding> {
        match self.bindings.get(name) {
            Some(binding) => Some(binding),
            None => self.parent.as_ref().and_then(|p| p.lookup(name)),
        }
    }

    /// The materialized sequence bound to a variable.
    ///
    /// Partitioned bindings are collected; a count-only binding here means
    /// projection under-materialized, which is an engine bug.
    pub fn sequence(&self, name: &str, location: &SourceLocation) -> Result<Arc<Vec<Item>>> {
        match self.lookup(name) {
            Some(SequenceBinding::Sequence(items)) => Ok(items.clone()),
            Some(SequenceBinding::Rdd(rdd)) => Ok(Arc::new(rdd.collect())),
            Some(SequenceBinding::Count(_)) => Err(RuntimeError::iterator_flow(
                format!("variable ${} was projected to its count only", name),
                location.clone(),
            )),
            None => Err(RuntimeError::dynamic(
                format!("variable ${} is not bound", name),
                location.clone(),
            )),
        }
    }

    /// The cardinality of a variable's binding, without materializing
    pub fn count(&self, name: &str, location: &SourceLocation) -> Result<i64> {
        match self.lookup(name) {
            Some(SequenceBinding::Sequence(items)) => Ok(items.len() as i64),
            Some(SequenceBinding::Rdd(rdd)) => Ok(rdd.count() as i64),
            Some(SequenceBinding::Count(n)) => Ok(*n),
            None => Err(RuntimeError::dynamic(
                format!("variable ${} is not bound", name),
                location.clone(),
            )),
        }
    }

    /// The focus item, from the nearest frame that set one
    pub fn context_item(&self) -> Option<&Item> {
        match &self.context_item {
            Some(item) => Some(item),
            None => self.parent.as_ref().and_then(|p| p.context_item()),
        }
    }

    pub fn position(&self) -> Option<i64> {
        match self.position {
            Some(p) => Some(p),
            None => self.parent.as_ref().and_then(|p| p.position()),
        }
    }

    pub fn size(&self) -> Option<i64> {
        match self.size {
            Some(s) => Some(s),
            None => self.parent.as_ref().and_then(|p| p.size()),
        }
    }

    // === cancellation ===

    /// Raise `Cancelled` if the query's cancel flag is set
    pub fn check_cancelled(&self, location: &SourceLocation) -> Result<()> {
        if self.globals.is_cancelled() {
            Err(RuntimeError::Cancelled {
                location: location.clone(),
            })
        } else {
            Ok(())
        }
    }

    // === closures ===

    /// Deep-copy the subset of visible bindings a closure needs.
    ///
    /// Partitioned bindings are materialized: the snapshot must be
    /// self-contained so the closure can outlive this scope.
    pub fn snapshot(
        &self,
        names: &[Arc<str>],
        location: &SourceLocation,
    ) -> Result<Vec<(Arc<str>, Arc<Vec<Item>>)>> {
        let mut captured = Vec::with_capacity(names.len());
        for name in names {
            match self.lookup(name) {
                Some(SequenceBinding::Sequence(items)) => {
                    captured.push((name.clone(), items.clone()));
                }
                Some(SequenceBinding::Rdd(rdd)) => {
                    captured.push((name.clone(), Arc::new(rdd.collect())));
                }
                Some(SequenceBinding::Count(_)) => {
                    return Err(RuntimeError::iterator_flow(
                        format!("closure capture of count-projected variable ${}", name),
                        location.clone(),
                    ));
                }
                // free variables a function body mentions under a branch
                // that never runs may legitimately be unbound here
                None => {}
            }
        }
        Ok(captured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Arc<DynamicContext> {
        DynamicContext::root(Arc::new(Globals::new(RuntimeOptions::default()))).into_arc()
    }

    #[test]
    fn test_chain_lookup() {
        let root = root();
        let mut mid = DynamicContext::child(&root);
        mid.bind_sequence(Arc::from("x"), vec![Item::Integer(1)]);
        let mid = mid.into_arc();
        let leaf = DynamicContext::child(&mid).into_arc();

        let items = leaf.sequence("x", &SourceLocation::unknown()).unwrap();
        assert_eq!(items.as_ref(), &vec![Item::Integer(1)]);
        assert!(leaf.sequence("missing", &SourceLocation::unknown()).is_err());
    }

    #[test]
    fn test_shadowing() {
        let root = root();
        let mut outer = DynamicContext::child(&root);
        outer.bind_sequence(Arc::from("x"), vec![Item::Integer(1)]);
        let outer = outer.into_arc();
        let mut inner = DynamicContext::child(&outer);
        inner.bind_sequence(Arc::from("x"), vec![Item::Integer(2)]);
        let inner = inner.into_arc();

        assert_eq!(
            inner.sequence("x", &SourceLocation::unknown()).unwrap()[0],
            Item::Integer(2)
        );
        assert_eq!(
            outer.sequence("x", &SourceLocation::unknown()).unwrap()[0],
            Item::Integer(1)
        );
    }

    #[test]
    fn test_count_binding() {
        let root = root();
        let mut ctx = DynamicContext::child(&root);
        ctx.bind_count(Arc::from("x"), 7);
        let ctx = ctx.into_arc();
        assert_eq!(ctx.count("x", &SourceLocation::unknown()).unwrap(), 7);
        assert!(ctx.sequence("x", &SourceLocation::unknown()).is_err());
    }

    #[test]
    fn test_cancellation() {
        let root = root();
        assert!(root.check_cancelled(&SourceLocation::unknown()).is_ok());
        root.globals().cancel();
        assert!(matches!(
            root.check_cancelled(&SourceLocation::unknown()),
            Err(RuntimeError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_focus_inherited() {
        let root = root();
        let mut ctx = DynamicContext::child(&root);
        ctx.set_focus(Item::Integer(9), 2, 5);
        let ctx = ctx.into_arc();
        let leaf = DynamicContext::child(&ctx).into_arc();
        assert_eq!(leaf.position(), Some(2));
        assert_eq!(leaf.size(), Some(5));
        assert_eq!(leaf.context_item(), Some(&Item::Integer(9)));
    }
}
