//! The FLWOR pipeline
//!
//! Clauses are [`TupleIterator`]s: the same lifecycle as the item protocol
//! but yielding [`FlworTuple`]s. For/Let/Where/GroupBy/OrderBy/Count each
//! transform the tuple stream; Return terminates the pipeline by turning
//! tuples back into items (see the `return_clause` module).
//!
//! Projection flows through the pipeline at construction: each clause asks
//! downstream which of its variables are needed and in what form, and the
//! builder threads the answers backward so every clause knows both what to
//! emit and what to request from its child.
//!
//! In distributed mode tuples ride in a frame with one opaque binary
//! column plus dedicated long columns for count-projected variables; a
//! clause that cannot run distributed (GroupBy, Count) drains its child's
//! frame into local tuples and the pipeline continues locally above it.

pub mod count_clause;
pub mod for_clause;
pub mod frame;
pub mod group_by;
pub mod let_clause;
pub mod order_by;
pub mod return_clause;
pub mod tuple;
pub mod where_clause;

use crate::ast::{
    self, Clause, FlworExpr, VariableDependencyMap,
};
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::expr::BuildEnv;
use crate::item::Item;
use crate::iterator::{materialize, BoxedIterator, IteratorState};
use soniq_backend::Frame;
use std::sync::Arc;
use tuple::FlworTuple;

/// The streaming contract over FLWOR tuples
pub trait TupleIterator {
    fn metadata(&self) -> &SourceLocation;
    fn state(&self) -> IteratorState;

    fn open(&mut self, ctx: &Arc<DynamicContext>) -> Result<()>;
    fn has_next(&self) -> bool;
    fn next(&mut self) -> Result<FlworTuple>;
    fn close(&mut self);
    fn reset(&mut self, ctx: &Arc<DynamicContext>) -> Result<()>;

    /// Whether this subtree can produce a typed tabular stream
    fn is_dataframe(&self) -> bool {
        false
    }

    /// The pipeline up to here as a frame carrying `projection`
    fn dataframe(
        &mut self,
        _ctx: &Arc<DynamicContext>,
        _projection: &VariableDependencyMap,
    ) -> Result<Frame> {
        Err(RuntimeError::iterator_flow(
            "dataframe() called on a local-only clause",
            self.metadata().clone(),
        ))
    }

    /// Variables bound so far in the enclosing FLWOR (child's plus own)
    fn bound_variables(&self) -> &[Arc<str>];

    /// Upstream variables this clause (and its child chain) reads
    fn variable_dependencies(&self) -> &VariableDependencyMap;

    /// What the child must materialize: parent needs minus own bindings,
    /// united with this clause's own reads (conflicts resolve to Full)
    fn projection(&self, parent: &VariableDependencyMap) -> VariableDependencyMap;
}

/// Boxed tuple iterator for dynamic dispatch
pub type BoxedTupleIterator = Box<dyn TupleIterator>;

/// Static facts about a clause, precomputed by the pipeline builder
#[derive(Clone, Debug)]
pub struct ClauseInfo {
    pub metadata: SourceLocation,
    /// Variables this clause itself introduces
    pub own_bound: Vec<Arc<str>>,
    /// Variables this clause's own expressions read
    pub own_deps: VariableDependencyMap,
    /// Bound variables accumulated through the pipeline up to this clause
    pub bound_accumulated: Vec<Arc<str>>,
    /// Reads of the whole chain up to this clause, minus its bindings
    pub dependencies: VariableDependencyMap,
    /// What tuples emitted by this clause must carry
    pub downstream: VariableDependencyMap,
    /// What this clause requests from its child
    pub child_projection: VariableDependencyMap,
}

impl ClauseInfo {
    /// The generic projection rule shared by all clauses
    pub fn project_through(&self, parent: &VariableDependencyMap) -> VariableDependencyMap {
        let mut projection = parent.clone();
        for var in &self.own_bound {
            projection.remove(var);
        }
        ast::merge_dependencies(&mut projection, &self.own_deps);
        projection
    }
}

/// Lifecycle plumbing shared by clause implementations
#[derive(Debug)]
pub struct TupleCore {
    pub info: ClauseInfo,
    state: IteratorState,
    lookahead: Option<FlworTuple>,
    ctx: Option<Arc<DynamicContext>>,
}

impl TupleCore {
    pub fn new(info: ClauseInfo) -> Self {
        Self {
            info,
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

/// Implemented by clauses; the blanket impl supplies the lifecycle
pub trait TupleStep {
    fn core(&self) -> &TupleCore;
    fn core_mut(&mut self) -> &mut TupleCore;

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()>;
    fn step(&mut self) -> Result<Option<FlworTuple>>;
    fn release(&mut self);

    fn is_dataframe_capable(&self) -> bool {
        false
    }

    fn to_dataframe(
        &mut self,
        _ctx: &Arc<DynamicContext>,
        _projection: &VariableDependencyMap,
    ) -> Result<Frame> {
        Err(RuntimeError::iterator_flow(
            "dataframe() called on a local-only clause",
            self.core().info.metadata.clone(),
        ))
    }
}

fn open_clause<T: TupleStep + ?Sized>(it: &mut T, ctx: &Arc<DynamicContext>) -> Result<()> {
    it.core_mut().ctx = Some(ctx.clone());
    it.init(ctx)?;
    it.core_mut().state = IteratorState::Open;
    let first = it.step()?;
    it.core_mut().lookahead = first;
    Ok(())
}

impl<T: TupleStep> TupleIterator for T {
    fn metadata(&self) -> &SourceLocation {
        &self.core().info.metadata
    }

    fn state(&self) -> IteratorState {
        self.core().state()
    }

    fn open(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        match self.core().state {
            IteratorState::Created => open_clause(self, ctx),
            _ => Err(RuntimeError::iterator_flow(
                "open() called out of lifecycle",
                self.core().info.metadata.clone(),
            )),
        }
    }

    fn has_next(&self) -> bool {
        self.core().lookahead.is_some()
    }

    fn next(&mut self) -> Result<FlworTuple> {
        if self.core().state != IteratorState::Open {
            return Err(RuntimeError::iterator_flow(
                "next() called on a clause that is not open",
                self.core().info.metadata.clone(),
            ));
        }
        if let Some(ctx) = self.core().ctx.clone() {
            ctx.check_cancelled(&self.core().info.metadata)?;
        }
        match self.core_mut().lookahead.take() {
            Some(tuple) => {
                let following = self.step()?;
                self.core_mut().lookahead = following;
                Ok(tuple)
            }
            None => Err(RuntimeError::iterator_flow(
                "next() called on an exhausted clause",
                self.core().info.metadata.clone(),
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
        self.release();
        self.core_mut().lookahead = None;
        self.core_mut().state = IteratorState::Created;
        open_clause(self, ctx)
    }

    fn is_dataframe(&self) -> bool {
        self.is_dataframe_capable()
    }

    fn dataframe(
        &mut self,
        ctx: &Arc<DynamicContext>,
        projection: &VariableDependencyMap,
    ) -> Result<Frame> {
        self.to_dataframe(ctx, projection)
    }

    fn bound_variables(&self) -> &[Arc<str>] {
        &self.core().info.bound_accumulated
    }

    fn variable_dependencies(&self) -> &VariableDependencyMap {
        &self.core().info.dependencies
    }

    fn projection(&self, parent: &VariableDependencyMap) -> VariableDependencyMap {
        self.core().info.project_through(parent)
    }
}

/// Open a tuple child fresh, or rewind it on reuse
pub(crate) fn open_or_reset_clause(
    child: &mut dyn TupleIterator,
    ctx: &Arc<DynamicContext>,
) -> Result<()> {
    match child.state() {
        IteratorState::Created => child.open(ctx),
        IteratorState::Closed => child.reset(ctx),
        IteratorState::Open => Err(RuntimeError::iterator_flow(
            "clause is already open",
            child.metadata().clone(),
        )),
    }
}

/// Reads tuples from an optional child: local children stream, dataframe
/// children are drained once through their frame, a missing child yields a
/// single empty tuple (the pipeline's start).
pub(crate) struct TupleSource {
    drained: Option<std::vec::IntoIter<FlworTuple>>,
    opened: bool,
    start_emitted: bool,
}

impl TupleSource {
    pub(crate) fn start(
        child: Option<&mut BoxedTupleIterator>,
        ctx: &Arc<DynamicContext>,
        child_projection: &VariableDependencyMap,
        env: &Arc<BuildEnv>,
        metadata: &SourceLocation,
    ) -> Result<TupleSource> {
        match child {
            None => Ok(TupleSource {
                drained: None,
                opened: false,
                start_emitted: false,
            }),
            Some(child) => {
                if child.is_dataframe() {
                    let df = child.dataframe(ctx, child_projection)?;
                    let tuples = frame::decode_frame(&df, &env.registry, metadata)?;
                    Ok(TupleSource {
                        drained: Some(tuples.into_iter()),
                        opened: false,
                        start_emitted: true,
                    })
                } else {
                    open_or_reset_clause(child.as_mut(), ctx)?;
                    Ok(TupleSource {
                        drained: None,
                        opened: true,
                        start_emitted: true,
                    })
                }
            }
        }
    }

    pub(crate) fn next(
        &mut self,
        child: Option<&mut BoxedTupleIterator>,
    ) -> Result<Option<FlworTuple>> {
        if let Some(drained) = &mut self.drained {
            return Ok(drained.next());
        }
        if !self.opened {
            // start of the pipeline: exactly one empty tuple
            if self.start_emitted {
                return Ok(None);
            }
            self.start_emitted = true;
            return Ok(Some(FlworTuple::new()));
        }
        match child {
            Some(child) if child.has_next() => child.next().map(Some),
            _ => Ok(None),
        }
    }

    pub(crate) fn finish(&mut self, child: Option<&mut BoxedTupleIterator>) {
        if self.opened {
            if let Some(child) = child {
                child.close();
            }
            self.opened = false;
        }
        self.drained = None;
    }
}

/// Evaluate an expression AST to a materialized sequence under `ctx`
pub(crate) fn eval_expr(
    node: &Arc<ast::ExprNode>,
    env: &Arc<BuildEnv>,
    ctx: &Arc<DynamicContext>,
) -> Result<Vec<Item>> {
    let mut iter = crate::expr::build_iterator(node, env)?;
    materialize(iter.as_mut(), ctx)
}

/// A child frame of `ctx` with a tuple's bindings
pub(crate) fn tuple_frame(ctx: &Arc<DynamicContext>, tuple: &FlworTuple) -> Arc<DynamicContext> {
    let mut frame = DynamicContext::child(ctx);
    frame.bind_tuple(tuple);
    frame.into_arc()
}

// ============================================================================
// Pipeline construction
// ============================================================================

/// Build the iterator for a whole FLWOR expression.
///
/// Computes each clause's projection by walking the clause list backward
/// from the return expression, then builds the clause chain forward.
pub fn build_flwor_iterator(
    flwor: &FlworExpr,
    node: &ast::ExprNode,
    env: &Arc<BuildEnv>,
) -> Result<BoxedIterator> {
    if !matches!(
        flwor.clauses.first(),
        Some(Clause::For { .. }) | Some(Clause::Let { .. })
    ) {
        return Err(RuntimeError::invalid_argument(
            "a FLWOR expression must start with a for or let clause",
            node.location.clone(),
        ));
    }

    let return_projection = ast::variable_dependencies(&flwor.return_expr);

    // backward pass: what each clause must emit, and request from its child
    let count = flwor.clauses.len();
    let mut downstream: Vec<VariableDependencyMap> = vec![VariableDependencyMap::new(); count];
    let mut child_projection: Vec<VariableDependencyMap> =
        vec![VariableDependencyMap::new(); count];
    let mut next_needs = return_projection.clone();
    for index in (0..count).rev() {
        let clause = &flwor.clauses[index];
        downstream[index] = next_needs.clone();
        let own_bound = ast::clause_bound_variables(clause);
        let own_deps = ast::clause_dependencies(clause);
        let mut projection = next_needs.clone();
        for var in &own_bound {
            projection.remove(var);
        }
        ast::merge_dependencies(&mut projection, &own_deps);
        child_projection[index] = projection.clone();
        next_needs = projection;
    }

    // forward pass: accumulate bound variables and chain dependencies
    let mut pipeline: Option<BoxedTupleIterator> = None;
    let mut bound_accumulated: Vec<Arc<str>> = Vec::new();
    let mut chain_deps = VariableDependencyMap::new();

    for (index, clause) in flwor.clauses.iter().enumerate() {
        let own_bound = ast::clause_bound_variables(clause);
        let own_deps = ast::clause_dependencies(clause);

        let mut dependencies = own_deps.clone();
        for var in &bound_accumulated {
            dependencies.remove(var);
        }
        ast::merge_dependencies(&mut dependencies, &chain_deps);
        chain_deps = dependencies.clone();

        for var in &own_bound {
            if !bound_accumulated.contains(var) {
                bound_accumulated.push(var.clone());
            }
        }

        let info = ClauseInfo {
            metadata: clause_location(clause, node),
            own_bound,
            own_deps,
            bound_accumulated: bound_accumulated.clone(),
            dependencies,
            downstream: downstream[index].clone(),
            child_projection: child_projection[index].clone(),
        };

        pipeline = Some(build_clause(clause, pipeline, info, env)?);
    }

    let pipeline = pipeline.ok_or_else(|| {
        RuntimeError::invalid_argument(
            "a FLWOR expression requires at least one clause",
            node.location.clone(),
        )
    })?;

    Ok(Box::new(return_clause::FlworExpressionIterator::new(
        pipeline,
        flwor.return_expr.clone(),
        return_projection,
        env.clone(),
        node.location.clone(),
    )))
}

fn build_clause(
    clause: &Clause,
    child: Option<BoxedTupleIterator>,
    info: ClauseInfo,
    env: &Arc<BuildEnv>,
) -> Result<BoxedTupleIterator> {
    Ok(match clause {
        Clause::For {
            var,
            position_var,
            expr,
        } => Box::new(for_clause::ForClauseIterator::new(
            child,
            var.clone(),
            position_var.clone(),
            expr.clone(),
            info,
            env.clone(),
        )),
        Clause::Let { var, expr } => Box::new(let_clause::LetClauseIterator::new(
            child,
            var.clone(),
            expr.clone(),
            info,
            env.clone(),
        )),
        Clause::Where { expr } => Box::new(where_clause::WhereClauseIterator::new(
            required_child(child, &info)?,
            expr.clone(),
            info,
            env.clone(),
        )),
        Clause::GroupBy { keys } => Box::new(group_by::GroupByClauseIterator::new(
            required_child(child, &info)?,
            keys.clone(),
            info,
            env.clone(),
        )),
        Clause::OrderBy { specs, stable } => Box::new(order_by::OrderByClauseIterator::new(
            required_child(child, &info)?,
            specs.clone(),
            *stable,
            info,
            env.clone(),
        )),
        Clause::Count { var } => Box::new(count_clause::CountClauseIterator::new(
            required_child(child, &info)?,
            var.clone(),
            info,
            env.clone(),
        )),
    })
}

fn required_child(
    child: Option<BoxedTupleIterator>,
    info: &ClauseInfo,
) -> Result<BoxedTupleIterator> {
    child.ok_or_else(|| {
        RuntimeError::invalid_argument(
            "this clause cannot start a FLWOR expression",
            info.metadata.clone(),
        )
    })
}

fn clause_location(clause: &Clause, node: &ast::ExprNode) -> SourceLocation {
    match clause {
        Clause::For { expr, .. } | Clause::Let { expr, .. } | Clause::Where { expr } => {
            expr.location.clone()
        }
        Clause::GroupBy { keys } => keys
            .iter()
            .find_map(|k| k.expr.as_ref().map(|e| e.location.clone()))
            .unwrap_or_else(|| node.location.clone()),
        Clause::OrderBy { specs, .. } => specs
            .first()
            .map(|s| s.expr.location.clone())
            .unwrap_or_else(|| node.location.clone()),
        Clause::Count { .. } => node.location.clone(),
    }
}
