//! Where clause
//!
//! Filters tuples by the predicate's effective boolean value.

use crate::ast::{ExprNode, VariableDependencyMap};
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError};
use crate::expr::BuildEnv;
use crate::flwor::frame;
use crate::flwor::tuple::FlworTuple;
use crate::flwor::{BoxedTupleIterator, ClauseInfo, TupleCore, TupleIterator, TupleSource, TupleStep};
use crate::item::coerce::effective_boolean_value;
use soniq_backend::Frame;
use std::sync::Arc;

pub struct WhereClauseIterator {
    core: TupleCore,
    child: BoxedTupleIterator,
    expr_ast: Arc<ExprNode>,
    env: Arc<BuildEnv>,
    source: Option<TupleSource>,
}

impl WhereClauseIterator {
    pub fn new(
        child: BoxedTupleIterator,
        expr_ast: Arc<ExprNode>,
        info: ClauseInfo,
        env: Arc<BuildEnv>,
    ) -> Self {
        Self {
            core: TupleCore::new(info),
            child,
            expr_ast,
            env,
            source: None,
        }
    }
}

impl TupleStep for WhereClauseIterator {
    fn core(&self) -> &TupleCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TupleCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        self.source = Some(TupleSource::start(
            Some(&mut self.child),
            ctx,
            &self.core.info.child_projection,
            &self.env,
            &self.core.info.metadata,
        )?);
        Ok(())
    }

    fn step(&mut self) -> Result<Option<FlworTuple>> {
        let metadata = self.core.info.metadata.clone();
        let ctx = self
            .core
            .ctx()
            .cloned()
            .ok_or_else(|| RuntimeError::iterator_flow("clause consumed before open", metadata.clone()))?;
        loop {
            let Some(source) = &mut self.source else {
                return Ok(None);
            };
            let Some(input) = source.next(Some(&mut self.child))? else {
                return Ok(None);
            };
            let frame_ctx = crate::flwor::tuple_frame(&ctx, &input);
            let predicate = crate::flwor::eval_expr(&self.expr_ast, &self.env, &frame_ctx)?;
            if effective_boolean_value(&predicate, &metadata)? {
                return Ok(Some(input.project(&self.core.info.downstream)));
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.finish(Some(&mut self.child));
        }
    }

    fn is_dataframe_capable(&self) -> bool {
        self.child.is_dataframe()
    }

    fn to_dataframe(
        &mut self,
        ctx: &Arc<DynamicContext>,
        projection: &VariableDependencyMap,
    ) -> Result<Frame> {
        let metadata = self.core.info.metadata.clone();
        let child_projection = self.core.info.project_through(projection);
        let df = self.child.dataframe(ctx, &child_projection)?;
        let child_schema = df.schema().clone();

        let expr_ast = self.expr_ast.clone();
        let env = self.env.clone();
        let ctx = ctx.clone();
        let meta = metadata.clone();
        let filtered = df
            .filter_rows(&move |row| {
                let (frame_ctx, _tuple) =
                    frame::row_context(&ctx, row, &child_schema, &env.registry, &meta)
                        .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
                let predicate = crate::flwor::eval_expr(&expr_ast, &env, &frame_ctx)
                    .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
                effective_boolean_value(&predicate, &meta)
                    .map_err(|e| Box::new(e) as soniq_backend::UdfError)
            })
            .map_err(|e| RuntimeError::from_backend(e, metadata.clone()))?;

        // the child materialized a superset; narrow to what the parent needs
        frame::reproject(filtered, projection, &self.env, &metadata)
    }
}
