//! Let clause
//!
//! Binds the expression's value per input tuple: one output tuple per
//! input tuple. When downstream only counts the variable, the sequence is
//! streamed and counted without being stored — the count-projection path.

use crate::ast::{ExprNode, VariableDependency, VariableDependencyMap};
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError};
use crate::expr::{build_iterator, BuildEnv};
use crate::flwor::frame::{self, schema_for};
use crate::flwor::tuple::{FlworTuple, TupleField};
use crate::flwor::{BoxedTupleIterator, ClauseInfo, TupleCore, TupleIterator, TupleSource, TupleStep};
use crate::iterator::{materialize, ChildStream};
use soniq_backend::Frame;
use std::sync::Arc;

pub struct LetClauseIterator {
    core: TupleCore,
    child: Option<BoxedTupleIterator>,
    var: Arc<str>,
    expr_ast: Arc<ExprNode>,
    env: Arc<BuildEnv>,
    source: Option<TupleSource>,
}

impl LetClauseIterator {
    pub fn new(
        child: Option<BoxedTupleIterator>,
        var: Arc<str>,
        expr_ast: Arc<ExprNode>,
        info: ClauseInfo,
        env: Arc<BuildEnv>,
    ) -> Self {
        Self {
            core: TupleCore::new(info),
            child,
            var,
            expr_ast,
            env,
            source: None,
        }
    }

    /// Bind the let variable under the given frame, honoring the
    /// downstream dependency kind.
    fn binding_for(
        &self,
        frame_ctx: &Arc<DynamicContext>,
        dependency: Option<VariableDependency>,
    ) -> Result<TupleField> {
        match dependency {
            Some(VariableDependency::Count) => {
                // stream and count without materializing
                let mut iter = build_iterator(&self.expr_ast, &self.env)?;
                let mut stream = ChildStream::start(iter.as_mut(), frame_ctx)?;
                let mut count: i64 = 0;
                while stream.next(iter.as_mut())?.is_some() {
                    count += 1;
                }
                stream.finish(iter.as_mut());
                Ok(TupleField::Count(count))
            }
            _ => {
                let mut iter = build_iterator(&self.expr_ast, &self.env)?;
                let items = materialize(iter.as_mut(), frame_ctx)?;
                Ok(TupleField::Sequence(Arc::new(items)))
            }
        }
    }
}

impl TupleStep for LetClauseIterator {
    fn core(&self) -> &TupleCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TupleCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        self.source = Some(TupleSource::start(
            self.child.as_mut(),
            ctx,
            &self.core.info.child_projection,
            &self.env,
            &self.core.info.metadata,
        )?);
        Ok(())
    }

    fn step(&mut self) -> Result<Option<FlworTuple>> {
        let ctx = self
            .core
            .ctx()
            .cloned()
            .ok_or_else(|| {
                RuntimeError::iterator_flow(
                    "clause consumed before open",
                    self.core.info.metadata.clone(),
                )
            })?;
        let Some(source) = &mut self.source else {
            return Ok(None);
        };
        let Some(input) = source.next(self.child.as_mut())? else {
            return Ok(None);
        };

        let frame_ctx = crate::flwor::tuple_frame(&ctx, &input);
        let dependency = self.core.info.downstream.get(&self.var).copied();
        let field = self.binding_for(&frame_ctx, dependency)?;
        let out = input.extended(self.var.clone(), field);
        Ok(Some(out.project(&self.core.info.downstream)))
    }

    fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.finish(self.child.as_mut());
        }
    }

    fn is_dataframe_capable(&self) -> bool {
        match &self.child {
            Some(child) => child.is_dataframe(),
            None => false,
        }
    }

    fn to_dataframe(
        &mut self,
        ctx: &Arc<DynamicContext>,
        projection: &VariableDependencyMap,
    ) -> Result<Frame> {
        let metadata = self.core.info.metadata.clone();
        let schema = schema_for(projection, &metadata)?;

        let Some(child) = &mut self.child else {
            return Err(RuntimeError::iterator_flow(
                "dataframe() on a start-of-pipeline let clause",
                metadata,
            ));
        };
        let child_projection = self.core.info.project_through(projection);
        let df = child.dataframe(ctx, &child_projection)?;
        let child_schema = df.schema().clone();

        let var = self.var.clone();
        let expr_ast = self.expr_ast.clone();
        let env = self.env.clone();
        let dependency = projection.get(&self.var).copied();
        let projection = projection.clone();
        let ctx = ctx.clone();
        let meta = metadata.clone();
        let out_schema = schema.clone();
        df.flat_map_rows(schema, &move |row| {
            let (frame_ctx, tuple) =
                frame::row_context(&ctx, row, &child_schema, &env.registry, &meta)
                    .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
            let field = match dependency {
                Some(VariableDependency::Count) => {
                    let items = crate::flwor::eval_expr(&expr_ast, &env, &frame_ctx)
                        .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
                    TupleField::Count(items.len() as i64)
                }
                _ => {
                    let items = crate::flwor::eval_expr(&expr_ast, &env, &frame_ctx)
                        .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
                    TupleField::Sequence(Arc::new(items))
                }
            };
            let out = tuple.extended(var.clone(), field);
            let row = frame::encode_row(&out.project(&projection), &out_schema, &meta)
                .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
            Ok(vec![row])
        })
        .map_err(|e| RuntimeError::from_backend(e, metadata))
    }
}
