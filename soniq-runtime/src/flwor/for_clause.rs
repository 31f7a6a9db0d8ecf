//! For clause
//!
//! For each input tuple, evaluates its expression and emits one output
//! tuple per produced item, extending the input with `var ← [item]` and
//! optionally a 1-based position variable. Output order is input tuples in
//! order, items in expression order within each.
//!
//! Distributed: a start-of-pipeline For over a partitioned source maps
//! each item to a one-binding tuple row; mid-pipeline it flat-maps the
//! child's frame. A position variable forces local evaluation.

use crate::ast::{ExprNode, VariableDependencyMap};
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError};
use crate::expr::{build_iterator, BuildEnv};
use crate::flwor::frame::{self, schema_for};
use crate::flwor::tuple::{FlworTuple, TupleField};
use crate::flwor::{BoxedTupleIterator, ClauseInfo, TupleCore, TupleIterator, TupleSource, TupleStep};
use crate::item::Item;
use crate::iterator::{materialize, BoxedIterator, ChildStream, RuntimeIterator};
use soniq_backend::{Frame, Rdd};
use std::sync::Arc;

pub struct ForClauseIterator {
    core: TupleCore,
    child: Option<BoxedTupleIterator>,
    var: Arc<str>,
    position_var: Option<Arc<str>>,
    expr_ast: Arc<ExprNode>,
    env: Arc<BuildEnv>,
    /// capability probe, taken at construction
    expr_prefers_rdd: bool,
    source: Option<TupleSource>,
    input_tuple: Option<FlworTuple>,
    expr_iter: Option<BoxedIterator>,
    expr_stream: Option<ChildStream>,
    position: i64,
}

impl ForClauseIterator {
    pub fn new(
        child: Option<BoxedTupleIterator>,
        var: Arc<str>,
        position_var: Option<Arc<str>>,
        expr_ast: Arc<ExprNode>,
        info: ClauseInfo,
        env: Arc<BuildEnv>,
    ) -> Self {
        // eager probe: construct the expression once to learn whether the
        // subtree prefers distributed evaluation
        let expr_prefers_rdd = build_iterator(&expr_ast, &env)
            .map(|it| it.is_rdd())
            .unwrap_or(false);
        Self {
            core: TupleCore::new(info),
            child,
            var,
            position_var,
            expr_ast,
            env,
            expr_prefers_rdd,
            source: None,
            input_tuple: None,
            expr_iter: None,
            expr_stream: None,
            position: 0,
        }
    }

    fn finish_expr(&mut self) {
        if let (Some(mut stream), Some(mut iter)) = (self.expr_stream.take(), self.expr_iter.take())
        {
            stream.finish(iter.as_mut());
        }
    }

    /// Start streaming the expression under the next input tuple
    fn start_input(&mut self, tuple: FlworTuple) -> Result<()> {
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
        let frame = crate::flwor::tuple_frame(&ctx, &tuple);
        let mut iter = build_iterator(&self.expr_ast, &self.env)?;
        let stream = match ChildStream::start(iter.as_mut(), &frame) {
            Ok(stream) => stream,
            Err(e) => {
                iter.close();
                return Err(e);
            }
        };
        self.input_tuple = Some(tuple);
        self.expr_iter = Some(iter);
        self.expr_stream = Some(stream);
        self.position = 0;
        Ok(())
    }
}

impl TupleStep for ForClauseIterator {
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
        self.input_tuple = None;
        self.position = 0;
        Ok(())
    }

    fn step(&mut self) -> Result<Option<FlworTuple>> {
        loop {
            if let (Some(stream), Some(iter)) = (&mut self.expr_stream, &mut self.expr_iter) {
                if let Some(item) = stream.next(iter.as_mut())? {
                    self.position += 1;
                    let input = self.input_tuple.as_ref().cloned().unwrap_or_default();
                    let mut out =
                        input.extended(self.var.clone(), TupleField::Sequence(Arc::new(vec![item])));
                    if let Some(pos_var) = &self.position_var {
                        out.bind(
                            pos_var.clone(),
                            TupleField::Sequence(Arc::new(vec![Item::Integer(self.position)])),
                        );
                    }
                    return Ok(Some(out.project(&self.core.info.downstream)));
                }
                self.finish_expr();
                self.input_tuple = None;
            }

            let Some(source) = &mut self.source else {
                return Ok(None);
            };
            match source.next(self.child.as_mut())? {
                None => return Ok(None),
                Some(tuple) => self.start_input(tuple)?,
            }
        }
    }

    fn release(&mut self) {
        self.finish_expr();
        if let Some(mut source) = self.source.take() {
            source.finish(self.child.as_mut());
        }
        self.input_tuple = None;
    }

    fn is_dataframe_capable(&self) -> bool {
        if self.position_var.is_some() {
            return false;
        }
        match &self.child {
            Some(child) => child.is_dataframe(),
            None => self.expr_prefers_rdd,
        }
    }

    fn to_dataframe(
        &mut self,
        ctx: &Arc<DynamicContext>,
        projection: &VariableDependencyMap,
    ) -> Result<Frame> {
        let metadata = self.core.info.metadata.clone();
        let schema = schema_for(projection, &metadata)?;

        match &mut self.child {
            None => {
                let mut expr = build_iterator(&self.expr_ast, &self.env)?;
                let rdd = if expr.is_rdd() {
                    expr.rdd(ctx)?
                } else {
                    Rdd::single_partition(materialize(expr.as_mut(), ctx)?)
                };
                let var = self.var.clone();
                let rows = rdd.try_map(|item| {
                    let tuple = FlworTuple::new().extended(
                        var.clone(),
                        TupleField::Sequence(Arc::new(vec![item.clone()])),
                    );
                    frame::encode_row(&tuple.project(projection), &schema, &metadata)
                })?;
                Frame::new(schema.clone(), rows)
                    .map_err(|e| RuntimeError::from_backend(e, metadata.clone()))
            }
            Some(child) => {
                let child_projection = self.core.info.project_through(projection);
                let df = child.dataframe(ctx, &child_projection)?;
                let child_schema = df.schema().clone();

                let var = self.var.clone();
                let expr_ast = self.expr_ast.clone();
                let env = self.env.clone();
                let ctx = ctx.clone();
                let meta = metadata.clone();
                let out_schema = schema.clone();
                df.flat_map_rows(schema, &move |row| {
                    let (frame_ctx, tuple) =
                        frame::row_context(&ctx, row, &child_schema, &env.registry, &meta)
                            .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
                    let items = crate::flwor::eval_expr(&expr_ast, &env, &frame_ctx)
                        .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
                    let mut rows = Vec::with_capacity(items.len());
                    for item in items {
                        let extended = tuple.extended(
                            var.clone(),
                            TupleField::Sequence(Arc::new(vec![item])),
                        );
                        let row = frame::encode_row(&extended.project(projection), &out_schema, &meta)
                            .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
                        rows.push(row);
                    }
                    Ok(rows)
                })
                .map_err(|e| RuntimeError::from_backend(e, metadata))
            }
        }
    }
}
