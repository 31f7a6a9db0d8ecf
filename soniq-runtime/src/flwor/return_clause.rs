//! Return clause: the FLWOR expression iterator
//!
//! Terminates the tuple pipeline: evaluates the return expression per
//! tuple and flattens the resulting sequences into the enclosing item
//! stream. This is the hybrid node of a FLWOR expression — when the clause
//! pipeline can produce a frame, the whole expression reports RDD
//! capability and materializes by mapping the frame's rows through the
//! return expression.

use crate::ast::{ExprNode, VariableDependencyMap};
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::expr::{build_iterator, BuildEnv};
use crate::flwor::frame as tuple_frame_codec;
use crate::flwor::tuple::FlworTuple;
use crate::flwor::{BoxedTupleIterator, TupleIterator, TupleSource};
use crate::item::Item;
use crate::iterator::{BoxedIterator, ChildStream, ExecutionKind, IteratorState, RuntimeIterator};
use soniq_backend::Rdd;
use std::sync::Arc;

pub struct FlworExpressionIterator {
    metadata: SourceLocation,
    pipeline: BoxedTupleIterator,
    return_expr: Arc<ExprNode>,
    return_projection: VariableDependencyMap,
    env: Arc<BuildEnv>,
    state: IteratorState,
    ctx: Option<Arc<DynamicContext>>,
    source: Option<TupleSource>,
    body: Option<BoxedIterator>,
    body_stream: Option<ChildStream>,
    lookahead: Option<Item>,
}

impl FlworExpressionIterator {
    pub fn new(
        pipeline: BoxedTupleIterator,
        return_expr: Arc<ExprNode>,
        return_projection: VariableDependencyMap,
        env: Arc<BuildEnv>,
        metadata: SourceLocation,
    ) -> Self {
        Self {
            metadata,
            pipeline,
            return_expr,
            return_projection,
            env,
            state: IteratorState::Created,
            ctx: None,
            source: None,
            body: None,
            body_stream: None,
            lookahead: None,
        }
    }

    fn finish_body(&mut self) {
        if let (Some(mut stream), Some(mut body)) = (self.body_stream.take(), self.body.take()) {
            stream.finish(body.as_mut());
        }
    }

    /// Open the return expression under the next tuple's frame
    fn start_tuple(&mut self, tuple: &FlworTuple) -> Result<()> {
        let ctx = self.ctx.clone().ok_or_else(|| {
            RuntimeError::iterator_flow("iterator consumed before open", self.metadata.clone())
        })?;
        let frame = crate::flwor::tuple_frame(&ctx, tuple);
        let mut body = build_iterator(&self.return_expr, &self.env)?;
        let stream = match ChildStream::start(body.as_mut(), &frame) {
            Ok(stream) => stream,
            Err(e) => {
                body.close();
                return Err(e);
            }
        };
        self.body = Some(body);
        self.body_stream = Some(stream);
        Ok(())
    }

    /// Advance to the next item, refilling the lookahead
    fn advance(&mut self) -> Result<Option<Item>> {
        loop {
            if let (Some(stream), Some(body)) = (&mut self.body_stream, &mut self.body) {
                if let Some(item) = stream.next(body.as_mut())? {
                    return Ok(Some(item));
                }
                self.finish_body();
            }

            let Some(source) = &mut self.source else {
                return Ok(None);
            };
            match source.next(Some(&mut self.pipeline))? {
                None => return Ok(None),
                Some(tuple) => self.start_tuple(&tuple)?,
            }
        }
    }
}

impl RuntimeIterator for FlworExpressionIterator {
    fn metadata(&self) -> &SourceLocation {
        &self.metadata
    }

    fn state(&self) -> IteratorState {
        self.state
    }

    fn execution_kind(&self) -> ExecutionKind {
        if self.pipeline.is_dataframe() {
            ExecutionKind::DataFrameCapable
        } else {
            ExecutionKind::LocalOnly
        }
    }

    fn open(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        if self.is_rdd() {
            return Err(RuntimeError::iterator_flow(
                "open() on a distributed FLWOR expression; use rdd()",
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
        self.source = Some(TupleSource::start(
            Some(&mut self.pipeline),
            ctx,
            &self.return_projection,
            &self.env,
            &self.metadata,
        )?);
        self.state = IteratorState::Open;
        self.lookahead = self.advance()?;
        Ok(())
    }

    fn has_next(&self) -> bool {
        self.lookahead.is_some()
    }

    fn next(&mut self) -> Result<Item> {
        if self.state != IteratorState::Open {
            return Err(RuntimeError::iterator_flow(
                "next() called on an iterator that is not open",
                self.metadata.clone(),
            ));
        }
        if let Some(ctx) = &self.ctx {
            ctx.check_cancelled(&self.metadata)?;
        }
        match self.lookahead.take() {
            Some(item) => {
                self.lookahead = self.advance()?;
                Ok(item)
            }
            None => Err(RuntimeError::iterator_flow(
                "next() called on an exhausted FLWOR expression",
                self.metadata.clone(),
            )),
        }
    }

    fn close(&mut self) {
        if self.state == IteratorState::Closed {
            return;
        }
        self.finish_body();
        if let Some(mut source) = self.source.take() {
            source.finish(Some(&mut self.pipeline));
        }
        self.lookahead = None;
        self.ctx = None;
        self.state = IteratorState::Closed;
    }

    fn reset(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        self.close();
        self.state = IteratorState::Created;
        self.open(ctx)
    }

    /// The pipeline's frame; the return expression's own dependencies
    /// govern the layout, not the caller's projection.
    fn dataframe(
        &mut self,
        ctx: &Arc<DynamicContext>,
        _projection: &VariableDependencyMap,
    ) -> Result<soniq_backend::Frame> {
        self.pipeline.dataframe(ctx, &self.return_projection)
    }

    fn rdd(&mut self, ctx: &Arc<DynamicContext>) -> Result<Rdd<Item>> {
        let df = self
            .pipeline
            .dataframe(ctx, &self.return_projection)?;
        let schema = df.schema().clone();
        let env = self.env.clone();
        let return_expr = self.return_expr.clone();
        let ctx = ctx.clone();
        let metadata = self.metadata.clone();
        df.rows().try_flat_map(|row| {
            let (frame_ctx, _tuple) =
                tuple_frame_codec::row_context(&ctx, row, &schema, &env.registry, &metadata)?;
            crate::flwor::eval_expr(&return_expr, &env, &frame_ctx)
        })
    }
}
