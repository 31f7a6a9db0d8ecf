//! Count clause
//!
//! Extends each tuple with a 1-based position counter. The counter follows
//! the upstream tuple order, so it is deterministic for a deterministic
//! child; a distributed child is drained locally first, which pins the
//! order to the frame's partition order.

use crate::error::Result;
use crate::expr::BuildEnv;
use crate::flwor::tuple::{FlworTuple, TupleField};
use crate::flwor::{BoxedTupleIterator, ClauseInfo, TupleCore, TupleSource, TupleStep};
use crate::item::Item;
use std::sync::Arc;

pub struct CountClauseIterator {
    core: TupleCore,
    child: BoxedTupleIterator,
    var: Arc<str>,
    counter: i64,
    source: Option<TupleSource>,
    env: Arc<BuildEnv>,
}

impl CountClauseIterator {
    pub fn new(
        child: BoxedTupleIterator,
        var: Arc<str>,
        info: ClauseInfo,
        env: Arc<BuildEnv>,
    ) -> Self {
        Self {
            core: TupleCore::new(info),
            child,
            var,
            counter: 0,
            source: None,
            env,
        }
    }
}

impl TupleStep for CountClauseIterator {
    fn core(&self) -> &TupleCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TupleCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<crate::context::DynamicContext>) -> Result<()> {
        self.counter = 0;
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
        let Some(source) = &mut self.source else {
            return Ok(None);
        };
        let Some(input) = source.next(Some(&mut self.child))? else {
            return Ok(None);
        };
        self.counter += 1;
        let out = input.extended(
            self.var.clone(),
            TupleField::Sequence(Arc::new(vec![Item::Integer(self.counter)])),
        );
        Ok(Some(out.project(&self.core.info.downstream)))
    }

    fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.finish(Some(&mut self.child));
        }
    }
}
