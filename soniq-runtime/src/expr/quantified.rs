//! Quantified expressions: `some` / `every`
//!
//! Iterates the cartesian product of the binding sequences and evaluates
//! the predicate's effective boolean value per combination, short-
//! circuiting on the deciding value. The predicate is built fresh per
//! combination since it runs under a new frame.

use crate::ast::{ExprNode, QuantifierKind};
use crate::context::DynamicContext;
use crate::error::{Result, SourceLocation};
use crate::expr::{build_iterator, BuildEnv};
use crate::item::coerce::effective_boolean_value;
use crate::item::Item;
use crate::iterator::{materialize, BoxedIterator, IteratorCore, LocalStep};
use std::sync::Arc;

pub struct QuantifiedIterator {
    core: IteratorCore,
    kind: QuantifierKind,
    bindings: Vec<(Arc<str>, BoxedIterator)>,
    predicate: Arc<ExprNode>,
    env: Arc<BuildEnv>,
    result: Option<Item>,
}

impl QuantifiedIterator {
    pub fn new(
        kind: QuantifierKind,
        bindings: Vec<(Arc<str>, BoxedIterator)>,
        predicate: Arc<ExprNode>,
        env: Arc<BuildEnv>,
        metadata: SourceLocation,
    ) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            kind,
            bindings,
            predicate,
            env,
            result: None,
        }
    }
}

impl LocalStep for QuantifiedIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();

        let mut names = Vec::with_capacity(self.bindings.len());
        let mut sequences = Vec::with_capacity(self.bindings.len());
        for (name, expr) in &mut self.bindings {
            names.push(name.clone());
            sequences.push(materialize(expr.as_mut(), ctx)?);
        }

        // `some` over any empty binding is false, `every` is true
        let deciding = self.kind == QuantifierKind::Some;
        if sequences.iter().any(|s| s.is_empty()) {
            self.result = Some(Item::Boolean(!deciding));
            return Ok(());
        }

        let mut odometer = vec![0usize; sequences.len()];
        let mut outcome = !deciding;
        'product: loop {
            ctx.check_cancelled(&location)?;

            let mut frame = DynamicContext::child(ctx);
            for (i, name) in names.iter().enumerate() {
                frame.bind_sequence(name.clone(), vec![sequences[i][odometer[i]].clone()]);
            }
            let frame = frame.into_arc();

            let mut predicate = build_iterator(&self.predicate, &self.env)?;
            let verdict = materialize(predicate.as_mut(), &frame)
                .and_then(|items| effective_boolean_value(&items, &location))?;
            if verdict == deciding {
                outcome = deciding;
                break 'product;
            }

            // advance the odometer
            let mut position = sequences.len();
            loop {
                if position == 0 {
                    break 'product;
                }
                position -= 1;
                odometer[position] += 1;
                if odometer[position] < sequences[position].len() {
                    break;
                }
                odometer[position] = 0;
            }
        }

        self.result = Some(Item::Boolean(outcome));
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        Ok(self.result.take())
    }

    fn release(&mut self) {
        self.result = None;
    }
}
