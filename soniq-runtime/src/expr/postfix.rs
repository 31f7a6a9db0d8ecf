//! Postfix expressions: predicates, object lookup, array lookup
//!
//! Each step streams over its base. Predicates materialize the base first
//! because the focus carries position *and* size; lookups stream item by
//! item.

use crate::ast::{ExprKind, ExprNode};
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::expr::{build_iterator, BuildEnv};
use crate::item::coerce::{effective_boolean_value, exactly_one};
use crate::item::ordering::compare_values;
use crate::item::Item;
use crate::iterator::{materialize, BoxedIterator, ChildStream, IteratorCore, LocalStep};
use std::cmp::Ordering;
use std::sync::Arc;

/// `base[predicate]` — positional or boolean filtering
pub struct PredicateIterator {
    core: IteratorCore,
    base: BoxedIterator,
    predicate: Arc<ExprNode>,
    env: Arc<BuildEnv>,
    /// fast path: a literal integer predicate is a direct index
    literal_position: Option<i64>,
    matches: std::vec::IntoIter<Item>,
}

impl PredicateIterator {
    pub fn new(
        base: BoxedIterator,
        predicate: Arc<ExprNode>,
        env: Arc<BuildEnv>,
        metadata: SourceLocation,
    ) -> Self {
        let literal_position = match &predicate.kind {
            ExprKind::IntegerLiteral(lexical) => lexical.parse::<i64>().ok(),
            _ => None,
        };
        Self {
            core: IteratorCore::new(metadata),
            base,
            predicate,
            env,
            literal_position,
            matches: Vec::new().into_iter(),
        }
    }
}

impl LocalStep for PredicateIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let base = materialize(self.base.as_mut(), ctx)?;

        if let Some(position) = self.literal_position {
            let mut out = Vec::new();
            if position >= 1 {
                if let Some(item) = base.get(position as usize - 1) {
                    out.push(item.clone());
                }
            }
            self.matches = out.into_iter();
            return Ok(());
        }

        let size = base.len() as i64;
        let mut out = Vec::new();
        for (index, item) in base.into_iter().enumerate() {
            ctx.check_cancelled(&location)?;
            let position = index as i64 + 1;

            let mut frame = DynamicContext::child(ctx);
            frame.set_focus(item.clone(), position, size);
            let frame = frame.into_arc();

            let mut predicate = build_iterator(&self.predicate, &self.env)?;
            let result = materialize(predicate.as_mut(), &frame)?;

            let keep = match result.as_slice() {
                [single] if single.is_numeric() => {
                    compare_values(single, &Item::Integer(position)) == Some(Ordering::Equal)
                }
                other => effective_boolean_value(other, &location)?,
            };
            if keep {
                out.push(item);
            }
        }
        self.matches = out.into_iter();
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        Ok(self.matches.next())
    }

    fn release(&mut self) {
        self.matches = Vec::new().into_iter();
    }
}

/// `base.key` — member lookup; non-objects produce nothing
pub struct ObjectLookupIterator {
    core: IteratorCore,
    base: BoxedIterator,
    key: BoxedIterator,
    key_value: Option<Arc<str>>,
    stream: Option<ChildStream>,
}

impl ObjectLookupIterator {
    pub fn new(base: BoxedIterator, key: BoxedIterator, metadata: SourceLocation) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            base,
            key,
            key_value: None,
            stream: None,
        }
    }
}

impl LocalStep for ObjectLookupIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let key = exactly_one(
            materialize(self.key.as_mut(), ctx)?,
            "object lookup key",
            &location,
        )?;
        let key = match key {
            Item::String(s) => s,
            other => {
                return Err(RuntimeError::type_error(
                    format!("object lookup key must be a string, found {}", other.type_name()),
                    location,
                ))
            }
        };
        self.key_value = Some(key);
        self.stream = Some(ChildStream::start(self.base.as_mut(), ctx)?);
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(None);
        };
        let key = self.key_value.clone().unwrap_or_else(|| Arc::from(""));
        let result = loop {
            match stream.next(self.base.as_mut())? {
                None => break Ok(None),
                Some(Item::Object(object)) => {
                    if let Some(value) = object.get(&key) {
                        break Ok(Some(value.clone()));
                    }
                }
                Some(_) => {}
            }
        };
        self.stream = Some(stream);
        result
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.finish(self.base.as_mut());
        }
        self.key_value = None;
    }
}

/// `base[[index]]` — 1-based array member lookup; non-arrays and
/// out-of-bounds indices produce nothing
pub struct ArrayLookupIterator {
    core: IteratorCore,
    base: BoxedIterator,
    index: BoxedIterator,
    position: i64,
    stream: Option<ChildStream>,
}

impl ArrayLookupIterator {
    pub fn new(base: BoxedIterator, index: BoxedIterator, metadata: SourceLocation) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            base,
            index,
            position: 0,
            stream: None,
        }
    }
}

impl LocalStep for ArrayLookupIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let index = exactly_one(
            materialize(self.index.as_mut(), ctx)?,
            "array lookup index",
            &location,
        )?;
        self.position = index.as_integer().ok_or_else(|| {
            RuntimeError::type_error(
                format!(
                    "array lookup index must be an integer, found {}",
                    index.type_name()
                ),
                location,
            )
        })?;
        self.stream = Some(ChildStream::start(self.base.as_mut(), ctx)?);
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(None);
        };
        let position = self.position;
        let result = loop {
            match stream.next(self.base.as_mut())? {
                None => break Ok(None),
                Some(Item::Array(members)) => {
                    if position >= 1 {
                        if let Some(member) = members.get(position as usize - 1) {
                            break Ok(Some(member.clone()));
                        }
                    }
                }
                Some(_) => {}
            }
        };
        self.stream = Some(stream);
        result
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.finish(self.base.as_mut());
        }
    }
}
