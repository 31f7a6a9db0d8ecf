//! Array and object constructors
//!
//! Builders materialize their member expressions and yield one structured
//! item, immutable from then on. Object construction enforces key
//! uniqueness and atomizes keys to strings.

use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::item::coerce::{at_most_one, exactly_one};
use crate::item::Item;
use crate::iterator::{materialize, BoxedIterator, IteratorCore, LocalStep};
use std::sync::Arc;

/// `[ expr? ]`
pub struct ArrayConstructorIterator {
    core: IteratorCore,
    members: Option<BoxedIterator>,
    result: Option<Item>,
}

impl ArrayConstructorIterator {
    pub fn new(members: Option<BoxedIterator>, metadata: SourceLocation) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            members,
            result: None,
        }
    }
}

impl LocalStep for ArrayConstructorIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let members = match &mut self.members {
            Some(inner) => materialize(inner.as_mut(), ctx)?,
            None => Vec::new(),
        };
        self.result = Some(Item::array(members));
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        Ok(self.result.take())
    }

    fn release(&mut self) {
        self.result = None;
    }
}

/// `{ key: value, ... }`
pub struct ObjectConstructorIterator {
    core: IteratorCore,
    pairs: Vec<(BoxedIterator, BoxedIterator)>,
    result: Option<Item>,
}

impl ObjectConstructorIterator {
    pub fn new(pairs: Vec<(BoxedIterator, BoxedIterator)>, metadata: SourceLocation) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            pairs,
            result: None,
        }
    }
}

impl LocalStep for ObjectConstructorIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let mut members = Vec::with_capacity(self.pairs.len());
        for (key_expr, value_expr) in &mut self.pairs {
            let key_item = exactly_one(
                materialize(key_expr.as_mut(), ctx)?,
                "object key",
                &location,
            )?;
            let key = key_item.string_value().ok_or_else(|| {
                RuntimeError::type_error(
                    format!("object key must be atomic, found {}", key_item.type_name()),
                    location.clone(),
                )
            })?;

            let value = match at_most_one(
                materialize(value_expr.as_mut(), ctx)?,
                "object member value",
                &location,
            )? {
                Some(item) => item,
                None => Item::Null,
            };
            members.push((Arc::from(key.as_str()), value));
        }
        self.result = Some(Item::object(members, &location)?);
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        Ok(self.result.take())
    }

    fn release(&mut self) {
        self.result = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Globals;
    use crate::expr::primary::LiteralIterator;
    use crate::options::RuntimeOptions;

    fn ctx() -> Arc<DynamicContext> {
        DynamicContext::root(Arc::new(Globals::new(RuntimeOptions::default()))).into_arc()
    }

    fn literal(item: Item) -> BoxedIterator {
        Box::new(LiteralIterator::new(item, SourceLocation::unknown()))
    }

    #[test]
    fn test_object_construction() {
        let mut ctor = ObjectConstructorIterator::new(
            vec![
                (literal(Item::string("a")), literal(Item::Integer(1))),
                (literal(Item::string("b")), literal(Item::Integer(2))),
            ],
            SourceLocation::unknown(),
        );
        let items = materialize(&mut ctor, &ctx()).unwrap();
        let object = items[0].as_object().unwrap();
        assert_eq!(object.get("a"), Some(&Item::Integer(1)));
        assert_eq!(object.get("b"), Some(&Item::Integer(2)));
    }

    #[test]
    fn test_duplicate_key_fails() {
        let mut ctor = ObjectConstructorIterator::new(
            vec![
                (literal(Item::string("a")), literal(Item::Integer(1))),
                (literal(Item::string("a")), literal(Item::Integer(2))),
            ],
            SourceLocation::unknown(),
        );
        assert!(matches!(
            materialize(&mut ctor, &ctx()),
            Err(RuntimeError::Dynamic { .. })
        ));
    }

    #[test]
    fn test_array_constructor() {
        let mut ctor = ArrayConstructorIterator::new(
            Some(literal(Item::Integer(7))),
            SourceLocation::unknown(),
        );
        let items = materialize(&mut ctor, &ctx()).unwrap();
        assert_eq!(items[0], Item::array(vec![Item::Integer(7)]));

        let mut empty = ArrayConstructorIterator::new(None, SourceLocation::unknown());
        let items = materialize(&mut empty, &ctx()).unwrap();
        assert_eq!(items[0], Item::array(vec![]));
    }
}
