//! Conditional expressions: if, switch, typeswitch

use crate::ast::{SwitchCase, TypeFilter, TypeswitchCase};
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::expr::{build_iterator, BuildEnv};
use crate::item::coerce::{at_most_one, effective_boolean_value};
use crate::item::ordering::equals;
use crate::item::Item;
use crate::iterator::{materialize, BoxedIterator, ChildStream, IteratorCore, LocalStep, RuntimeIterator};
use std::sync::Arc;

/// `if (cond) then ... else ...` — streams the chosen branch
pub struct IfIterator {
    core: IteratorCore,
    condition: BoxedIterator,
    then_branch: BoxedIterator,
    else_branch: BoxedIterator,
    active_then: bool,
    stream: Option<ChildStream>,
}

impl IfIterator {
    pub fn new(
        condition: BoxedIterator,
        then_branch: BoxedIterator,
        else_branch: BoxedIterator,
        metadata: SourceLocation,
    ) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            condition,
            then_branch,
            else_branch,
            active_then: false,
            stream: None,
        }
    }

}

impl LocalStep for IfIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let cond = materialize(self.condition.as_mut(), ctx)?;
        self.active_then = effective_boolean_value(&cond, &location)?;
        let branch = if self.active_then {
            &mut self.then_branch
        } else {
            &mut self.else_branch
        };
        let stream = ChildStream::start(branch.as_mut(), ctx)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(None);
        };
        let active_then = self.active_then;
        let branch = if active_then {
            &mut self.then_branch
        } else {
            &mut self.else_branch
        };
        let item = stream.next(branch.as_mut());
        self.stream = Some(stream);
        item
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let branch = if self.active_then {
                &mut self.then_branch
            } else {
                &mut self.else_branch
            };
            stream.finish(branch.as_mut());
        }
    }
}

/// `switch (subject) case ... default ...`
///
/// The subject atomizes to at most one item; each case comparand is
/// matched by value equality (null matches null). The first matching case
/// body streams; otherwise the default does.
pub struct SwitchIterator {
    core: IteratorCore,
    subject: BoxedIterator,
    cases: Vec<CompiledSwitchCase>,
    default: BoxedIterator,
    /// `None` after init means the default branch
    active: Option<usize>,
    stream: Option<ChildStream>,
}

pub struct CompiledSwitchCase {
    pub operands: Vec<BoxedIterator>,
    pub body: BoxedIterator,
}

impl SwitchIterator {
    pub fn new(
        subject: BoxedIterator,
        cases: Vec<CompiledSwitchCase>,
        default: BoxedIterator,
        metadata: SourceLocation,
    ) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            subject,
            cases,
            default,
            active: None,
            stream: None,
        }
    }

    fn active_body(&mut self) -> &mut BoxedIterator {
        match self.active {
            Some(i) => &mut self.cases[i].body,
            None => &mut self.default,
        }
    }
}

impl LocalStep for SwitchIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let subject = at_most_one(
            materialize(self.subject.as_mut(), ctx)?,
            "switch subject",
            &location,
        )?;
        if let Some(item) = &subject {
            if !item.is_atomic() {
                return Err(RuntimeError::type_error(
                    format!("switch subject must be atomic, found {}", item.type_name()),
                    location,
                ));
            }
        }

        self.active = None;
        'search: for (index, case) in self.cases.iter_mut().enumerate() {
            for operand in &mut case.operands {
                let comparand = at_most_one(
                    materialize(operand.as_mut(), ctx)?,
                    "switch case operand",
                    &location,
                )?;
                let matched = match (&subject, &comparand) {
                    (None, None) => true,
                    (Some(s), Some(c)) => equals(s, c) == Some(true),
                    _ => false,
                };
                if matched {
                    self.active = Some(index);
                    break 'search;
                }
            }
        }

        let stream = ChildStream::start(self.active_body().as_mut(), ctx)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(None);
        };
        let item = {
            let body = match self.active {
                Some(i) => &mut self.cases[i].body,
                None => &mut self.default,
            };
            stream.next(body.as_mut())
        };
        self.stream = Some(stream);
        item
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let body = match self.active {
                Some(i) => &mut self.cases[i].body,
                None => &mut self.default,
            };
            stream.finish(body.as_mut());
        }
    }
}

/// `typeswitch (subject) case ... default ...`
///
/// Matches the subject's dynamic type: a case fires when the subject is
/// non-empty and every item satisfies one of the case's filters. The case
/// variable, when declared, binds to the whole subject sequence. Bodies
/// are built fresh per evaluation because they run under the extended
/// frame.
pub struct TypeswitchIterator {
    core: IteratorCore,
    subject: BoxedIterator,
    cases: Vec<TypeswitchCase>,
    default_var: Option<Arc<str>>,
    default: Arc<crate::ast::ExprNode>,
    env: Arc<BuildEnv>,
    body: Option<BoxedIterator>,
    stream: Option<ChildStream>,
}

impl TypeswitchIterator {
    pub fn new(
        subject: BoxedIterator,
        cases: Vec<TypeswitchCase>,
        default_var: Option<Arc<str>>,
        default: Arc<crate::ast::ExprNode>,
        env: Arc<BuildEnv>,
        metadata: SourceLocation,
    ) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            subject,
            cases,
            default_var,
            default,
            env,
            body: None,
            stream: None,
        }
    }
}

fn sequence_matches(items: &[Item], filters: &[TypeFilter]) -> bool {
    !items.is_empty()
        && items
            .iter()
            .all(|item| filters.iter().any(|f| f.matches(item)))
}

impl LocalStep for TypeswitchIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let subject = materialize(self.subject.as_mut(), ctx)?;

        let (var, body_ast) = match self
            .cases
            .iter()
            .find(|case| sequence_matches(&subject, &case.types))
        {
            Some(case) => (case.var.clone(), case.body.clone()),
            None => (self.default_var.clone(), self.default.clone()),
        };

        let mut frame = DynamicContext::child(ctx);
        if let Some(var) = var {
            frame.bind_sequence(var, subject);
        }
        let frame = frame.into_arc();

        let mut body = build_iterator(&body_ast, &self.env)?;
        let stream = match ChildStream::start(body.as_mut(), &frame) {
            Ok(stream) => stream,
            Err(e) => {
                body.close();
                return Err(e);
            }
        };
        self.body = Some(body);
        self.stream = Some(stream);
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        let (Some(mut stream), Some(mut body)) = (self.stream.take(), self.body.take()) else {
            return Ok(None);
        };
        let item = stream.next(body.as_mut());
        self.stream = Some(stream);
        self.body = Some(body);
        item
    }

    fn release(&mut self) {
        if let (Some(mut stream), Some(mut body)) = (self.stream.take(), self.body.take()) {
            stream.finish(body.as_mut());
        }
    }
}
