//! Function call iterators
//!
//! Static calls resolve through the registry at construction and build a
//! fresh body iterator each time they open, so recursion bottoms out
//! naturally: the recursive branch only constructs its callee when control
//! actually reaches it. `close` never cascades into a callee that was not
//! opened.

use crate::ast::ExprNode;
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::expr::{build_iterator, BuildEnv};
use crate::functions::builtins::{self, BuiltinKind};
use crate::functions::{FunctionItem, UserFunction};
use crate::item::Item;
use crate::iterator::{
    materialize, materialize_at_most_one, BoxedIterator, IteratorCore, LocalStep, RuntimeIterator,
};
use std::sync::Arc;

/// Builtin call: evaluates eagerly into a buffer, then streams it
pub struct BuiltinFunctionIterator {
    core: IteratorCore,
    kind: BuiltinKind,
    args: Vec<BoxedIterator>,
    buffer: std::vec::IntoIter<Item>,
}

impl BuiltinFunctionIterator {
    pub fn new(kind: BuiltinKind, args: Vec<BoxedIterator>, metadata: SourceLocation) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            kind,
            args,
            buffer: Vec::new().into_iter(),
        }
    }
}

impl LocalStep for BuiltinFunctionIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let result = builtins::compute(self.kind, &mut self.args, ctx, &location)?;
        self.buffer = result.into_iter();
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        Ok(self.buffer.next())
    }

    fn release(&mut self) {
        self.buffer = Vec::new().into_iter();
    }
}

/// `count($x)` over a bare variable: reads the binding's cardinality
/// without materializing it, which is what makes count projection sound.
pub struct VariableCountIterator {
    core: IteratorCore,
    var: Arc<str>,
    done: bool,
}

impl VariableCountIterator {
    pub fn new(var: Arc<str>, metadata: SourceLocation) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            var,
            done: false,
        }
    }
}

impl LocalStep for VariableCountIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, _ctx: &Arc<DynamicContext>) -> Result<()> {
        self.done = false;
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let ctx = self
            .core
            .ctx()
            .cloned()
            .ok_or_else(|| flow_no_context(&self.core.metadata))?;
        let count = ctx.count(&self.var, &self.core.metadata)?;
        Ok(Some(Item::Integer(count)))
    }

    fn release(&mut self) {}
}

/// Static call of a user-declared function
pub struct FunctionCallIterator {
    core: IteratorCore,
    declaration: Arc<UserFunction>,
    args: Vec<BoxedIterator>,
    env: Arc<BuildEnv>,
    invocation: Option<Invocation>,
}

impl FunctionCallIterator {
    pub fn new(
        declaration: Arc<UserFunction>,
        args: Vec<BoxedIterator>,
        env: Arc<BuildEnv>,
        metadata: SourceLocation,
    ) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            declaration,
            args,
            env,
            invocation: None,
        }
    }
}

impl LocalStep for FunctionCallIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let mut frame = DynamicContext::child(ctx);
        for (param, arg) in self.declaration.params.iter().zip(self.args.iter_mut()) {
            let items = materialize(arg.as_mut(), ctx)?;
            frame.bind_sequence(param.clone(), items);
        }
        self.invocation = Some(Invocation::open(
            &self.declaration.body,
            frame.into_arc(),
            &self.env,
        )?);
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        match &mut self.invocation {
            Some(invocation) => invocation.next_item(),
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        if let Some(invocation) = &mut self.invocation {
            invocation.close();
        }
        self.invocation = None;
    }
}

/// Call through a function item produced by an expression
pub struct DynamicCallIterator {
    core: IteratorCore,
    callee: BoxedIterator,
    args: Vec<BoxedIterator>,
    env: Arc<BuildEnv>,
    invocation: Option<Invocation>,
}

impl DynamicCallIterator {
    pub fn new(
        callee: BoxedIterator,
        args: Vec<BoxedIterator>,
        env: Arc<BuildEnv>,
        metadata: SourceLocation,
    ) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            callee,
            args,
            env,
            invocation: None,
        }
    }
}

impl LocalStep for DynamicCallIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let location = self.core.metadata.clone();
        let callee =
            materialize_at_most_one(self.callee.as_mut(), ctx, "callee of a dynamic call")?
                .ok_or_else(|| {
                    RuntimeError::dynamic("dynamic call of an empty sequence", location.clone())
                })?;
        let function = callee
            .as_function()
            .ok_or_else(|| {
                RuntimeError::type_error(
                    format!("dynamic call of a non-function {}", callee.type_name()),
                    location.clone(),
                )
            })?
            .clone();

        if function.params.len() != self.args.len() {
            return Err(RuntimeError::invalid_argument(
                format!(
                    "function expects {} arguments, got {}",
                    function.params.len(),
                    self.args.len()
                ),
                location,
            ));
        }

        // closure snapshot first, parameters on top
        let mut frame = DynamicContext::child(ctx);
        for (name, items) in &function.closure {
            frame.bind_shared(name.clone(), items.clone());
        }
        for (param, arg) in function.params.iter().zip(self.args.iter_mut()) {
            let items = materialize(arg.as_mut(), ctx)?;
            frame.bind_sequence(param.clone(), items);
        }
        self.invocation = Some(Invocation::open(
            &function.body,
            frame.into_arc(),
            &self.env,
        )?);
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        match &mut self.invocation {
            Some(invocation) => invocation.next_item(),
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        if let Some(invocation) = &mut self.invocation {
            invocation.close();
        }
        self.invocation = None;
    }
}

/// `name#arity`: a function item over a user declaration
pub struct NamedFunctionRefIterator {
    core: IteratorCore,
    identifier: crate::functions::FunctionIdentifier,
    env: Arc<BuildEnv>,
    done: bool,
}

impl NamedFunctionRefIterator {
    pub fn new(
        identifier: crate::functions::FunctionIdentifier,
        env: Arc<BuildEnv>,
        metadata: SourceLocation,
    ) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            identifier,
            env,
            done: false,
        }
    }
}

impl LocalStep for NamedFunctionRefIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, _ctx: &Arc<DynamicContext>) -> Result<()> {
        self.done = false;
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        match self.env.registry.resolve_user(&self.identifier) {
            Some(declaration) => Ok(Some(Item::Function(Arc::new(
                FunctionItem::from_declaration(&declaration),
            )))),
            None => Err(RuntimeError::FunctionNotFound {
                name: self.identifier.name.to_string(),
                arity: self.identifier.arity,
                location: self.core.metadata.clone(),
            }),
        }
    }

    fn release(&mut self) {}
}

/// Inline function literal: one function item with a captured closure
pub struct InlineFunctionIterator {
    core: IteratorCore,
    params: Vec<Arc<str>>,
    body: Arc<ExprNode>,
    /// free variables of the body, computed at construction
    captured_names: Vec<Arc<str>>,
    done: bool,
}

impl InlineFunctionIterator {
    pub fn new(
        params: Vec<Arc<str>>,
        body: Arc<ExprNode>,
        captured_names: Vec<Arc<str>>,
        metadata: SourceLocation,
    ) -> Self {
        Self {
            core: IteratorCore::new(metadata),
            params,
            body,
            captured_names,
            done: false,
        }
    }
}

impl LocalStep for InlineFunctionIterator {
    fn core(&self) -> &IteratorCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut IteratorCore {
        &mut self.core
    }

    fn init(&mut self, _ctx: &Arc<DynamicContext>) -> Result<()> {
        self.done = false;
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Item>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let ctx = self
            .core
            .ctx()
            .cloned()
            .ok_or_else(|| flow_no_context(&self.core.metadata))?;
        let closure = ctx.snapshot(&self.captured_names, &self.core.metadata)?;
        Ok(Some(Item::Function(Arc::new(FunctionItem {
            identifier: None,
            params: self.params.clone(),
            body: self.body.clone(),
            closure,
        }))))
    }

    fn release(&mut self) {}
}

/// An opened function body: a fresh iterator over the body AST plus the
/// frame it runs in. Distributed bodies are collected on open.
struct Invocation {
    body: BoxedIterator,
    opened: bool,
    collected: Option<std::vec::IntoIter<Item>>,
}

impl Invocation {
    fn open(
        body_ast: &Arc<ExprNode>,
        frame: Arc<DynamicContext>,
        env: &Arc<BuildEnv>,
    ) -> Result<Invocation> {
        let mut body = build_iterator(body_ast, env)?;
        if body.is_rdd() {
            let items = body.rdd(&frame)?.collect();
            return Ok(Invocation {
                body,
                opened: false,
                collected: Some(items.into_iter()),
            });
        }
        if let Err(e) = body.open(&frame) {
            body.close();
            return Err(e);
        }
        Ok(Invocation {
            body,
            opened: true,
            collected: None,
        })
    }

    fn next_item(&mut self) -> Result<Option<Item>> {
        if let Some(collected) = &mut self.collected {
            return Ok(collected.next());
        }
        if self.body.has_next() {
            self.body.next().map(Some)
        } else {
            Ok(None)
        }
    }

    fn close(&mut self) {
        if self.opened {
            self.body.close();
            self.opened = false;
        }
        self.collected = None;
    }
}

fn flow_no_context(location: &SourceLocation) -> RuntimeError {
    RuntimeError::iterator_flow("iterator consumed before open", location.clone())
}
