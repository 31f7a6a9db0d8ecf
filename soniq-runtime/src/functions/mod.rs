//! Function machinery: identifiers, function items, the registry, and the
//! call iterators

pub mod builtins;
pub mod call;
pub mod registry;

use crate::ast::ExprNode;
use crate::item::Item;
use std::fmt;
use std::sync::Arc;

/// A function's name and arity; resolution is arity-exact
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionIdentifier {
    pub name: Arc<str>,
    pub arity: usize,
}

impl FunctionIdentifier {
    pub fn new(name: impl Into<Arc<str>>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

impl fmt::Display for FunctionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.arity)
    }
}

/// A user-declared function captured during prolog processing
#[derive(Clone, Debug)]
pub struct UserFunction {
    pub identifier: FunctionIdentifier,
    pub params: Vec<Arc<str>>,
    pub body: Arc<ExprNode>,
}

/// A function item: parameters, body AST, and the captured environment.
///
/// The closure is an immutable snapshot of the free variables the body
/// reads, materialized at creation, so the item can outlive the scope it
/// was created in. Two function items are never equal by value.
#[derive(Clone, Debug)]
pub struct FunctionItem {
    /// Present for named functions; `None` for inline closures
    pub identifier: Option<FunctionIdentifier>,
    pub params: Vec<Arc<str>>,
    pub body: Arc<ExprNode>,
    pub closure: Vec<(Arc<str>, Arc<Vec<Item>>)>,
}

impl FunctionItem {
    /// Item for a user-declared function (empty closure; statics come from
    /// the module scope at call time)
    pub fn from_declaration(function: &UserFunction) -> Self {
        Self {
            identifier: Some(function.identifier.clone()),
            params: function.params.clone(),
            body: function.body.clone(),
            closure: Vec::new(),
        }
    }
}
