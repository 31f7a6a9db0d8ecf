//! Function registry
//!
//! Maps `(name, arity)` to something callable: user functions declared in
//! the prolog, or the static builtin table. Resolution is arity-exact and
//! tries user scope first. Recursion and mutual recursion work because
//! bodies are only turned into iterators when a call opens, never at
//! registration.

use super::{FunctionIdentifier, UserFunction};
use crate::error::{Result, RuntimeError};
use crate::functions::builtins::BuiltinKind;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Outcome of resolving an identifier
#[derive(Clone, Debug)]
pub enum ResolvedFunction {
    User(Arc<UserFunction>),
    Builtin(BuiltinKind),
}

/// Registry of callable functions
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    user: FxHashMap<FunctionIdentifier, Arc<UserFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user function; redeclaring an identifier is an error.
    pub fn declare(&mut self, function: UserFunction) -> Result<()> {
        let identifier = function.identifier.clone();
        if self.user.contains_key(&identifier) {
            return Err(RuntimeError::invalid_argument(
                format!("function {} is already declared", identifier),
                function.body.location.clone(),
            ));
        }
        self.user.insert(identifier, Arc::new(function));
        Ok(())
    }

    /// Look up a user function only (wire reconstitution)
    pub fn resolve_user(&self, identifier: &FunctionIdentifier) -> Option<Arc<UserFunction>> {
        self.user.get(identifier).cloned()
    }

    /// Resolve an identifier: user scope first, then builtins
    pub fn resolve(&self, identifier: &FunctionIdentifier) -> Option<ResolvedFunction> {
        if let Some(user) = self.user.get(identifier) {
            return Some(ResolvedFunction::User(user.clone()));
        }
        BuiltinKind::lookup(&identifier.name, identifier.arity).map(ResolvedFunction::Builtin)
    }

    /// Number of user declarations
    pub fn user_len(&self) -> usize {
        self.user.len()
    }
}
