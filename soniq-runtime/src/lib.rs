//! # soniq-runtime
//!
//! The core of the soniq JSONiq engine: a tree-walking runtime over a
//! JSONiq expression AST that streams items and FLWOR tuples through
//! composable iterators, with a dual local/distributed execution mode.
//!
//! This crate provides:
//! - The [`item`] model: the heterogeneous value algebra with its
//!   ordering/equality semantics and JSON text encoding
//! - The [`iterator`] protocol: the uniform pull-based streaming contract
//!   every expression implements, with opt-in distributed capability
//! - The [`flwor`] pipeline: For/Let/Where/GroupBy/OrderBy/Count/Return
//!   over an intermediate tuple stream, including the two OrderBy
//!   algorithms
//! - The [`functions`] registry with a built-in library and user function
//!   dispatch, recursion included
//! - The [`exec`] driver for batch programs
//!
//! The distributed backend interface lives in `soniq-backend`; the leaf
//! value machinery (temporal types, numeric tower, binary codecs) in
//! `soniq-core`.

pub mod ast;
pub mod context;
pub mod error;
pub mod exec;
pub mod expr;
pub mod flwor;
pub mod functions;
pub mod item;
pub mod iterator;
pub mod options;
pub mod sources;
pub mod tabular;

// Re-exports
pub use ast::{
    ArithmeticOp, Clause, ComparisonKind, ComparisonOp, ExecutionMode, ExprKind, ExprNode,
    FlworExpr, GroupKey, OrderSpec, QuantifierKind, SwitchCase, TypeFilter, TypeswitchCase,
    VariableDependency, VariableDependencyMap,
};
pub use context::{DynamicContext, Globals, SequenceBinding};
pub use error::{Result, RuntimeError, SourceLocation};
pub use exec::{Engine, Program, Prolog};
pub use expr::{build_iterator, BuildEnv};
pub use flwor::tuple::{FlworTuple, TupleField};
pub use flwor::{build_flwor_iterator, BoxedTupleIterator, TupleIterator};
pub use functions::registry::FunctionRegistry;
pub use functions::{FunctionIdentifier, FunctionItem, UserFunction};
pub use item::json::{item_from_json, item_to_json, parse_item, serialize_item};
pub use item::{Item, ObjectItem};
pub use iterator::{
    materialize, BoxedIterator, ExecutionKind, IteratorState, RuntimeIterator,
};
pub use options::RuntimeOptions;
pub use sources::{CollectionIterator, InMemorySource, ItemSource};

// Re-export the backend surface for embedders
pub use soniq_backend::{Frame, Rdd, Session};
