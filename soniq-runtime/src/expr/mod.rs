//! Expression iterators and iterator construction
//!
//! [`build_iterator`] is the construction traversal over the AST: one
//! dispatch arm per expression kind, producing the iterator tree the
//! driver opens. Construction is cheap and infallible for well-formed
//! input; the errors it can raise are name-resolution failures (unknown
//! functions, unknown collections) and malformed literals.

pub mod arithmetic;
pub mod comparison;
pub mod constructors;
pub mod control;
pub mod logical;
pub mod postfix;
pub mod primary;
pub mod quantified;
pub mod range;
pub mod sequence;

use crate::ast::{self, ExprKind, ExprNode, ExecutionMode};
use crate::error::{Result, RuntimeError};
use crate::functions::call::{
    BuiltinFunctionIterator, DynamicCallIterator, FunctionCallIterator, InlineFunctionIterator,
    NamedFunctionRefIterator, VariableCountIterator,
};
use crate::functions::registry::{FunctionRegistry, ResolvedFunction};
use crate::functions::FunctionIdentifier;
use crate::item::Item;
use crate::iterator::{BoxedIterator, ExecutionKind};
use crate::sources::{CollectionIterator, ItemSource};
use rustc_hash::FxHashMap;
use soniq_core::{parse_integer_lexical, ParsedInteger};
use std::sync::Arc;

/// Everything iterator construction needs besides the AST
#[derive(Debug)]
pub struct BuildEnv {
    pub registry: Arc<FunctionRegistry>,
    pub sources: FxHashMap<Arc<str>, Arc<dyn ItemSource>>,
}

impl BuildEnv {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self {
            registry,
            sources: FxHashMap::default(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn ItemSource>) -> Self {
        self.sources.insert(Arc::from(source.name()), source);
        self
    }
}

/// Construct the iterator tree for an expression
pub fn build_iterator(node: &Arc<ExprNode>, env: &Arc<BuildEnv>) -> Result<BoxedIterator> {
    let location = node.location.clone();
    Ok(match &node.kind {
        ExprKind::NullLiteral => literal(Item::Null, node),
        ExprKind::BooleanLiteral(b) => literal(Item::Boolean(*b), node),
        ExprKind::StringLiteral(s) => literal(Item::string(s.as_str()), node),
        ExprKind::DoubleLiteral(d) => literal(Item::Double(*d), node),
        ExprKind::DecimalLiteral(d) => literal(Item::decimal(d.clone()), node),
        ExprKind::IntegerLiteral(lexical) => {
            let item = match parse_integer_lexical(lexical)
                .map_err(|e| RuntimeError::core(e, location.clone()))?
            {
                ParsedInteger::Integer(v) => Item::Integer(v),
                ParsedInteger::Decimal(d) => Item::decimal(d),
            };
            literal(item, node)
        }

        ExprKind::VariableReference(name) => Box::new(primary::VariableReferenceIterator::new(
            name.clone(),
            variable_kind(node.mode),
            location,
        )),
        ExprKind::ContextItem => Box::new(primary::ContextItemIterator::new(location)),

        ExprKind::Sequence(children) => {
            let built = children
                .iter()
                .map(|c| build_iterator(c, env))
                .collect::<Result<Vec<_>>>()?;
            Box::new(sequence::CommaExpressionIterator::new(built, location))
        }
        ExprKind::Range { start, end } => Box::new(range::RangeIterator::new(
            build_iterator(start, env)?,
            build_iterator(end, env)?,
            location,
        )),

        ExprKind::Arithmetic { op, lhs, rhs } => Box::new(arithmetic::ArithmeticIterator::new(
            *op,
            build_iterator(lhs, env)?,
            build_iterator(rhs, env)?,
            location,
        )),
        ExprKind::UnaryMinus(inner) => Box::new(arithmetic::UnaryMinusIterator::new(
            build_iterator(inner, env)?,
            location,
        )),
        ExprKind::Comparison { op, kind, lhs, rhs } => {
            Box::new(comparison::ComparisonIterator::new(
                *op,
                *kind,
                build_iterator(lhs, env)?,
                build_iterator(rhs, env)?,
                location,
            ))
        }
        ExprKind::And { lhs, rhs } => Box::new(logical::LogicalIterator::and(
            build_iterator(lhs, env)?,
            build_iterator(rhs, env)?,
            location,
        )),
        ExprKind::Or { lhs, rhs } => Box::new(logical::LogicalIterator::or(
            build_iterator(lhs, env)?,
            build_iterator(rhs, env)?,
            location,
        )),
        ExprKind::Not(inner) => Box::new(logical::NotIterator::new(
            build_iterator(inner, env)?,
            location,
        )),

        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => Box::new(control::IfIterator::new(
            build_iterator(condition, env)?,
            build_iterator(then_branch, env)?,
            build_iterator(else_branch, env)?,
            location,
        )),
        ExprKind::Switch {
            subject,
            cases,
            default,
        } => {
            let mut compiled = Vec::with_capacity(cases.len());
            for case in cases {
                let operands = case
                    .operands
                    .iter()
                    .map(|o| build_iterator(o, env))
                    .collect::<Result<Vec<_>>>()?;
                compiled.push(control::CompiledSwitchCase {
                    operands,
                    body: build_iterator(&case.body, env)?,
                });
            }
            Box::new(control::SwitchIterator::new(
                build_iterator(subject, env)?,
                compiled,
                build_iterator(default, env)?,
                location,
            ))
        }
        ExprKind::Typeswitch {
            subject,
            cases,
            default_var,
            default,
        } => Box::new(control::TypeswitchIterator::new(
            build_iterator(subject, env)?,
            cases.clone(),
            default_var.clone(),
            default.clone(),
            env.clone(),
            location,
        )),

        ExprKind::Quantified {
            kind,
            bindings,
            predicate,
        } => {
            let mut built = Vec::with_capacity(bindings.len());
            for (name, expr) in bindings {
                built.push((name.clone(), build_iterator(expr, env)?));
            }
            Box::new(quantified::QuantifiedIterator::new(
                *kind,
                built,
                predicate.clone(),
                env.clone(),
                location,
            ))
        }

        ExprKind::ArrayConstructor(inner) => {
            let members = match inner {
                Some(expr) => Some(build_iterator(expr, env)?),
                None => None,
            };
            Box::new(constructors::ArrayConstructorIterator::new(members, location))
        }
        ExprKind::ObjectConstructor(pairs) => {
            let mut built = Vec::with_capacity(pairs.len());
            for (key, value) in pairs {
                built.push((build_iterator(key, env)?, build_iterator(value, env)?));
            }
            Box::new(constructors::ObjectConstructorIterator::new(built, location))
        }

        ExprKind::Predicate { base, predicate } => Box::new(postfix::PredicateIterator::new(
            build_iterator(base, env)?,
            predicate.clone(),
            env.clone(),
            location,
        )),
        ExprKind::ObjectLookup { base, key } => Box::new(postfix::ObjectLookupIterator::new(
            build_iterator(base, env)?,
            build_iterator(key, env)?,
            location,
        )),
        ExprKind::ArrayLookup { base, index } => Box::new(postfix::ArrayLookupIterator::new(
            build_iterator(base, env)?,
            build_iterator(index, env)?,
            location,
        )),
        ExprKind::DynamicCall { callee, args } => {
            let built_args = args
                .iter()
                .map(|a| build_iterator(a, env))
                .collect::<Result<Vec<_>>>()?;
            Box::new(DynamicCallIterator::new(
                build_iterator(callee, env)?,
                built_args,
                env.clone(),
                location,
            ))
        }

        ExprKind::FunctionCall { name, args } => {
            // cardinality-only read of a bare variable
            if name.as_ref() == "count" && args.len() == 1 {
                if let ExprKind::VariableReference(var) = &args[0].kind {
                    return Ok(Box::new(VariableCountIterator::new(var.clone(), location)));
                }
            }
            let identifier = FunctionIdentifier::new(name.clone(), args.len());
            let built_args = args
                .iter()
                .map(|a| build_iterator(a, env))
                .collect::<Result<Vec<_>>>()?;
            match env.registry.resolve(&identifier) {
                Some(ResolvedFunction::User(declaration)) => Box::new(FunctionCallIterator::new(
                    declaration,
                    built_args,
                    env.clone(),
                    location,
                )),
                Some(ResolvedFunction::Builtin(kind)) => {
                    Box::new(BuiltinFunctionIterator::new(kind, built_args, location))
                }
                None => {
                    return Err(RuntimeError::FunctionNotFound {
                        name: name.to_string(),
                        arity: args.len(),
                        location,
                    })
                }
            }
        }
        ExprKind::NamedFunctionRef { name, arity } => Box::new(NamedFunctionRefIterator::new(
            FunctionIdentifier::new(name.clone(), *arity),
            env.clone(),
            location,
        )),
        ExprKind::InlineFunction { params, body } => {
            let captured: Vec<Arc<str>> =
                ast::variable_dependencies(node).keys().cloned().collect();
            Box::new(InlineFunctionIterator::new(
                params.clone(),
                body.clone(),
                captured,
                location,
            ))
        }

        ExprKind::Flwor(flwor) => crate::flwor::build_flwor_iterator(flwor, node, env)?,

        ExprKind::Collection(name) => {
            let source = env.sources.get(name).cloned().ok_or_else(|| {
                RuntimeError::dynamic(
                    format!("unknown collection \"{}\"", name),
                    location.clone(),
                )
            })?;
            Box::new(CollectionIterator::new(source, node.mode, location))
        }
    })
}

fn literal(item: Item, node: &ExprNode) -> BoxedIterator {
    Box::new(primary::LiteralIterator::new(item, node.location.clone()))
}

fn variable_kind(mode: ExecutionMode) -> ExecutionKind {
    match mode {
        ExecutionMode::Rdd | ExecutionMode::DataFrame => ExecutionKind::RddCapable,
        _ => ExecutionKind::LocalOnly,
    }
}
