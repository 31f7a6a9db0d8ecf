//! Query driver
//!
//! A [`Program`] is a prolog — user function declarations and global
//! variable declarations — plus a batch of top-level expressions. The
//! driver registers the prolog, evaluates the globals in order into the
//! module context, and then evaluates each expression independently: one
//! expression failing does not stop the others.
//!
//! The driver is also where the hybrid decision surfaces: a root iterator
//! preferring distributed evaluation is collected through its partitioned
//! collection (honoring the configured collect cap), everything else
//! streams locally with `open`/`close` balanced on every path.

use crate::ast::ExprNode;
use crate::context::{DynamicContext, Globals};
use crate::error::Result;
use crate::expr::{build_iterator, BuildEnv};
use crate::functions::registry::FunctionRegistry;
use crate::functions::UserFunction;
use crate::item::Item;
use crate::iterator::{materialize, RuntimeIterator};
use crate::options::RuntimeOptions;
use crate::sources::ItemSource;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Prolog: declarations processed before any expression runs
#[derive(Clone, Debug, Default)]
pub struct Prolog {
    pub functions: Vec<UserFunction>,
    pub variables: Vec<(Arc<str>, Arc<ExprNode>)>,
}

/// A batch program
#[derive(Clone, Debug)]
pub struct Program {
    pub prolog: Prolog,
    pub expressions: Vec<Arc<ExprNode>>,
}

impl Program {
    /// A program with a single expression and no prolog
    pub fn expression(expr: Arc<ExprNode>) -> Self {
        Self {
            prolog: Prolog::default(),
            expressions: vec![expr],
        }
    }
}

/// The engine: options plus registered item sources
#[derive(Debug, Default)]
pub struct Engine {
    options: RuntimeOptions,
    sources: FxHashMap<Arc<str>, Arc<dyn ItemSource>>,
}

impl Engine {
    pub fn new(options: RuntimeOptions) -> Self {
        Self {
            options,
            sources: FxHashMap::default(),
        }
    }

    /// Register an external item source under its name
    pub fn with_source(mut self, source: Arc<dyn ItemSource>) -> Self {
        self.sources.insert(Arc::from(source.name()), source);
        self
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Run a program with fresh query-wide state
    pub fn run(&self, program: &Program) -> Vec<Result<Vec<Item>>> {
        self.run_with_globals(program, Arc::new(Globals::new(self.options.clone())))
    }

    /// Run a program against caller-held globals.
    ///
    /// Holding the `Globals` lets the caller cancel the run from another
    /// thread via [`Globals::cancel`].
    pub fn run_with_globals(
        &self,
        program: &Program,
        globals: Arc<Globals>,
    ) -> Vec<Result<Vec<Item>>> {
        let prepared = self.prepare(program, globals);
        let (env, module_ctx) = match prepared {
            Ok(ready) => ready,
            // a prolog failure fails every expression of the batch
            Err(e) => return program.expressions.iter().map(|_| Err(e.clone())).collect(),
        };

        program
            .expressions
            .iter()
            .map(|expr| {
                tracing::debug!(location = %expr.location, "evaluating top-level expression");
                self.evaluate(expr, &env, &module_ctx)
            })
            .collect()
    }

    /// Evaluate one expression with no prolog
    pub fn evaluate_expression(&self, expr: &Arc<ExprNode>) -> Result<Vec<Item>> {
        let program = Program::expression(expr.clone());
        self.run(&program)
            .pop()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Register the prolog and evaluate global variables in order
    fn prepare(
        &self,
        program: &Program,
        globals: Arc<Globals>,
    ) -> Result<(Arc<BuildEnv>, Arc<DynamicContext>)> {
        let mut registry = FunctionRegistry::new();
        for function in &program.prolog.functions {
            registry.declare(function.clone())?;
        }
        let mut env = BuildEnv::new(Arc::new(registry));
        env.sources = self.sources.clone();
        let env = Arc::new(env);

        // each global sees the ones declared before it
        let mut module = DynamicContext::root(globals);
        for (name, expr) in &program.prolog.variables {
            let scope = module.clone().into_arc();
            let items = self.evaluate(expr, &env, &scope)?;
            module.bind_sequence(name.clone(), items);
        }
        Ok((env, module.into_arc()))
    }

    fn evaluate(
        &self,
        expr: &Arc<ExprNode>,
        env: &Arc<BuildEnv>,
        ctx: &Arc<DynamicContext>,
    ) -> Result<Vec<Item>> {
        let mut iter = build_iterator(expr, env)?;
        if iter.is_rdd() {
            let rdd = iter.rdd(ctx)?;
            return Ok(match self.options.collect_cap {
                Some(cap) => rdd.take(cap),
                None => rdd.collect(),
            });
        }
        materialize(iter.as_mut(), ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, SwitchCase};
    use crate::error::{RuntimeError, SourceLocation};

    fn int(n: i64) -> Arc<ExprNode> {
        ExprNode::arc(
            ExprKind::IntegerLiteral(n.to_string()),
            SourceLocation::unknown(),
        )
    }

    #[test]
    fn test_batch_expressions_fail_independently() {
        let engine = Engine::default();
        let ok = int(1);
        let bad = ExprNode::arc(
            ExprKind::FunctionCall {
                name: Arc::from("no-such-function"),
                args: vec![],
            },
            SourceLocation::unknown(),
        );
        let program = Program {
            prolog: Prolog::default(),
            expressions: vec![ok, bad, int(3)],
        };
        let results = engine.run(&program);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &vec![Item::Integer(1)]);
        assert!(matches!(
            results[1],
            Err(RuntimeError::FunctionNotFound { .. })
        ));
        assert_eq!(results[2].as_ref().unwrap(), &vec![Item::Integer(3)]);
    }

    #[test]
    fn test_global_variables_bind_in_order() {
        let engine = Engine::default();
        let program = Program {
            prolog: Prolog {
                functions: vec![],
                variables: vec![
                    (Arc::from("a"), int(10)),
                    (
                        Arc::from("b"),
                        ExprNode::arc(
                            ExprKind::Arithmetic {
                                op: crate::ast::ArithmeticOp::Add,
                                lhs: ExprNode::arc(
                                    ExprKind::VariableReference(Arc::from("a")),
                                    SourceLocation::unknown(),
                                ),
                                rhs: int(5),
                            },
                            SourceLocation::unknown(),
                        ),
                    ),
                ],
            },
            expressions: vec![ExprNode::arc(
                ExprKind::VariableReference(Arc::from("b")),
                SourceLocation::unknown(),
            )],
        };
        let results = engine.run(&program);
        assert_eq!(results[0].as_ref().unwrap(), &vec![Item::Integer(15)]);
    }

    #[test]
    fn test_switch_expression() {
        let engine = Engine::default();
        let switch = ExprNode::arc(
            ExprKind::Switch {
                subject: int(2),
                cases: vec![
                    SwitchCase {
                        operands: vec![int(1)],
                        body: ExprNode::arc(
                            ExprKind::StringLiteral("one".into()),
                            SourceLocation::unknown(),
                        ),
                    },
                    SwitchCase {
                        operands: vec![int(2), int(3)],
                        body: ExprNode::arc(
                            ExprKind::StringLiteral("few".into()),
                            SourceLocation::unknown(),
                        ),
                    },
                ],
                default: ExprNode::arc(
                    ExprKind::StringLiteral("many".into()),
                    SourceLocation::unknown(),
                ),
            },
            SourceLocation::unknown(),
        );
        let result = engine.evaluate_expression(&switch).unwrap();
        assert_eq!(result, vec![Item::string("few")]);
    }
}
