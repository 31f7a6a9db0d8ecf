//! Shared AST builders for the integration suites
//!
//! The parser is an external collaborator; tests synthesize the AST it
//! would deliver.

#![allow(dead_code)]

use soniq_runtime::ast::{
    ArithmeticOp, Clause, ComparisonKind, ComparisonOp, ExprKind, ExprNode, FlworExpr, GroupKey,
    OrderSpec,
};
use soniq_runtime::{Engine, Item, Result, SourceLocation};
use std::sync::Arc;

pub fn loc() -> SourceLocation {
    SourceLocation::unknown()
}

pub fn node(kind: ExprKind) -> Arc<ExprNode> {
    ExprNode::arc(kind, loc())
}

pub fn int(n: i64) -> Arc<ExprNode> {
    node(ExprKind::IntegerLiteral(n.to_string()))
}

pub fn dbl(value: f64) -> Arc<ExprNode> {
    node(ExprKind::DoubleLiteral(value))
}

pub fn string(value: &str) -> Arc<ExprNode> {
    node(ExprKind::StringLiteral(value.to_string()))
}

pub fn null() -> Arc<ExprNode> {
    node(ExprKind::NullLiteral)
}

pub fn var(name: &str) -> Arc<ExprNode> {
    node(ExprKind::VariableReference(Arc::from(name)))
}

pub fn seq(items: Vec<Arc<ExprNode>>) -> Arc<ExprNode> {
    node(ExprKind::Sequence(items))
}

pub fn range(start: Arc<ExprNode>, end: Arc<ExprNode>) -> Arc<ExprNode> {
    node(ExprKind::Range { start, end })
}

pub fn arith(op: ArithmeticOp, lhs: Arc<ExprNode>, rhs: Arc<ExprNode>) -> Arc<ExprNode> {
    node(ExprKind::Arithmetic { op, lhs, rhs })
}

pub fn general_cmp(op: ComparisonOp, lhs: Arc<ExprNode>, rhs: Arc<ExprNode>) -> Arc<ExprNode> {
    node(ExprKind::Comparison {
        op,
        kind: ComparisonKind::General,
        lhs,
        rhs,
    })
}

pub fn value_cmp(op: ComparisonOp, lhs: Arc<ExprNode>, rhs: Arc<ExprNode>) -> Arc<ExprNode> {
    node(ExprKind::Comparison {
        op,
        kind: ComparisonKind::Value,
        lhs,
        rhs,
    })
}

pub fn call(name: &str, args: Vec<Arc<ExprNode>>) -> Arc<ExprNode> {
    node(ExprKind::FunctionCall {
        name: Arc::from(name),
        args,
    })
}

pub fn array(members: Option<Arc<ExprNode>>) -> Arc<ExprNode> {
    node(ExprKind::ArrayConstructor(members))
}

pub fn object(pairs: Vec<(&str, Arc<ExprNode>)>) -> Arc<ExprNode> {
    node(ExprKind::ObjectConstructor(
        pairs
            .into_iter()
            .map(|(k, v)| (string(k), v))
            .collect(),
    ))
}

pub fn if_expr(
    condition: Arc<ExprNode>,
    then_branch: Arc<ExprNode>,
    else_branch: Arc<ExprNode>,
) -> Arc<ExprNode> {
    node(ExprKind::If {
        condition,
        then_branch,
        else_branch,
    })
}

pub fn collection(name: &str) -> Arc<ExprNode> {
    node(ExprKind::Collection(Arc::from(name)))
}

// === FLWOR builders ===

pub fn flwor(clauses: Vec<Clause>, return_expr: Arc<ExprNode>) -> Arc<ExprNode> {
    node(ExprKind::Flwor(FlworExpr {
        clauses,
        return_expr,
    }))
}

pub fn for_in(name: &str, expr: Arc<ExprNode>) -> Clause {
    Clause::For {
        var: Arc::from(name),
        position_var: None,
        expr,
    }
}

pub fn for_in_at(name: &str, position: &str, expr: Arc<ExprNode>) -> Clause {
    Clause::For {
        var: Arc::from(name),
        position_var: Some(Arc::from(position)),
        expr,
    }
}

pub fn let_be(name: &str, expr: Arc<ExprNode>) -> Clause {
    Clause::Let {
        var: Arc::from(name),
        expr,
    }
}

pub fn where_is(expr: Arc<ExprNode>) -> Clause {
    Clause::Where { expr }
}

pub fn group_by(keys: Vec<(&str, Option<Arc<ExprNode>>)>) -> Clause {
    Clause::GroupBy {
        keys: keys
            .into_iter()
            .map(|(name, expr)| GroupKey {
                var: Arc::from(name),
                expr,
            })
            .collect(),
    }
}

pub fn order_by(specs: Vec<OrderSpec>, stable: bool) -> Clause {
    Clause::OrderBy { specs, stable }
}

pub fn asc(expr: Arc<ExprNode>) -> OrderSpec {
    OrderSpec {
        expr,
        descending: false,
        empty_greatest: false,
    }
}

pub fn desc(expr: Arc<ExprNode>) -> OrderSpec {
    OrderSpec {
        expr,
        descending: true,
        empty_greatest: false,
    }
}

pub fn count_as(name: &str) -> Clause {
    Clause::Count {
        var: Arc::from(name),
    }
}

// === running ===

pub fn run(expr: &Arc<ExprNode>) -> Result<Vec<Item>> {
    Engine::default().evaluate_expression(expr)
}

pub fn run_ok(expr: &Arc<ExprNode>) -> Vec<Item> {
    match run(expr) {
        Ok(items) => items,
        Err(e) => panic!("query failed: {}", e),
    }
}

pub fn integers(values: &[i64]) -> Vec<Item> {
    values.iter().map(|v| Item::Integer(*v)).collect()
}
