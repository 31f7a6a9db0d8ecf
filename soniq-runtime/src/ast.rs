//! Expression AST delivered by the parser
//!
//! The runtime consumes these nodes; it never mutates them. Each node
//! carries its kind, source metadata, and the execution-mode annotation the
//! static analyzer computed (`Unset` when analysis did not run — the
//! runtime then probes child capabilities at iterator construction).
//!
//! Traversals are plain dispatch functions over the tagged kind:
//! [`variable_dependencies`] (used for projection),
//! [`print_expression`] (diagnostics), and iterator construction in the
//! expr module.

use crate::error::SourceLocation;
use bigdecimal::BigDecimal;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

/// Static execution-mode annotation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Analysis did not run; the runtime probes children
    #[default]
    Unset,
    /// Evaluate locally
    Local,
    /// Prefer the partitioned item collection
    Rdd,
    /// Prefer the typed tabular stream (FLWOR pipelines)
    DataFrame,
}

/// One expression node
#[derive(Clone, Debug)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub mode: ExecutionMode,
    pub location: SourceLocation,
}

impl ExprNode {
    pub fn new(kind: ExprKind, location: SourceLocation) -> Self {
        Self {
            kind,
            mode: ExecutionMode::Unset,
            location,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Convenience for synthesized nodes in tests and builders
    pub fn arc(kind: ExprKind, location: SourceLocation) -> Arc<Self> {
        Arc::new(Self::new(kind, location))
    }
}

/// Arithmetic operators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Modulo,
}

impl ArithmeticOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "div",
            ArithmeticOp::IntegerDivide => "idiv",
            ArithmeticOp::Modulo => "mod",
        }
    }
}

/// Comparison operators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Value comparisons require singletons; general comparisons are
/// existential over both operand sequences
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonKind {
    Value,
    General,
}

/// `some` / `every`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantifierKind {
    Some,
    Every,
}

/// A `switch` case: several comparand expressions sharing one body
#[derive(Clone, Debug)]
pub struct SwitchCase {
    pub operands: Vec<Arc<ExprNode>>,
    pub body: Arc<ExprNode>,
}

/// A `typeswitch` case
#[derive(Clone, Debug)]
pub struct TypeswitchCase {
    pub var: Option<Arc<str>>,
    pub types: Vec<TypeFilter>,
    pub body: Arc<ExprNode>,
}

/// Dynamic type filters for typeswitch.
///
/// Numeric types stay distinct: an `integer` filter does not match a
/// decimal item and vice versa; promotion is the business of `cast`, not of
/// type matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeFilter {
    AnyItem,
    Atomic,
    Null,
    Boolean,
    String,
    Integer,
    Decimal,
    Double,
    DateTime,
    Date,
    Time,
    YearMonthDuration,
    DayTimeDuration,
    Duration,
    HexBinary,
    Base64Binary,
    Array,
    Object,
    Function,
}

impl TypeFilter {
    /// Does an item match this filter?
    pub fn matches(self, item: &crate::item::Item) -> bool {
        use crate::item::Item;
        match self {
            TypeFilter::AnyItem => true,
            TypeFilter::Atomic => item.is_atomic(),
            TypeFilter::Null => item.is_null(),
            TypeFilter::Boolean => item.is_boolean(),
            TypeFilter::String => item.is_string(),
            TypeFilter::Integer => matches!(item, Item::Integer(_)),
            TypeFilter::Decimal => matches!(item, Item::Decimal(_)),
            TypeFilter::Double => matches!(item, Item::Double(_)),
            TypeFilter::DateTime => matches!(item, Item::DateTime(_)),
            TypeFilter::Date => matches!(item, Item::Date(_)),
            TypeFilter::Time => matches!(item, Item::Time(_)),
            TypeFilter::YearMonthDuration => matches!(item, Item::YearMonthDuration(_)),
            TypeFilter::DayTimeDuration => matches!(item, Item::DayTimeDuration(_)),
            TypeFilter::Duration => matches!(item, Item::Duration(_)),
            TypeFilter::HexBinary => matches!(item, Item::HexBinary(_)),
            TypeFilter::Base64Binary => matches!(item, Item::Base64Binary(_)),
            TypeFilter::Array => item.is_array(),
            TypeFilter::Object => item.is_object(),
            TypeFilter::Function => item.is_function(),
        }
    }
}

/// FLWOR expression: a clause pipeline plus the return expression
#[derive(Clone, Debug)]
pub struct FlworExpr {
    pub clauses: Vec<Clause>,
    pub return_expr: Arc<ExprNode>,
}

/// One FLWOR clause
#[derive(Clone, Debug)]
pub enum Clause {
    For {
        var: Arc<str>,
        position_var: Option<Arc<str>>,
        expr: Arc<ExprNode>,
    },
    Let {
        var: Arc<str>,
        expr: Arc<ExprNode>,
    },
    Where {
        expr: Arc<ExprNode>,
    },
    GroupBy {
        keys: Vec<GroupKey>,
    },
    OrderBy {
        specs: Vec<OrderSpec>,
        stable: bool,
    },
    Count {
        var: Arc<str>,
    },
}

/// `group by $var := expr` — `expr` is absent when grouping on an
/// already-bound variable
#[derive(Clone, Debug)]
pub struct GroupKey {
    pub var: Arc<str>,
    pub expr: Option<Arc<ExprNode>>,
}

/// One ordering specifier
#[derive(Clone, Debug)]
pub struct OrderSpec {
    pub expr: Arc<ExprNode>,
    pub descending: bool,
    pub empty_greatest: bool,
}

/// Everything an expression can be
#[derive(Clone, Debug)]
pub enum ExprKind {
    NullLiteral,
    BooleanLiteral(bool),
    /// Lexical form; machine-integer parsing with decimal fallback happens
    /// at iterator construction
    IntegerLiteral(String),
    DecimalLiteral(BigDecimal),
    DoubleLiteral(f64),
    StringLiteral(String),
    VariableReference(Arc<str>),
    ContextItem,
    Sequence(Vec<Arc<ExprNode>>),
    Range {
        start: Arc<ExprNode>,
        end: Arc<ExprNode>,
    },
    Arithmetic {
        op: ArithmeticOp,
        lhs: Arc<ExprNode>,
        rhs: Arc<ExprNode>,
    },
    UnaryMinus(Arc<ExprNode>),
    Comparison {
        op: ComparisonOp,
        kind: ComparisonKind,
        lhs: Arc<ExprNode>,
        rhs: Arc<ExprNode>,
    },
    And {
        lhs: Arc<ExprNode>,
        rhs: Arc<ExprNode>,
    },
    Or {
        lhs: Arc<ExprNode>,
        rhs: Arc<ExprNode>,
    },
    Not(Arc<ExprNode>),
    If {
        condition: Arc<ExprNode>,
        then_branch: Arc<ExprNode>,
        else_branch: Arc<ExprNode>,
    },
    Switch {
        subject: Arc<ExprNode>,
        cases: Vec<SwitchCase>,
        default: Arc<ExprNode>,
    },
    Typeswitch {
        subject: Arc<ExprNode>,
        cases: Vec<TypeswitchCase>,
        default_var: Option<Arc<str>>,
        default: Arc<ExprNode>,
    },
    Quantified {
        kind: QuantifierKind,
        bindings: Vec<(Arc<str>, Arc<ExprNode>)>,
        predicate: Arc<ExprNode>,
    },
    /// `[ expr? ]`
    ArrayConstructor(Option<Arc<ExprNode>>),
    /// `{ key: value, ... }`
    ObjectConstructor(Vec<(Arc<ExprNode>, Arc<ExprNode>)>),
    /// `base[predicate]`
    Predicate {
        base: Arc<ExprNode>,
        predicate: Arc<ExprNode>,
    },
    /// `base.key`
    ObjectLookup {
        base: Arc<ExprNode>,
        key: Arc<ExprNode>,
    },
    /// `base[[index]]`
    ArrayLookup {
        base: Arc<ExprNode>,
        index: Arc<ExprNode>,
    },
    /// `callee(args...)` where callee is an expression
    DynamicCall {
        callee: Arc<ExprNode>,
        args: Vec<Arc<ExprNode>>,
    },
    /// Static call resolved by name and arity
    FunctionCall {
        name: Arc<str>,
        args: Vec<Arc<ExprNode>>,
    },
    /// `name#arity`
    NamedFunctionRef {
        name: Arc<str>,
        arity: usize,
    },
    /// `function($p, ...) { body }`
    InlineFunction {
        params: Vec<Arc<str>>,
        body: Arc<ExprNode>,
    },
    Flwor(FlworExpr),
    /// Opaque external item source, resolved by name at construction
    Collection(Arc<str>),
}

// ============================================================================
// Variable dependencies
// ============================================================================

/// How a downstream consumer uses a variable
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariableDependency {
    /// The full materialized sequence is needed
    Full,
    /// Only the item count is needed
    Count,
}

/// Dependency map, ordered for deterministic column layouts
pub type VariableDependencyMap = BTreeMap<Arc<str>, VariableDependency>;

/// Merge one dependency in; conflicting uses collapse to `Full`.
pub fn merge_dependency(
    map: &mut VariableDependencyMap,
    name: &Arc<str>,
    dependency: VariableDependency,
) {
    map.entry(name.clone())
        .and_modify(|existing| {
            if *existing != dependency {
                *existing = VariableDependency::Full;
            }
        })
        .or_insert(dependency);
}

/// Merge a whole map, resolving conflicts to `Full`.
pub fn merge_dependencies(into: &mut VariableDependencyMap, from: &VariableDependencyMap) {
    for (name, dep) in from {
        merge_dependency(into, name, *dep);
    }
}

/// Free-variable dependencies of an expression.
///
/// `count($x)` contributes a `Count` dependency on `$x`; every other read
/// is `Full`. Binding forms (FLWOR clauses, quantifiers, inline function
/// parameters, typeswitch case variables) remove their own bindings.
pub fn variable_dependencies(node: &ExprNode) -> VariableDependencyMap {
    let mut map = VariableDependencyMap::new();
    collect_dependencies(node, &mut map);
    map
}

fn collect_dependencies(node: &ExprNode, map: &mut VariableDependencyMap) {
    match &node.kind {
        ExprKind::VariableReference(name) => {
            merge_dependency(map, name, VariableDependency::Full);
        }

        // count over a bare variable only needs the cardinality
        ExprKind::FunctionCall { name, args }
            if name.as_ref() == "count" && args.len() == 1 =>
        {
            if let ExprKind::VariableReference(var) = &args[0].kind {
                merge_dependency(map, var, VariableDependency::Count);
            } else {
                collect_dependencies(&args[0], map);
            }
        }

        ExprKind::InlineFunction { params, body } => {
            let mut inner = variable_dependencies(body);
            for param in params {
                inner.remove(param);
            }
            merge_dependencies(map, &inner);
        }

        ExprKind::Quantified {
            bindings,
            predicate,
            ..
        } => {
            let mut inner = variable_dependencies(predicate);
            for (var, _) in bindings {
                inner.remove(var);
            }
            for (_, expr) in bindings {
                collect_dependencies(expr, map);
            }
            merge_dependencies(map, &inner);
        }

        ExprKind::Typeswitch {
            subject,
            cases,
            default_var,
            default,
        } => {
            collect_dependencies(subject, map);
            for case in cases {
                let mut inner = variable_dependencies(&case.body);
                if let Some(var) = &case.var {
                    inner.remove(var);
                }
                merge_dependencies(map, &inner);
            }
            let mut inner = variable_dependencies(default);
            if let Some(var) = default_var {
                inner.remove(var);
            }
            merge_dependencies(map, &inner);
        }

        ExprKind::Flwor(flwor) => {
            merge_dependencies(map, &flwor_dependencies(flwor));
        }

        _ => {
            for child in children(node) {
                collect_dependencies(child, map);
            }
        }
    }
}

/// Free variables of a whole FLWOR expression
pub fn flwor_dependencies(flwor: &FlworExpr) -> VariableDependencyMap {
    let mut map = VariableDependencyMap::new();
    let mut bound: Vec<Arc<str>> = Vec::new();
    for clause in &flwor.clauses {
        let mut clause_deps = clause_dependencies(clause);
        for var in &bound {
            clause_deps.remove(var);
        }
        merge_dependencies(&mut map, &clause_deps);
        for var in clause_bound_variables(clause) {
            if !bound.contains(&var) {
                bound.push(var);
            }
        }
    }
    let mut ret = variable_dependencies(&flwor.return_expr);
    for var in &bound {
        ret.remove(var);
    }
    merge_dependencies(&mut map, &ret);
    map
}

/// Variables a clause introduces
pub fn clause_bound_variables(clause: &Clause) -> Vec<Arc<str>> {
    match clause {
        Clause::For {
            var, position_var, ..
        } => {
            let mut vars = vec![var.clone()];
            if let Some(pos) = position_var {
                vars.push(pos.clone());
            }
            vars
        }
        Clause::Let { var, .. } => vec![var.clone()],
        Clause::GroupBy { keys } => keys
            .iter()
            .filter(|k| k.expr.is_some())
            .map(|k| k.var.clone())
            .collect(),
        Clause::Count { var } => vec![var.clone()],
        Clause::Where { .. } | Clause::OrderBy { .. } => Vec::new(),
    }
}

/// Variables a clause's own expressions read
pub fn clause_dependencies(clause: &Clause) -> VariableDependencyMap {
    let mut map = VariableDependencyMap::new();
    match clause {
        Clause::For { expr, .. } | Clause::Let { expr, .. } | Clause::Where { expr } => {
            merge_dependencies(&mut map, &variable_dependencies(expr));
        }
        Clause::GroupBy { keys } => {
            for key in keys {
                match &key.expr {
                    Some(expr) => merge_dependencies(&mut map, &variable_dependencies(expr)),
                    // grouping on an existing variable reads it fully
                    None => merge_dependency(&mut map, &key.var, VariableDependency::Full),
                }
            }
        }
        Clause::OrderBy { specs, .. } => {
            for spec in specs {
                merge_dependencies(&mut map, &variable_dependencies(&spec.expr));
            }
        }
        Clause::Count { .. } => {}
    }
    map
}

/// Direct children of a node, for the generic traversal case
fn children(node: &ExprNode) -> Vec<&Arc<ExprNode>> {
    match &node.kind {
        ExprKind::NullLiteral
        | ExprKind::BooleanLiteral(_)
        | ExprKind::IntegerLiteral(_)
        | ExprKind::DecimalLiteral(_)
        | ExprKind::DoubleLiteral(_)
        | ExprKind::StringLiteral(_)
        | ExprKind::VariableReference(_)
        | ExprKind::ContextItem
        | ExprKind::NamedFunctionRef { .. }
        | ExprKind::Collection(_) => Vec::new(),

        ExprKind::Sequence(nodes) => nodes.iter().collect(),
        ExprKind::Range { start, end } => vec![start, end],
        ExprKind::Arithmetic { lhs, rhs, .. }
        | ExprKind::Comparison { lhs, rhs, .. }
        | ExprKind::And { lhs, rhs }
        | ExprKind::Or { lhs, rhs } => vec![lhs, rhs],
        ExprKind::UnaryMinus(inner) | ExprKind::Not(inner) => vec![inner],
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => vec![condition, then_branch, else_branch],
        ExprKind::Switch {
            subject,
            cases,
            default,
        } => {
            let mut out = vec![subject];
            for case in cases {
                out.extend(case.operands.iter());
                out.push(&case.body);
            }
            out.push(default);
            out
        }
        ExprKind::Typeswitch { .. } => Vec::new(), // handled by the caller
        ExprKind::Quantified { .. } => Vec::new(), // handled by the caller
        ExprKind::ArrayConstructor(inner) => inner.iter().collect(),
        ExprKind::ObjectConstructor(pairs) => {
            pairs.iter().flat_map(|(k, v)| [k, v]).collect()
        }
        ExprKind::Predicate { base, predicate } => vec![base, predicate],
        ExprKind::ObjectLookup { base, key } => vec![base, key],
        ExprKind::ArrayLookup { base, index } => vec![base, index],
        ExprKind::DynamicCall { callee, args } => {
            let mut out = vec![callee];
            out.extend(args.iter());
            out
        }
        ExprKind::FunctionCall { args, .. } => args.iter().collect(),
        ExprKind::InlineFunction { .. } => Vec::new(), // handled by the caller
        ExprKind::Flwor(_) => Vec::new(),              // handled by the caller
    }
}

// ============================================================================
// Printing
// ============================================================================

/// Append a one-node-per-line rendering of the tree, for diagnostics.
pub fn print_expression(node: &ExprNode, buffer: &mut String, indent: usize) {
    for _ in 0..indent {
        buffer.push_str("  ");
    }
    let _ = writeln!(buffer, "{}", kind_label(&node.kind));
    match &node.kind {
        ExprKind::Flwor(flwor) => {
            for clause in &flwor.clauses {
                for _ in 0..indent + 1 {
                    buffer.push_str("  ");
                }
                let _ = writeln!(buffer, "{}", clause_label(clause));
            }
            print_expression(&flwor.return_expr, buffer, indent + 1);
        }
        ExprKind::InlineFunction { body, .. } => print_expression(body, buffer, indent + 1),
        ExprKind::Typeswitch {
            subject,
            cases,
            default,
            ..
        } => {
            print_expression(subject, buffer, indent + 1);
            for case in cases {
                print_expression(&case.body, buffer, indent + 1);
            }
            print_expression(default, buffer, indent + 1);
        }
        ExprKind::Quantified {
            bindings,
            predicate,
            ..
        } => {
            for (_, expr) in bindings {
                print_expression(expr, buffer, indent + 1);
            }
            print_expression(predicate, buffer, indent + 1);
        }
        _ => {
            for child in children(node) {
                print_expression(child, buffer, indent + 1);
            }
        }
    }
}

fn kind_label(kind: &ExprKind) -> String {
    match kind {
        ExprKind::NullLiteral => "null".to_string(),
        ExprKind::BooleanLiteral(b) => b.to_string(),
        ExprKind::IntegerLiteral(s) => s.clone(),
        ExprKind::DecimalLiteral(d) => d.to_string(),
        ExprKind::DoubleLiteral(d) => d.to_string(),
        ExprKind::StringLiteral(s) => format!("\"{}\"", s),
        ExprKind::VariableReference(v) => format!("${}", v),
        ExprKind::ContextItem => "$$".to_string(),
        ExprKind::Sequence(_) => "sequence".to_string(),
        ExprKind::Range { .. } => "range".to_string(),
        ExprKind::Arithmetic { op, .. } => format!("arithmetic {}", op.symbol()),
        ExprKind::UnaryMinus(_) => "unary -".to_string(),
        ExprKind::Comparison { op, kind, .. } => format!("comparison {:?} {:?}", kind, op),
        ExprKind::And { .. } => "and".to_string(),
        ExprKind::Or { .. } => "or".to_string(),
        ExprKind::Not(_) => "not".to_string(),
        ExprKind::If { .. } => "if".to_string(),
        ExprKind::Switch { .. } => "switch".to_string(),
        ExprKind::Typeswitch { .. } => "typeswitch".to_string(),
        ExprKind::Quantified { kind, .. } => format!("{:?}", kind).to_lowercase(),
        ExprKind::ArrayConstructor(_) => "array constructor".to_string(),
        ExprKind::ObjectConstructor(_) => "object constructor".to_string(),
        ExprKind::Predicate { .. } => "predicate".to_string(),
        ExprKind::ObjectLookup { .. } => "object lookup".to_string(),
        ExprKind::ArrayLookup { .. } => "array lookup".to_string(),
        ExprKind::DynamicCall { .. } => "dynamic call".to_string(),
        ExprKind::FunctionCall { name, args } => format!("call {}#{}", name, args.len()),
        ExprKind::NamedFunctionRef { name, arity } => format!("{}#{}", name, arity),
        ExprKind::InlineFunction { params, .. } => format!("function#{}", params.len()),
        ExprKind::Flwor(_) => "flwor".to_string(),
        ExprKind::Collection(name) => format!("collection(\"{}\")", name),
    }
}

fn clause_label(clause: &Clause) -> String {
    match clause {
        Clause::For { var, .. } => format!("for ${}", var),
        Clause::Let { var, .. } => format!("let ${}", var),
        Clause::Where { .. } => "where".to_string(),
        Clause::GroupBy { keys } => format!("group by ({} keys)", keys.len()),
        Clause::OrderBy { specs, stable } => {
            format!("order by ({} specs, stable={})", specs.len(), stable)
        }
        Clause::Count { var } => format!("count ${}", var),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Arc<ExprNode> {
        ExprNode::arc(
            ExprKind::VariableReference(Arc::from(name)),
            SourceLocation::unknown(),
        )
    }

    #[test]
    fn test_count_dependency() {
        let call = ExprNode::new(
            ExprKind::FunctionCall {
                name: Arc::from("count"),
                args: vec![var("x")],
            },
            SourceLocation::unknown(),
        );
        let deps = variable_dependencies(&call);
        assert_eq!(deps.get("x"), Some(&VariableDependency::Count));
    }

    #[test]
    fn test_conflicting_uses_collapse_to_full() {
        // count($x) + $x
        let node = ExprNode::new(
            ExprKind::Arithmetic {
                op: ArithmeticOp::Add,
                lhs: ExprNode::arc(
                    ExprKind::FunctionCall {
                        name: Arc::from("count"),
                        args: vec![var("x")],
                    },
                    SourceLocation::unknown(),
                ),
                rhs: var("x"),
            },
            SourceLocation::unknown(),
        );
        let deps = variable_dependencies(&node);
        assert_eq!(deps.get("x"), Some(&VariableDependency::Full));
    }

    #[test]
    fn test_flwor_bound_variables_are_not_free() {
        // for $x in $input return $x + $y
        let flwor = FlworExpr {
            clauses: vec![Clause::For {
                var: Arc::from("x"),
                position_var: None,
                expr: var("input"),
            }],
            return_expr: ExprNode::arc(
                ExprKind::Arithmetic {
                    op: ArithmeticOp::Add,
                    lhs: var("x"),
                    rhs: var("y"),
                },
                SourceLocation::unknown(),
            ),
        };
        let deps = flwor_dependencies(&flwor);
        assert!(deps.contains_key("input"));
        assert!(deps.contains_key("y"));
        assert!(!deps.contains_key("x"));
    }

    #[test]
    fn test_inline_function_params_removed() {
        let node = ExprNode::new(
            ExprKind::InlineFunction {
                params: vec![Arc::from("p")],
                body: ExprNode::arc(
                    ExprKind::Arithmetic {
                        op: ArithmeticOp::Add,
                        lhs: var("p"),
                        rhs: var("captured"),
                    },
                    SourceLocation::unknown(),
                ),
            },
            SourceLocation::unknown(),
        );
        let deps = variable_dependencies(&node);
        assert!(!deps.contains_key("p"));
        assert!(deps.contains_key("captured"));
    }
}
