//! End-to-end correctness of the FLWOR pipeline and expression iterators

mod support;

use soniq_runtime::ast::{ArithmeticOp, ComparisonOp, ExprKind, ExprNode};
use soniq_runtime::{Engine, Globals, Item, Program, Prolog, RuntimeError, RuntimeOptions};
use std::sync::Arc;
use support::*;

#[test]
fn order_by_sorts_integers() {
    // for $x in (3,1,2) order by $x return $x
    let query = flwor(
        vec![
            for_in("x", seq(vec![int(3), int(1), int(2)])),
            order_by(vec![asc(var("x"))], false),
        ],
        var("x"),
    );
    assert_eq!(run_ok(&query), integers(&[1, 2, 3]));
}

#[test]
fn order_by_rejects_mixed_families() {
    // for $x in (1, "a") order by $x return $x
    let query = flwor(
        vec![
            for_in("x", seq(vec![int(1), string("a")])),
            order_by(vec![asc(var("x"))], false),
        ],
        var("x"),
    );
    assert!(matches!(
        run(&query),
        Err(RuntimeError::UnexpectedType { .. })
    ));
}

#[test]
fn where_filters_by_effective_boolean_value() {
    // for $x in 1 to 5 where $x mod 2 = 0 return $x * 10
    let query = flwor(
        vec![
            for_in("x", range(int(1), int(5))),
            where_is(general_cmp(
                ComparisonOp::Eq,
                arith(ArithmeticOp::Modulo, var("x"), int(2)),
                int(0),
            )),
        ],
        arith(ArithmeticOp::Multiply, var("x"), int(10)),
    );
    assert_eq!(run_ok(&query), integers(&[20, 40]));
}

#[test]
fn keys_of_object_in_descending_order() {
    // let $o := {"a":1,"b":2} for $k in keys($o) order by $k descending return $k
    let query = flwor(
        vec![
            let_be("o", object(vec![("a", int(1)), ("b", int(2))])),
            for_in("k", call("keys", vec![var("o")])),
            order_by(vec![desc(var("k"))], false),
        ],
        var("k"),
    );
    assert_eq!(run_ok(&query), vec![Item::string("b"), Item::string("a")]);
}

#[test]
fn group_by_concatenates_non_grouping_variables() {
    // for $x in (1,2,3) group by $g := $x mod 2 return [$g, $x]
    let query = flwor(
        vec![
            for_in("x", seq(vec![int(1), int(2), int(3)])),
            group_by(vec![(
                "g",
                Some(arith(ArithmeticOp::Modulo, var("x"), int(2))),
            )]),
        ],
        array(Some(seq(vec![var("g"), var("x")]))),
    );
    let mut results = run_ok(&query);
    // group order is unspecified; contents are not
    results.sort_by_key(|item| match item {
        Item::Array(members) => members[0].as_integer().unwrap_or(0),
        _ => 0,
    });
    assert_eq!(
        results,
        vec![
            Item::array(integers(&[0, 2])),
            Item::array(integers(&[1, 1, 3])),
        ]
    );
}

#[test]
fn recursive_user_function() {
    // declare function local:f($n) { if ($n = 0) then 0 else $n + local:f($n - 1) };
    // local:f(5)
    let body = if_expr(
        general_cmp(ComparisonOp::Eq, var("n"), int(0)),
        int(0),
        arith(
            ArithmeticOp::Add,
            var("n"),
            call(
                "local:f",
                vec![arith(ArithmeticOp::Subtract, var("n"), int(1))],
            ),
        ),
    );
    let program = Program {
        prolog: Prolog {
            functions: vec![soniq_runtime::UserFunction {
                identifier: soniq_runtime::FunctionIdentifier::new("local:f", 1),
                params: vec![Arc::from("n")],
                body,
            }],
            variables: vec![],
        },
        expressions: vec![call("local:f", vec![int(5)])],
    };
    let results = Engine::default().run(&program);
    assert_eq!(results[0].as_ref().unwrap(), &integers(&[15]));
}

#[test]
fn count_clause_numbers_tuples() {
    // for $x in ("a","b","c") count $i return $i
    let query = flwor(
        vec![
            for_in("x", seq(vec![string("a"), string("b"), string("c")])),
            count_as("i"),
        ],
        var("i"),
    );
    assert_eq!(run_ok(&query), integers(&[1, 2, 3]));
}

#[test]
fn positional_variable_is_one_based() {
    // for $x at $i in (10, 20) return $i * $x
    let query = flwor(
        vec![for_in_at("x", "i", seq(vec![int(10), int(20)]))],
        arith(ArithmeticOp::Multiply, var("i"), var("x")),
    );
    assert_eq!(run_ok(&query), integers(&[10, 40]));
}

#[test]
fn let_clause_binds_whole_sequence() {
    // let $s := (1,2,3) return count($s)
    let query = flwor(
        vec![let_be("s", seq(vec![int(1), int(2), int(3)]))],
        call("count", vec![var("s")]),
    );
    assert_eq!(run_ok(&query), integers(&[3]));
}

#[test]
fn count_projection_still_counts_correctly() {
    // for $x in 1 to 3 let $y := 1 to $x return count($y)
    // downstream only counts $y, so the let clause binds a count
    let query = flwor(
        vec![
            for_in("x", range(int(1), int(3))),
            let_be("y", range(int(1), var("x"))),
        ],
        call("count", vec![var("y")]),
    );
    assert_eq!(run_ok(&query), integers(&[1, 2, 3]));
}

#[test]
fn nested_flwor() {
    // for $x in (1,2) return (for $y in (10,20) return $x + $y)
    let inner = flwor(
        vec![for_in("y", seq(vec![int(10), int(20)]))],
        arith(ArithmeticOp::Add, var("x"), var("y")),
    );
    let query = flwor(vec![for_in("x", seq(vec![int(1), int(2)]))], inner);
    assert_eq!(run_ok(&query), integers(&[11, 21, 12, 22]));
}

#[test]
fn quantified_expressions_short_circuit() {
    use soniq_runtime::ast::QuantifierKind;
    // some $x in (1,2,3) satisfies $x = 2
    let some = node(ExprKind::Quantified {
        kind: QuantifierKind::Some,
        bindings: vec![(Arc::from("x"), seq(vec![int(1), int(2), int(3)]))],
        predicate: general_cmp(ComparisonOp::Eq, var("x"), int(2)),
    });
    assert_eq!(run_ok(&some), vec![Item::Boolean(true)]);

    // every $x in (1,2,3) satisfies $x < 3
    let every = node(ExprKind::Quantified {
        kind: QuantifierKind::Every,
        bindings: vec![(Arc::from("x"), seq(vec![int(1), int(2), int(3)]))],
        predicate: general_cmp(ComparisonOp::Lt, var("x"), int(3)),
    });
    assert_eq!(run_ok(&every), vec![Item::Boolean(false)]);
}

#[test]
fn predicates_filter_positionally_and_by_value() {
    // (10,20,30)[2]
    let positional = node(ExprKind::Predicate {
        base: seq(vec![int(10), int(20), int(30)]),
        predicate: int(2),
    });
    assert_eq!(run_ok(&positional), integers(&[20]));

    // (10,20,30)[$$ > 15]
    let by_value = node(ExprKind::Predicate {
        base: seq(vec![int(10), int(20), int(30)]),
        predicate: general_cmp(ComparisonOp::Gt, node(ExprKind::ContextItem), int(15)),
    });
    assert_eq!(run_ok(&by_value), integers(&[20, 30]));
}

#[test]
fn object_and_array_lookup() {
    // {"a": 1}.a
    let lookup = node(ExprKind::ObjectLookup {
        base: object(vec![("a", int(1))]),
        key: string("a"),
    });
    assert_eq!(run_ok(&lookup), integers(&[1]));

    // [5,6,7][[3]]
    let array_lookup = node(ExprKind::ArrayLookup {
        base: array(Some(seq(vec![int(5), int(6), int(7)]))),
        index: int(3),
    });
    assert_eq!(run_ok(&array_lookup), integers(&[7]));
}

#[test]
fn higher_order_function_items() {
    // let $base := 100
    // let $f := function($x) { $x + $base }
    // return $f(7)
    let inline = node(ExprKind::InlineFunction {
        params: vec![Arc::from("x")],
        body: arith(ArithmeticOp::Add, var("x"), var("base")),
    });
    let query = flwor(
        vec![let_be("base", int(100)), let_be("f", inline)],
        node(ExprKind::DynamicCall {
            callee: var("f"),
            args: vec![int(7)],
        }),
    );
    assert_eq!(run_ok(&query), integers(&[107]));
}

#[test]
fn corrected_lower_case_contract() {
    // lower-case(()) is the empty string, and the function lowercases
    assert_eq!(
        run_ok(&call("lower-case", vec![seq(vec![])])),
        vec![Item::string("")]
    );
    assert_eq!(
        run_ok(&call("lower-case", vec![string("MiXeD")])),
        vec![Item::string("mixed")]
    );
}

#[test]
fn integer_literals_fall_back_to_decimal_on_overflow() {
    // a 12-character lexical form still fits the machine integer domain
    let fits = node(ExprKind::IntegerLiteral("100000000000".to_string()));
    assert_eq!(run_ok(&fits), integers(&[100_000_000_000]));

    let beyond = node(ExprKind::IntegerLiteral("99999999999999999999".to_string()));
    let items = run_ok(&beyond);
    assert_eq!(items[0].type_name(), "decimal");
}

#[test]
fn cancellation_surfaces_as_cancelled() {
    let engine = Engine::default();
    let globals = Arc::new(Globals::new(RuntimeOptions::default()));
    globals.cancel();
    let query = flwor(
        vec![for_in("x", range(int(1), int(1000)))],
        var("x"),
    );
    let results = engine.run_with_globals(&Program::expression(query), globals);
    assert!(matches!(results[0], Err(RuntimeError::Cancelled { .. })));
}

#[test]
fn division_semantics() {
    // 1 div 2 leaves the integer domain
    let div = arith(ArithmeticOp::Divide, int(1), int(2));
    let items = run_ok(&div);
    assert_eq!(items[0].type_name(), "decimal");
    assert_eq!(items[0], Item::Double(0.5));

    // integer division by zero is an error
    let by_zero = arith(ArithmeticOp::Divide, int(1), int(0));
    assert!(matches!(run(&by_zero), Err(RuntimeError::Dynamic { .. })));

    // double division by zero follows IEEE
    let ieee = arith(ArithmeticOp::Divide, dbl(1.0), dbl(0.0));
    assert_eq!(run_ok(&ieee), vec![Item::Double(f64::INFINITY)]);
}

#[test]
fn value_comparison_requires_singletons() {
    let empty_operand = value_cmp(ComparisonOp::Eq, seq(vec![]), int(1));
    assert!(run(&empty_operand).is_err());

    let multi_operand = value_cmp(ComparisonOp::Eq, seq(vec![int(1), int(2)]), int(1));
    assert!(run(&multi_operand).is_err());

    // general comparison over an empty operand is simply false
    let general_empty = general_cmp(ComparisonOp::Eq, seq(vec![]), int(1));
    assert_eq!(run_ok(&general_empty), vec![Item::Boolean(false)]);
}

#[test]
fn typeswitch_keeps_numeric_types_distinct() {
    use soniq_runtime::ast::{TypeFilter, TypeswitchCase};
    let query = node(ExprKind::Typeswitch {
        subject: node(ExprKind::DecimalLiteral(bigdecimal::BigDecimal::from(3))),
        cases: vec![
            TypeswitchCase {
                var: None,
                types: vec![TypeFilter::Integer],
                body: string("integer"),
            },
            TypeswitchCase {
                var: None,
                types: vec![TypeFilter::Decimal],
                body: string("decimal"),
            },
        ],
        default_var: None,
        default: string("other"),
    });
    assert_eq!(run_ok(&query), vec![Item::string("decimal")]);
}
