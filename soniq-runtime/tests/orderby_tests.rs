//! OrderBy invariants: stability, empty ordering, key families

mod support;

use soniq_runtime::ast::{ExprKind, OrderSpec};
use soniq_runtime::{Item, RuntimeError};
use std::sync::Arc;
use support::*;

fn pair(key: i64, tag: &str) -> Arc<soniq_runtime::ExprNode> {
    object(vec![("k", int(key)), ("tag", string(tag))])
}

fn key_of(v: &str) -> Arc<soniq_runtime::ExprNode> {
    node(ExprKind::ObjectLookup {
        base: var(v),
        key: string("k"),
    })
}

fn tag_of(v: &str) -> Arc<soniq_runtime::ExprNode> {
    node(ExprKind::ObjectLookup {
        base: var(v),
        key: string("tag"),
    })
}

#[test]
fn stable_sort_preserves_input_order_of_ties() {
    // for $x in (…ties on k…) stable order by $x.k return $x.tag
    let input = seq(vec![
        pair(2, "first-two"),
        pair(1, "one"),
        pair(2, "second-two"),
        pair(2, "third-two"),
    ]);
    let query = flwor(
        vec![for_in("x", input), order_by(vec![asc(key_of("x"))], true)],
        tag_of("x"),
    );
    assert_eq!(
        run_ok(&query),
        vec![
            Item::string("one"),
            Item::string("first-two"),
            Item::string("second-two"),
            Item::string("third-two"),
        ]
    );
}

#[test]
fn unstable_sort_yields_same_multiset_for_key_preserving_permutations() {
    let a = seq(vec![pair(2, "x"), pair(1, "y"), pair(2, "z")]);
    let b = seq(vec![pair(2, "z"), pair(2, "x"), pair(1, "y")]);

    let sorted = |input| {
        let query = flwor(
            vec![for_in("x", input), order_by(vec![asc(key_of("x"))], false)],
            tag_of("x"),
        );
        let mut out: Vec<String> = run_ok(&query)
            .into_iter()
            .map(|i| i.as_str().unwrap().to_string())
            .collect();
        // keys are ordered either way; ties may swap freely
        assert_eq!(out[0], "y");
        out.sort();
        out
    };
    assert_eq!(sorted(a), sorted(b));
}

#[test]
fn multiple_specifiers_with_mixed_directions() {
    let person = |city: &str, age: i64, name: &str| {
        object(vec![
            ("city", string(city)),
            ("age", int(age)),
            ("name", string(name)),
        ])
    };
    let field = |f: &str| {
        node(ExprKind::ObjectLookup {
            base: var("p"),
            key: string(f),
        })
    };
    let input = seq(vec![
        person("nyc", 30, "alice"),
        person("la", 25, "bob"),
        person("nyc", 25, "carol"),
        person("la", 35, "dan"),
    ]);
    // order by $p.city ascending, $p.age descending
    let query = flwor(
        vec![
            for_in("p", input),
            order_by(vec![asc(field("city")), desc(field("age"))], false),
        ],
        field("name"),
    );
    assert_eq!(
        run_ok(&query),
        vec![
            Item::string("dan"),
            Item::string("bob"),
            Item::string("alice"),
            Item::string("carol"),
        ]
    );
}

#[test]
fn empty_least_is_the_default_and_empty_greatest_flips() {
    let input = || {
        seq(vec![
            object(vec![("k", int(2))]),
            object(vec![("other", int(0))]),
            object(vec![("k", int(1))]),
        ])
    };
    let render = if_expr(call("empty", vec![key_of("x")]), int(-99), key_of("x"));

    let least = flwor(
        vec![
            for_in("x", input()),
            order_by(vec![asc(key_of("x"))], false),
        ],
        render.clone(),
    );
    assert_eq!(run_ok(&least), integers(&[-99, 1, 2]));

    let greatest_spec = OrderSpec {
        expr: key_of("x"),
        descending: false,
        empty_greatest: true,
    };
    let greatest = flwor(
        vec![for_in("x", input()), order_by(vec![greatest_spec], false)],
        render,
    );
    assert_eq!(run_ok(&greatest), integers(&[1, 2, -99]));
}

#[test]
fn null_keys_sort_between_empty_and_values() {
    let input = seq(vec![int(5), null(), int(3)]);
    let query = flwor(
        vec![for_in("x", input), order_by(vec![asc(var("x"))], false)],
        var("x"),
    );
    assert_eq!(
        run_ok(&query),
        vec![Item::Null, Item::Integer(3), Item::Integer(5)]
    );
}

#[test]
fn numeric_keys_promote_across_representations() {
    let input = seq(vec![dbl(2.5), int(3), int(1)]);
    let query = flwor(
        vec![for_in("x", input), order_by(vec![asc(var("x"))], false)],
        var("x"),
    );
    assert_eq!(
        run_ok(&query),
        vec![Item::Integer(1), Item::Double(2.5), Item::Integer(3)]
    );
}

#[test]
fn binary_keys_are_rejected() {
    use soniq_runtime::{Engine, InMemorySource};

    let bin = soniq_runtime::parse_item(r#"{"$hexBinary": "FF"}"#).unwrap();
    assert!(bin.is_binary());

    let engine = Engine::default()
        .with_source(Arc::new(InMemorySource::new("bins", vec![bin, Item::Null])));
    let query = flwor(
        vec![
            for_in("x", collection("bins")),
            order_by(vec![asc(var("x"))], false),
        ],
        var("x"),
    );
    assert!(matches!(
        engine.evaluate_expression(&query),
        Err(RuntimeError::UnexpectedType { .. })
    ));
}

#[test]
fn multi_item_keys_are_rejected() {
    let query = flwor(
        vec![
            for_in("x", seq(vec![int(1)])),
            order_by(vec![asc(seq(vec![int(1), int(2)]))], false),
        ],
        var("x"),
    );
    assert!(matches!(
        run(&query),
        Err(RuntimeError::NonAtomicKey { .. })
    ));
}

#[test]
fn non_atomic_keys_are_rejected() {
    let query = flwor(
        vec![
            for_in("x", seq(vec![int(1)])),
            order_by(vec![asc(array(Some(int(1))))], false),
        ],
        var("x"),
    );
    assert!(matches!(
        run(&query),
        Err(RuntimeError::NonAtomicKey { .. })
    ));
}
