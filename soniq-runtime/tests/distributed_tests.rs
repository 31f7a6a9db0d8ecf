//! Local/distributed equivalence and the distributed OrderBy algorithm
//!
//! The same queries run against a local item source and a partitioned one;
//! on a single partition the result sequences must be identical, and with
//! several partitions OrderBy output must still be fully ordered.

mod support;

use soniq_runtime::ast::{ArithmeticOp, ComparisonOp, ExprKind};
use soniq_runtime::{
    build_iterator, BuildEnv, DynamicContext, Engine, FunctionRegistry, Globals, InMemorySource,
    Item, Program, RuntimeError, RuntimeIterator, RuntimeOptions,
};
use std::sync::Arc;
use support::*;

fn engine_with(items: Vec<Item>, distributed: bool, partitions: usize) -> Engine {
    let source = if distributed {
        InMemorySource::distributed("c", items)
    } else {
        InMemorySource::new("c", items)
    };
    Engine::new(RuntimeOptions::default().with_partitions(partitions))
        .with_source(Arc::new(source))
}

fn person(name: &str, age: i64) -> Item {
    Item::object(
        vec![
            (Arc::from("name"), Item::string(name)),
            (Arc::from("age"), Item::Integer(age)),
        ],
        &loc(),
    )
    .unwrap()
}

fn people() -> Vec<Item> {
    vec![
        person("carol", 35),
        person("alice", 30),
        person("dan", 30),
        person("bob", 25),
    ]
}

/// for $p in collection("c") order by $p.age return $p.name
fn order_by_age_query(descending: bool) -> Arc<soniq_runtime::ExprNode> {
    let age = node(ExprKind::ObjectLookup {
        base: var("p"),
        key: string("age"),
    });
    let name = node(ExprKind::ObjectLookup {
        base: var("p"),
        key: string("name"),
    });
    let spec = if descending { desc(age) } else { asc(age) };
    flwor(
        vec![for_in("p", collection("c")), order_by(vec![spec], true)],
        name,
    )
}

#[test]
fn single_partition_matches_local() {
    let query = order_by_age_query(false);

    let local = engine_with(people(), false, 1)
        .evaluate_expression(&query)
        .unwrap();
    let distributed = engine_with(people(), true, 1)
        .evaluate_expression(&query)
        .unwrap();

    assert_eq!(local, distributed);
    assert_eq!(
        local,
        vec![
            Item::string("bob"),
            Item::string("alice"),
            Item::string("dan"),
            Item::string("carol"),
        ]
    );
}

#[test]
fn multi_partition_order_by_is_globally_sorted() {
    let query = order_by_age_query(true);
    let result = engine_with(people(), true, 3)
        .evaluate_expression(&query)
        .unwrap();
    assert_eq!(
        result,
        vec![
            Item::string("carol"),
            Item::string("alice"),
            Item::string("dan"),
            Item::string("bob"),
        ]
    );
}

#[test]
fn distributed_pipeline_prefers_rdd_at_the_root() {
    let engine = engine_with(people(), true, 2);
    let query = order_by_age_query(false);

    // probe the built tree: the FLWOR over a partitioned source reports
    // distributed capability, so consumers must collect through rdd()
    let env = Arc::new(
        BuildEnv::new(Arc::new(FunctionRegistry::new()))
            .with_source(Arc::new(InMemorySource::distributed("c", people()))),
    );
    let iter = build_iterator(&query, &env).unwrap();
    assert!(iter.is_rdd());

    // and the engine still evaluates it transparently
    assert_eq!(engine.evaluate_expression(&query).unwrap().len(), 4);
}

#[test]
fn distributed_where_filters() {
    // for $p in collection("c") where $p.age > 28 order by $p.name return $p.name
    let age = node(ExprKind::ObjectLookup {
        base: var("p"),
        key: string("age"),
    });
    let name = node(ExprKind::ObjectLookup {
        base: var("p"),
        key: string("name"),
    });
    let query = flwor(
        vec![
            for_in("p", collection("c")),
            where_is(general_cmp(ComparisonOp::Gt, age, int(28))),
            order_by(vec![asc(name.clone())], false),
        ],
        name,
    );

    let local = engine_with(people(), false, 1)
        .evaluate_expression(&query)
        .unwrap();
    let distributed = engine_with(people(), true, 2)
        .evaluate_expression(&query)
        .unwrap();
    assert_eq!(local, distributed);
    assert_eq!(
        distributed,
        vec![
            Item::string("alice"),
            Item::string("carol"),
            Item::string("dan"),
        ]
    );
}

#[test]
fn distributed_order_by_joins_numeric_types() {
    // a key column mixing integer, decimal and double joins over the
    // numeric lattice instead of erroring
    let items = vec![
        Item::object(vec![(Arc::from("k"), Item::Double(2.5))], &loc()).unwrap(),
        Item::object(vec![(Arc::from("k"), Item::Integer(1))], &loc()).unwrap(),
        Item::object(
            vec![(
                Arc::from("k"),
                Item::decimal(bigdecimal::BigDecimal::from(2)),
            )],
            &loc(),
        )
        .unwrap(),
    ];
    let key = node(ExprKind::ObjectLookup {
        base: var("x"),
        key: string("k"),
    });
    let query = flwor(
        vec![for_in("x", collection("c")), order_by(vec![asc(key.clone())], false)],
        key,
    );
    let result = engine_with(items, true, 2)
        .evaluate_expression(&query)
        .unwrap();
    assert_eq!(result[0], Item::Integer(1));
    assert_eq!(result[2], Item::Double(2.5));
}

#[test]
fn distributed_order_by_rejects_mixed_families() {
    let items = vec![
        Item::object(vec![(Arc::from("k"), Item::Integer(1))], &loc()).unwrap(),
        Item::object(vec![(Arc::from("k"), Item::string("a"))], &loc()).unwrap(),
    ];
    let key = node(ExprKind::ObjectLookup {
        base: var("x"),
        key: string("k"),
    });
    let query = flwor(
        vec![for_in("x", collection("c")), order_by(vec![asc(key.clone())], false)],
        key,
    );
    let result = engine_with(items, true, 2).evaluate_expression(&query);
    assert!(matches!(result, Err(RuntimeError::UnexpectedType { .. })));
}

#[test]
fn distributed_empty_keys_follow_empty_order() {
    // objects without the key sort per empty-order (least by default)
    let items = vec![
        Item::object(vec![(Arc::from("k"), Item::Integer(2))], &loc()).unwrap(),
        Item::object(vec![(Arc::from("other"), Item::Integer(0))], &loc()).unwrap(),
        Item::object(vec![(Arc::from("k"), Item::Integer(1))], &loc()).unwrap(),
    ];
    let key = node(ExprKind::ObjectLookup {
        base: var("x"),
        key: string("k"),
    });
    let query = flwor(
        vec![for_in("x", collection("c")), order_by(vec![asc(key.clone())], false)],
        if_expr(call("empty", vec![key.clone()]), int(-99), key),
    );
    let result = engine_with(items, true, 2)
        .evaluate_expression(&query)
        .unwrap();
    // the empty key comes first, then 1, then 2
    assert_eq!(
        result,
        vec![Item::Integer(-99), Item::Integer(1), Item::Integer(2)]
    );
}

#[test]
fn innermost_error_survives_distributed_execution() {
    // division by zero inside a distributed pipeline surfaces as the
    // original dynamic error, not a generic task failure
    let items = vec![Item::Integer(1), Item::Integer(0)];
    let query = flwor(
        vec![for_in("x", collection("c"))],
        arith(ArithmeticOp::Divide, int(10), var("x")),
    );
    let result = engine_with(items, true, 2).evaluate_expression(&query);
    match result {
        Err(RuntimeError::Dynamic { message, .. }) => {
            assert!(message.contains("division by zero"), "{}", message)
        }
        other => panic!("expected the inner dynamic error, got {:?}", other),
    }
}

#[test]
fn batch_driver_reports_per_expression_results() {
    let engine = engine_with(people(), true, 2);
    let ok = order_by_age_query(false);
    let bad = flwor(
        vec![for_in("p", collection("missing"))],
        var("p"),
    );
    let program = Program {
        prolog: Default::default(),
        expressions: vec![ok, bad],
    };
    let results = engine.run(&program);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
}

#[test]
fn collect_cap_limits_materialization() {
    let engine = Engine::new(RuntimeOptions::default().with_collect_cap(2).with_partitions(2))
        .with_source(Arc::new(InMemorySource::distributed(
            "c",
            (0..10).map(Item::Integer).collect(),
        )));
    let query = flwor(vec![for_in("x", collection("c"))], var("x"));
    let result = engine.evaluate_expression(&query).unwrap();
    assert_eq!(result.len(), 2);
}

#[test]
fn cancellation_reaches_distributed_evaluation() {
    let engine = engine_with((0..100).map(Item::Integer).collect(), true, 2);
    let globals = Arc::new(Globals::new(RuntimeOptions::default()));
    globals.cancel();
    let query = flwor(
        vec![for_in("x", collection("c"))],
        arith(ArithmeticOp::Add, var("x"), int(1)),
    );
    let results = engine.run_with_globals(&Program::expression(query), globals);
    assert!(results[0].is_err());
}

#[test]
fn local_iteration_still_works_under_unset_annotation() {
    // an Unset-annotated collection over a local source stays local
    let engine = engine_with(people(), false, 1);
    let ctx = DynamicContext::root(Arc::new(Globals::new(RuntimeOptions::default()))).into_arc();
    let _ = ctx;
    let query = flwor(vec![for_in("p", collection("c"))], int(1));
    assert_eq!(engine.evaluate_expression(&query).unwrap().len(), 4);
}
