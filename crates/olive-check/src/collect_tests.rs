//! Tests for `For` expressions: sources, list transforms, collectors and
//! item ordering.
//!
//! Each test puts one expression in a `Let` clause of an otherwise valid
//! definition over `rows` and looks at its recorded type or the
//! diagnostics.

use olive_ast::*;

use crate::config::{CheckConfig, UnusedPolicy};
use crate::fixtures::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn with_value(value: Expr) -> Vec<Olive> {
    vec![olive(
        1,
        "rows",
        vec![let_(2, vec![("tag", var(2, "tag")), ("value", value)])],
        define(3, "values", Vec::new()),
    )]
}

#[track_caller]
fn type_of(value: Expr) -> Type {
    let id = value.id;
    let compilation = assert_compiles(with_value(value));
    compilation
        .resolutions
        .type_of(id)
        .cloned()
        .expect("value should have been checked")
}

#[track_caller]
fn fails(value: Expr, expected: &[&str]) {
    assert_fails(with_value(value), expected);
}

fn len(line: u32, argument: Expr) -> Expr {
    at(
        line,
        ExprKind::Call {
            function: ident(line, "len"),
            arguments: vec![argument],
        },
    )
}

fn list(line: u32, items: Vec<Expr>) -> Expr {
    at(line, ExprKind::List(items))
}

fn over_labels(collector: CollectorKind) -> Expr {
    for_each(2, pvar(2, "l"), var(2, "labels"), Vec::new(), collector)
}

fn sorted_labels(collector: CollectorKind) -> Expr {
    let sort = at(2, ListTransformKind::Sort(var(2, "l")));
    for_each(2, pvar(2, "l"), var(2, "labels"), vec![sort], collector)
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[test]
fn count_over_a_list() {
    assert_eq!(type_of(over_labels(CollectorKind::Count)), Type::Integer);
}

#[test]
fn dictionaries_iterate_as_key_value_tuples() {
    let value = for_each(
        2,
        at(2, PatternKind::Tuple(vec![pvar(2, "k"), pvar(2, "v")])),
        var(2, "counts"),
        Vec::new(),
        CollectorKind::Sum(var(2, "v")),
    );
    assert_eq!(type_of(value), Type::Integer);
}

#[test]
fn optionals_iterate_over_their_content() {
    let value = for_each(
        2,
        pvar(2, "o"),
        var(2, "owner"),
        Vec::new(),
        CollectorKind::List(var(2, "o")),
    );
    assert_eq!(type_of(value), Type::list(Type::String));
}

#[test]
fn empty_list_has_no_item_type() {
    let value = for_each(
        2,
        pvar(2, "x"),
        at(2, ExprKind::EmptyList),
        Vec::new(),
        CollectorKind::Count,
    );
    fails(
        value,
        &["Cannot iterate over empty list. No type to check subsequent operations."],
    );
}

#[test]
fn scalars_cannot_be_iterated() {
    let value = for_each(2, pvar(2, "x"), var(2, "size"), Vec::new(), CollectorKind::Count);
    fails(
        value,
        &["Expected list, dictionary or optional, but got integer."],
    );
}

// ---------------------------------------------------------------------------
// Collectors
// ---------------------------------------------------------------------------

#[test]
fn first_without_default_is_optional() {
    let value = over_labels(CollectorKind::First {
        value: var(2, "l"),
        default: None,
    });
    assert_eq!(type_of(value), Type::optional(Type::String));
}

#[test]
fn first_default_must_match_the_value() {
    let value = over_labels(CollectorKind::First {
        value: var(2, "l"),
        default: Some(int(2, 0)),
    });
    fails(
        value,
        &["First would return string, but default value is integer. They must be the same"],
    );
}

#[test]
fn optimum_with_default_is_the_value_type() {
    let value = over_labels(CollectorKind::Optimum {
        extremum: Extremum::Min,
        value: len(2, var(2, "l")),
        default: Some(int(2, 0)),
    });
    assert_eq!(type_of(value), Type::Integer);
}

#[test]
fn optimum_requires_an_orderable_value() {
    let value = for_each(
        2,
        pvar(2, "p"),
        list(2, vec![var(2, "pair")]),
        Vec::new(),
        CollectorKind::Optimum {
            extremum: Extremum::Max,
            value: var(2, "p"),
            default: None,
        },
    );
    fails(
        value,
        &["Expected orderable type for Max but got {integer, string}."],
    );
}

#[test]
fn reduce_folds_into_the_initial_type() {
    let value = over_labels(CollectorKind::Reduce {
        accumulator: pvar(2, "total"),
        initial: int(2, 0),
        reducer: binary(2, BinaryOp::Add, var(2, "total"), len(2, var(2, "l"))),
    });
    assert_eq!(type_of(value), Type::Integer);
}

#[test]
fn reduce_must_keep_the_initial_type() {
    let value = over_labels(CollectorKind::Reduce {
        accumulator: pvar(2, "total"),
        initial: int(2, 0),
        reducer: var(2, "l"),
    });
    fails(
        value,
        &["Reducer produces type string, but initial expression is integer."],
    );
}

#[test]
fn stats_describe_numbers() {
    let value = for_each(
        2,
        pvar(2, "n"),
        list(2, vec![var(2, "size"), int(2, 4)]),
        Vec::new(),
        CollectorKind::Stats(var(2, "n")),
    );
    assert_eq!(
        type_of(value),
        Type::object([
            ("average", Type::Float),
            ("count", Type::Integer),
            ("maximum", Type::Integer),
            ("minimum", Type::Integer),
            ("sum", Type::Integer),
        ])
    );
}

#[test]
fn stats_reject_strings() {
    fails(
        over_labels(CollectorKind::Stats(var(2, "l"))),
        &["Expected integer or float, but got string."],
    );
}

#[test]
fn dictionary_collector() {
    let value = over_labels(CollectorKind::Dictionary {
        key: var(2, "l"),
        value: len(2, var(2, "l")),
    });
    assert_eq!(type_of(value), Type::dictionary(Type::String, Type::Integer));
}

#[test]
fn object_collector_combines_fields() {
    let value = over_labels(CollectorKind::Object(vec![
        field(2, "count", CollectorKind::Count),
        field(
            2,
            "first",
            CollectorKind::First {
                value: var(2, "l"),
                default: None,
            },
        ),
    ]));
    assert_eq!(
        type_of(value),
        Type::object([
            ("count", Type::Integer),
            ("first", Type::optional(Type::String)),
        ])
    );
}

#[test]
fn object_collector_rejects_repeated_fields() {
    let value = over_labels(CollectorKind::Object(vec![
        field(2, "a", CollectorKind::Count),
        field(2, "a", CollectorKind::List(var(2, "l"))),
    ]));
    fails(value, &["Field “a” repeats 2."]);
}

#[test]
fn partition_count_and_matches() {
    let predicate = || binary(2, BinaryOp::Greater, len(2, var(2, "l")), int(2, 3));
    assert_eq!(
        type_of(over_labels(CollectorKind::PartitionCount(predicate()))),
        Type::tuple([Type::Integer, Type::Integer])
    );
    assert_eq!(
        type_of(over_labels(CollectorKind::Matches {
            mode: MatchMode::Any,
            predicate: predicate(),
        })),
        Type::Boolean
    );
}

#[test]
fn tuple_collector_needs_at_least_one_element() {
    let value = sorted_labels(CollectorKind::Tuple {
        value: var(2, "l"),
        size: 0,
    });
    fails(value, &["Tuple collector must collect at least one element."]);
}

#[test]
fn tuple_collector_size_is_bounded() {
    let value = sorted_labels(CollectorKind::Tuple {
        value: var(2, "l"),
        size: 1usize << 60,
    });
    fails(
        value,
        &["Tuple collector size 1152921504606846976 is larger than the limit of 1024."],
    );

    let largest = sorted_labels(CollectorKind::Tuple {
        value: var(2, "l"),
        size: crate::collect::MAX_TUPLE_SIZE,
    });
    assert_eq!(
        type_of(largest),
        Type::optional(Type::Tuple(vec![Type::String; crate::collect::MAX_TUPLE_SIZE]))
    );
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[test]
fn tuple_collector_rejects_random_order() {
    let value = over_labels(CollectorKind::Tuple {
        value: var(2, "l"),
        size: 2,
    });
    fails(
        value,
        &["Tuple collection is based on a random order. That is a bad idea."],
    );
}

#[test]
fn sorting_makes_tuple_collection_deterministic() {
    let value = sorted_labels(CollectorKind::Tuple {
        value: var(2, "l"),
        size: 2,
    });
    assert_eq!(
        type_of(value),
        Type::optional(Type::tuple([Type::String, Type::String]))
    );
}

#[test]
fn provided_concatenation_rejects_random_order() {
    let concat = |mode| CollectorKind::Concatenate {
        value: var(2, "l"),
        delimiter: string(2, ","),
        mode,
    };
    fails(
        over_labels(concat(ConcatenationMode::Provided)),
        &["String concatenation is based on a random order. That is a bad idea."],
    );
    assert_eq!(
        type_of(over_labels(concat(ConcatenationMode::Lexicographical))),
        Type::String
    );
    assert_eq!(
        type_of(sorted_labels(concat(ConcatenationMode::Provided))),
        Type::String
    );
}

#[test]
fn limit_needs_a_known_order() {
    let limit = at(2, ListTransformKind::Limit(int(2, 2)));
    let value = for_each(
        2,
        pvar(2, "l"),
        var(2, "labels"),
        vec![limit],
        CollectorKind::List(var(2, "l")),
    );
    fails(
        value,
        &["“Limit” is applied to items in a random order, so the result is random. Sort them first."],
    );
}

#[test]
fn ranges_are_ordered() {
    let value = at(
        2,
        ExprKind::For {
            pattern: pvar(2, "i"),
            source: Box::new(at(
                2,
                SourceKind::Range {
                    start: int(2, 0),
                    end: var(2, "size"),
                },
            )),
            transforms: vec![at(2, ListTransformKind::Skip(int(2, 1)))],
            collector: Box::new(at(
                2,
                CollectorKind::Tuple {
                    value: var(2, "i"),
                    size: 3,
                },
            )),
        },
    );
    assert_eq!(
        type_of(value),
        Type::optional(Type::tuple([Type::Integer, Type::Integer, Type::Integer]))
    );
}

#[test]
fn nested_flatten_of_a_random_source_loses_the_order() {
    let flatten = at(
        2,
        ListTransformKind::Flatten {
            pattern: pvar(2, "c"),
            source: at(2, SourceKind::Container(list(2, vec![var(2, "l")]))),
            transforms: Vec::new(),
        },
    );
    let value = for_each(
        2,
        pvar(2, "l"),
        var(2, "labels"),
        vec![at(2, ListTransformKind::Sort(var(2, "l"))), flatten],
        CollectorKind::Tuple {
            value: var(2, "c"),
            size: 1,
        },
    );
    fails(
        value,
        &["Tuple collection is based on a random order. That is a bad idea."],
    );
}

#[test]
fn limit_after_map_keeps_the_sorted_order() {
    let transforms = vec![
        at(2, ListTransformKind::Sort(var(2, "l"))),
        at(
            2,
            ListTransformKind::Map {
                pattern: pvar(2, "n"),
                value: len(2, var(2, "l")),
            },
        ),
        at(2, ListTransformKind::Limit(var(2, "limit"))),
    ];
    let value = for_each(
        2,
        pvar(2, "l"),
        var(2, "labels"),
        transforms,
        CollectorKind::List(var(2, "n")),
    );
    assert_eq!(type_of(value), Type::list(Type::Integer));
}

// ---------------------------------------------------------------------------
// Wildcards and captures
// ---------------------------------------------------------------------------

#[test]
fn wildcard_items_supply_unbound_names() {
    let value = for_each(
        2,
        pwild(2),
        list(2, vec![var(2, "info")]),
        Vec::new(),
        CollectorKind::List(var(2, "name")),
    );
    assert_eq!(type_of(value), Type::list(Type::String));
}

#[test]
fn wildcard_demands_must_exist() {
    let value = for_each(
        2,
        pwild(2),
        list(2, vec![var(2, "info")]),
        Vec::new(),
        CollectorKind::List(var(2, "missing")),
    );
    fails(
        value,
        &["Field missing inferred in * does not exist in object { name = string, size = integer }."],
    );
}

#[test]
fn unread_wildcards_follow_the_unused_policy() {
    let value = || {
        for_each(
            2,
            pwild(2),
            list(2, vec![var(2, "info")]),
            Vec::new(),
            CollectorKind::Count,
        )
    };
    fails(
        value(),
        &["No variables map back to this wildcard. It is unused"],
    );

    let config = CheckConfig {
        unused: UnusedPolicy::Warning,
    };
    let (compilation, diagnostics) = check_with(with_value(value()), &config);
    assert!(compilation.compiled);
    assert_eq!(diagnostics.len(), 1);
    assert!(!diagnostics[0].is_error());
}

#[test]
fn captures_exclude_items_and_stream_variables() {
    let condition = binary(
        2,
        BinaryOp::And,
        binary(2, BinaryOp::Greater, len(2, var(2, "l")), var(2, "limit")),
        binary(2, BinaryOp::Greater, var(2, "size"), int(2, 0)),
    );
    let value = for_each(
        2,
        pvar(2, "l"),
        var(2, "labels"),
        vec![at(2, ListTransformKind::Filter(condition))],
        CollectorKind::Count,
    );
    let id = value.id;
    let compilation = assert_compiles(with_value(value));
    let captures: Vec<&str> = compilation
        .resolutions
        .captures(id)
        .expect("captures should be recorded")
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(captures, ["limit"]);
}

#[test]
fn group_collectors_see_rows_in_random_order() {
    let concat = CollectorKind::Concatenate {
        value: var(2, "tag"),
        delimiter: string(2, ","),
        mode: ConcatenationMode::Provided,
    };
    assert_fails(
        vec![olive(
            1,
            "rows",
            vec![group(2, &["id"], vec![field(2, "tags", concat)])],
            run(3, vec![("tag", var(3, "tags"))]),
        )],
        &["String concatenation is based on a random order. That is a bad idea."],
    );
}
