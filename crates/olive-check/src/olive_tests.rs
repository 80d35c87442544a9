//! End-to-end tests of [`compile`](crate::compile): whole olives, olive
//! definitions and the stream-order state machine.

use insta::assert_snapshot;
use olive_ast::*;

use crate::config::{CheckConfig, UnusedPolicy};
use crate::dashboard::{Behaviour, TerminalSummary};
use crate::fixtures::*;

fn gt(line: u32, name: &str, value: Expr) -> Expr {
    binary(line, BinaryOp::Greater, var(line, name), value)
}

/// `Define <name>(parameters): Where size > <bound>` over `rows`.
fn filter_definition(line: u32, name: &str, parameters: Vec<(&str, Type)>, bound: Expr) -> Olive {
    olive(
        line,
        "rows",
        vec![where_(line + 1, gt(line + 1, "size", bound))],
        define(line + 2, name, parameters),
    )
}

fn counted(line: u32) -> Clause {
    group(line, &["tag"], vec![field(line, "total", CollectorKind::Count)])
}

// ---------------------------------------------------------------------------
// Single olives
// ---------------------------------------------------------------------------

#[test]
fn group_sum_compiles() {
    let total = field(2, "total", CollectorKind::Sum(var(2, "id")));
    let collector = total.collector.id;
    let program = vec![olive(
        1,
        "rows",
        vec![group(2, &["tag"], vec![total])],
        run(3, vec![("tag", var(3, "tag")), ("total", var(3, "total"))]),
    )];
    let compilation = assert_compiles(program);
    assert_eq!(compilation.resolutions.type_of(collector), Some(&Type::Integer));

    let summary = &compilation.summaries[0];
    assert_eq!(summary.kind, TerminalSummary::Run);
    assert_eq!(summary.signable, ["id", "tag"]);
    let total = &summary.clauses[0].variables[1];
    assert_eq!(total.name, "total");
    assert_eq!(total.behaviour, Behaviour::Definition);
    assert_eq!(total.inputs, ["id"]);
}

#[test]
fn destructuring_a_tuple_as_an_object() {
    let pattern = pobject(2, vec![("a", pvar(2, "a")), ("b", pvar(2, "b"))]);
    let clause = at(
        2,
        ClauseKind::Let(vec![at(
            2,
            LetArgumentKind::Simple {
                pattern,
                value: var(2, "pair"),
            },
        )]),
    );
    assert_fails(
        vec![olive(1, "rows", vec![clause], run(3, vec![("tag", var(3, "a"))]))],
        &["Object expected for destructuring, but got {integer, string}."],
    );
}

#[test]
fn one_wildcard_per_object_pattern() {
    let pattern = pobject(2, vec![("name", pwild(2)), ("size", pwild(2))]);
    let clause = at(
        2,
        ClauseKind::Let(vec![at(
            2,
            LetArgumentKind::Simple {
                pattern,
                value: var(2, "info"),
            },
        )]),
    );
    assert_fails(
        vec![olive(1, "rows", vec![clause], notify_tag(3))],
        &["Multiple wildcards are not allowed in object."],
    );
}

#[test]
fn object_equality_ignores_field_order() {
    let left = object(
        2,
        vec![
            ("a", int(2, 1)),
            ("b", object(2, vec![("c", var(2, "tag")), ("d", var(2, "size"))])),
        ],
    );
    let right = object(
        2,
        vec![
            ("b", object(2, vec![("d", var(2, "size")), ("c", var(2, "tag"))])),
            ("a", int(2, 1)),
        ],
    );
    let condition = binary(2, BinaryOp::Equal, left, right);
    assert_compiles(vec![olive(1, "rows", vec![where_(2, condition)], notify_tag(3))]);
}

#[test]
fn unknown_input_format() {
    assert_fails(
        vec![olive(1, "nope", Vec::new(), notify_tag(2))],
        &["Unknown input format “nope”."],
    );
}

#[test]
fn action_arguments_are_matched_by_name() {
    assert_fails(
        vec![olive(
            1,
            "rows",
            Vec::new(),
            run(2, vec![("total", var(2, "size")), ("colour", var(2, "tag"))]),
        )],
        &[
            "Extra arguments for action notify: colour",
            "Missing arguments for action notify: tag",
        ],
    );
    assert_fails(
        vec![olive(1, "rows", Vec::new(), run(2, vec![("tag", var(2, "size"))]))],
        &["Expected string, but got integer."],
    );
}

#[test]
fn alert_terminal() {
    let alert = |ttl| {
        at(
            2,
            TerminalKind::Alert {
                labels: vec![NamedArgument {
                    name: ident(2, "alertname"),
                    value: var(2, "tag"),
                }],
                annotations: Vec::new(),
                ttl,
            },
        )
    };
    let compilation = assert_compiles(vec![olive(1, "rows", Vec::new(), alert(var(2, "size")))]);
    assert_eq!(compilation.summaries[0].kind, TerminalSummary::Alert);
    assert_eq!(compilation.summaries[0].signable, ["tag"]);

    assert_fails(
        vec![olive(1, "rows", Vec::new(), alert(var(2, "tag")))],
        &["Expected integer, but got string."],
    );
}

// ---------------------------------------------------------------------------
// Definitions and the stream order
// ---------------------------------------------------------------------------

#[test]
fn call_after_group_is_rejected() {
    let program = vec![
        filter_definition(1, "active", Vec::new(), int(2, 3)),
        olive(
            4,
            "rows",
            vec![counted(5), call(6, "active", Vec::new())],
            notify_tag(7),
        ),
    ];
    let (compilation, diagnostics) = check(program);
    assert!(!compilation.compiled);
    assert_eq!(
        messages(&diagnostics),
        ["6:1: Call clause cannot be applied to transformed result."]
    );
    assert_eq!(
        diagnostics[0].help.as_deref(),
        Some("Move it before any Group, Join or Let clause.")
    );
}

#[test]
fn call_before_group_compiles() {
    let program = vec![
        olive(
            1,
            "rows",
            vec![call(2, "active", vec![int(2, 3)]), counted(3)],
            run(4, vec![("tag", var(4, "tag")), ("total", var(4, "total"))]),
        ),
        filter_definition(5, "active", vec![("min", Type::Integer)], var(6, "min")),
    ];
    let compilation = assert_compiles(program);
    assert_eq!(compilation.summaries[1].kind, TerminalSummary::Define);
    assert_eq!(compilation.summaries[1].name.as_deref(), Some("active"));
}

#[test]
fn definitions_cannot_include_themselves() {
    let program = vec![olive(
        1,
        "rows",
        vec![call(2, "loop", Vec::new())],
        define(3, "loop", Vec::new()),
    )];
    assert_fails(program, &["Olive definition loop includes itself."]);
}

#[test]
fn mutual_recursion_is_reported_once() {
    let program = vec![
        olive(1, "rows", vec![call(2, "b", Vec::new())], define(3, "a", Vec::new())),
        olive(4, "rows", vec![call(5, "a", Vec::new())], define(6, "b", Vec::new())),
    ];
    let (compilation, diagnostics) = check(program);
    assert!(!compilation.compiled);
    assert_eq!(diagnostics.len(), 1, "{:#?}", messages(&diagnostics));
    assert!(diagnostics[0].message.ends_with("includes itself."));
}

#[test]
fn duplicate_definitions() {
    let program = vec![
        filter_definition(1, "active", Vec::new(), int(2, 3)),
        filter_definition(4, "active", Vec::new(), int(5, 4)),
    ];
    let (compilation, diagnostics) = check(program);
    assert!(!compilation.compiled);
    assert_eq!(
        messages(&diagnostics),
        ["6:1: Duplicate definition of “Define active”. Previous entry on 1:1."]
    );
}

#[test]
fn call_checks_the_definition_signature() {
    let definition = || filter_definition(1, "sized", vec![("min", Type::Integer)], var(2, "min"));

    assert_fails(
        vec![
            definition(),
            olive(4, "rows", vec![call(5, "sized", vec![string(5, "x")])], notify_tag(6)),
        ],
        &["Parameter 1 to “Define sized” expects integer, but got string."],
    );
    assert_fails(
        vec![
            definition(),
            olive(4, "rows", vec![call(5, "sized", Vec::new())], notify_tag(6)),
        ],
        &["“Define sized” expects 1 parameters, but 0 arguments were provided."],
    );
    assert_fails(
        vec![
            definition(),
            olive(
                4,
                "owners",
                vec![call(5, "sized", vec![int(5, 1)])],
                run(6, vec![("tag", var(6, "team"))]),
            ),
        ],
        &["“Define sized” is for input format “rows”, but this olive uses “owners”."],
    );
    assert_fails(
        vec![olive(1, "rows", vec![call(2, "missing", Vec::new())], notify_tag(3))],
        &["Cannot find matching “Define missing” for call."],
    );
}

#[test]
fn call_arguments_cannot_read_the_stream() {
    let program = vec![
        filter_definition(1, "sized", vec![("min", Type::Integer)], var(2, "min")),
        olive(4, "rows", vec![call(5, "sized", vec![var(5, "size")])], notify_tag(6)),
    ];
    assert_fails(program, &["Undefined variable “size”."]);
}

#[test]
fn matches_keeps_the_stream() {
    let program = vec![
        filter_definition(1, "big", Vec::new(), var(2, "limit")),
        olive(
            4,
            "rows",
            vec![matches(5, "big", Vec::new())],
            run(6, vec![("tag", var(6, "tag")), ("total", var(6, "size"))]),
        ),
    ];
    let compilation = assert_compiles(program);
    assert_eq!(compilation.summaries[1].signable, ["tag"]);
}

#[test]
fn matches_needs_a_row_preserving_definition() {
    let program = vec![
        olive(1, "rows", vec![counted(2)], define(3, "grouped", Vec::new())),
        olive(4, "rows", vec![matches(5, "grouped", Vec::new())], notify_tag(6)),
    ];
    assert_fails(
        program,
        &["“Define grouped” does not keep its input rows, so it cannot be used with “Matches”."],
    );
}

#[test]
fn calls_inherit_the_signables_their_definition_reads() {
    let program = vec![
        olive(
            1,
            "rows",
            vec![where_(2, gt(2, "id", int(2, 3)))],
            define(3, "large_ids", Vec::new()),
        ),
        olive(4, "rows", vec![call(5, "large_ids", Vec::new())], notify_tag(6)),
    ];
    let compilation = assert_compiles(program);
    assert_eq!(compilation.summaries[0].signable, ["id"]);
    assert_eq!(compilation.summaries[1].signable, ["id", "tag"]);
}

#[test]
fn catalogue_definitions_can_be_called() {
    let program = vec![olive(
        1,
        "rows",
        vec![call(2, "external_rows", vec![var(2, "limit")])],
        notify_tag(3),
    )];
    let compilation = assert_compiles(program);
    assert_eq!(compilation.summaries[0].signable, ["tag"]);
}

#[test]
fn failed_definitions_fail_their_callers_quietly() {
    let broken = olive(
        1,
        "rows",
        vec![where_(2, var(2, "nope"))],
        define(3, "broken", Vec::new()),
    );
    let program = vec![
        broken,
        olive(4, "rows", vec![call(5, "broken", Vec::new())], notify_tag(6)),
    ];
    assert_fails(program, &["Undefined variable “nope”."]);
}

// ---------------------------------------------------------------------------
// Policy and output
// ---------------------------------------------------------------------------

#[test]
fn unused_policy_controls_severity() {
    let program = || {
        vec![olive(
            1,
            "rows",
            vec![group(
                2,
                &["tag"],
                vec![
                    field(2, "total", CollectorKind::Count),
                    field(2, "extra", CollectorKind::Count),
                ],
            )],
            run(3, vec![("tag", var(3, "tag")), ("total", var(3, "total"))]),
        )]
    };

    let warn = CheckConfig {
        unused: UnusedPolicy::Warning,
    };
    let (compilation, diagnostics) = check_with(program(), &warn);
    assert!(compilation.compiled);
    assert_eq!(
        messages(&diagnostics),
        ["2:1: Collected result “extra” is never used."]
    );
    assert!(!diagnostics[0].is_error());

    let ignore = CheckConfig {
        unused: UnusedPolicy::Ignore,
    };
    let (compilation, diagnostics) = check_with(program(), &ignore);
    assert!(compilation.compiled);
    assert!(diagnostics.is_empty());
}

#[test]
fn try_compile_returns_the_diagnostics() {
    let catalogue = catalogue();
    let config = CheckConfig::default();

    let good = Program {
        olives: vec![olive(1, "rows", Vec::new(), notify_tag(2))],
    };
    let compilation = crate::try_compile(&good, &catalogue, &config).expect("program compiles");
    assert_eq!(compilation.summaries.len(), 1);

    let bad = Program {
        olives: vec![olive(1, "rows", vec![where_(2, var(2, "size"))], notify_tag(3))],
    };
    let err = crate::try_compile(&bad, &catalogue, &config).expect_err("program fails");
    assert_eq!(err.error_count(), 1);
    assert_eq!(err.to_string(), "2:1: Expected boolean, but got integer.");
}

#[test]
fn summaries_serialize() {
    let compilation = assert_compiles(vec![olive(
        1,
        "rows",
        vec![where_(2, gt(2, "id", int(2, 0)))],
        notify_tag(3),
    )]);
    let value = serde_json::to_value(&compilation.summaries).expect("summaries serialize");
    assert_eq!(value[0]["kind"], "run");
    assert_eq!(value[0]["format"], "rows");
    assert_eq!(value[0]["clauses"][0]["syntax"], "Where");
    assert_eq!(value[0]["clauses"][0]["variables"][0]["name"], "id");
    assert_eq!(value[0]["clauses"][0]["variables"][0]["type"], "i");
    assert_eq!(value[0]["clauses"][0]["variables"][0]["behaviour"], "observer");
    assert_eq!(value[0]["signable"], serde_json::json!(["id", "tag"]));
    assert!(value[0].get("name").is_none());
}

#[test]
fn broken_program_snapshot() {
    let program = vec![
        olive(1, "rows", vec![where_(2, var(2, "size"))], notify_tag(3)),
        olive(
            4,
            "owners",
            vec![group(
                5,
                &["team"],
                vec![
                    field(5, "total", CollectorKind::Count),
                    field(5, "extra", CollectorKind::Count),
                ],
            )],
            run(6, vec![("tag", var(6, "team")), ("total", var(6, "total"))]),
        ),
        olive(7, "events", Vec::new(), run(8, vec![("total", var(8, "at"))])),
        olive(9, "nope", Vec::new(), notify_tag(10)),
    ];
    let (compilation, diagnostics) = check(program);
    assert!(!compilation.compiled);
    let output = diagnostics
        .iter()
        .map(|diagnostic| diagnostic.render())
        .collect::<Vec<_>>()
        .join("\n");
    assert_snapshot!("broken_program", output);
}
