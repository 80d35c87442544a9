//! Helpers shared by the checker tests.
//!
//! Trees are built by hand. Every helper takes the line it should appear
//! on so diagnostics can be told apart.

use olive_ast::*;

use crate::catalogue::Catalogue;
use crate::config::CheckConfig;
use crate::olive::{Compilation, compile};
use crate::Diagnostic;

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

pub(crate) const CATALOGUE: &str = r#"{
    "formats": [
        {
            "name": "rows",
            "variables": [
                {"name": "id", "type": "i", "signable": true},
                {"name": "tag", "type": "s", "signable": true},
                {"name": "size", "type": "i"},
                {"name": "ratio", "type": "f"},
                {"name": "labels", "type": "as"},
                {"name": "owner", "type": "qs"},
                {"name": "pair", "type": "t2is"},
                {"name": "info", "type": "o2name$ssize$i"},
                {"name": "counts", "type": "msi"}
            ],
            "gangs": {
                "key": [
                    {"name": "tag", "type": "s"},
                    {"name": "id", "type": "i"}
                ]
            }
        },
        {
            "name": "owners",
            "variables": [
                {"name": "team", "type": "s"},
                {"name": "lead", "type": "s"}
            ]
        },
        {
            "name": "events",
            "variables": [
                {"name": "event_tag", "type": "s"},
                {"name": "at", "type": "d"}
            ]
        }
    ],
    "functions": [
        {"name": "len", "parameters": ["s"], "return_type": "i"}
    ],
    "actions": [
        {"name": "notify", "parameters": [
            {"name": "tag", "type": "s"},
            {"name": "total", "type": "i", "required": false}
        ]}
    ],
    "constants": [{"name": "limit", "type": "i"}],
    "signatures": [{"name": "sig", "type": "s"}],
    "definitions": [{
        "name": "external_rows",
        "format": "rows",
        "parameters": ["i"],
        "output": [
            {"name": "id", "type": "i", "flavour": "stream_signable"},
            {"name": "tag", "type": "s", "flavour": "stream_signable"}
        ],
        "is_root": true
    }]
}"#;

pub(crate) fn catalogue() -> Catalogue {
    Catalogue::from_json(CATALOGUE).expect("fixture catalogue should load")
}

// ---------------------------------------------------------------------------
// Tree construction
// ---------------------------------------------------------------------------

pub(crate) fn at<T>(line: u32, node: T) -> Spanned<T> {
    Spanned::new(node, Span::new(line, 1))
}

pub(crate) fn ident(line: u32, name: &str) -> Ident {
    at(line, name.to_string())
}

pub(crate) fn var(line: u32, name: &str) -> Expr {
    at(line, ExprKind::Variable(name.to_string()))
}

pub(crate) fn int(line: u32, value: i64) -> Expr {
    at(line, ExprKind::Literal(Literal::Integer(value)))
}

pub(crate) fn string(line: u32, value: &str) -> Expr {
    at(line, ExprKind::Literal(Literal::String(value.to_string())))
}

pub(crate) fn boolean(line: u32, value: bool) -> Expr {
    at(line, ExprKind::Literal(Literal::Boolean(value)))
}

pub(crate) fn binary(line: u32, op: BinaryOp, left: Expr, right: Expr) -> Expr {
    at(
        line,
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    )
}

pub(crate) fn object(line: u32, fields: Vec<(&str, Expr)>) -> Expr {
    at(
        line,
        ExprKind::Object(
            fields
                .into_iter()
                .map(|(name, value)| ObjectField {
                    name: ident(line, name),
                    value,
                })
                .collect(),
        ),
    )
}

pub(crate) fn pvar(line: u32, name: &str) -> Pattern {
    at(line, PatternKind::Variable(name.to_string()))
}

pub(crate) fn pobject(line: u32, fields: Vec<(&str, Pattern)>) -> Pattern {
    at(
        line,
        PatternKind::Object(
            fields
                .into_iter()
                .map(|(field, pattern)| FieldPattern {
                    field: ident(line, field),
                    pattern,
                })
                .collect(),
        ),
    )
}

pub(crate) fn pwild(line: u32) -> Pattern {
    at(line, PatternKind::Wildcard)
}

/// `For pattern In source: transforms collector`
pub(crate) fn for_each(
    line: u32,
    pattern: Pattern,
    source: Expr,
    transforms: Vec<ListTransform>,
    collector: CollectorKind,
) -> Expr {
    at(
        line,
        ExprKind::For {
            pattern,
            source: Box::new(at(line, SourceKind::Container(source))),
            transforms,
            collector: Box::new(at(line, collector)),
        },
    )
}

pub(crate) fn field(line: u32, name: &str, collector: CollectorKind) -> CollectField {
    CollectField {
        name: ident(line, name),
        transforms: Vec::new(),
        collector: at(line, collector),
    }
}

pub(crate) fn group(line: u32, by: &[&str], collectors: Vec<CollectField>) -> Clause {
    at(
        line,
        ClauseKind::Group {
            discriminators: by
                .iter()
                .map(|name| at(line, DiscriminatorKind::Variable(name.to_string())))
                .collect(),
            collectors,
            filter: None,
        },
    )
}

pub(crate) fn where_(line: u32, condition: Expr) -> Clause {
    at(line, ClauseKind::Where(condition))
}

pub(crate) fn let_(line: u32, assignments: Vec<(&str, Expr)>) -> Clause {
    at(
        line,
        ClauseKind::Let(
            assignments
                .into_iter()
                .map(|(name, value)| {
                    at(
                        line,
                        LetArgumentKind::Simple {
                            pattern: pvar(line, name),
                            value,
                        },
                    )
                })
                .collect(),
        ),
    )
}

pub(crate) fn call(line: u32, name: &str, arguments: Vec<Expr>) -> Clause {
    at(
        line,
        ClauseKind::Call(DefinitionCall {
            name: ident(line, name),
            arguments,
        }),
    )
}

pub(crate) fn matches(line: u32, name: &str, arguments: Vec<Expr>) -> Clause {
    at(
        line,
        ClauseKind::Matches(DefinitionCall {
            name: ident(line, name),
            arguments,
        }),
    )
}

pub(crate) fn run(line: u32, arguments: Vec<(&str, Expr)>) -> Terminal {
    at(
        line,
        TerminalKind::Run {
            action: ident(line, "notify"),
            arguments: arguments
                .into_iter()
                .map(|(name, value)| NamedArgument {
                    name: ident(line, name),
                    value,
                })
                .collect(),
        },
    )
}

pub(crate) fn define(line: u32, name: &str, parameters: Vec<(&str, Type)>) -> Terminal {
    at(
        line,
        TerminalKind::Define {
            name: ident(line, name),
            parameters: parameters
                .into_iter()
                .map(|(name, ty)| Parameter {
                    name: ident(line, name),
                    ty,
                })
                .collect(),
        },
    )
}

pub(crate) fn olive(line: u32, format: &str, clauses: Vec<Clause>, terminal: Terminal) -> Olive {
    at(
        line,
        OliveNode {
            format: ident(line, format),
            clauses,
            terminal,
        },
    )
}

/// `Run notify With tag = tag`, the smallest valid terminal for `rows`.
pub(crate) fn notify_tag(line: u32) -> Terminal {
    run(line, vec![("tag", var(line, "tag"))])
}

// ---------------------------------------------------------------------------
// Running the checker
// ---------------------------------------------------------------------------

pub(crate) fn check_with(olives: Vec<Olive>, config: &CheckConfig) -> (Compilation, Vec<Diagnostic>) {
    let program = Program { olives };
    let catalogue = catalogue();
    let mut diagnostics = Vec::new();
    let compilation = compile(&program, &catalogue, config, &mut diagnostics);
    (compilation, diagnostics)
}

pub(crate) fn check(olives: Vec<Olive>) -> (Compilation, Vec<Diagnostic>) {
    check_with(olives, &CheckConfig::default())
}

/// Diagnostics as `line:column: message` strings.
pub(crate) fn messages(diagnostics: &[Diagnostic]) -> Vec<String> {
    diagnostics.iter().map(ToString::to_string).collect()
}

/// Assert the program compiles, showing the diagnostics otherwise.
#[track_caller]
pub(crate) fn assert_compiles(olives: Vec<Olive>) -> Compilation {
    let (compilation, diagnostics) = check(olives);
    assert!(
        compilation.compiled,
        "expected success, got: {:#?}",
        messages(&diagnostics)
    );
    assert!(diagnostics.is_empty(), "{:#?}", messages(&diagnostics));
    compilation
}

/// Assert the program fails with exactly these messages, ignoring
/// locations.
#[track_caller]
pub(crate) fn assert_fails(olives: Vec<Olive>, expected: &[&str]) {
    let (compilation, diagnostics) = check(olives);
    assert!(!compilation.compiled);
    let actual: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(actual, expected);
}
