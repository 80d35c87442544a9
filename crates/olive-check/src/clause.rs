//! Clauses: the stages of an olive's pipeline.
//!
//! Each clause takes the scope left by the clause before it and returns
//! the scope for the next one. Clauses that regroup or reshape rows replace
//! the stream bindings wholesale; filters pass them through.
//!
//! Separately, [`ClauseStreamOrder`] tracks whether the pipeline still
//! produces one output row per input row. Only such a pipeline may call
//! another olive definition, and only such a pipeline can sign its rows.

use std::collections::{BTreeMap, BTreeSet};

use olive_ast::{
    Clause, ClauseKind, CollectField, DefinitionCall, Discriminator, DiscriminatorKind, Expr,
    LetArgumentKind, MonitorLabel, NodeId, Pattern, PatternKind, Span,
};
use olive_diag::{Category, Diagnostic};
use olive_types::Type;
use serde::Serialize;

use crate::capture;
use crate::collect::{Ordering, Row};
use crate::context::{Checker, join_names, location};
use crate::scope::{Binding, BindingType, Flavour, Scope};

/// Whether the pipeline is still one output row per input row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseStreamOrder {
    /// A clause was used where it is not allowed.
    Bad,
    /// Rows are input rows, possibly filtered or extended.
    Pure,
    /// Rows have been grouped, joined or rebuilt.
    Transformed,
}

fn is_signable(flavour: Flavour) -> bool {
    flavour == Flavour::StreamSignable
}

/// Names a pattern binds explicitly, in order.
pub(crate) fn pattern_names(pattern: &Pattern, names: &mut Vec<(String, Span)>) {
    match &pattern.node {
        PatternKind::Variable(name) => names.push((name.clone(), pattern.span)),
        PatternKind::Discard | PatternKind::Wildcard => {}
        PatternKind::Tuple(elements) => elements.iter().for_each(|e| pattern_names(e, names)),
        PatternKind::Object(fields) => fields.iter().for_each(|f| pattern_names(&f.pattern, names)),
    }
}

/// Names that appear more than once, sorted.
fn repeated<'n>(names: impl IntoIterator<Item = &'n str>) -> Vec<&'n str> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name)
        .collect()
}

fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Checker<'_> {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    pub(crate) fn clause_definitions(&mut self, clause: &Clause) -> bool {
        match &clause.node {
            ClauseKind::Where(expr) | ClauseKind::Reject(expr) => self.expr_definitions(expr),
            ClauseKind::Group {
                discriminators,
                collectors,
                filter,
            } => {
                let mut ok = self.discriminator_definitions(discriminators);
                for field in collectors {
                    ok &= self.field_definitions(field);
                }
                ok &= self.group_names(clause.span, discriminators, collectors);
                if let Some(filter) = filter {
                    ok &= self.expr_definitions(filter);
                }
                ok
            }
            ClauseKind::Join {
                format,
                outer_key,
                inner_key,
                ..
            } => {
                let mut ok = self.join_format(clause, format);
                ok &= self.expr_definitions(outer_key);
                ok &= self.expr_definitions(inner_key);
                ok
            }
            ClauseKind::LeftJoin {
                format,
                outer_key,
                inner_key,
                collectors,
                filter,
                ..
            } => {
                let mut ok = self.join_format(clause, format);
                ok &= self.expr_definitions(outer_key);
                ok &= self.expr_definitions(inner_key);
                for field in collectors {
                    ok &= self.field_definitions(field);
                }
                ok &= self.unique_collect_fields(collectors, |count, name| {
                    format!("Collected variable “{name}” is declared {count} times.")
                });
                if let Some(filter) = filter {
                    ok &= self.expr_definitions(filter);
                }
                ok
            }
            ClauseKind::Let(arguments) => {
                let mut ok = true;
                let mut names = Vec::new();
                for argument in arguments {
                    match &argument.node {
                        LetArgumentKind::Simple { pattern, value } => {
                            ok &= self.pattern_definitions(pattern);
                            ok &= self.assignment_keeps_value(pattern);
                            ok &= self.expr_definitions(value);
                            pattern_names(pattern, &mut names);
                        }
                        LetArgumentKind::Gang(gang) => match self.lookup_gang(argument.id, gang, argument.span) {
                            Some(elements) => names.extend(
                                elements.into_iter().map(|e| (e.name, argument.span)),
                            ),
                            None => ok = false,
                        },
                    }
                }
                let duplicates = repeated(names.iter().map(|(name, _)| name.as_str()));
                if !duplicates.is_empty() {
                    self.error(
                        clause.span,
                        Category::DuplicateName,
                        format!(
                            "Duplicate variables in “Let” clause: {}",
                            join_names(duplicates)
                        ),
                    );
                    ok = false;
                }
                ok
            }
            ClauseKind::Flatten { pattern, value } | ClauseKind::Require { pattern, value } => {
                let mut ok = self.pattern_definitions(pattern);
                ok &= self.assignment_keeps_value(pattern);
                ok &= self.expr_definitions(value);
                ok
            }
            ClauseKind::Monitor {
                metric,
                help,
                labels,
            } => self.monitor_definitions(metric, help, labels),
            ClauseKind::Pick {
                value,
                discriminators,
                ..
            } => {
                let ok = self.discriminator_definitions(discriminators);
                self.expr_definitions(value) && ok
            }
            ClauseKind::Call(call) | ClauseKind::Matches(call) => self.call_definitions(call),
        }
    }

    fn assignment_keeps_value(&mut self, pattern: &Pattern) -> bool {
        if pattern.node.is_blank() {
            self.error(pattern.span, Category::PatternMismatch, "Assignment discards value.");
            false
        } else {
            true
        }
    }

    fn lookup_gang(
        &mut self,
        node: NodeId,
        gang: &str,
        span: Span,
    ) -> Option<Vec<crate::catalogue::GangElement>> {
        match self.format.and_then(|format| format.gang(gang)) {
            Some(elements) => {
                let elements = elements.to_vec();
                self.table.gangs.insert(node, elements.clone());
                Some(elements)
            }
            None => {
                let format = self.format_name().to_string();
                self.error(
                    span,
                    Category::UndefinedName,
                    format!("Unknown gang “{gang}” for input format “{format}”."),
                );
                None
            }
        }
    }

    fn discriminator_definitions(&mut self, discriminators: &[Discriminator]) -> bool {
        let mut ok = true;
        for discriminator in discriminators {
            match &discriminator.node {
                DiscriminatorKind::Variable(_) => {}
                DiscriminatorKind::Rename { value, .. } => ok &= self.expr_definitions(value),
                DiscriminatorKind::Gang(gang) => {
                    ok &= self
                        .lookup_gang(discriminator.id, gang, discriminator.span)
                        .is_some();
                }
            }
        }
        ok
    }

    /// Names a discriminator contributes. Gangs must have been looked up.
    fn discriminator_names(&self, discriminator: &Discriminator) -> Vec<String> {
        match &discriminator.node {
            DiscriminatorKind::Variable(name) | DiscriminatorKind::Rename { name, .. } => {
                vec![name.clone()]
            }
            DiscriminatorKind::Gang(_) => self
                .table
                .gangs
                .get(&discriminator.id)
                .map(|elements| elements.iter().map(|e| e.name.clone()).collect())
                .unwrap_or_default(),
        }
    }

    fn group_names(
        &mut self,
        span: Span,
        discriminators: &[Discriminator],
        collectors: &[CollectField],
    ) -> bool {
        let by: Vec<String> = discriminators
            .iter()
            .flat_map(|d| self.discriminator_names(d))
            .collect();
        let mut ok = true;
        let duplicates = repeated(by.iter().map(String::as_str));
        if !duplicates.is_empty() {
            self.error(
                span,
                Category::DuplicateName,
                format!("Duplicate “By” variables: {}", join_names(duplicates)),
            );
            ok = false;
        }
        ok &= self.unique_collect_fields(collectors, |count, name| {
            format!("Collected variable “{name}” is declared {count} times.")
        });
        let by: BTreeSet<&str> = by.iter().map(String::as_str).collect();
        let clashes: BTreeSet<&str> = collectors
            .iter()
            .map(|c| c.name.node.as_str())
            .filter(|name| by.contains(name))
            .collect();
        if !clashes.is_empty() {
            self.error(
                span,
                Category::DuplicateName,
                format!(
                    "Collected variables have same names as “By” variables: {}",
                    join_names(clashes)
                ),
            );
            ok = false;
        }
        ok
    }

    fn join_format(&mut self, clause: &Clause, format: &olive_ast::Ident) -> bool {
        match self.catalogue.format(&format.node) {
            Some(input) => {
                self.table.formats.insert(clause.id, input.clone());
                true
            }
            None => {
                self.error(
                    format.span,
                    Category::UndefinedName,
                    format!(
                        "Unknown input format “{}” in {}.",
                        format.node,
                        clause.node.syntax()
                    ),
                );
                false
            }
        }
    }

    fn monitor_definitions(
        &mut self,
        metric: &olive_ast::Ident,
        help: &str,
        labels: &[MonitorLabel],
    ) -> bool {
        let mut ok = true;
        if !is_metric_name(&metric.node) {
            self.error(
                metric.span,
                Category::InvalidMetric,
                format!("Invalid metric name “{}”.", metric.node),
            );
            ok = false;
        }
        if help.trim().is_empty() {
            self.error(
                metric.span,
                Category::InvalidMetric,
                format!("Help text is required for metric “{}”.", metric.node),
            );
            ok = false;
        }
        for label in labels {
            if !is_label_name(&label.name.node) {
                self.error(
                    label.name.span,
                    Category::InvalidMetric,
                    format!("Invalid label name “{}”.", label.name.node),
                );
                ok = false;
            }
            ok &= self.expr_definitions(&label.value);
        }
        for name in repeated(labels.iter().map(|l| l.name.node.as_str())) {
            self.error(
                metric.span,
                Category::DuplicateName,
                format!("Duplicated label: {name}"),
            );
            ok = false;
        }
        ok
    }

    fn call_definitions(&mut self, call: &DefinitionCall) -> bool {
        let mut ok = true;
        for argument in &call.arguments {
            ok &= self.expr_definitions(argument);
        }
        let name = &call.name.node;
        let signature = match self.definitions.get(name) {
            Some(entry) => {
                let parameters = match &entry.olive.node.terminal.node {
                    olive_ast::TerminalKind::Define { parameters, .. } => parameters.len(),
                    _ => 0,
                };
                Some((entry.olive.node.format.node.clone(), parameters))
            }
            None => self
                .catalogue
                .definition(name)
                .map(|d| (d.format.clone(), d.parameters.len())),
        };
        let Some((format, parameters)) = signature else {
            self.error(
                call.name.span,
                Category::UndefinedName,
                format!("Cannot find matching “Define {name}” for call."),
            );
            return false;
        };
        if format != self.format_name() {
            let current = self.format_name().to_string();
            self.error(
                call.name.span,
                Category::TypeMismatch,
                format!(
                    "“Define {name}” is for input format “{format}”, but this olive uses “{current}”."
                ),
            );
            ok = false;
        }
        if parameters != call.arguments.len() {
            self.error(
                call.name.span,
                Category::ArityMismatch,
                format!(
                    "“Define {name}” expects {parameters} parameters, but {} arguments were provided.",
                    call.arguments.len()
                ),
            );
            ok = false;
        }
        ok
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Resolve one clause, producing the scope the next clause sees.
    pub(crate) fn resolve_clause(&mut self, clause: &Clause, scope: &Scope) -> Scope {
        match &clause.node {
            ClauseKind::Where(expr) | ClauseKind::Reject(expr) => {
                let ok = self.resolve_expr(expr, scope);
                scope.fail(ok)
            }
            ClauseKind::Monitor { labels, .. } => {
                let mut ok = true;
                for label in labels {
                    ok &= self.resolve_expr(&label.value, scope);
                }
                scope.fail(ok)
            }
            ClauseKind::Group {
                discriminators,
                collectors,
                filter,
            } => {
                let mut output = Vec::new();
                let mut ok = self.resolve_discriminators(discriminators, scope, Some(&mut output));
                let row = Row::stream(scope);
                for field in collectors {
                    ok &= self.resolve_field(field, &row);
                    ok &= self.not_redefined(scope, &field.name.node, field.name.span);
                    output.push(collected(field));
                }
                let grouped = scope.replace_stream(output, ok);
                match filter {
                    Some(filter) => {
                        let filter_ok = self.resolve_expr(filter, &grouped);
                        grouped.fail(filter_ok)
                    }
                    None => grouped,
                }
            }
            ClauseKind::Pick {
                value,
                discriminators,
                ..
            } => {
                let ok = self.resolve_discriminators(discriminators, scope, None);
                let value_ok = self.resolve_expr(value, scope);
                scope.fail(ok && value_ok)
            }
            ClauseKind::Join {
                outer_key,
                inner_key,
                ..
            } => {
                let Some((rows, inner)) = self.joined_variables(clause, scope, "") else {
                    return scope.fail(false);
                };
                let mut ok = self.resolve_expr(outer_key, scope);
                ok &= self.resolve_expr(inner_key, &scope.replace_stream(rows, true));
                let output: Vec<Binding> = scope.stream().cloned().chain(inner).collect();
                scope.replace_stream(output, ok)
            }
            ClauseKind::LeftJoin {
                outer_key,
                inner_key,
                prefix,
                collectors,
                filter,
                ..
            } => {
                let Some((rows, inner)) = self.joined_variables(clause, scope, prefix) else {
                    return scope.fail(false);
                };
                let mut ok = self.resolve_expr(outer_key, scope);
                ok &= self.resolve_expr(inner_key, &scope.replace_stream(rows, true));
                let discriminators: Vec<Binding> = scope
                    .stream()
                    .filter(|b| b.flavour != Flavour::StreamSignature)
                    .cloned()
                    .collect();
                let joined =
                    scope.replace_stream(discriminators.iter().cloned().chain(inner), true);
                if let Some(filter) = filter {
                    ok &= self.resolve_expr(filter, &joined);
                }
                let row = Row::stream(&joined);
                let mut output = discriminators;
                for field in collectors {
                    ok &= self.resolve_field(field, &row);
                    if output.iter().any(|b| b.name == field.name.node) {
                        self.error(
                            field.name.span,
                            Category::DuplicateName,
                            format!("Redefinition of variable “{}”.", field.name.node),
                        );
                        ok = false;
                    }
                    ok &= self.not_redefined(scope, &field.name.node, field.name.span);
                    output.push(collected(field));
                }
                scope.replace_stream(output, ok)
            }
            ClauseKind::Let(arguments) => {
                let mut ok = true;
                let mut output = Vec::new();
                let mut wildcards = Vec::new();
                for argument in arguments {
                    match &argument.node {
                        LetArgumentKind::Simple { pattern, value } => {
                            ok &= self.resolve_expr(value, scope);
                            let (bindings, sources) = self.pattern_bindings(pattern, Flavour::Stream);
                            output.extend(bindings);
                            wildcards.extend(sources);
                        }
                        LetArgumentKind::Gang(_) => match self.resolve_gang(argument.id, scope, argument.span) {
                            Some(bindings) => {
                                let declared: Vec<Binding> = bindings
                                    .into_iter()
                                    .map(|binding| Binding {
                                        origin: Some(NodeId::fresh()),
                                        span: argument.span,
                                        ..binding
                                    })
                                    .collect();
                                self.table.let_gangs.insert(argument.id, declared.clone());
                                output.extend(declared);
                            }
                            None => ok = false,
                        },
                    }
                }
                scope.replace_stream_with(output, wildcards, ok)
            }
            ClauseKind::Flatten { pattern, value } | ClauseKind::Require { pattern, value } => {
                let mut ok = self.resolve_expr(value, scope);
                let (bindings, wildcards) = self.pattern_bindings(pattern, Flavour::Stream);
                for binding in &bindings {
                    if scope.get_declared(&binding.name).is_some() {
                        self.error(
                            binding.span,
                            Category::DuplicateName,
                            format!("Variable “{}” is already defined.", binding.name),
                        );
                        ok = false;
                    }
                }
                wildcards
                    .into_iter()
                    .fold(scope.bind_all(bindings), |scope, w| scope.bind_wildcard(w))
                    .fail(ok)
            }
            ClauseKind::Call(call) | ClauseKind::Matches(call) => {
                let arguments_scope = scope.replace_stream([], true);
                let mut ok = true;
                for argument in &call.arguments {
                    ok &= self.resolve_expr(argument, &arguments_scope);
                }
                let Some(target) = self.definition_target(&call.name) else {
                    return scope.fail(false);
                };
                let is_matches = matches!(clause.node, ClauseKind::Matches(_));
                if is_matches && !target.is_root {
                    self.error(
                        call.name.span,
                        Category::ClauseOrder,
                        format!(
                            "“Define {}” does not keep its input rows, so it cannot be used with “Matches”.",
                            target.name
                        ),
                    );
                    ok = false;
                }
                self.table.definitions.insert(clause.id, target.clone());
                if is_matches {
                    scope.fail(ok)
                } else {
                    scope.replace_stream(target.output, ok)
                }
            }
        }
    }

    /// A new stream name must not hide a constant or parameter.
    fn not_redefined(&mut self, scope: &Scope, name: &str, span: Span) -> bool {
        match scope.get_declared(name) {
            Some(existing) if !existing.flavour.is_stream() => {
                self.error(
                    span,
                    Category::DuplicateName,
                    format!("Redefinition of variable “{name}”."),
                );
                false
            }
            _ => true,
        }
    }

    /// Look up a `By` variable. It must be part of the current row.
    fn stream_variable(&mut self, scope: &Scope, name: &str, span: Span) -> Option<Binding> {
        match scope.get_declared(name) {
            None => {
                self.error(
                    span,
                    Category::UndefinedName,
                    format!("Undefined variable “{name}” in “By”."),
                );
                None
            }
            Some(binding) if !binding.flavour.is_stream() => {
                self.error(
                    span,
                    Category::UndefinedName,
                    format!("Non-stream variable “{name}” in “By”."),
                );
                None
            }
            Some(binding) => Some(binding.clone()),
        }
    }

    fn resolve_gang(&mut self, node: NodeId, scope: &Scope, span: Span) -> Option<Vec<Binding>> {
        let elements = self.table.gangs.get(&node)?.clone();
        let mut bindings = Vec::new();
        let mut ok = true;
        for element in &elements {
            match self.stream_variable(scope, &element.name, span) {
                Some(binding) => {
                    if let Some(origin) = binding.origin {
                        self.table.mark_read(origin);
                    }
                    bindings.push(binding.with_flavour(Flavour::Stream));
                }
                None => ok = false,
            }
        }
        self.table.gang_bindings.insert(node, bindings.clone());
        ok.then_some(bindings)
    }

    fn resolve_discriminators(
        &mut self,
        discriminators: &[Discriminator],
        scope: &Scope,
        mut output: Option<&mut Vec<Binding>>,
    ) -> bool {
        let mut ok = true;
        for discriminator in discriminators {
            let produced = match &discriminator.node {
                DiscriminatorKind::Variable(name) => {
                    match self.stream_variable(scope, name, discriminator.span) {
                        Some(binding) => {
                            self.table.record_variable(discriminator.id, binding.clone());
                            vec![binding.with_flavour(Flavour::Stream)]
                        }
                        None => {
                            ok = false;
                            Vec::new()
                        }
                    }
                }
                DiscriminatorKind::Rename { name, value } => {
                    ok &= self.resolve_expr(value, scope);
                    vec![Binding::declared(
                        name,
                        Flavour::Stream,
                        BindingType::Node(value.id),
                        discriminator.id,
                        discriminator.span,
                    )]
                }
                DiscriminatorKind::Gang(_) => {
                    match self.resolve_gang(discriminator.id, scope, discriminator.span) {
                        Some(bindings) => bindings,
                        None => {
                            ok = false;
                            Vec::new()
                        }
                    }
                }
            };
            if let Some(output) = output.as_deref_mut() {
                output.extend(produced);
            }
        }
        ok
    }

    /// Stream bindings for the rows of a joined format: as the inner key
    /// sees them, and renamed with `prefix` as they appear in the joined
    /// row. Reports names present on both sides.
    fn joined_variables(
        &mut self,
        clause: &Clause,
        scope: &Scope,
        prefix: &str,
    ) -> Option<(Vec<Binding>, Vec<Binding>)> {
        let format = self.table.formats.get(&clause.id)?.clone();
        let rows: Vec<Binding> = format.stream().collect();
        let inner: Vec<Binding> = rows
            .iter()
            .map(|b| b.renamed(format!("{prefix}{}", b.name)).with_flavour(Flavour::Stream))
            .collect();
        let both: Vec<&str> = inner
            .iter()
            .filter(|b| scope.stream().any(|outer| outer.name == b.name))
            .map(|b| b.name.as_str())
            .collect();
        if !both.is_empty() {
            self.error(
                clause.span,
                Category::DuplicateName,
                format!(
                    "Duplicate variables on both sides of {}. Please rename or drop the following using a Let: {}",
                    clause.node.syntax(),
                    join_names(both)
                ),
            );
            return None;
        }
        Some((rows, inner))
    }

    // -----------------------------------------------------------------------
    // Stream order
    // -----------------------------------------------------------------------

    /// Advance the pipeline state past one clause. While the pipeline is
    /// pure, signable variables the clause reads are added to `signables`.
    pub(crate) fn ensure_root(
        &mut self,
        clause: &Clause,
        state: ClauseStreamOrder,
        signables: &mut BTreeSet<String>,
    ) -> ClauseStreamOrder {
        let pure = state == ClauseStreamOrder::Pure;
        let transformed = match state {
            ClauseStreamOrder::Bad => ClauseStreamOrder::Bad,
            _ => ClauseStreamOrder::Transformed,
        };
        match &clause.node {
            ClauseKind::Where(expr) | ClauseKind::Reject(expr) => {
                if pure {
                    self.add_signables(signables, [expr]);
                }
                state
            }
            ClauseKind::Monitor { labels, .. } => {
                if pure {
                    self.add_signables(signables, labels.iter().map(|l| &l.value));
                }
                state
            }
            // Flatten and Require only add unsignable variables, so the
            // rows keep their signatures.
            ClauseKind::Flatten { value, .. } | ClauseKind::Require { value, .. } => {
                if pure {
                    self.add_signables(signables, [value]);
                }
                state
            }
            ClauseKind::Pick {
                value,
                discriminators,
                ..
            } => {
                if pure {
                    self.add_signables(signables, [value]);
                    self.add_discriminator_signables(signables, discriminators);
                }
                state
            }
            ClauseKind::Group {
                discriminators,
                collectors,
                ..
            } => {
                if pure {
                    self.add_discriminator_signables(signables, discriminators);
                    for field in collectors {
                        signables.extend(capture::free_variables_field(
                            &self.table,
                            field,
                            is_signable,
                        ));
                    }
                }
                transformed
            }
            ClauseKind::Let(arguments) => {
                if pure {
                    for argument in arguments {
                        match &argument.node {
                            LetArgumentKind::Simple { value, .. } => {
                                self.add_signables(signables, [value]);
                            }
                            LetArgumentKind::Gang(_) => {
                                self.add_gang_signables(signables, argument.id);
                            }
                        }
                    }
                }
                transformed
            }
            ClauseKind::Join { outer_key, .. } => {
                if pure {
                    self.add_signables(signables, [outer_key]);
                }
                transformed
            }
            // Every outer row survives a left join exactly once.
            ClauseKind::LeftJoin { outer_key, .. } => {
                if pure {
                    self.add_signables(signables, [outer_key]);
                }
                state
            }
            ClauseKind::Call(call) | ClauseKind::Matches(call) => match state {
                ClauseStreamOrder::Bad => ClauseStreamOrder::Bad,
                ClauseStreamOrder::Transformed => {
                    let message = format!(
                        "{} clause cannot be applied to transformed result.",
                        clause.node.syntax()
                    );
                    self.report(
                        Diagnostic::error(Category::ClauseOrder, message)
                            .at(location(clause.span))
                            .with_help("Move it before any Group, Join or Let clause."),
                    );
                    ClauseStreamOrder::Bad
                }
                ClauseStreamOrder::Pure => {
                    self.add_signables(signables, &call.arguments);
                    match self.table.definitions.get(&clause.id) {
                        Some(target) => {
                            signables.extend(self.called_signables(&target.name));
                            if target.is_root {
                                ClauseStreamOrder::Pure
                            } else {
                                ClauseStreamOrder::Transformed
                            }
                        }
                        None => ClauseStreamOrder::Bad,
                    }
                }
            },
        }
    }

    pub(crate) fn add_signables<'e>(
        &self,
        signables: &mut BTreeSet<String>,
        exprs: impl IntoIterator<Item = &'e Expr>,
    ) {
        signables.extend(capture::free_variables_all(&self.table, exprs, is_signable));
    }

    fn add_discriminator_signables(
        &self,
        signables: &mut BTreeSet<String>,
        discriminators: &[Discriminator],
    ) {
        for discriminator in discriminators {
            match &discriminator.node {
                DiscriminatorKind::Variable(_) => {
                    if let Some(binding) = self.table.binding(discriminator.id)
                        && is_signable(binding.flavour)
                    {
                        signables.insert(binding.name.clone());
                    }
                }
                DiscriminatorKind::Rename { value, .. } => self.add_signables(signables, [value]),
                DiscriminatorKind::Gang(_) => self.add_gang_signables(signables, discriminator.id),
            }
        }
    }

    /// Gang members are copied with a plain stream flavour, so check the
    /// flavour they had in the format.
    fn add_gang_signables(&self, signables: &mut BTreeSet<String>, node: NodeId) {
        let Some(format) = self.format else {
            return;
        };
        for element in self.table.gangs.get(&node).into_iter().flatten() {
            if format
                .variables
                .iter()
                .any(|v| v.name == element.name && v.signable)
            {
                signables.insert(element.name.clone());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Type checking
    // -----------------------------------------------------------------------

    pub(crate) fn check_clause(&mut self, clause: &Clause) -> bool {
        match &clause.node {
            ClauseKind::Where(expr) | ClauseKind::Reject(expr) => self.check_condition(expr),
            ClauseKind::Monitor { labels, .. } => {
                let mut ok = true;
                for label in labels {
                    let ty = self.check_expr(&label.value);
                    ok &= self.expect_type(label.value.span, &Type::String, &ty);
                }
                ok
            }
            ClauseKind::Group {
                discriminators,
                collectors,
                filter,
            } => {
                let mut ok = self.check_discriminators(discriminators);
                ok &= self.check_collected(collectors);
                if let Some(filter) = filter {
                    ok &= self.check_condition(filter);
                }
                ok
            }
            ClauseKind::Pick {
                extremum: _,
                value,
                discriminators,
            } => {
                let ok = self.check_discriminators(discriminators);
                let ty = self.check_expr(value);
                self.expect_orderable(value.span, &ty, "sorting") && ok
            }
            ClauseKind::Join {
                outer_key,
                inner_key,
                intersection,
                ..
            } => self.check_join_keys(outer_key, inner_key, *intersection),
            ClauseKind::LeftJoin {
                outer_key,
                inner_key,
                collectors,
                filter,
                intersection,
                ..
            } => {
                let mut ok = self.check_join_keys(outer_key, inner_key, *intersection);
                if let Some(filter) = filter {
                    ok &= self.check_condition(filter);
                }
                ok &= self.check_collected(collectors);
                ok
            }
            ClauseKind::Let(arguments) => {
                let mut ok = true;
                for argument in arguments {
                    ok &= match &argument.node {
                        LetArgumentKind::Simple { pattern, value } => {
                            let ty = self.check_expr(value);
                            self.check_pattern(pattern, &ty)
                        }
                        LetArgumentKind::Gang(_) => self.check_gang(argument.id),
                    };
                }
                ok
            }
            ClauseKind::Flatten { pattern, value } => {
                let ty = self.check_expr(value);
                let element = match &ty {
                    Type::Bad => Type::Bad,
                    Type::Empty => {
                        self.error(
                            value.span,
                            Category::TypeMismatch,
                            "Cannot iterate over empty list. No type to check subsequent operations.",
                        );
                        Type::Bad
                    }
                    other => other.element().unwrap_or_else(|| {
                        self.type_error(value.span, "list or dictionary", other);
                        Type::Bad
                    }),
                };
                self.check_pattern(pattern, &element)
            }
            ClauseKind::Require { pattern, value } => {
                let ty = self.check_expr(value);
                let inner = match ty {
                    Type::Bad => Type::Bad,
                    Type::Optional(inner) => *inner,
                    other => {
                        self.type_error(value.span, "optional", &other);
                        Type::Bad
                    }
                };
                self.check_pattern(pattern, &inner)
            }
            ClauseKind::Call(call) | ClauseKind::Matches(call) => {
                let types: Vec<Type> = call.arguments.iter().map(|a| self.check_expr(a)).collect();
                let Some(target) = self.table.definitions.get(&clause.id).cloned() else {
                    return false;
                };
                let mut ok = true;
                for (index, ((argument, expected), actual)) in call
                    .arguments
                    .iter()
                    .zip(&target.parameters)
                    .zip(&types)
                    .enumerate()
                {
                    if actual.is_bad() {
                        ok = false;
                    } else if !expected.is_same(actual) {
                        self.error(
                            argument.span,
                            Category::TypeMismatch,
                            format!(
                                "Parameter {} to “Define {}” expects {expected}, but got {actual}.",
                                index + 1,
                                target.name
                            ),
                        );
                        ok = false;
                    }
                }
                ok
            }
        }
    }

    fn check_condition(&mut self, expr: &Expr) -> bool {
        let ty = self.check_expr(expr);
        self.expect_type(expr.span, &Type::Boolean, &ty)
    }

    /// Grouped collectors see the rows of each group in no particular order.
    fn check_collected(&mut self, collectors: &[CollectField]) -> bool {
        let mut ok = true;
        for field in collectors {
            let ty = self.check_field(field);
            ok &= !ty.is_bad() && self.field_ordering(field, Ordering::Random);
        }
        ok
    }

    fn check_discriminators(&mut self, discriminators: &[Discriminator]) -> bool {
        let mut ok = true;
        for discriminator in discriminators {
            ok &= match &discriminator.node {
                DiscriminatorKind::Variable(_) => true,
                DiscriminatorKind::Rename { value, .. } => !self.check_expr(value).is_bad(),
                DiscriminatorKind::Gang(_) => self.check_gang(discriminator.id),
            };
        }
        ok
    }

    fn check_gang(&mut self, node: NodeId) -> bool {
        let elements = self.table.gangs.get(&node).cloned().unwrap_or_default();
        let bindings = self.table.gang_bindings.get(&node).cloned().unwrap_or_default();
        let mut ok = true;
        for (element, binding) in elements.iter().zip(&bindings) {
            let actual = self.table.binding_type(binding);
            if !actual.is_bad() && !element.ty.is_same(&actual) {
                self.error(
                    binding.span,
                    Category::TypeMismatch,
                    format!(
                        "Variable {} in gang should have type {} but got {actual}.",
                        element.name, element.ty
                    ),
                );
                ok = false;
            }
        }
        ok
    }

    fn check_join_keys(&mut self, outer_key: &Expr, inner_key: &Expr, intersection: bool) -> bool {
        let outer = self.check_expr(outer_key);
        let inner = self.check_expr(inner_key);
        if outer.is_bad() || inner.is_bad() {
            return false;
        }
        if intersection {
            let mut ok = true;
            for (key, ty) in [(outer_key, &outer), (inner_key, &inner)] {
                if !matches!(ty, Type::List(_)) {
                    self.type_error(key.span, "list", ty);
                    ok = false;
                }
            }
            if !ok {
                return false;
            }
        }
        if outer.is_same(&inner) {
            true
        } else {
            self.type_error(inner_key.span, &outer, &inner);
            false
        }
    }

    // -----------------------------------------------------------------------
    // Unused declarations
    // -----------------------------------------------------------------------

    /// Report declarations of `clause` nothing reads. `Let` bindings are
    /// skipped when `exported`, since callers of a definition read them.
    pub(crate) fn clause_unused(&mut self, clause: &Clause, exported: bool) -> bool {
        let collectors = match &clause.node {
            ClauseKind::Group { collectors, .. } | ClauseKind::LeftJoin { collectors, .. } => {
                collectors.as_slice()
            }
            ClauseKind::Let(arguments) if !exported => {
                let mut ok = true;
                for argument in arguments {
                    match &argument.node {
                        LetArgumentKind::Simple { pattern, .. } => {
                            ok &= self.pattern_unused(pattern);
                        }
                        LetArgumentKind::Gang(gang) => {
                            let declared = self.table.let_gangs.get(&argument.id).cloned();
                            for binding in declared.unwrap_or_default() {
                                if binding.origin.is_some_and(|origin| !self.table.is_read(origin)) {
                                    ok &= self.unused(
                                        argument.span,
                                        format!(
                                            "Gang “@{gang}” contains “{}”, but this is never used.",
                                            binding.name
                                        ),
                                    );
                                }
                            }
                        }
                    }
                }
                return ok;
            }
            _ => return true,
        };
        let mut ok = true;
        for field in collectors {
            if !self.table.is_read(field.name.id) {
                ok &= self.unused(
                    field.name.span,
                    format!("Collected result “{}” is never used.", field.name.node),
                );
            }
        }
        ok
    }

    fn pattern_unused(&mut self, pattern: &Pattern) -> bool {
        match &pattern.node {
            PatternKind::Variable(name) if !self.table.is_read(pattern.id) => self.unused(
                pattern.span,
                format!("Variable “{name}” is never used."),
            ),
            PatternKind::Variable(_) | PatternKind::Discard | PatternKind::Wildcard => true,
            PatternKind::Tuple(elements) => elements
                .iter()
                .fold(true, |ok, element| self.pattern_unused(element) & ok),
            PatternKind::Object(fields) => fields
                .iter()
                .fold(true, |ok, field| self.pattern_unused(&field.pattern) & ok),
        }
    }
}

/// The stream binding a grouping clause produces for one collector.
fn collected(field: &CollectField) -> Binding {
    Binding::declared(
        &field.name.node,
        Flavour::Stream,
        BindingType::Node(field.collector.id),
        field.name.id,
        field.name.span,
    )
}
