//! Whole-program checking.
//!
//! Every olive goes through the same phases, each visiting every olive
//! before the next phase starts:
//!
//! 1. definitions: external names (formats, functions, actions, gangs,
//!    olive definitions) are looked up;
//! 2. resolution: a scope is threaded through the clauses. `Define` olives
//!    are resolved first, on demand, so a caller always sees the row shape
//!    its target produces;
//! 3. stream order: the clause state machine is folded over the pipeline;
//! 4. type checking, in the order resolution finished;
//! 5. unused declarations.
//!
//! An olive that fails one phase is skipped by the later ones.

use std::collections::{BTreeMap, BTreeSet};

use olive_ast::{
    ClauseKind, Ident, NamedArgument, Olive, Program, Terminal, TerminalKind,
};
use olive_diag::{Category, DiagnosticError, DiagnosticSink, has_errors};
use olive_types::Type;
use tracing::{debug, info_span, trace};

use crate::catalogue::Catalogue;
use crate::clause::ClauseStreamOrder;
use crate::config::CheckConfig;
use crate::context::{Checker, DefinitionEntry, DefinitionState, join_names};
use crate::dashboard::{self, OliveSummary};
use crate::scope::{Binding, BindingType, Flavour, Scope};
use crate::table::{ResolvedDefinition, Resolutions};

/// The outcome of checking one program.
#[derive(Debug)]
pub struct Compilation {
    /// True when no errors were reported. Warnings do not count.
    pub compiled: bool,
    pub resolutions: Resolutions,
    /// One entry per olive, in program order.
    pub summaries: Vec<OliveSummary>,
}

/// An olive that resolved cleanly, with the scope before each clause and
/// after the last one.
#[derive(Debug)]
pub(crate) struct ResolvedOlive<'a> {
    pub(crate) index: usize,
    pub(crate) olive: &'a Olive,
    pub(crate) scopes: Vec<Scope>,
}

/// Check a whole program against a catalogue. Every problem found is
/// reported to `sink`.
pub fn compile(
    program: &Program,
    catalogue: &Catalogue,
    config: &CheckConfig,
    sink: &mut dyn DiagnosticSink,
) -> Compilation {
    let _span = info_span!("compile", olives = program.olives.len()).entered();
    let mut checker = Checker::new(catalogue, config, sink);

    let mut good = checker.register_definitions(program);
    for (index, olive) in program.olives.iter().enumerate() {
        if good[index] && !checker.olive_definitions(olive, index) {
            good[index] = false;
            checker.definition_failed(olive, index);
        }
    }
    debug!(passed = count(&good), "definitions phase finished");

    let names: Vec<String> = checker.definitions.keys().cloned().collect();
    for name in &names {
        checker.resolve_definition(name);
    }
    for (index, olive) in program.olives.iter().enumerate() {
        if good[index] && olive.node.definition_name().is_none() {
            checker.enter(olive, index);
            if let Some(scopes) = checker.resolve_olive(olive) {
                checker.resolved.push(ResolvedOlive {
                    index,
                    olive,
                    scopes,
                });
            }
        }
    }
    debug!(passed = checker.resolved.len(), "resolution phase finished");

    let resolved = std::mem::take(&mut checker.resolved);
    let mut passed = vec![false; program.olives.len()];
    let mut signables: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
    for entry in &resolved {
        checker.enter(entry.olive, entry.index);
        let Some(signable) = checker.stream_order(entry.olive) else {
            continue;
        };
        if let Some(name) = entry.olive.node.definition_name() {
            checker
                .definition_signables
                .insert(name.node.clone(), signable.clone());
        }
        signables.insert(entry.index, signable);
        passed[entry.index] = checker.check_olive(entry.olive) && checker.olive_unused(entry.olive);
    }
    debug!(passed = count(&passed), "type checking finished");

    let summaries = program
        .olives
        .iter()
        .enumerate()
        .map(|(index, olive)| {
            let scopes = resolved
                .iter()
                .find(|entry| entry.index == index)
                .map(|entry| entry.scopes.as_slice());
            let signable = signables.get(&index).cloned().unwrap_or_default();
            dashboard::summarize(&checker.table, olive, scopes, signable)
        })
        .collect();

    let compiled = checker.error_count() == 0 && passed.iter().all(|ok| *ok);
    debug!(compiled, errors = checker.error_count(), "compilation finished");
    Compilation {
        compiled,
        resolutions: checker.into_table(),
        summaries,
    }
}

/// Check a whole program, returning every diagnostic as the error if any
/// of them is an error. Warnings of a successful check are dropped.
pub fn try_compile(
    program: &Program,
    catalogue: &Catalogue,
    config: &CheckConfig,
) -> Result<Compilation, DiagnosticError> {
    let mut diagnostics = Vec::new();
    let compilation = compile(program, catalogue, config, &mut diagnostics);
    if compilation.compiled && !has_errors(&diagnostics) {
        Ok(compilation)
    } else {
        Err(DiagnosticError(diagnostics))
    }
}

fn count(flags: &[bool]) -> usize {
    flags.iter().filter(|ok| **ok).count()
}

/// Whether a pipeline keeps one output row per input row, judging from
/// resolved clauses.
fn keeps_rows(table: &Resolutions, olive: &Olive) -> bool {
    olive.node.clauses.iter().all(|clause| match &clause.node {
        ClauseKind::Group { .. } | ClauseKind::Join { .. } | ClauseKind::Let(_) => false,
        ClauseKind::Call(_) => table.definition(clause.id).is_some_and(|d| d.is_root),
        _ => true,
    })
}

fn argument_names(arguments: &[NamedArgument]) -> impl Iterator<Item = &str> {
    arguments.iter().map(|argument| argument.name.node.as_str())
}

/// Names repeated among `names`, sorted.
fn duplicates<'n>(names: impl IntoIterator<Item = &'n str>) -> BTreeSet<&'n str> {
    let mut seen = BTreeSet::new();
    names.into_iter().filter(|name| !seen.insert(*name)).collect()
}

impl<'a> Checker<'a> {
    /// Point the checker at one olive.
    fn enter(&mut self, olive: &Olive, index: usize) {
        self.format = self.catalogue.format(&olive.node.format.node);
        self.olive = index;
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Record every `Define` olive by name. Returns which olives may go on
    /// to the next phase.
    fn register_definitions(&mut self, program: &'a Program) -> Vec<bool> {
        let mut good = vec![true; program.olives.len()];
        for (index, olive) in program.olives.iter().enumerate() {
            let Some(name) = olive.node.definition_name() else {
                continue;
            };
            if let Some(previous) = self.definitions.get(&name.node) {
                let span = previous.olive.span;
                self.error(
                    name.span,
                    Category::DuplicateName,
                    format!(
                        "Duplicate definition of “Define {}”. Previous entry on {}:{}.",
                        name.node, span.line, span.column
                    ),
                );
                good[index] = false;
                continue;
            }
            self.definitions.insert(
                name.node.clone(),
                DefinitionEntry {
                    olive,
                    index,
                    state: DefinitionState::Pending,
                },
            );
        }
        good
    }

    fn definition_failed(&mut self, olive: &Olive, index: usize) {
        if let Some(name) = olive.node.definition_name()
            && let Some(entry) = self.definitions.get_mut(&name.node)
            && entry.index == index
        {
            entry.state = DefinitionState::Failed;
        }
    }

    fn olive_definitions(&mut self, olive: &Olive, index: usize) -> bool {
        self.enter(olive, index);
        if self.format.is_none() {
            self.error(
                olive.node.format.span,
                Category::UndefinedName,
                format!("Unknown input format “{}”.", olive.node.format.node),
            );
            return false;
        }
        let mut ok = true;
        for clause in &olive.node.clauses {
            ok &= self.clause_definitions(clause);
        }
        ok &= self.terminal_definitions(&olive.node.terminal);
        trace!(olive = index, ok, "olive definitions");
        ok
    }

    fn terminal_definitions(&mut self, terminal: &Terminal) -> bool {
        match &terminal.node {
            TerminalKind::Run { action, arguments } => {
                let mut ok = true;
                match self.catalogue.action(&action.node) {
                    Some(definition) => {
                        self.table.actions.insert(terminal.id, definition.clone());
                    }
                    None => {
                        self.error(
                            action.span,
                            Category::UndefinedName,
                            format!("Unknown action for “{}”.", action.node),
                        );
                        ok = false;
                    }
                }
                if !duplicates(argument_names(arguments)).is_empty() {
                    self.error(
                        terminal.span,
                        Category::DuplicateName,
                        "Duplicate arguments to action.",
                    );
                    ok = false;
                }
                for argument in arguments {
                    ok &= self.expr_definitions(&argument.value);
                }
                ok
            }
            TerminalKind::Alert {
                labels,
                annotations,
                ttl,
            } => {
                let mut ok = true;
                for (kind, arguments) in [("labels", labels), ("annotations", annotations)] {
                    let repeated = duplicates(argument_names(arguments));
                    if !repeated.is_empty() {
                        self.error(
                            terminal.span,
                            Category::DuplicateName,
                            format!("Duplicate {kind} in alert: {}", join_names(repeated)),
                        );
                        ok = false;
                    }
                    for argument in arguments {
                        ok &= self.expr_definitions(&argument.value);
                    }
                }
                ok & self.expr_definitions(ttl)
            }
            TerminalKind::Define { name, parameters } => {
                let repeated = duplicates(parameters.iter().map(|p| p.name.node.as_str()));
                if repeated.is_empty() {
                    true
                } else {
                    self.error(
                        name.span,
                        Category::DuplicateName,
                        format!(
                            "Duplicate parameters in “Define {}”: {}",
                            name.node,
                            join_names(repeated)
                        ),
                    );
                    false
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Resolve a program-local definition, unless it already has been.
    pub(crate) fn resolve_definition(&mut self, name: &str) -> Option<ResolvedDefinition> {
        let entry = self.definitions.get_mut(name)?;
        match &entry.state {
            DefinitionState::Resolved(definition) => return Some(definition.clone()),
            DefinitionState::Failed | DefinitionState::Resolving => return None,
            DefinitionState::Pending => {}
        }
        entry.state = DefinitionState::Resolving;
        let (olive, index) = (entry.olive, entry.index);
        trace!(definition = name, "resolving definition");

        let saved = (self.format, self.olive);
        self.enter(olive, index);
        let scopes = self.resolve_olive(olive);
        let resolved = scopes.map(|scopes| {
            let parameters = match &olive.node.terminal.node {
                TerminalKind::Define { parameters, .. } => {
                    parameters.iter().map(|p| p.ty.clone()).collect()
                }
                _ => Vec::new(),
            };
            let output = scopes
                .last()
                .map(|scope| scope.stream().cloned().collect())
                .unwrap_or_default();
            let definition = ResolvedDefinition {
                name: name.to_string(),
                format: olive.node.format.node.clone(),
                parameters,
                output,
                is_root: keeps_rows(&self.table, olive),
            };
            self.resolved.push(ResolvedOlive {
                index,
                olive,
                scopes,
            });
            definition
        });
        (self.format, self.olive) = saved;

        let state = match &resolved {
            Some(definition) => DefinitionState::Resolved(definition.clone()),
            None => DefinitionState::Failed,
        };
        if let Some(entry) = self.definitions.get_mut(name) {
            entry.state = state;
        }
        resolved
    }

    /// The definition a `Call` or `Matches` names: program definitions
    /// first, then the catalogue.
    pub(crate) fn definition_target(&mut self, name: &Ident) -> Option<ResolvedDefinition> {
        if let Some(entry) = self.definitions.get(&name.node) {
            if matches!(entry.state, DefinitionState::Resolving) {
                self.error(
                    name.span,
                    Category::RecursiveDefinition,
                    format!("Olive definition {} includes itself.", name.node),
                );
                return None;
            }
            return self.resolve_definition(&name.node);
        }
        let signature = self.catalogue.definition(&name.node)?;
        Some(ResolvedDefinition {
            name: signature.name.clone(),
            format: signature.format.clone(),
            parameters: signature.parameters.clone(),
            output: signature
                .output
                .iter()
                .map(|variable| Binding::known(&variable.name, variable.flavour, variable.ty.clone()))
                .collect(),
            is_root: signature.is_root,
        })
    }

    /// Thread a scope through one olive. Returns the scope before each
    /// clause plus the final one, if everything resolved.
    fn resolve_olive(&mut self, olive: &Olive) -> Option<Vec<Scope>> {
        let format = self.format?;
        let mut others: Vec<Binding> = self.catalogue.globals().collect();
        if let TerminalKind::Define { parameters, .. } = &olive.node.terminal.node {
            others.extend(parameters.iter().map(|parameter| {
                Binding::declared(
                    &parameter.name.node,
                    Flavour::Parameter,
                    BindingType::Known(parameter.ty.clone()),
                    parameter.name.id,
                    parameter.name.span,
                )
            }));
        }
        let mut scope = Scope::root(format.stream(), others);
        let mut scopes = vec![scope.clone()];
        for clause in &olive.node.clauses {
            scope = self.resolve_clause(clause, &scope);
            trace!(clause = clause.node.syntax(), good = scope.is_good(), "clause resolved");
            scopes.push(scope.clone());
        }
        let ok = self.resolve_terminal(&olive.node.terminal, &scope);
        (ok && scope.is_good()).then_some(scopes)
    }

    fn resolve_terminal(&mut self, terminal: &Terminal, scope: &Scope) -> bool {
        match &terminal.node {
            TerminalKind::Run { action, arguments } => {
                let mut ok = true;
                for argument in arguments {
                    ok &= self.resolve_expr(&argument.value, scope);
                }
                let Some(definition) = self.table.action(terminal.id).cloned() else {
                    return false;
                };
                let given: BTreeSet<&str> = argument_names(arguments).collect();
                let extra: Vec<&str> = given
                    .iter()
                    .copied()
                    .filter(|name| definition.parameters.iter().all(|p| p.name != *name))
                    .collect();
                if !extra.is_empty() {
                    self.error(
                        terminal.span,
                        Category::UndefinedName,
                        format!(
                            "Extra arguments for action {}: {}",
                            action.node,
                            join_names(extra)
                        ),
                    );
                    ok = false;
                }
                let missing: Vec<&str> = definition
                    .parameters
                    .iter()
                    .filter(|p| p.required && !given.contains(p.name.as_str()))
                    .map(|p| p.name.as_str())
                    .collect();
                if !missing.is_empty() {
                    self.error(
                        terminal.span,
                        Category::ArityMismatch,
                        format!(
                            "Missing arguments for action {}: {}",
                            action.node,
                            join_names(missing)
                        ),
                    );
                    ok = false;
                }
                ok
            }
            TerminalKind::Alert {
                labels,
                annotations,
                ttl,
            } => {
                let mut ok = self.resolve_expr(ttl, scope);
                for argument in labels.iter().chain(annotations) {
                    ok &= self.resolve_expr(&argument.value, scope);
                }
                ok
            }
            // The output rows are what callers read, so every stream
            // variable left counts as used.
            TerminalKind::Define { .. } => {
                for origin in scope.stream().filter_map(|binding| binding.origin) {
                    self.table.mark_read(origin);
                }
                true
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stream order
    // -----------------------------------------------------------------------

    /// Fold the clause state machine over an olive. Returns the signable
    /// variables the olive reads, or `None` if the pipeline is invalid.
    fn stream_order(&mut self, olive: &Olive) -> Option<BTreeSet<String>> {
        let mut state = ClauseStreamOrder::Pure;
        let mut signables = BTreeSet::new();
        for clause in &olive.node.clauses {
            let next = self.ensure_root(clause, state, &mut signables);
            trace!(clause = clause.node.syntax(), from = ?state, to = ?next, "stream order");
            state = next;
        }
        match state {
            ClauseStreamOrder::Bad => None,
            ClauseStreamOrder::Pure => {
                match &olive.node.terminal.node {
                    TerminalKind::Run { arguments, .. } => {
                        self.add_signables(&mut signables, arguments.iter().map(|a| &a.value));
                    }
                    TerminalKind::Alert {
                        labels,
                        annotations,
                        ttl,
                    } => {
                        let values = labels.iter().chain(annotations).map(|a| &a.value);
                        self.add_signables(&mut signables, values.chain([ttl]));
                    }
                    TerminalKind::Define { .. } => {}
                }
                Some(signables)
            }
            ClauseStreamOrder::Transformed => Some(signables),
        }
    }

    /// Signable variables a called definition reads. Program definitions
    /// are known once their own stream order has been folded; external
    /// ones declare theirs in the catalogue.
    pub(crate) fn called_signables(&self, name: &str) -> Vec<String> {
        match self.definition_signables.get(name) {
            Some(signables) => signables.iter().cloned().collect(),
            None => self
                .catalogue
                .definition(name)
                .map(|definition| definition.signable.clone())
                .unwrap_or_default(),
        }
    }

    // -----------------------------------------------------------------------
    // Type checking
    // -----------------------------------------------------------------------

    /// Check clauses in order, stopping at the first failure since later
    /// clauses read its types.
    fn check_olive(&mut self, olive: &Olive) -> bool {
        for clause in &olive.node.clauses {
            if !self.check_clause(clause) {
                trace!(clause = clause.node.syntax(), "type checking stopped");
                return false;
            }
        }
        self.check_terminal(&olive.node.terminal)
    }

    fn check_terminal(&mut self, terminal: &Terminal) -> bool {
        match &terminal.node {
            TerminalKind::Run { arguments, .. } => {
                let Some(definition) = self.table.action(terminal.id).cloned() else {
                    return false;
                };
                let mut ok = true;
                for argument in arguments {
                    let ty = self.check_expr(&argument.value);
                    if let Some(parameter) = definition
                        .parameters
                        .iter()
                        .find(|p| p.name == argument.name.node)
                    {
                        ok &= self.expect_type(argument.value.span, &parameter.ty, &ty);
                    }
                }
                ok
            }
            TerminalKind::Alert {
                labels,
                annotations,
                ttl,
            } => {
                let mut ok = true;
                for argument in labels.iter().chain(annotations) {
                    let ty = self.check_expr(&argument.value);
                    ok &= self.expect_type(argument.value.span, &Type::String, &ty);
                }
                let ty = self.check_expr(ttl);
                self.expect_type(ttl.span, &Type::Integer, &ty) && ok
            }
            TerminalKind::Define { .. } => true,
        }
    }

    // -----------------------------------------------------------------------
    // Unused declarations
    // -----------------------------------------------------------------------

    fn olive_unused(&mut self, olive: &Olive) -> bool {
        let exported = olive.node.definition_name().is_some();
        let mut ok = true;
        for clause in &olive.node.clauses {
            ok &= self.clause_unused(clause, exported);
        }
        ok & self.check_unused_wildcards(self.olive)
    }
}
