//! The state shared by every phase of one compilation.

use std::collections::{BTreeMap, BTreeSet};

use olive_ast::{Olive, Span};
use olive_diag::{Category, Diagnostic, DiagnosticSink, Severity, SourceLocation};
use olive_types::Type;

use crate::catalogue::{Catalogue, InputFormat};
use crate::config::CheckConfig;
use crate::olive::ResolvedOlive;
use crate::table::{ResolvedDefinition, Resolutions};

/// Progress of a program-local `Define` through resolution.
#[derive(Debug, Clone)]
pub(crate) enum DefinitionState {
    Pending,
    /// Being resolved right now; asking for it again is a cycle.
    Resolving,
    Resolved(ResolvedDefinition),
    Failed,
}

#[derive(Debug)]
pub(crate) struct DefinitionEntry<'a> {
    pub(crate) olive: &'a Olive,
    pub(crate) index: usize,
    pub(crate) state: DefinitionState,
}

pub(crate) struct Checker<'a> {
    pub(crate) catalogue: &'a Catalogue,
    pub(crate) config: &'a CheckConfig,
    sink: &'a mut dyn DiagnosticSink,
    pub(crate) table: Resolutions,
    /// Input format of the olive being checked.
    pub(crate) format: Option<&'a InputFormat>,
    /// Index of the olive being checked.
    pub(crate) olive: usize,
    pub(crate) definitions: BTreeMap<String, DefinitionEntry<'a>>,
    /// Olives that resolved cleanly, in the order resolution finished.
    pub(crate) resolved: Vec<ResolvedOlive<'a>>,
    /// Signable variables each program-local definition reads, filled by
    /// the stream order phase.
    pub(crate) definition_signables: BTreeMap<String, BTreeSet<String>>,
    errors: usize,
}

impl<'a> Checker<'a> {
    pub(crate) fn new(
        catalogue: &'a Catalogue,
        config: &'a CheckConfig,
        sink: &'a mut dyn DiagnosticSink,
    ) -> Self {
        Self {
            catalogue,
            config,
            sink,
            table: Resolutions::default(),
            format: None,
            olive: 0,
            definitions: BTreeMap::new(),
            resolved: Vec::new(),
            definition_signables: BTreeMap::new(),
            errors: 0,
        }
    }

    pub(crate) fn error_count(&self) -> usize {
        self.errors
    }

    pub(crate) fn into_table(self) -> Resolutions {
        self.table
    }

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error() {
            self.errors += 1;
        }
        tracing::trace!(code = %diagnostic.code, message = %diagnostic.message, "diagnostic");
        self.sink.report(diagnostic);
    }

    pub(crate) fn error(&mut self, span: Span, category: Category, message: impl Into<String>) {
        self.report(Diagnostic::error(category, message).at(location(span)));
    }

    /// `Expected X, but got Y.` for a value of the wrong type.
    pub(crate) fn type_error(&mut self, span: Span, expected: impl std::fmt::Display, actual: &Type) {
        self.error(
            span,
            Category::TypeMismatch,
            format!("Expected {expected}, but got {actual}."),
        );
    }

    /// Check that `actual` is `expected`, reporting otherwise. A `Bad`
    /// actual type was already reported and fails quietly.
    pub(crate) fn expect_type(&mut self, span: Span, expected: &Type, actual: &Type) -> bool {
        if actual.is_bad() {
            return false;
        }
        if expected.is_same(actual) {
            true
        } else {
            self.type_error(span, expected, actual);
            false
        }
    }

    /// Report a declaration nobody reads, as configured.
    pub(crate) fn unused(&mut self, span: Span, message: impl Into<String>) -> bool {
        match self.config.unused.severity() {
            Some(Severity::Error) => {
                self.error(span, Category::UnusedDeclaration, message);
                false
            }
            Some(_) => {
                self.report(
                    Diagnostic::warning(Category::UnusedDeclaration, message).at(location(span)),
                );
                true
            }
            None => true,
        }
    }

    /// The format's name, for messages.
    pub(crate) fn format_name(&self) -> &str {
        self.format.map_or("<unknown>", |f| f.name.as_str())
    }
}

pub(crate) fn location(span: Span) -> SourceLocation {
    SourceLocation::new(span.line, span.column)
}

/// `a, b, c` for diagnostics listing names.
pub(crate) fn join_names<'n>(names: impl IntoIterator<Item = &'n str>) -> String {
    names.into_iter().collect::<Vec<_>>().join(", ")
}
