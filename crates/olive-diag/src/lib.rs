//! Error reporting and diagnostics for olive programs.
//!
//! Semantic analysis never aborts on a user error. Each problem is turned
//! into a [`Diagnostic`] and handed to a [`DiagnosticSink`], and the phase
//! that found it keeps going so every independent mistake surfaces in a
//! single pass. The plain-text form of a diagnostic is always
//! `line:column: message`.

use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Undefined variable, function, action, format, gang or definition.
    UndefinedName,
    /// A name bound twice where only one binding is allowed.
    DuplicateName,
    /// Expression type does not match the expected type.
    TypeMismatch,
    /// A sort key or extremum over a type with no natural order.
    NotOrderable,
    /// Wrong number of arguments or tuple elements.
    ArityMismatch,
    /// A destructuring pattern does not fit the value's shape.
    PatternMismatch,
    /// A field that does not exist on an object.
    MissingField,
    /// A clause used where the stream no longer allows it.
    ClauseOrder,
    /// An operation that needs a determined row order received a random one.
    Nondeterministic,
    /// An olive definition that reaches itself.
    RecursiveDefinition,
    /// A declared value that is never read.
    UnusedDeclaration,
    /// A malformed monitoring metric.
    InvalidMetric,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::UndefinedName,
        Category::DuplicateName,
        Category::TypeMismatch,
        Category::NotOrderable,
        Category::ArityMismatch,
        Category::PatternMismatch,
        Category::MissingField,
        Category::ClauseOrder,
        Category::Nondeterministic,
        Category::RecursiveDefinition,
        Category::UnusedDeclaration,
        Category::InvalidMetric,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::UndefinedName => "undefined_name",
            Category::DuplicateName => "duplicate_name",
            Category::TypeMismatch => "type_mismatch",
            Category::NotOrderable => "not_orderable",
            Category::ArityMismatch => "arity_mismatch",
            Category::PatternMismatch => "pattern_mismatch",
            Category::MissingField => "missing_field",
            Category::ClauseOrder => "clause_order",
            Category::Nondeterministic => "nondeterministic",
            Category::RecursiveDefinition => "recursive_definition",
            Category::UnusedDeclaration => "unused_declaration",
            Category::InvalidMetric => "invalid_metric",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::UndefinedName => "E0001",
            Category::DuplicateName => "E0002",
            Category::TypeMismatch => "E0003",
            Category::NotOrderable => "E0004",
            Category::ArityMismatch => "E0005",
            Category::PatternMismatch => "E0006",
            Category::MissingField => "E0007",
            Category::ClauseOrder => "E0008",
            Category::Nondeterministic => "E0009",
            Category::RecursiveDefinition => "E0010",
            Category::UnusedDeclaration => "E0011",
            Category::InvalidMetric => "E0012",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::UndefinedName => "A referenced variable, function or definition is unknown.",
            Category::DuplicateName => "A name is declared more than once in the same place.",
            Category::TypeMismatch => "Expression type does not match the expected type.",
            Category::NotOrderable => "An ordering operation was applied to an unordered type.",
            Category::ArityMismatch => "The number of arguments or elements is wrong.",
            Category::PatternMismatch => "A destructuring pattern does not fit the value.",
            Category::MissingField => "An object does not have the requested field.",
            Category::ClauseOrder => "A clause cannot follow the clauses before it.",
            Category::Nondeterministic => "A result would depend on an undetermined row order.",
            Category::RecursiveDefinition => "An olive definition includes itself.",
            Category::UnusedDeclaration => "A declared value is never used.",
            Category::InvalidMetric => "A monitoring metric is malformed.",
        }
    }

    pub fn example_fix(self) -> &'static str {
        match self {
            Category::UndefinedName => "Fix the spelling or supply the missing definition.",
            Category::DuplicateName => "Rename or remove one of the duplicates.",
            Category::TypeMismatch => "Convert the value or change the expression.",
            Category::NotOrderable => "Sort or compare by an integer, float, string or date.",
            Category::ArityMismatch => "Match the declared number of parameters.",
            Category::PatternMismatch => "Use a pattern with the same shape as the value.",
            Category::MissingField => "Use one of the fields the object declares.",
            Category::ClauseOrder => "Move the clause before any grouping or joining clause.",
            Category::Nondeterministic => "Sort the values first or use a lexicographic mode.",
            Category::RecursiveDefinition => "Break the cycle between definitions.",
            Category::UnusedDeclaration => "Remove the declaration or use it.",
            Category::InvalidMetric => "Use a valid metric name with help text and unique labels.",
        }
    }
}

// ---------------------------------------------------------------------------
// Source locations
// ---------------------------------------------------------------------------

/// A line and column in the source program, both starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. E0001).
    pub code: String,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Where it went wrong.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Suggested fix, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: category.code().to_string(),
            severity: Severity::Error,
            category,
            message: message.into(),
            location: None,
            help: None,
        }
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(category, message)
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// The long form shown by the command line: severity, code, location,
    /// message and help.
    pub fn render(&self) -> String {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        let mut out = format!("{prefix}[{}]: {self}", self.code);
        if let Some(help) = &self.help {
            out.push_str("\n  help: ");
            out.push_str(help);
        }
        out
    }
}

/// `line:column: message`, the form handed to message callbacks.
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receives diagnostics as they are found.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Adapts a plain `FnMut(String)` callback into a sink. Each diagnostic is
/// passed as its `line:column: message` text.
pub struct MessageSink<F>(pub F);

impl<F: FnMut(String)> DiagnosticSink for MessageSink<F> {
    fn report(&mut self, diagnostic: Diagnostic) {
        (self.0)(diagnostic.to_string());
    }
}

/// True when any diagnostic is an error rather than a warning.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// Every diagnostic of a failed compilation, for callers that want a
/// `Result`. Displays as its first error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .0.iter().find(|d| d.is_error()).map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }

    pub fn error_count(&self) -> usize {
        self.0.iter().filter(|d| d.is_error()).count()
    }
}
