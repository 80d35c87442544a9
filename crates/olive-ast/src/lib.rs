//! Syntax tree for olive programs.
//!
//! The tree is what a parser hands to the checker. Every node carries a
//! [`Span`] for diagnostics and a [`NodeId`] that keys any data the checker
//! later resolves for it; the nodes themselves are never modified after
//! construction. Each family of nodes is a closed enum, so every checking
//! phase has to handle every variant.
//!
//! All nodes deserialize from JSON. Spans may be omitted and node ids are
//! always assigned fresh on load.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;

pub use olive_types::Type;

// ---------------------------------------------------------------------------
// Spans and node identity
// ---------------------------------------------------------------------------

/// A position in the source program. Lines and columns start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// A span for nodes the compiler made up rather than read from source.
    pub fn synthetic() -> Self {
        Self { line: 0, column: 0 }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::synthetic()
    }
}

/// Identifies one node of a tree. Unique within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A value paired with its source location and identity.
///
/// Cloning keeps the id, so a clone is the same node. Equality ignores the
/// id and compares only content and position.
#[derive(Debug, Clone, Deserialize)]
pub struct Spanned<T> {
    pub node: T,
    #[serde(default)]
    pub span: Span,
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self {
            node,
            span,
            id: NodeId::fresh(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            node: f(self.node),
            span: self.span,
            id: self.id,
        }
    }
}

impl<T: PartialEq> PartialEq for Spanned<T> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.span == other.span
    }
}

/// A name as written in the source.
pub type Ident = Spanned<String>;

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    Path(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

pub type Expr = Spanned<ExprKind>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Literal(Literal),
    /// `[]`
    EmptyList,
    /// A reference to a bound name.
    Variable(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Object(Vec<ObjectField>),
    /// A tagged value: `TAG {a, b}` or `TAG { x = 1 }`.
    Algebraic {
        tag: String,
        payload: AlgebraicPayload,
    },
    /// Wrap a value in an optional.
    Optional(Box<Expr>),
    /// `value Default alternative`: unwrap an optional or fall back.
    Default {
        value: Box<Expr>,
        alternative: Box<Expr>,
    },
    /// `target.field`
    Field {
        target: Box<Expr>,
        field: String,
    },
    /// `target[index]` on a tuple.
    Index {
        target: Box<Expr>,
        index: usize,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// A call to an externally defined function.
    Call {
        function: Ident,
        arguments: Vec<Expr>,
    },
    /// A local binding visible only in `body`.
    Let {
        pattern: Pattern,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    /// `For pattern In source: transforms collector`
    For {
        pattern: Pattern,
        source: Box<Source>,
        transforms: Vec<ListTransform>,
        collector: Box<Collector>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObjectField {
    pub name: Ident,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgebraicPayload {
    Tuple(Vec<Expr>),
    Object(Vec<ObjectField>),
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

pub type Pattern = Spanned<PatternKind>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Bind the whole value to a name.
    Variable(String),
    /// `_`: bind nothing.
    Discard,
    /// `*`: bind every field of an object on demand.
    Wildcard,
    Tuple(Vec<Pattern>),
    Object(Vec<FieldPattern>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldPattern {
    pub field: Ident,
    pub pattern: Pattern,
}

impl PatternKind {
    /// True when the pattern can never bind anything.
    pub fn is_blank(&self) -> bool {
        match self {
            PatternKind::Discard => true,
            PatternKind::Variable(_) | PatternKind::Wildcard => false,
            PatternKind::Tuple(elements) => elements.iter().all(|e| e.node.is_blank()),
            PatternKind::Object(fields) => fields.iter().all(|f| f.pattern.node.is_blank()),
        }
    }
}

// ---------------------------------------------------------------------------
// Sources, list transforms and collectors
// ---------------------------------------------------------------------------

pub type Source = Spanned<SourceKind>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Iterate over a list, optional or dictionary.
    Container(Expr),
    /// Every integer from `start` up to but excluding `end`.
    Range { start: Expr, end: Expr },
}

pub type ListTransform = Spanned<ListTransformKind>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListTransformKind {
    /// `Let pattern = value`: replace each item.
    Map { pattern: Pattern, value: Expr },
    /// `Where condition`
    Filter(Expr),
    /// `Sort key`
    Sort(Expr),
    Reverse,
    Limit(Expr),
    Skip(Expr),
    /// `Flatten pattern In source transforms`: replace each item by many.
    Flatten {
        pattern: Pattern,
        source: Source,
        transforms: Vec<ListTransform>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extremum {
    Min,
    Max,
}

impl Extremum {
    pub fn keyword(self) -> &'static str {
        match self {
            Extremum::Min => "Min",
            Extremum::Max => "Max",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatenationMode {
    /// Sort the strings before joining them.
    Lexicographical,
    /// Join in the order the items arrive.
    Provided,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    All,
    Any,
    None,
}

pub type Collector = Spanned<CollectorKind>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorKind {
    Count,
    List(Expr),
    /// The first value; optional unless a default is given.
    First {
        value: Expr,
        #[serde(default)]
        default: Option<Expr>,
    },
    /// The single distinct value; optional unless a default is given.
    Univalued {
        value: Expr,
        #[serde(default)]
        default: Option<Expr>,
    },
    /// The smallest or largest value; optional unless a default is given.
    Optimum {
        extremum: Extremum,
        value: Expr,
        #[serde(default)]
        default: Option<Expr>,
    },
    /// `Reduce (accumulator = initial) reducer`
    Reduce {
        accumulator: Pattern,
        initial: Expr,
        reducer: Expr,
    },
    Stats(Expr),
    Sum(Expr),
    Dictionary {
        key: Expr,
        value: Expr,
    },
    Object(Vec<CollectField>),
    /// Exactly `size` values as a tuple.
    Tuple {
        value: Expr,
        size: usize,
    },
    PartitionCount(Expr),
    Concatenate {
        value: Expr,
        delimiter: Expr,
        mode: ConcatenationMode,
    },
    /// `All`, `Any` or `None` of the items satisfy a predicate.
    Matches {
        mode: MatchMode,
        predicate: Expr,
    },
}

/// A named collector with its own list transforms: a field of an object
/// collector or one output of a grouping clause.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CollectField {
    pub name: Ident,
    #[serde(default)]
    pub transforms: Vec<ListTransform>,
    pub collector: Collector,
}

// ---------------------------------------------------------------------------
// Clauses
// ---------------------------------------------------------------------------

pub type Discriminator = Spanned<DiscriminatorKind>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminatorKind {
    /// Group by an existing stream variable.
    Variable(String),
    /// Group by a computed value, bound to a new name.
    Rename { name: String, value: Expr },
    /// Group by every variable of a named gang.
    Gang(String),
}

pub type LetArgument = Spanned<LetArgumentKind>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetArgumentKind {
    Simple { pattern: Pattern, value: Expr },
    /// Copy every variable of a named gang.
    Gang(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonitorLabel {
    pub name: Ident,
    pub value: Expr,
}

/// Invocation of an olive definition by `Call` or `Matches`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DefinitionCall {
    pub name: Ident,
    #[serde(default)]
    pub arguments: Vec<Expr>,
}

pub type Clause = Spanned<ClauseKind>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseKind {
    Where(Expr),
    Group {
        discriminators: Vec<Discriminator>,
        collectors: Vec<CollectField>,
        #[serde(default)]
        filter: Option<Expr>,
    },
    Join {
        format: Ident,
        outer_key: Expr,
        inner_key: Expr,
        #[serde(default)]
        intersection: bool,
    },
    LeftJoin {
        format: Ident,
        outer_key: Expr,
        inner_key: Expr,
        #[serde(default)]
        prefix: String,
        collectors: Vec<CollectField>,
        #[serde(default)]
        filter: Option<Expr>,
        #[serde(default)]
        intersection: bool,
    },
    Let(Vec<LetArgument>),
    Flatten {
        pattern: Pattern,
        value: Expr,
    },
    Monitor {
        metric: Ident,
        help: String,
        labels: Vec<MonitorLabel>,
    },
    Reject(Expr),
    /// Keep rows where an optional has a value, binding that value.
    Require {
        pattern: Pattern,
        value: Expr,
    },
    Pick {
        extremum: Extremum,
        value: Expr,
        discriminators: Vec<Discriminator>,
    },
    Call(DefinitionCall),
    Matches(DefinitionCall),
}

impl ClauseKind {
    /// The keyword that introduces the clause.
    pub fn syntax(&self) -> &'static str {
        match self {
            ClauseKind::Where(_) => "Where",
            ClauseKind::Group { .. } => "Group",
            ClauseKind::Join {
                intersection: false,
                ..
            } => "Join",
            ClauseKind::Join {
                intersection: true, ..
            } => "IntersectionJoin",
            ClauseKind::LeftJoin {
                intersection: false,
                ..
            } => "LeftJoin",
            ClauseKind::LeftJoin {
                intersection: true, ..
            } => "LeftIntersectionJoin",
            ClauseKind::Let(_) => "Let",
            ClauseKind::Flatten { .. } => "Flatten",
            ClauseKind::Monitor { .. } => "Monitor",
            ClauseKind::Reject(_) => "Reject",
            ClauseKind::Require { .. } => "Require",
            ClauseKind::Pick { .. } => "Pick",
            ClauseKind::Call(_) => "Call",
            ClauseKind::Matches(_) => "Matches",
        }
    }
}

// ---------------------------------------------------------------------------
// Olives
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamedArgument {
    pub name: Ident,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Parameter {
    pub name: Ident,
    #[serde(rename = "type")]
    pub ty: Type,
}

pub type Terminal = Spanned<TerminalKind>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    /// `Run action With { arguments }`
    Run {
        action: Ident,
        arguments: Vec<NamedArgument>,
    },
    /// `Alert labels Annotations annotations For ttl`
    Alert {
        labels: Vec<NamedArgument>,
        #[serde(default)]
        annotations: Vec<NamedArgument>,
        ttl: Expr,
    },
    /// `Define name(parameters)`: a reusable pipeline for `Call`/`Matches`.
    Define {
        name: Ident,
        #[serde(default)]
        parameters: Vec<Parameter>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OliveNode {
    /// The input format the olive reads.
    pub format: Ident,
    #[serde(default)]
    pub clauses: Vec<Clause>,
    pub terminal: Terminal,
}

pub type Olive = Spanned<OliveNode>;

impl OliveNode {
    /// The name this olive defines, if it is a definition.
    pub fn definition_name(&self) -> Option<&Ident> {
        match &self.terminal.node {
            TerminalKind::Define { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// A whole source file.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub olives: Vec<Olive>,
}
