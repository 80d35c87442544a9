//! Which names a piece of code depends on from outside itself.
//!
//! Works on resolved trees: each variable reference is looked up in the
//! side table to find the binding it resolved to. A reference whose binding
//! was declared by a pattern inside the walked node is local and never
//! reported.

use std::collections::{BTreeSet, HashSet};

use olive_ast::{
    AlgebraicPayload, CollectField, Collector, CollectorKind, Expr, ExprKind, ListTransform,
    ListTransformKind, NodeId, Pattern, PatternKind, Source, SourceKind,
};

use crate::scope::{Binding, Flavour};
use crate::table::Resolutions;

/// Free variables of an expression whose flavour satisfies `predicate`.
pub fn free_variables(
    table: &Resolutions,
    expr: &Expr,
    predicate: impl Fn(Flavour) -> bool,
) -> BTreeSet<String> {
    let mut walker = Walker::new(table);
    walker.expr(expr);
    walker.finish(predicate)
}

/// Free variables of a collector with its list transforms, as used by
/// grouping clauses and object collector fields.
pub fn free_variables_field(
    table: &Resolutions,
    field: &CollectField,
    predicate: impl Fn(Flavour) -> bool,
) -> BTreeSet<String> {
    let mut walker = Walker::new(table);
    walker.field(field);
    walker.finish(predicate)
}

/// Free variables of several expressions at once.
pub fn free_variables_all<'e>(
    table: &Resolutions,
    exprs: impl IntoIterator<Item = &'e Expr>,
    predicate: impl Fn(Flavour) -> bool,
) -> BTreeSet<String> {
    let mut walker = Walker::new(table);
    for expr in exprs {
        walker.expr(expr);
    }
    walker.finish(predicate)
}

struct Walker<'t> {
    table: &'t Resolutions,
    locals: HashSet<NodeId>,
    references: Vec<&'t Binding>,
}

impl<'t> Walker<'t> {
    fn new(table: &'t Resolutions) -> Self {
        Self {
            table,
            locals: HashSet::new(),
            references: Vec::new(),
        }
    }

    fn finish(self, predicate: impl Fn(Flavour) -> bool) -> BTreeSet<String> {
        self.references
            .into_iter()
            .filter(|binding| binding.origin.is_none_or(|origin| !self.locals.contains(&origin)))
            .filter(|binding| predicate(binding.flavour))
            .map(|binding| binding.name.clone())
            .collect()
    }

    fn pattern(&mut self, pattern: &Pattern) {
        match &pattern.node {
            PatternKind::Variable(_) | PatternKind::Wildcard => {
                self.locals.insert(pattern.id);
            }
            PatternKind::Discard => {}
            PatternKind::Tuple(elements) => elements.iter().for_each(|e| self.pattern(e)),
            PatternKind::Object(fields) => fields.iter().for_each(|f| self.pattern(&f.pattern)),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.node {
            ExprKind::Literal(_) | ExprKind::EmptyList => {}
            ExprKind::Variable(_) => {
                if let Some(binding) = self.table.binding(expr.id) {
                    self.references.push(binding);
                }
            }
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                items.iter().for_each(|item| self.expr(item));
            }
            ExprKind::Object(fields) => fields.iter().for_each(|f| self.expr(&f.value)),
            ExprKind::Algebraic { payload, .. } => match payload {
                AlgebraicPayload::Tuple(items) => items.iter().for_each(|item| self.expr(item)),
                AlgebraicPayload::Object(fields) => {
                    fields.iter().for_each(|f| self.expr(&f.value));
                }
            },
            ExprKind::Optional(inner) => self.expr(inner),
            ExprKind::Default { value, alternative } => {
                self.expr(value);
                self.expr(alternative);
            }
            ExprKind::Field { target, .. } | ExprKind::Index { target, .. } => self.expr(target),
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Binary { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expr(condition);
                self.expr(then_branch);
                self.expr(else_branch);
            }
            ExprKind::Call { arguments, .. } => arguments.iter().for_each(|a| self.expr(a)),
            ExprKind::Let {
                pattern,
                value,
                body,
            } => {
                self.pattern(pattern);
                self.expr(value);
                self.expr(body);
            }
            ExprKind::For {
                pattern,
                source,
                transforms,
                collector,
            } => {
                self.pattern(pattern);
                self.source(source);
                self.transforms(transforms);
                self.collector(collector);
            }
        }
    }

    fn source(&mut self, source: &Source) {
        match &source.node {
            SourceKind::Container(expr) => self.expr(expr),
            SourceKind::Range { start, end } => {
                self.expr(start);
                self.expr(end);
            }
        }
    }

    fn transforms(&mut self, transforms: &[ListTransform]) {
        for transform in transforms {
            match &transform.node {
                ListTransformKind::Map { pattern, value } => {
                    self.pattern(pattern);
                    self.expr(value);
                }
                ListTransformKind::Filter(expr)
                | ListTransformKind::Sort(expr)
                | ListTransformKind::Limit(expr)
                | ListTransformKind::Skip(expr) => self.expr(expr),
                ListTransformKind::Reverse => {}
                ListTransformKind::Flatten {
                    pattern,
                    source,
                    transforms,
                } => {
                    self.pattern(pattern);
                    self.source(source);
                    self.transforms(transforms);
                }
            }
        }
    }

    fn field(&mut self, field: &CollectField) {
        self.transforms(&field.transforms);
        self.collector(&field.collector);
    }

    fn collector(&mut self, collector: &Collector) {
        match &collector.node {
            CollectorKind::Count => {}
            CollectorKind::List(expr)
            | CollectorKind::Stats(expr)
            | CollectorKind::Sum(expr)
            | CollectorKind::PartitionCount(expr)
            | CollectorKind::Tuple { value: expr, .. }
            | CollectorKind::Matches {
                predicate: expr, ..
            } => self.expr(expr),
            CollectorKind::First { value, default }
            | CollectorKind::Univalued { value, default }
            | CollectorKind::Optimum { value, default, .. } => {
                self.expr(value);
                if let Some(default) = default {
                    self.expr(default);
                }
            }
            CollectorKind::Reduce {
                accumulator,
                initial,
                reducer,
            } => {
                self.pattern(accumulator);
                self.expr(initial);
                self.expr(reducer);
            }
            CollectorKind::Dictionary { key, value } => {
                self.expr(key);
                self.expr(value);
            }
            CollectorKind::Object(fields) => fields.iter().for_each(|f| self.field(f)),
            CollectorKind::Concatenate {
                value, delimiter, ..
            } => {
                self.expr(value);
                self.expr(delimiter);
            }
        }
    }
}
