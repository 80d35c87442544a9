//! Sources, list transforms and collectors.
//!
//! The same machinery serves `For` expressions, where each item is bound
//! by a pattern, and grouping clauses, where the item is the stream row
//! itself. Collectors also track whether the order items arrive in is
//! known, and reject the ones whose result would depend on it.

use std::collections::BTreeMap;

use olive_ast::{
    CollectField, Collector, CollectorKind, ConcatenationMode, Expr, ListTransform,
    ListTransformKind, Pattern, Source, SourceKind,
};
use olive_diag::Category;
use olive_types::Type;
use serde::Serialize;

use crate::capture;
use crate::context::Checker;
use crate::scope::{Binding, Flavour, Scope, WildcardSource};

/// Largest element count a `Tuple` collector may request.
pub const MAX_TUPLE_SIZE: usize = 1024;

/// Whether the order of items in a stream is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ordering {
    /// Already reported as an error.
    Bad,
    /// Arbitrary, for example items of a list or rows of a group.
    Random,
    /// Fixed by a range or a sort.
    Requested,
}

impl Ordering {
    fn combine(self, other: Ordering) -> Ordering {
        match (self, other) {
            (Ordering::Bad, _) | (_, Ordering::Bad) => Ordering::Bad,
            (Ordering::Requested, Ordering::Requested) => Ordering::Requested,
            _ => Ordering::Random,
        }
    }
}

/// The names visible to per-item code: everything outside the iteration
/// plus whatever the current item's pattern declares.
#[derive(Debug, Clone)]
pub(crate) struct Row {
    outer: Scope,
    item: Option<(Vec<Binding>, Vec<WildcardSource>)>,
}

impl Row {
    /// Items are whole stream rows, already visible in `scope`.
    pub(crate) fn stream(scope: &Scope) -> Self {
        Self {
            outer: scope.clone(),
            item: None,
        }
    }

    fn scope(&self) -> Scope {
        match &self.item {
            Some((bindings, wildcards)) => wildcards
                .iter()
                .cloned()
                .fold(self.outer.bind_all(bindings.iter().cloned()), |scope, w| {
                    scope.bind_wildcard(w)
                }),
            None => self.outer.clone(),
        }
    }
}

fn source_ordering(source: &Source) -> Ordering {
    match source.node {
        SourceKind::Container(_) => Ordering::Random,
        SourceKind::Range { .. } => Ordering::Requested,
    }
}

fn collector_name(collector: &CollectorKind) -> &'static str {
    match collector {
        CollectorKind::First { .. } => "First",
        CollectorKind::Univalued { .. } => "Univalued",
        CollectorKind::Optimum { extremum, .. } => extremum.keyword(),
        CollectorKind::Count => "Count",
        CollectorKind::List(_) => "List",
        CollectorKind::Reduce { .. } => "Reduce",
        CollectorKind::Stats(_) => "Stats",
        CollectorKind::Sum(_) => "Sum",
        CollectorKind::Dictionary { .. } => "Dict",
        CollectorKind::Object(_) => "Object",
        CollectorKind::Tuple { .. } => "Tuple",
        CollectorKind::PartitionCount(_) => "PartitionCount",
        CollectorKind::Concatenate { .. } => "Concat",
        CollectorKind::Matches { .. } => "Matches",
    }
}

impl Checker<'_> {
    // -----------------------------------------------------------------------
    // For expressions
    // -----------------------------------------------------------------------

    pub(crate) fn for_definitions(
        &mut self,
        pattern: &Pattern,
        source: &Source,
        transforms: &[ListTransform],
        collector: &Collector,
    ) -> bool {
        let mut ok = self.pattern_definitions(pattern);
        ok &= self.source_definitions(source);
        ok &= self.transforms_definitions(transforms);
        ok &= self.collector_definitions(collector);
        ok
    }

    pub(crate) fn resolve_for(
        &mut self,
        expr: &Expr,
        pattern: &Pattern,
        source: &Source,
        transforms: &[ListTransform],
        collector: &Collector,
        scope: &Scope,
    ) -> bool {
        let mut ok = self.resolve_source(source, scope);
        let row = Row {
            outer: scope.clone(),
            item: Some(self.pattern_bindings(pattern, Flavour::Lambda)),
        };
        let (row, transforms_ok) = self.resolve_transforms(row, transforms);
        ok &= transforms_ok;
        ok &= self.resolve_collector(collector, &row);
        if ok {
            let captured = capture::free_variables(&self.table, expr, Flavour::needs_capture);
            self.table.captures.insert(expr.id, captured);
        }
        ok
    }

    pub(crate) fn check_for(
        &mut self,
        pattern: &Pattern,
        source: &Source,
        transforms: &[ListTransform],
        collector: &Collector,
    ) -> Type {
        let element = self.check_source(source);
        let mut ok = self.check_pattern(pattern, &element);
        ok &= self.check_transforms(transforms);
        let ty = self.check_collector(collector);
        if !ok || ty.is_bad() {
            return Type::Bad;
        }
        let ordering = self.order_transforms(source_ordering(source), transforms);
        if self.collector_ordering(collector, ordering) {
            ty
        } else {
            Type::Bad
        }
    }

    // -----------------------------------------------------------------------
    // Sources
    // -----------------------------------------------------------------------

    fn source_definitions(&mut self, source: &Source) -> bool {
        match &source.node {
            SourceKind::Container(expr) => self.expr_definitions(expr),
            SourceKind::Range { start, end } => {
                let ok = self.expr_definitions(start);
                self.expr_definitions(end) && ok
            }
        }
    }

    fn resolve_source(&mut self, source: &Source, scope: &Scope) -> bool {
        match &source.node {
            SourceKind::Container(expr) => self.resolve_expr(expr, scope),
            SourceKind::Range { start, end } => {
                let ok = self.resolve_expr(start, scope);
                self.resolve_expr(end, scope) && ok
            }
        }
    }

    /// The type of each item the source produces.
    fn check_source(&mut self, source: &Source) -> Type {
        let ty = match &source.node {
            SourceKind::Container(expr) => match self.check_expr(expr) {
                Type::Bad => Type::Bad,
                Type::Empty => {
                    self.error(
                        expr.span,
                        Category::TypeMismatch,
                        "Cannot iterate over empty list. No type to check subsequent operations.",
                    );
                    Type::Bad
                }
                Type::Optional(inner) => *inner,
                other => match other.element() {
                    Some(element) => element,
                    None => {
                        self.type_error(expr.span, "list, dictionary or optional", &other);
                        Type::Bad
                    }
                },
            },
            SourceKind::Range { start, end } => {
                let start_type = self.check_expr(start);
                let end_type = self.check_expr(end);
                let start_ok = self.expect_type(start.span, &Type::Integer, &start_type);
                let end_ok = self.expect_type(end.span, &Type::Integer, &end_type);
                if start_ok && end_ok {
                    Type::Integer
                } else {
                    Type::Bad
                }
            }
        };
        self.table.record_type(source.id, ty)
    }

    // -----------------------------------------------------------------------
    // List transforms
    // -----------------------------------------------------------------------

    fn transforms_definitions(&mut self, transforms: &[ListTransform]) -> bool {
        let mut ok = true;
        for transform in transforms {
            ok &= match &transform.node {
                ListTransformKind::Map { pattern, value } => {
                    let pattern_ok = self.pattern_definitions(pattern);
                    self.expr_definitions(value) && pattern_ok
                }
                ListTransformKind::Filter(expr)
                | ListTransformKind::Sort(expr)
                | ListTransformKind::Limit(expr)
                | ListTransformKind::Skip(expr) => self.expr_definitions(expr),
                ListTransformKind::Reverse => true,
                ListTransformKind::Flatten {
                    pattern,
                    source,
                    transforms,
                } => {
                    let mut inner = self.pattern_definitions(pattern);
                    inner &= self.source_definitions(source);
                    inner &= self.transforms_definitions(transforms);
                    inner
                }
            };
        }
        ok
    }

    /// Thread the per-item scope through a chain of transforms. Returns the
    /// scope the next transform (or the collector) sees.
    pub(crate) fn resolve_transforms(&mut self, mut row: Row, transforms: &[ListTransform]) -> (Row, bool) {
        let mut ok = true;
        for transform in transforms {
            match &transform.node {
                ListTransformKind::Map { pattern, value } => {
                    ok &= self.resolve_expr(value, &row.scope());
                    row = Row {
                        item: Some(self.pattern_bindings(pattern, Flavour::Lambda)),
                        outer: row.outer,
                    };
                }
                ListTransformKind::Filter(expr) | ListTransformKind::Sort(expr) => {
                    ok &= self.resolve_expr(expr, &row.scope());
                }
                ListTransformKind::Limit(expr) | ListTransformKind::Skip(expr) => {
                    ok &= self.resolve_expr(expr, &row.outer);
                }
                ListTransformKind::Reverse => {}
                ListTransformKind::Flatten {
                    pattern,
                    source,
                    transforms,
                } => {
                    let current = row.scope();
                    ok &= self.resolve_source(source, &current);
                    let inner = Row {
                        outer: current,
                        item: Some(self.pattern_bindings(pattern, Flavour::Lambda)),
                    };
                    let (inner, inner_ok) = self.resolve_transforms(inner, transforms);
                    ok &= inner_ok;
                    row = Row {
                        outer: row.outer,
                        item: inner.item,
                    };
                }
            }
        }
        (row, ok)
    }

    fn check_transforms(&mut self, transforms: &[ListTransform]) -> bool {
        let mut ok = true;
        for transform in transforms {
            ok &= match &transform.node {
                ListTransformKind::Map { pattern, value } => {
                    let ty = self.check_expr(value);
                    self.check_pattern(pattern, &ty)
                }
                ListTransformKind::Filter(expr) => {
                    let ty = self.check_expr(expr);
                    self.expect_type(expr.span, &Type::Boolean, &ty)
                }
                ListTransformKind::Sort(expr) => {
                    let ty = self.check_expr(expr);
                    self.expect_orderable(expr.span, &ty, "sorting")
                }
                ListTransformKind::Limit(expr) | ListTransformKind::Skip(expr) => {
                    let ty = self.check_expr(expr);
                    self.expect_type(expr.span, &Type::Integer, &ty)
                }
                ListTransformKind::Reverse => true,
                ListTransformKind::Flatten {
                    pattern,
                    source,
                    transforms,
                } => {
                    let element = self.check_source(source);
                    let bound = self.check_pattern(pattern, &element);
                    self.check_transforms(transforms) && bound
                }
            };
        }
        ok
    }

    pub(crate) fn expect_orderable(&mut self, span: olive_ast::Span, ty: &Type, purpose: &str) -> bool {
        if ty.is_bad() {
            false
        } else if ty.is_orderable() {
            true
        } else {
            self.error(
                span,
                Category::NotOrderable,
                format!("Expected orderable type for {purpose} but got {ty}."),
            );
            false
        }
    }

    /// Fold the item ordering through a chain of transforms.
    pub(crate) fn order_transforms(&mut self, mut ordering: Ordering, transforms: &[ListTransform]) -> Ordering {
        for transform in transforms {
            ordering = match &transform.node {
                ListTransformKind::Sort(_) => match ordering {
                    Ordering::Bad => Ordering::Bad,
                    _ => Ordering::Requested,
                },
                ListTransformKind::Map { .. }
                | ListTransformKind::Filter(_)
                | ListTransformKind::Reverse => ordering,
                ListTransformKind::Limit(_) | ListTransformKind::Skip(_) => {
                    if ordering == Ordering::Random {
                        let keyword = match transform.node {
                            ListTransformKind::Limit(_) => "Limit",
                            _ => "Skip",
                        };
                        self.error(
                            transform.span,
                            Category::Nondeterministic,
                            format!(
                                "“{keyword}” is applied to items in a random order, so the result is random. Sort them first."
                            ),
                        );
                        Ordering::Bad
                    } else {
                        ordering
                    }
                }
                ListTransformKind::Flatten {
                    source, transforms, ..
                } => {
                    let inner = self.order_transforms(source_ordering(source), transforms);
                    ordering.combine(inner)
                }
            };
        }
        ordering
    }

    // -----------------------------------------------------------------------
    // Collectors
    // -----------------------------------------------------------------------

    pub(crate) fn collector_definitions(&mut self, collector: &Collector) -> bool {
        match &collector.node {
            CollectorKind::Count => true,
            CollectorKind::List(expr)
            | CollectorKind::Stats(expr)
            | CollectorKind::Sum(expr)
            | CollectorKind::PartitionCount(expr)
            | CollectorKind::Tuple { value: expr, .. }
            | CollectorKind::Matches {
                predicate: expr, ..
            } => self.expr_definitions(expr),
            CollectorKind::First { value, default }
            | CollectorKind::Univalued { value, default }
            | CollectorKind::Optimum { value, default, .. } => {
                let ok = self.expr_definitions(value);
                match default {
                    Some(default) => self.expr_definitions(default) && ok,
                    None => ok,
                }
            }
            CollectorKind::Reduce {
                accumulator,
                initial,
                reducer,
            } => {
                let mut ok = self.pattern_definitions(accumulator);
                ok &= self.expr_definitions(initial);
                ok &= self.expr_definitions(reducer);
                ok
            }
            CollectorKind::Dictionary { key, value } => {
                let ok = self.expr_definitions(key);
                self.expr_definitions(value) && ok
            }
            CollectorKind::Object(fields) => {
                let mut ok = self.unique_collect_fields(fields, |count, name| {
                    format!("Field “{name}” repeats {count}.")
                });
                for field in fields {
                    ok &= self.field_definitions(field);
                }
                ok
            }
            CollectorKind::Concatenate {
                value, delimiter, ..
            } => {
                let ok = self.expr_definitions(value);
                self.expr_definitions(delimiter) && ok
            }
        }
    }

    /// Report every name declared more than once among `fields`.
    pub(crate) fn unique_collect_fields(
        &mut self,
        fields: &[CollectField],
        message: impl Fn(usize, &str) -> String,
    ) -> bool {
        let mut counts: BTreeMap<&str, (usize, olive_ast::Span)> = BTreeMap::new();
        for field in fields {
            counts
                .entry(field.name.node.as_str())
                .or_insert((0, field.name.span))
                .0 += 1;
        }
        let mut ok = true;
        for (name, (count, span)) in counts {
            if count > 1 {
                self.error(span, Category::DuplicateName, message(count, name));
                ok = false;
            }
        }
        ok
    }

    pub(crate) fn field_definitions(&mut self, field: &CollectField) -> bool {
        let ok = self.transforms_definitions(&field.transforms);
        self.collector_definitions(&field.collector) && ok
    }

    pub(crate) fn resolve_field(&mut self, field: &CollectField, row: &Row) -> bool {
        let (row, ok) = self.resolve_transforms(row.clone(), &field.transforms);
        let ok = self.resolve_collector(&field.collector, &row) && ok;
        if ok {
            let captured = capture::free_variables_field(&self.table, field, Flavour::needs_capture);
            self.table.captures.insert(field.collector.id, captured);
        }
        ok
    }

    fn resolve_collector(&mut self, collector: &Collector, row: &Row) -> bool {
        let current = row.scope();
        match &collector.node {
            CollectorKind::Count => true,
            CollectorKind::List(expr)
            | CollectorKind::Stats(expr)
            | CollectorKind::Sum(expr)
            | CollectorKind::PartitionCount(expr)
            | CollectorKind::Tuple { value: expr, .. }
            | CollectorKind::Matches {
                predicate: expr, ..
            } => self.resolve_expr(expr, &current),
            CollectorKind::First { value, default }
            | CollectorKind::Univalued { value, default }
            | CollectorKind::Optimum { value, default, .. } => {
                let ok = self.resolve_expr(value, &current);
                match default {
                    Some(default) => self.resolve_expr(default, &row.outer) && ok,
                    None => ok,
                }
            }
            CollectorKind::Reduce {
                accumulator,
                initial,
                reducer,
            } => {
                let ok = self.resolve_expr(initial, &row.outer);
                let folding = self.bind_pattern(&current, accumulator, Flavour::Lambda);
                self.resolve_expr(reducer, &folding) && ok
            }
            CollectorKind::Dictionary { key, value } => {
                let ok = self.resolve_expr(key, &current);
                self.resolve_expr(value, &current) && ok
            }
            CollectorKind::Object(fields) => {
                let mut ok = true;
                for field in fields {
                    ok &= self.resolve_field(field, row);
                }
                ok
            }
            CollectorKind::Concatenate {
                value, delimiter, ..
            } => {
                let ok = self.resolve_expr(value, &current);
                self.resolve_expr(delimiter, &row.outer) && ok
            }
        }
    }

    /// Type of a collector with its transforms. Records the result on the
    /// collector node, which is what grouping bindings read.
    pub(crate) fn check_field(&mut self, field: &CollectField) -> Type {
        let transforms_ok = self.check_transforms(&field.transforms);
        let ty = self.check_collector(&field.collector);
        if transforms_ok {
            ty
        } else {
            self.table.record_type(field.collector.id, Type::Bad)
        }
    }

    pub(crate) fn check_collector(&mut self, collector: &Collector) -> Type {
        let ty = self.infer_collector(collector);
        self.table.record_type(collector.id, ty)
    }

    fn infer_collector(&mut self, collector: &Collector) -> Type {
        match &collector.node {
            CollectorKind::Count => Type::Integer,
            CollectorKind::List(expr) => match self.check_expr(expr) {
                Type::Bad => Type::Bad,
                ty => ty.as_list(),
            },
            CollectorKind::First { value, default }
            | CollectorKind::Univalued { value, default } => {
                let ty = self.check_expr(value);
                self.with_default(&collector.node, collector.span, ty, default.as_ref())
            }
            CollectorKind::Optimum {
                extremum,
                value,
                default,
            } => {
                let ty = self.check_expr(value);
                if !self.expect_orderable(value.span, &ty, extremum.keyword()) {
                    if let Some(default) = default {
                        self.check_expr(default);
                    }
                    return Type::Bad;
                }
                self.with_default(&collector.node, collector.span, ty, default.as_ref())
            }
            CollectorKind::Reduce {
                accumulator,
                initial,
                reducer,
            } => {
                let initial_type = self.check_expr(initial);
                let bound = self.check_pattern(accumulator, &initial_type);
                let reducer_type = self.check_expr(reducer);
                if !bound || initial_type.is_bad() || reducer_type.is_bad() {
                    return Type::Bad;
                }
                if reducer_type.is_same(&initial_type) {
                    reducer_type.unify(&initial_type)
                } else {
                    self.error(
                        reducer.span,
                        Category::TypeMismatch,
                        format!(
                            "Reducer produces type {reducer_type}, but initial expression is {initial_type}."
                        ),
                    );
                    Type::Bad
                }
            }
            CollectorKind::Stats(expr) => {
                let ty = self.check_expr(expr);
                if !self.expect_numeric(expr.span, &ty) {
                    return Type::Bad;
                }
                Type::object([
                    ("average", Type::Float),
                    ("count", Type::Integer),
                    ("maximum", ty.clone()),
                    ("minimum", ty.clone()),
                    ("sum", ty),
                ])
            }
            CollectorKind::Sum(expr) => {
                let ty = self.check_expr(expr);
                if self.expect_numeric(expr.span, &ty) {
                    ty
                } else {
                    Type::Bad
                }
            }
            CollectorKind::Dictionary { key, value } => {
                let key_type = self.check_expr(key);
                let value_type = self.check_expr(value);
                if key_type.is_bad() || value_type.is_bad() {
                    Type::Bad
                } else {
                    Type::dictionary(key_type, value_type)
                }
            }
            CollectorKind::Object(fields) => {
                let mut types = BTreeMap::new();
                let mut ok = true;
                for field in fields {
                    let ty = self.check_field(field);
                    ok &= !ty.is_bad();
                    types.insert(field.name.node.clone(), ty);
                }
                if ok { Type::Object(types) } else { Type::Bad }
            }
            CollectorKind::Tuple { value, size } => {
                let ty = self.check_expr(value);
                if *size == 0 {
                    self.error(
                        collector.span,
                        Category::ArityMismatch,
                        "Tuple collector must collect at least one element.",
                    );
                    return Type::Bad;
                }
                if *size > MAX_TUPLE_SIZE {
                    self.error(
                        collector.span,
                        Category::ArityMismatch,
                        format!(
                            "Tuple collector size {size} is larger than the limit of {MAX_TUPLE_SIZE}."
                        ),
                    );
                    return Type::Bad;
                }
                match ty {
                    Type::Bad => Type::Bad,
                    ty => Type::Tuple(vec![ty; *size]).as_optional(),
                }
            }
            CollectorKind::PartitionCount(expr) => {
                let ty = self.check_expr(expr);
                if self.expect_type(expr.span, &Type::Boolean, &ty) {
                    Type::tuple([Type::Integer, Type::Integer])
                } else {
                    Type::Bad
                }
            }
            CollectorKind::Concatenate {
                value, delimiter, ..
            } => {
                let value_type = self.check_expr(value);
                let delimiter_type = self.check_expr(delimiter);
                let value_ok = self.expect_type(value.span, &Type::String, &value_type);
                let delimiter_ok = self.expect_type(delimiter.span, &Type::String, &delimiter_type);
                if value_ok && delimiter_ok {
                    Type::String
                } else {
                    Type::Bad
                }
            }
            CollectorKind::Matches { predicate, .. } => {
                let ty = self.check_expr(predicate);
                if self.expect_type(predicate.span, &Type::Boolean, &ty) {
                    Type::Boolean
                } else {
                    Type::Bad
                }
            }
        }
    }

    fn expect_numeric(&mut self, span: olive_ast::Span, ty: &Type) -> bool {
        if ty.is_bad() {
            false
        } else if ty.is_numeric() {
            true
        } else {
            self.type_error(span, "integer or float", ty);
            false
        }
    }

    /// Without a default the result may be missing and is optional. With
    /// one, the default must be the same type as the value.
    fn with_default(
        &mut self,
        collector: &CollectorKind,
        span: olive_ast::Span,
        ty: Type,
        default: Option<&Expr>,
    ) -> Type {
        let Some(default) = default else {
            return match ty {
                Type::Bad => Type::Bad,
                ty => ty.as_optional(),
            };
        };
        let default_type = self.check_expr(default);
        if ty.is_bad() || default_type.is_bad() {
            return Type::Bad;
        }
        if ty.is_same(&default_type) {
            ty.unify(&default_type)
        } else {
            self.error(
                span,
                Category::TypeMismatch,
                format!(
                    "{} would return {ty}, but default value is {default_type}. They must be the same",
                    collector_name(collector)
                ),
            );
            Type::Bad
        }
    }

    /// Reject collectors whose result would depend on a random item order.
    pub(crate) fn collector_ordering(&mut self, collector: &Collector, ordering: Ordering) -> bool {
        if ordering == Ordering::Bad {
            return false;
        }
        match &collector.node {
            CollectorKind::Concatenate {
                mode: ConcatenationMode::Provided,
                ..
            } if ordering == Ordering::Random => {
                self.error(
                    collector.span,
                    Category::Nondeterministic,
                    "String concatenation is based on a random order. That is a bad idea.",
                );
                false
            }
            CollectorKind::Tuple { .. } if ordering == Ordering::Random => {
                self.error(
                    collector.span,
                    Category::Nondeterministic,
                    "Tuple collection is based on a random order. That is a bad idea.",
                );
                false
            }
            CollectorKind::Object(fields) => {
                let mut ok = true;
                for field in fields {
                    ok &= self.field_ordering(field, ordering);
                }
                ok
            }
            _ => true,
        }
    }

    pub(crate) fn field_ordering(&mut self, field: &CollectField, ordering: Ordering) -> bool {
        let ordering = self.order_transforms(ordering, &field.transforms);
        self.collector_ordering(&field.collector, ordering)
    }
}
