//! Destructuring patterns against values.
//!
//! A pattern is checked in three steps, one per phase: its wildcards are
//! counted and its field names checked for repeats, then it contributes
//! bindings to a scope, and finally it is matched against the type of the
//! value it destructures. Bindings carry deferred types that read the
//! pattern's recorded type, so they can be created before any type is
//! known.

use std::collections::BTreeMap;

use olive_ast::{Pattern, PatternKind};
use olive_diag::Category;
use olive_types::{AlgebraicShape, Type};

use crate::context::Checker;
use crate::scope::{Binding, BindingType, Flavour, Scope, WildcardSource};

/// How many wildcards a pattern contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WildcardCheck {
    None,
    HasWildcard,
    /// More than one; already reported.
    Bad,
}

impl WildcardCheck {
    /// Combine two sibling results. Returns `None` when the combination
    /// is a new conflict the caller must report.
    fn combine(self, other: WildcardCheck) -> Option<WildcardCheck> {
        match (self, other) {
            (WildcardCheck::Bad, _) | (_, WildcardCheck::Bad) => Some(WildcardCheck::Bad),
            (WildcardCheck::HasWildcard, WildcardCheck::HasWildcard) => None,
            (WildcardCheck::HasWildcard, _) | (_, WildcardCheck::HasWildcard) => {
                Some(WildcardCheck::HasWildcard)
            }
            (WildcardCheck::None, WildcardCheck::None) => Some(WildcardCheck::None),
        }
    }
}

fn tuple_elements(ty: &Type) -> Option<&[Type]> {
    match ty {
        Type::Tuple(elements)
        | Type::Algebraic {
            shape: AlgebraicShape::Tuple(elements),
            ..
        } => Some(elements),
        _ => None,
    }
}

fn object_fields(ty: &Type) -> Option<&BTreeMap<String, Type>> {
    match ty {
        Type::Object(fields)
        | Type::Algebraic {
            shape: AlgebraicShape::Object(fields),
            ..
        } => Some(fields),
        _ => None,
    }
}

impl Checker<'_> {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Count wildcards and reject repeated object fields. True when the
    /// pattern is well formed.
    pub(crate) fn pattern_definitions(&mut self, pattern: &Pattern) -> bool {
        let mut ok = true;
        let wildcards = self.check_wildcards(pattern, &mut ok);
        ok && wildcards != WildcardCheck::Bad
    }

    fn check_wildcards(&mut self, pattern: &Pattern, ok: &mut bool) -> WildcardCheck {
        match &pattern.node {
            PatternKind::Variable(_) | PatternKind::Discard => WildcardCheck::None,
            PatternKind::Wildcard => WildcardCheck::HasWildcard,
            PatternKind::Tuple(elements) => {
                let mut result = WildcardCheck::None;
                for element in elements {
                    let inner = self.check_wildcards(element, ok);
                    result = self.merge_wildcards(pattern, result, inner, "tuple");
                }
                result
            }
            PatternKind::Object(fields) => {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for field in fields {
                    *counts.entry(field.field.node.as_str()).or_default() += 1;
                }
                for (name, count) in counts {
                    if count > 1 {
                        self.error(
                            pattern.span,
                            Category::DuplicateName,
                            format!("Multiple use of object field {name} in destructuring."),
                        );
                        *ok = false;
                    }
                }
                let mut result = WildcardCheck::None;
                for field in fields {
                    let inner = self.check_wildcards(&field.pattern, ok);
                    result = self.merge_wildcards(pattern, result, inner, "object");
                }
                result
            }
        }
    }

    fn merge_wildcards(
        &mut self,
        pattern: &Pattern,
        left: WildcardCheck,
        right: WildcardCheck,
        kind: &str,
    ) -> WildcardCheck {
        left.combine(right).unwrap_or_else(|| {
            self.error(
                pattern.span,
                Category::PatternMismatch,
                format!("Multiple wildcards are not allowed in {kind}."),
            );
            WildcardCheck::Bad
        })
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Bind everything the pattern declares on top of `scope`.
    pub(crate) fn bind_pattern(&mut self, scope: &Scope, pattern: &Pattern, flavour: Flavour) -> Scope {
        let (bindings, wildcards) = self.pattern_bindings(pattern, flavour);
        wildcards
            .into_iter()
            .fold(scope.bind_all(bindings), |scope, wildcard| {
                scope.bind_wildcard(wildcard)
            })
    }

    /// The explicit bindings and wildcard sources a pattern declares.
    pub(crate) fn pattern_bindings(
        &mut self,
        pattern: &Pattern,
        flavour: Flavour,
    ) -> (Vec<Binding>, Vec<WildcardSource>) {
        let mut bindings = Vec::new();
        let mut wildcards = Vec::new();
        self.collect_bindings(pattern, flavour, &mut bindings, &mut wildcards);
        (bindings, wildcards)
    }

    fn collect_bindings(
        &mut self,
        pattern: &Pattern,
        flavour: Flavour,
        bindings: &mut Vec<Binding>,
        wildcards: &mut Vec<WildcardSource>,
    ) {
        match &pattern.node {
            PatternKind::Variable(name) => bindings.push(Binding::declared(
                name,
                flavour,
                BindingType::Node(pattern.id),
                pattern.id,
                pattern.span,
            )),
            PatternKind::Discard => {}
            PatternKind::Wildcard => {
                self.table.wildcards.push((self.olive, pattern.id, pattern.span));
                wildcards.push(WildcardSource {
                    pattern: pattern.id,
                    flavour,
                    span: pattern.span,
                });
            }
            PatternKind::Tuple(elements) => {
                for element in elements {
                    self.collect_bindings(element, flavour, bindings, wildcards);
                }
            }
            PatternKind::Object(fields) => {
                for field in fields {
                    self.collect_bindings(&field.pattern, flavour, bindings, wildcards);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Type checking
    // -----------------------------------------------------------------------

    /// Match a pattern against the type of the value it destructures,
    /// recording the type of every name it binds.
    pub(crate) fn check_pattern(&mut self, pattern: &Pattern, ty: &Type) -> bool {
        if ty.is_bad() {
            self.poison_pattern(pattern);
            return false;
        }
        match &pattern.node {
            PatternKind::Variable(_) => {
                self.table.record_type(pattern.id, ty.clone());
                true
            }
            PatternKind::Discard => true,
            PatternKind::Wildcard => {
                if object_fields(ty).is_none() {
                    self.error(
                        pattern.span,
                        Category::PatternMismatch,
                        format!("Object expected for destructuring, but got {ty}."),
                    );
                    self.poison_pattern(pattern);
                    return false;
                }
                self.table.record_type(pattern.id, ty.clone());
                let missing: Vec<String> = self
                    .table
                    .wildcard_fields(pattern.id)
                    .filter(|name| ty.field(name).is_none())
                    .map(str::to_string)
                    .collect();
                for name in &missing {
                    self.error(
                        pattern.span,
                        Category::MissingField,
                        format!("Field {name} inferred in * does not exist in object {ty}."),
                    );
                }
                missing.is_empty()
            }
            PatternKind::Tuple(elements) => match tuple_elements(ty) {
                Some(types) if types.len() == elements.len() => {
                    let mut ok = true;
                    for (element, ty) in elements.iter().zip(types) {
                        ok &= self.check_pattern(element, ty);
                    }
                    ok
                }
                Some(types) => {
                    self.error(
                        pattern.span,
                        Category::ArityMismatch,
                        format!(
                            "Tuple has {} elements, but destructuring expects {}.",
                            types.len(),
                            elements.len()
                        ),
                    );
                    self.poison_pattern(pattern);
                    false
                }
                None => {
                    self.error(
                        pattern.span,
                        Category::PatternMismatch,
                        format!("Tuple expected for destructuring, but got {ty}."),
                    );
                    self.poison_pattern(pattern);
                    false
                }
            },
            PatternKind::Object(fields) => {
                let Some(available) = object_fields(ty) else {
                    self.error(
                        pattern.span,
                        Category::PatternMismatch,
                        format!("Object expected for destructuring, but got {ty}."),
                    );
                    self.poison_pattern(pattern);
                    return false;
                };
                let mut ok = true;
                for field in fields {
                    match available.get(&field.field.node) {
                        Some(field_type) => ok &= self.check_pattern(&field.pattern, field_type),
                        None => {
                            self.error(
                                field.field.span,
                                Category::MissingField,
                                format!(
                                    "Field {} does not exist in object {ty}.",
                                    field.field.node
                                ),
                            );
                            self.poison_pattern(&field.pattern);
                            ok = false;
                        }
                    }
                }
                ok
            }
        }
    }

    /// Give every name a pattern binds the type `Bad`, so reads of them do
    /// not produce further errors.
    fn poison_pattern(&mut self, pattern: &Pattern) {
        match &pattern.node {
            PatternKind::Variable(_) | PatternKind::Wildcard => {
                self.table.record_type(pattern.id, Type::Bad);
            }
            PatternKind::Discard => {}
            PatternKind::Tuple(elements) => {
                for element in elements {
                    self.poison_pattern(element);
                }
            }
            PatternKind::Object(fields) => {
                for field in fields {
                    self.poison_pattern(&field.pattern);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Unused declarations
    // -----------------------------------------------------------------------

    /// Report wildcards of one olive that never supplied a name.
    pub(crate) fn check_unused_wildcards(&mut self, olive: usize) -> bool {
        let unused: Vec<_> = self
            .table
            .wildcards
            .iter()
            .filter(|(owner, id, _)| *owner == olive && !self.table.is_read(*id))
            .map(|(_, _, span)| *span)
            .collect();
        let mut ok = true;
        for span in unused {
            ok &= self.unused(span, "No variables map back to this wildcard. It is unused");
        }
        ok
    }
}
