//! The three checking phases for expressions.

use std::collections::BTreeMap;

use olive_ast::{AlgebraicPayload, BinaryOp, Expr, ExprKind, Literal, ObjectField, UnaryOp};
use olive_diag::Category;
use olive_types::{AlgebraicShape, Type};

use crate::context::Checker;
use crate::scope::{Flavour, Scope};

/// Direct children of expressions that bind nothing themselves.
fn subexpressions(expr: &Expr) -> Vec<&Expr> {
    match &expr.node {
        ExprKind::Literal(_) | ExprKind::EmptyList | ExprKind::Variable(_) => Vec::new(),
        ExprKind::List(items) | ExprKind::Tuple(items) => items.iter().collect(),
        ExprKind::Object(fields) => fields.iter().map(|f| &f.value).collect(),
        ExprKind::Algebraic { payload, .. } => match payload {
            AlgebraicPayload::Tuple(items) => items.iter().collect(),
            AlgebraicPayload::Object(fields) => fields.iter().map(|f| &f.value).collect(),
        },
        ExprKind::Optional(inner) => vec![inner],
        ExprKind::Default { value, alternative } => vec![value, alternative],
        ExprKind::Field { target, .. } | ExprKind::Index { target, .. } => vec![target],
        ExprKind::Unary { operand, .. } => vec![operand],
        ExprKind::Binary { left, right, .. } => vec![left, right],
        ExprKind::Ternary {
            condition,
            then_branch,
            else_branch,
        } => vec![condition, then_branch, else_branch],
        ExprKind::Call { arguments, .. } => arguments.iter().collect(),
        ExprKind::Let { value, body, .. } => vec![value, body],
        // Handled by the collector engine.
        ExprKind::For { .. } => Vec::new(),
    }
}

fn literal_type(literal: &Literal) -> Type {
    match literal {
        Literal::Boolean(_) => Type::Boolean,
        Literal::Integer(_) => Type::Integer,
        Literal::Float(_) => Type::Float,
        Literal::String(_) => Type::String,
        Literal::Date(_) => Type::Date,
        Literal::Path(_) => Type::Path,
    }
}

impl Checker<'_> {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    pub(crate) fn expr_definitions(&mut self, expr: &Expr) -> bool {
        let mut ok = true;
        match &expr.node {
            ExprKind::Call { function, .. } => match self.catalogue.function(&function.node) {
                Some(definition) => {
                    self.table.functions.insert(expr.id, definition.clone());
                }
                None => {
                    self.error(
                        function.span,
                        Category::UndefinedName,
                        format!("Undefined function “{}”.", function.node),
                    );
                    ok = false;
                }
            },
            ExprKind::Object(fields)
            | ExprKind::Algebraic {
                payload: AlgebraicPayload::Object(fields),
                ..
            } => ok &= self.unique_fields(fields),
            ExprKind::Let { pattern, .. } => ok &= self.pattern_definitions(pattern),
            ExprKind::For {
                pattern,
                source,
                transforms,
                collector,
            } => ok &= self.for_definitions(pattern, source, transforms, collector),
            _ => {}
        }
        for child in subexpressions(expr) {
            ok &= self.expr_definitions(child);
        }
        ok
    }

    fn unique_fields(&mut self, fields: &[ObjectField]) -> bool {
        let mut seen = BTreeMap::new();
        let mut ok = true;
        for field in fields {
            if seen.insert(field.name.node.as_str(), field.name.span).is_some() {
                self.error(
                    field.name.span,
                    Category::DuplicateName,
                    format!("Duplicate field “{}” in object.", field.name.node),
                );
                ok = false;
            }
        }
        ok
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    pub(crate) fn resolve_expr(&mut self, expr: &Expr, scope: &Scope) -> bool {
        match &expr.node {
            ExprKind::Variable(name) => match scope.get(name) {
                Some(binding) => {
                    self.table.record_variable(expr.id, binding);
                    true
                }
                None => {
                    self.error(
                        expr.span,
                        Category::UndefinedName,
                        format!("Undefined variable “{name}”."),
                    );
                    false
                }
            },
            ExprKind::Let {
                pattern,
                value,
                body,
            } => {
                let ok = self.resolve_expr(value, scope);
                let inner = self.bind_pattern(scope, pattern, Flavour::Lambda);
                self.resolve_expr(body, &inner) && ok
            }
            ExprKind::For {
                pattern,
                source,
                transforms,
                collector,
            } => self.resolve_for(expr, pattern, source, transforms, collector, scope),
            _ => {
                let mut ok = true;
                for child in subexpressions(expr) {
                    ok &= self.resolve_expr(child, scope);
                }
                ok
            }
        }
    }

    // -----------------------------------------------------------------------
    // Type checking
    // -----------------------------------------------------------------------

    /// Compute and record the type of an expression. A `Bad` result has
    /// already been reported.
    pub(crate) fn check_expr(&mut self, expr: &Expr) -> Type {
        let ty = self.infer_expr(expr);
        self.table.record_type(expr.id, ty)
    }

    fn infer_expr(&mut self, expr: &Expr) -> Type {
        match &expr.node {
            ExprKind::Literal(literal) => literal_type(literal),
            ExprKind::EmptyList => Type::Empty,
            ExprKind::Variable(_) => match self.table.binding(expr.id) {
                Some(binding) => self.table.binding_type(binding),
                None => Type::Bad,
            },
            ExprKind::List(items) => self.check_list(items),
            ExprKind::Tuple(items) => {
                let types: Vec<Type> = items.iter().map(|item| self.check_expr(item)).collect();
                if types.iter().any(Type::is_bad) {
                    Type::Bad
                } else {
                    Type::Tuple(types)
                }
            }
            ExprKind::Object(fields) => match self.check_fields(fields) {
                Some(fields) => Type::Object(fields),
                None => Type::Bad,
            },
            ExprKind::Algebraic { tag, payload } => {
                let shape = match payload {
                    AlgebraicPayload::Tuple(items) => {
                        let types: Vec<Type> =
                            items.iter().map(|item| self.check_expr(item)).collect();
                        if types.iter().any(Type::is_bad) {
                            return Type::Bad;
                        }
                        AlgebraicShape::Tuple(types)
                    }
                    AlgebraicPayload::Object(fields) => match self.check_fields(fields) {
                        Some(fields) => AlgebraicShape::Object(fields),
                        None => return Type::Bad,
                    },
                };
                Type::Algebraic {
                    tag: tag.clone(),
                    shape,
                }
            }
            ExprKind::Optional(inner) => match self.check_expr(inner) {
                Type::Bad => Type::Bad,
                ty => ty.as_optional(),
            },
            ExprKind::Default { value, alternative } => {
                let value_type = self.check_expr(value);
                let alternative_type = self.check_expr(alternative);
                if value_type.is_bad() || alternative_type.is_bad() {
                    return Type::Bad;
                }
                let Type::Optional(inner) = &value_type else {
                    self.type_error(value.span, "optional", &value_type);
                    return Type::Bad;
                };
                if inner.is_same(&alternative_type) {
                    inner.unify(&alternative_type)
                } else {
                    self.type_error(alternative.span, inner, &alternative_type);
                    Type::Bad
                }
            }
            ExprKind::Field { target, field } => {
                let target_type = self.check_expr(target);
                if target_type.is_bad() {
                    return Type::Bad;
                }
                if let Some(ty) = target_type.field(field) {
                    return ty.clone();
                }
                if matches!(
                    target_type,
                    Type::Object(_)
                        | Type::Algebraic {
                            shape: AlgebraicShape::Object(_),
                            ..
                        }
                ) {
                    self.error(
                        expr.span,
                        Category::MissingField,
                        format!("Field {field} does not exist in object {target_type}."),
                    );
                } else {
                    self.type_error(target.span, "object", &target_type);
                }
                Type::Bad
            }
            ExprKind::Index { target, index } => {
                let target_type = self.check_expr(target);
                match &target_type {
                    Type::Bad => Type::Bad,
                    Type::Tuple(elements)
                    | Type::Algebraic {
                        shape: AlgebraicShape::Tuple(elements),
                        ..
                    } => match elements.get(*index) {
                        Some(ty) => ty.clone(),
                        None => {
                            self.error(
                                expr.span,
                                Category::ArityMismatch,
                                format!(
                                    "Tuple has only {} elements, but element {index} was requested.",
                                    elements.len()
                                ),
                            );
                            Type::Bad
                        }
                    },
                    other => {
                        self.type_error(target.span, "tuple", other);
                        Type::Bad
                    }
                }
            }
            ExprKind::Unary { op, operand } => {
                let ty = self.check_expr(operand);
                match op {
                    UnaryOp::Not if self.expect_type(operand.span, &Type::Boolean, &ty) => {
                        Type::Boolean
                    }
                    UnaryOp::Negate if ty.is_numeric() => ty,
                    UnaryOp::Negate if !ty.is_bad() => {
                        self.type_error(operand.span, "integer or float", &ty);
                        Type::Bad
                    }
                    _ => Type::Bad,
                }
            }
            ExprKind::Binary { op, left, right } => {
                let left_type = self.check_expr(left);
                let right_type = self.check_expr(right);
                if left_type.is_bad() || right_type.is_bad() {
                    return Type::Bad;
                }
                self.check_binary(expr, *op, &left_type, &right_type)
            }
            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition_type = self.check_expr(condition);
                let condition_ok = self.expect_type(condition.span, &Type::Boolean, &condition_type);
                let then_type = self.check_expr(then_branch);
                let else_type = self.check_expr(else_branch);
                if !condition_ok || then_type.is_bad() || else_type.is_bad() {
                    return Type::Bad;
                }
                if then_type.is_same(&else_type) {
                    then_type.unify(&else_type)
                } else {
                    self.type_error(else_branch.span, &then_type, &else_type);
                    Type::Bad
                }
            }
            ExprKind::Call {
                function,
                arguments,
            } => {
                let argument_types: Vec<Type> =
                    arguments.iter().map(|arg| self.check_expr(arg)).collect();
                let Some(definition) = self.table.function(expr.id).cloned() else {
                    return Type::Bad;
                };
                if definition.parameters.len() != arguments.len() {
                    self.error(
                        function.span,
                        Category::ArityMismatch,
                        format!(
                            "Wrong number of arguments to function “{}”. Expected {}, but got {}.",
                            function.node,
                            definition.parameters.len(),
                            arguments.len()
                        ),
                    );
                    return Type::Bad;
                }
                let mut ok = true;
                for ((argument, expected), actual) in
                    arguments.iter().zip(&definition.parameters).zip(&argument_types)
                {
                    ok &= self.expect_type(argument.span, expected, actual);
                }
                if ok {
                    definition.return_type
                } else {
                    Type::Bad
                }
            }
            ExprKind::Let {
                pattern,
                value,
                body,
            } => {
                let value_type = self.check_expr(value);
                let bound = self.check_pattern(pattern, &value_type);
                let body_type = self.check_expr(body);
                if bound { body_type } else { Type::Bad }
            }
            ExprKind::For {
                pattern,
                source,
                transforms,
                collector,
            } => self.check_for(pattern, source, transforms, collector),
        }
    }

    fn check_list(&mut self, items: &[Expr]) -> Type {
        let types: Vec<Type> = items.iter().map(|item| self.check_expr(item)).collect();
        if types.iter().any(Type::is_bad) {
            return Type::Bad;
        }
        let mut iter = items.iter().zip(types);
        let Some((_, mut element)) = iter.next() else {
            return Type::Empty;
        };
        let mut ok = true;
        for (item, ty) in iter {
            if element.is_same(&ty) {
                element = element.unify(&ty);
            } else {
                self.type_error(item.span, &element, &ty);
                ok = false;
            }
        }
        if ok { element.as_list() } else { Type::Bad }
    }

    fn check_fields(&mut self, fields: &[ObjectField]) -> Option<BTreeMap<String, Type>> {
        let mut types = BTreeMap::new();
        let mut ok = true;
        for field in fields {
            let ty = self.check_expr(&field.value);
            ok &= !ty.is_bad();
            types.insert(field.name.node.clone(), ty);
        }
        ok.then_some(types)
    }

    fn check_binary(&mut self, expr: &Expr, op: BinaryOp, left: &Type, right: &Type) -> Type {
        let result = match op {
            BinaryOp::Add => match (left, right) {
                (Type::String, Type::String) => Some(Type::String),
                (Type::Date, Type::Integer) => Some(Type::Date),
                (Type::List(_) | Type::Empty, Type::List(_) | Type::Empty)
                    if left.is_same(right) =>
                {
                    Some(left.unify(right))
                }
                _ if left.is_numeric() && left == right => Some(left.clone()),
                _ => None,
            },
            BinaryOp::Subtract => match (left, right) {
                (Type::Date, Type::Integer) => Some(Type::Date),
                (Type::Date, Type::Date) => Some(Type::Integer),
                _ if left.is_numeric() && left == right => Some(left.clone()),
                _ => None,
            },
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
                (left.is_numeric() && left == right).then(|| left.clone())
            }
            BinaryOp::Equal | BinaryOp::NotEqual => {
                if left.is_same(right) {
                    Some(Type::Boolean)
                } else {
                    self.type_error(expr.span, left, right);
                    return Type::Bad;
                }
            }
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
                if !left.is_orderable() {
                    self.error(
                        expr.span,
                        Category::NotOrderable,
                        format!("Expected orderable type for comparison but got {left}."),
                    );
                    return Type::Bad;
                }
                left.is_same(right).then_some(Type::Boolean)
            }
            BinaryOp::And | BinaryOp::Or => {
                (*left == Type::Boolean && *right == Type::Boolean).then_some(Type::Boolean)
            }
        };
        result.unwrap_or_else(|| {
            self.error(
                expr.span,
                Category::TypeMismatch,
                format!(
                    "Operator {} cannot be applied to {left} and {right}.",
                    op.symbol()
                ),
            );
            Type::Bad
        })
    }
}
