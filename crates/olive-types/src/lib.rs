//! Structural types for olive programs.
//!
//! Every value flowing through an olive has one of the types defined here.
//! Types are compared structurally: two object types with the same fields
//! are the same type no matter the order the fields were written in. The
//! special [`Type::Bad`] absorbs every comparison so that a single reported
//! error never cascades into secondary ones.
//!
//! Each type has two textual forms: a compact descriptor (see
//! [`Type::descriptor`]) used for hashing and for exchanging types with
//! other processes, and a human-readable name (the [`fmt::Display`] impl)
//! used in diagnostics.

use std::collections::BTreeMap;
use std::fmt;

mod descriptor;

pub use descriptor::{DescriptorError, MAX_DESCRIPTOR_DEPTH};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A semantic type.
///
/// The derived `PartialEq` is exact structural equality. Type checking
/// should use [`Type::is_same`], which treats [`Type::Bad`] as a wildcard
/// and the empty list as compatible with every list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// The type of an expression that already failed to check.
    Bad,
    /// The type of `[]`: a list whose element type is not known.
    Empty,
    Boolean,
    Integer,
    Float,
    String,
    /// An instant in time.
    Date,
    /// A file system path.
    Path,
    /// An arbitrary JSON value.
    Json,
    List(Box<Type>),
    Optional(Box<Type>),
    Dictionary(Box<Type>, Box<Type>),
    /// Positional fields.
    Tuple(Vec<Type>),
    /// Named fields. Stored sorted, so declaration order never matters.
    Object(BTreeMap<String, Type>),
    /// A tagged value whose payload is either tuple- or object-shaped.
    Algebraic { tag: String, shape: AlgebraicShape },
}

/// The payload of an algebraic value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlgebraicShape {
    Tuple(Vec<Type>),
    Object(BTreeMap<String, Type>),
}

impl Type {
    pub fn list(inner: Type) -> Self {
        Type::List(Box::new(inner))
    }

    pub fn optional(inner: Type) -> Self {
        Type::Optional(Box::new(inner))
    }

    pub fn dictionary(key: Type, value: Type) -> Self {
        Type::Dictionary(Box::new(key), Box::new(value))
    }

    pub fn tuple(elements: impl IntoIterator<Item = Type>) -> Self {
        Type::Tuple(elements.into_iter().collect())
    }

    /// Build an object type. Later duplicates of a field name replace
    /// earlier ones; callers that must reject duplicates check beforehand.
    pub fn object<N: Into<String>>(fields: impl IntoIterator<Item = (N, Type)>) -> Self {
        Type::Object(
            fields
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        )
    }

    pub fn algebraic_tuple(tag: impl Into<String>, elements: impl IntoIterator<Item = Type>) -> Self {
        Type::Algebraic {
            tag: tag.into(),
            shape: AlgebraicShape::Tuple(elements.into_iter().collect()),
        }
    }

    pub fn algebraic_object<N: Into<String>>(
        tag: impl Into<String>,
        fields: impl IntoIterator<Item = (N, Type)>,
    ) -> Self {
        Type::Algebraic {
            tag: tag.into(),
            shape: AlgebraicShape::Object(
                fields
                    .into_iter()
                    .map(|(name, ty)| (name.into(), ty))
                    .collect(),
            ),
        }
    }

    pub fn is_bad(&self) -> bool {
        matches!(self, Type::Bad)
    }

    /// True for types that have a natural total order.
    pub fn is_orderable(&self) -> bool {
        matches!(self, Type::Integer | Type::Float | Type::String | Type::Date)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Integer | Type::Float)
    }

    pub fn as_optional(&self) -> Type {
        Type::optional(self.clone())
    }

    pub fn as_list(&self) -> Type {
        Type::list(self.clone())
    }

    /// Structural compatibility.
    ///
    /// Symmetric and reflexive. [`Type::Bad`] is the same as everything.
    /// Object and algebraic object shapes must have exactly the same field
    /// names, each with the same type, at every nesting depth.
    pub fn is_same(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Bad, _) | (_, Type::Bad) => true,
            (Type::Empty, Type::Empty | Type::List(_)) | (Type::List(_), Type::Empty) => true,
            (Type::List(a), Type::List(b)) | (Type::Optional(a), Type::Optional(b)) => {
                a.is_same(b)
            }
            (Type::Dictionary(ak, av), Type::Dictionary(bk, bv)) => {
                ak.is_same(bk) && av.is_same(bv)
            }
            (Type::Tuple(a), Type::Tuple(b)) => elements_same(a, b),
            (Type::Object(a), Type::Object(b)) => fields_same(a, b),
            (
                Type::Algebraic {
                    tag: a_tag,
                    shape: a_shape,
                },
                Type::Algebraic {
                    tag: b_tag,
                    shape: b_shape,
                },
            ) => a_tag == b_tag && a_shape.is_same(b_shape),
            (a, b) => a.is_base() && a == b,
        }
    }

    /// Produce a single type both inputs can be used as.
    ///
    /// Only meaningful when `self.is_same(other)`; if they are not the same,
    /// the result is [`Type::Bad`]. The empty list unifies to the other
    /// list type, and [`Type::Bad`] anywhere produces [`Type::Bad`].
    pub fn unify(&self, other: &Type) -> Type {
        if self.is_same(other) {
            self.unify_same(other)
        } else {
            Type::Bad
        }
    }

    fn unify_same(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Bad, _) | (_, Type::Bad) => Type::Bad,
            (Type::Empty, Type::Empty) => Type::Empty,
            (Type::Empty, list @ Type::List(_)) | (list @ Type::List(_), Type::Empty) => {
                list.clone()
            }
            (Type::List(a), Type::List(b)) => Type::list(a.unify_same(b)),
            (Type::Optional(a), Type::Optional(b)) => Type::optional(a.unify_same(b)),
            (Type::Dictionary(ak, av), Type::Dictionary(bk, bv)) => {
                Type::dictionary(ak.unify_same(bk), av.unify_same(bv))
            }
            (Type::Tuple(a), Type::Tuple(b)) if a.len() == b.len() => {
                Type::Tuple(a.iter().zip(b).map(|(a, b)| a.unify_same(b)).collect())
            }
            (Type::Object(a), Type::Object(b)) if a.len() == b.len() => {
                unify_fields(a, b).map_or(Type::Bad, Type::Object)
            }
            (
                Type::Algebraic {
                    tag: a_tag,
                    shape: a_shape,
                },
                Type::Algebraic {
                    tag: b_tag,
                    shape: b_shape,
                },
            ) if a_tag == b_tag => a_shape.unify(b_shape).map_or(Type::Bad, |shape| {
                Type::Algebraic {
                    tag: a_tag.clone(),
                    shape,
                }
            }),
            (a, b) if a.is_base() && a == b => a.clone(),
            _ => Type::Bad,
        }
    }

    /// Look up a named field of an object or object-shaped algebraic type.
    pub fn field(&self, name: &str) -> Option<&Type> {
        match self {
            Type::Object(fields)
            | Type::Algebraic {
                shape: AlgebraicShape::Object(fields),
                ..
            } => fields.get(name),
            _ => None,
        }
    }

    /// The element type produced by iterating over a value of this type.
    pub fn element(&self) -> Option<Type> {
        match self {
            Type::List(inner) => Some((**inner).clone()),
            Type::Dictionary(key, value) => {
                Some(Type::Tuple(vec![(**key).clone(), (**value).clone()]))
            }
            _ => None,
        }
    }

    /// The canonical, stable textual signature of this type.
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        descriptor::write(self, &mut out);
        out
    }

    /// Parse a descriptor as produced by [`Type::descriptor`].
    pub fn from_descriptor(input: &str) -> Result<Type, DescriptorError> {
        descriptor::parse(input)
    }

    /// The human-readable name used in diagnostics.
    pub fn name(&self) -> String {
        self.to_string()
    }

    fn is_base(&self) -> bool {
        matches!(
            self,
            Type::Boolean
                | Type::Integer
                | Type::Float
                | Type::String
                | Type::Date
                | Type::Path
                | Type::Json
        )
    }
}

impl AlgebraicShape {
    pub fn is_same(&self, other: &AlgebraicShape) -> bool {
        match (self, other) {
            (AlgebraicShape::Tuple(a), AlgebraicShape::Tuple(b)) => elements_same(a, b),
            (AlgebraicShape::Object(a), AlgebraicShape::Object(b)) => fields_same(a, b),
            _ => false,
        }
    }

    fn unify(&self, other: &AlgebraicShape) -> Option<AlgebraicShape> {
        match (self, other) {
            (AlgebraicShape::Tuple(a), AlgebraicShape::Tuple(b)) if a.len() == b.len() => Some(
                AlgebraicShape::Tuple(a.iter().zip(b).map(|(a, b)| a.unify_same(b)).collect()),
            ),
            (AlgebraicShape::Object(a), AlgebraicShape::Object(b)) if a.len() == b.len() => {
                unify_fields(a, b).map(AlgebraicShape::Object)
            }
            _ => None,
        }
    }
}

fn elements_same(a: &[Type], b: &[Type]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.is_same(b))
}

fn fields_same(a: &BTreeMap<String, Type>, b: &BTreeMap<String, Type>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(name, ty)| b.get(name).is_some_and(|other| ty.is_same(other)))
}

fn unify_fields(
    a: &BTreeMap<String, Type>,
    b: &BTreeMap<String, Type>,
) -> Option<BTreeMap<String, Type>> {
    a.iter()
        .map(|(name, ty)| b.get(name).map(|other| (name.clone(), ty.unify_same(other))))
        .collect()
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bad => write!(f, "bad"),
            Type::Empty => write!(f, "[]"),
            Type::Boolean => write!(f, "boolean"),
            Type::Integer => write!(f, "integer"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Date => write!(f, "date"),
            Type::Path => write!(f, "path"),
            Type::Json => write!(f, "json"),
            Type::List(inner) => write!(f, "[{inner}]"),
            Type::Optional(inner) => write!(f, "{inner}?"),
            Type::Dictionary(key, value) => write!(f, "({key} -> {value})"),
            Type::Tuple(elements) => write_tuple(f, elements),
            Type::Object(fields) => write_object(f, fields),
            Type::Algebraic { tag, shape } => {
                write!(f, "{tag} ")?;
                match shape {
                    AlgebraicShape::Tuple(elements) => write_tuple(f, elements),
                    AlgebraicShape::Object(fields) => write_object(f, fields),
                }
            }
        }
    }
}

fn write_tuple(f: &mut fmt::Formatter<'_>, elements: &[Type]) -> fmt::Result {
    write!(f, "{{")?;
    for (i, ty) in elements.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{ty}")?;
    }
    write!(f, "}}")
}

fn write_object(f: &mut fmt::Formatter<'_>, fields: &BTreeMap<String, Type>) -> fmt::Result {
    write!(f, "{{ ")?;
    for (i, (name, ty)) in fields.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{name} = {ty}")?;
    }
    write!(f, " }}")
}

// ---------------------------------------------------------------------------
// Serde: types travel as descriptors
// ---------------------------------------------------------------------------

impl serde::Serialize for Type {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.descriptor())
    }
}

impl<'de> serde::Deserialize<'de> for Type {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Type::from_descriptor(&text).map_err(serde::de::Error::custom)
    }
}

impl std::str::FromStr for Type {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Type::from_descriptor(s)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Type {
        Type::object([("name", Type::String), ("age", Type::Integer)])
    }

    #[test]
    fn bad_is_same_as_everything() {
        for ty in [
            Type::Empty,
            Type::Integer,
            person(),
            Type::list(Type::Date),
            Type::Bad,
        ] {
            assert!(Type::Bad.is_same(&ty));
            assert!(ty.is_same(&Type::Bad));
            assert_eq!(Type::Bad.unify(&ty), Type::Bad);
        }
    }

    #[test]
    fn empty_list_matches_any_list() {
        let ints = Type::list(Type::Integer);
        assert!(Type::Empty.is_same(&ints));
        assert!(ints.is_same(&Type::Empty));
        assert_eq!(Type::Empty.unify(&ints), ints);
        assert_eq!(ints.unify(&Type::Empty), ints);
        assert!(!Type::Empty.is_same(&Type::Integer));
    }

    #[test]
    fn base_types_only_match_themselves() {
        assert!(Type::Integer.is_same(&Type::Integer));
        assert!(!Type::Integer.is_same(&Type::Float));
        assert!(!Type::Path.is_same(&Type::String));
        assert_eq!(Type::Integer.unify(&Type::Float), Type::Bad);
    }

    #[test]
    fn object_field_order_does_not_matter() {
        let a = Type::object([("a", Type::Integer), ("b", Type::String)]);
        let b = Type::object([("b", Type::String), ("a", Type::Integer)]);
        assert!(a.is_same(&b));
        assert_eq!(a.unify(&b), a);
    }

    #[test]
    fn nested_object_field_order_does_not_matter() {
        let inner_a = Type::object([("x", Type::Float), ("y", Type::Float)]);
        let inner_b = Type::object([("y", Type::Float), ("x", Type::Float)]);
        let a = Type::object([
            ("point", inner_a.clone()),
            ("points", Type::list(inner_a)),
        ]);
        let b = Type::object([
            ("points", Type::list(inner_b.clone())),
            ("point", inner_b),
        ]);
        assert!(a.is_same(&b));
        assert_eq!(a.unify(&b), a);
    }

    #[test]
    fn object_field_type_change_is_detected() {
        let a = Type::object([("a", Type::Integer)]);
        let b = Type::object([("a", Type::String)]);
        let c = Type::object([("a", Type::Integer), ("b", Type::Integer)]);
        assert!(!a.is_same(&b));
        assert!(!a.is_same(&c));
        assert!(!c.is_same(&a));
    }

    #[test]
    fn algebraic_requires_matching_tag() {
        let a = Type::algebraic_object("POINT", [("x", Type::Integer)]);
        let b = Type::algebraic_object("POINT", [("x", Type::Integer)]);
        let c = Type::algebraic_object("SPOT", [("x", Type::Integer)]);
        let d = Type::algebraic_tuple("POINT", [Type::Integer]);
        assert!(a.is_same(&b));
        assert!(!a.is_same(&c));
        assert!(!a.is_same(&d));
    }

    #[test]
    fn unify_fills_in_empty_lists_inside_containers() {
        let known = Type::tuple([Type::list(Type::String), Type::Boolean]);
        let partial = Type::tuple([Type::Empty, Type::Boolean]);
        assert!(known.is_same(&partial));
        assert_eq!(partial.unify(&known), known);
    }

    #[test]
    fn orderable_types() {
        assert!(Type::Integer.is_orderable());
        assert!(Type::Float.is_orderable());
        assert!(Type::String.is_orderable());
        assert!(Type::Date.is_orderable());
        assert!(!Type::Boolean.is_orderable());
        assert!(!Type::Path.is_orderable());
        assert!(!Type::tuple([Type::Integer]).is_orderable());
    }

    #[test]
    fn names_are_readable() {
        assert_eq!(Type::list(Type::Integer).name(), "[integer]");
        assert_eq!(Type::optional(Type::String).name(), "string?");
        assert_eq!(
            Type::dictionary(Type::String, Type::Float).name(),
            "(string -> float)"
        );
        assert_eq!(Type::tuple([Type::Integer, Type::Date]).name(), "{integer, date}");
        assert_eq!(person().name(), "{ age = integer, name = string }");
        assert_eq!(
            Type::algebraic_tuple("PAIR", [Type::Integer, Type::Integer]).name(),
            "PAIR {integer, integer}"
        );
        assert_eq!(Type::Empty.name(), "[]");
    }

    #[test]
    fn descriptors_are_canonical() {
        assert_eq!(Type::Integer.descriptor(), "i");
        assert_eq!(Type::list(Type::String).descriptor(), "as");
        assert_eq!(
            Type::dictionary(Type::String, Type::optional(Type::Path)).descriptor(),
            "msqp"
        );
        assert_eq!(Type::tuple([Type::Integer, Type::Float]).descriptor(), "t2if");
        assert_eq!(person().descriptor(), "o2age$iname$s");
        assert_eq!(
            Type::algebraic_tuple("PAIR", [Type::Integer, Type::Boolean]).descriptor(),
            "u1PAIR$t2ib"
        );
    }

    #[test]
    fn descriptor_parses_nested_types() {
        let parsed = Type::from_descriptor("ao2id$iname$qs").expect("descriptor should parse");
        assert_eq!(
            parsed,
            Type::list(Type::object([
                ("id", Type::Integer),
                ("name", Type::optional(Type::String)),
            ]))
        );
    }

    #[test]
    fn descriptor_errors_report_position() {
        let err = Type::from_descriptor("t2i").expect_err("truncated tuple should fail");
        assert_eq!(err, DescriptorError::UnexpectedEnd);
        let err = Type::from_descriptor("ix").expect_err("trailing data should fail");
        assert_eq!(err, DescriptorError::TrailingInput { position: 1 });
        let err = Type::from_descriptor("z").expect_err("unknown code should fail");
        assert_eq!(
            err,
            DescriptorError::UnknownCode {
                code: 'z',
                position: 0
            }
        );
    }

    #[test]
    fn descriptor_nesting_is_bounded() {
        let deep = format!("{}i", "a".repeat(200_000));
        let err = Type::from_descriptor(&deep).expect_err("deep descriptor should fail");
        assert_eq!(
            err,
            DescriptorError::TooDeep {
                position: MAX_DESCRIPTOR_DEPTH
            }
        );

        let deepest = format!("{}i", "q".repeat(MAX_DESCRIPTOR_DEPTH - 1));
        assert!(Type::from_descriptor(&deepest).is_ok());
    }

    #[test]
    fn descriptor_counts_do_not_preallocate() {
        let err = Type::from_descriptor("t1152921504606846976i")
            .expect_err("missing elements should fail");
        assert_eq!(err, DescriptorError::UnexpectedEnd);
    }

    #[test]
    fn serde_uses_descriptors() {
        let json = serde_json::to_string(&person()).expect("serialize");
        assert_eq!(json, "\"o2age$iname$s\"");
        let back: Type = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, person());
    }
}
