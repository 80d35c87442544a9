//! Bindings and the persistent scope threaded through an olive.
//!
//! A [`Scope`] is an immutable snapshot. Every operation returns a new
//! snapshot and leaves the receiver untouched, so a clause can hand its
//! input scope to several children without any of them observing the
//! others' additions.

use std::collections::BTreeMap;
use std::sync::Arc;

use olive_ast::{NodeId, Span};
use olive_types::Type;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Flavour
// ---------------------------------------------------------------------------

/// Where a bound name comes from, which decides whether a generated
/// closure must capture it or can read it from the live row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavour {
    /// A program-wide constant.
    Constant,
    /// A parameter of an olive definition.
    Parameter,
    /// A name bound inside an expression (lambda, `For`, `Let` block).
    Lambda,
    /// A row variable that does not take part in signatures.
    Stream,
    /// A row variable whose content feeds the row's signature.
    StreamSignable,
    /// A binding that is itself a signature of the row.
    StreamSignature,
}

impl Flavour {
    pub fn is_stream(self) -> bool {
        matches!(
            self,
            Flavour::Stream | Flavour::StreamSignable | Flavour::StreamSignature
        )
    }

    pub fn needs_capture(self) -> bool {
        !self.is_stream()
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// How to find a binding's type once type checking has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingType {
    /// Known before checking starts (catalogue entries, parameters).
    Known(Type),
    /// Whatever type the checker records for this node.
    Node(NodeId),
    /// The same-named field of the value a wildcard pattern was checked
    /// against.
    Wildcard(NodeId),
}

/// A named, typed slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: String,
    pub flavour: Flavour,
    pub ty: BindingType,
    /// The node that declared this binding, if it was declared in the
    /// program rather than supplied from outside.
    pub origin: Option<NodeId>,
    pub span: Span,
}

impl Binding {
    pub fn known(name: impl Into<String>, flavour: Flavour, ty: Type) -> Self {
        Self {
            name: name.into(),
            flavour,
            ty: BindingType::Known(ty),
            origin: None,
            span: Span::synthetic(),
        }
    }

    pub fn declared(
        name: impl Into<String>,
        flavour: Flavour,
        ty: BindingType,
        origin: NodeId,
        span: Span,
    ) -> Self {
        Self {
            name: name.into(),
            flavour,
            ty,
            origin: Some(origin),
            span,
        }
    }

    /// The same binding under a different flavour.
    pub fn with_flavour(&self, flavour: Flavour) -> Self {
        Self {
            flavour,
            ..self.clone()
        }
    }

    /// The same binding under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// A `*` pattern in scope. It claims any name nothing else defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardSource {
    pub pattern: NodeId,
    pub flavour: Flavour,
    pub span: Span,
}

impl WildcardSource {
    fn claim(&self, name: &str) -> Binding {
        Binding {
            name: name.to_string(),
            flavour: self.flavour,
            ty: BindingType::Wildcard(self.pattern),
            origin: Some(self.pattern),
            span: self.span,
        }
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// The names visible at one point of the tree, plus whether everything that
/// produced this scope resolved cleanly.
#[derive(Debug, Clone)]
pub struct Scope {
    bindings: Arc<BTreeMap<String, Binding>>,
    wildcards: Arc<Vec<WildcardSource>>,
    good: bool,
}

impl Scope {
    /// Seed a pipeline with its raw row shape and everything else visible
    /// to it (constants, parameters, signatures).
    pub fn root(
        stream: impl IntoIterator<Item = Binding>,
        others: impl IntoIterator<Item = Binding>,
    ) -> Self {
        let mut bindings = BTreeMap::new();
        for binding in others.into_iter().chain(stream) {
            bindings.insert(binding.name.clone(), binding);
        }
        Self {
            bindings: Arc::new(bindings),
            wildcards: Arc::new(Vec::new()),
            good: true,
        }
    }

    pub fn empty() -> Self {
        Self::root(std::iter::empty(), std::iter::empty())
    }

    pub fn is_good(&self) -> bool {
        self.good
    }

    /// Add a binding, shadowing any existing one with the same name.
    pub fn bind(&self, binding: Binding) -> Self {
        let mut bindings = (*self.bindings).clone();
        bindings.insert(binding.name.clone(), binding);
        Self {
            bindings: Arc::new(bindings),
            wildcards: Arc::clone(&self.wildcards),
            good: self.good,
        }
    }

    pub fn bind_all(&self, new: impl IntoIterator<Item = Binding>) -> Self {
        let mut bindings = (*self.bindings).clone();
        for binding in new {
            bindings.insert(binding.name.clone(), binding);
        }
        Self {
            bindings: Arc::new(bindings),
            wildcards: Arc::clone(&self.wildcards),
            good: self.good,
        }
    }

    /// Let a wildcard claim names that are otherwise undefined. The most
    /// recently added wildcard wins.
    pub fn bind_wildcard(&self, source: WildcardSource) -> Self {
        let mut wildcards = (*self.wildcards).clone();
        wildcards.push(source);
        Self {
            bindings: Arc::clone(&self.bindings),
            wildcards: Arc::new(wildcards),
            good: self.good,
        }
    }

    /// Narrow the success flag. A failed scope never becomes good again.
    pub fn fail(&self, ok: bool) -> Self {
        Self {
            bindings: Arc::clone(&self.bindings),
            wildcards: Arc::clone(&self.wildcards),
            good: self.good && ok,
        }
    }

    /// Swap the whole row shape: drop every stream binding (and stream
    /// wildcard) and add `stream` in its place. Other bindings are kept.
    pub fn replace_stream(&self, stream: impl IntoIterator<Item = Binding>, ok: bool) -> Self {
        self.replace_stream_with(stream, std::iter::empty(), ok)
    }

    pub fn replace_stream_with(
        &self,
        stream: impl IntoIterator<Item = Binding>,
        wildcards: impl IntoIterator<Item = WildcardSource>,
        ok: bool,
    ) -> Self {
        let mut bindings: BTreeMap<String, Binding> = self
            .bindings
            .iter()
            .filter(|(_, binding)| !binding.flavour.is_stream())
            .map(|(name, binding)| (name.clone(), binding.clone()))
            .collect();
        for binding in stream {
            bindings.insert(binding.name.clone(), binding);
        }
        let kept = self
            .wildcards
            .iter()
            .filter(|w| !w.flavour.is_stream())
            .cloned()
            .chain(wildcards)
            .collect();
        Self {
            bindings: Arc::new(bindings),
            wildcards: Arc::new(kept),
            good: self.good && ok,
        }
    }

    /// Look a name up. Explicit bindings win over wildcards.
    pub fn get(&self, name: &str) -> Option<Binding> {
        self.bindings
            .get(name)
            .cloned()
            .or_else(|| self.wildcards.last().map(|w| w.claim(name)))
    }

    /// Only explicit bindings, ignoring wildcards.
    pub fn get_declared(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// The current row shape.
    pub fn stream(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values().filter(|b| b.flavour.is_stream())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }
}
