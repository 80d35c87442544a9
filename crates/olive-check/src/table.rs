//! Data resolved for tree nodes, keyed by [`NodeId`].
//!
//! The tree is never modified. Each phase writes what it learns about a node
//! here, and later phases (and any code generator) read it back.

use std::collections::{BTreeSet, HashMap, HashSet};

use olive_ast::{NodeId, Span};
use olive_types::Type;

use crate::catalogue::{ActionDefinition, FunctionDefinition, GangElement, InputFormat};
use crate::scope::{Binding, BindingType};

/// A `Call` or `Matches` target after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDefinition {
    pub name: String,
    pub format: String,
    pub parameters: Vec<Type>,
    /// The row shape the definition produces.
    pub output: Vec<Binding>,
    pub is_root: bool,
}

#[derive(Debug, Default)]
pub struct Resolutions {
    pub(crate) variables: HashMap<NodeId, Binding>,
    pub(crate) types: HashMap<NodeId, Type>,
    /// Every wildcard pattern bound, with the index of its olive.
    pub(crate) wildcards: Vec<(usize, NodeId, Span)>,
    pub(crate) demands: HashMap<NodeId, BTreeSet<String>>,
    pub(crate) captures: HashMap<NodeId, BTreeSet<String>>,
    pub(crate) functions: HashMap<NodeId, FunctionDefinition>,
    pub(crate) actions: HashMap<NodeId, ActionDefinition>,
    pub(crate) formats: HashMap<NodeId, InputFormat>,
    pub(crate) gangs: HashMap<NodeId, Vec<GangElement>>,
    /// The stream bindings each gang reference picked up, in gang order.
    pub(crate) gang_bindings: HashMap<NodeId, Vec<Binding>>,
    /// The stream bindings a `Let` gang declares, one per gang member.
    pub(crate) let_gangs: HashMap<NodeId, Vec<Binding>>,
    pub(crate) definitions: HashMap<NodeId, ResolvedDefinition>,
    pub(crate) reads: HashSet<NodeId>,
}

impl Resolutions {
    /// The binding a variable reference resolved to.
    pub fn binding(&self, reference: NodeId) -> Option<&Binding> {
        self.variables.get(&reference)
    }

    /// The checked type of an expression, collector or pattern.
    pub fn type_of(&self, node: NodeId) -> Option<&Type> {
        self.types.get(&node)
    }

    /// Names a `For` expression or collector must carry into its closure.
    pub fn captures(&self, node: NodeId) -> Option<&BTreeSet<String>> {
        self.captures.get(&node)
    }

    /// The fields read through a wildcard pattern.
    pub fn wildcard_fields(&self, pattern: NodeId) -> impl Iterator<Item = &str> {
        self.demands
            .get(&pattern)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    pub fn function(&self, call: NodeId) -> Option<&FunctionDefinition> {
        self.functions.get(&call)
    }

    pub fn action(&self, terminal: NodeId) -> Option<&ActionDefinition> {
        self.actions.get(&terminal)
    }

    pub fn definition(&self, clause: NodeId) -> Option<&ResolvedDefinition> {
        self.definitions.get(&clause)
    }

    pub fn is_read(&self, origin: NodeId) -> bool {
        self.reads.contains(&origin)
    }

    /// The type of a binding, once the node it depends on has been checked.
    /// Anything not yet checked reads as [`Type::Bad`].
    pub fn binding_type(&self, binding: &Binding) -> Type {
        match &binding.ty {
            BindingType::Known(ty) => ty.clone(),
            BindingType::Node(node) => self.types.get(node).cloned().unwrap_or(Type::Bad),
            BindingType::Wildcard(pattern) => self
                .types
                .get(pattern)
                .and_then(|ty| ty.field(&binding.name))
                .cloned()
                .unwrap_or(Type::Bad),
        }
    }

    pub(crate) fn record_type(&mut self, node: NodeId, ty: Type) -> Type {
        self.types.insert(node, ty.clone());
        ty
    }

    pub(crate) fn record_variable(&mut self, reference: NodeId, binding: Binding) {
        if let Some(origin) = binding.origin {
            self.reads.insert(origin);
        }
        if let BindingType::Wildcard(pattern) = binding.ty {
            self.demands
                .entry(pattern)
                .or_default()
                .insert(binding.name.clone());
        }
        self.variables.insert(reference, binding);
    }

    pub(crate) fn mark_read(&mut self, origin: NodeId) {
        self.reads.insert(origin);
    }
}
