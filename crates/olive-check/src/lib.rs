//! Semantic analysis for olive programs.
//!
//! This crate implements:
//! - Scopes of flavoured bindings threaded through each pipeline
//! - Destructuring of tuple, object and wildcard patterns
//! - Capture analysis for closures and row signatures
//! - Collectors, list transforms and item-order propagation
//! - The clause pipeline and its stream-order state machine
//!
//! [`compile`] runs the whole protocol over a [`Program`](olive_ast::Program).
//! Nothing in the tree is mutated: everything a phase learns is written to
//! the [`Resolutions`] side table, keyed by node id.

pub mod capture;
pub mod catalogue;
pub mod clause;
pub mod collect;
pub mod config;
pub mod dashboard;
pub mod olive;
pub mod scope;
pub mod table;

mod context;
mod destructure;
mod expr;

// Re-export for convenience.
pub use catalogue::{Catalogue, CatalogueError};
pub use config::{CheckConfig, UnusedPolicy};
pub use olive::{Compilation, compile, try_compile};
pub use olive_diag::{Category, Diagnostic, DiagnosticError, DiagnosticSink};
pub use olive_types::Type;
pub use table::Resolutions;

#[cfg(test)]
mod fixtures;


#[cfg(test)]
mod collect_tests;


#[cfg(test)]
mod olive_tests;
