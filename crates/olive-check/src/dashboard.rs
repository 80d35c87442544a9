//! Serializable summaries of checked olives.
//!
//! A summary says, clause by clause, which variables each clause defines,
//! carries through or only looks at, and which input variables each one
//! depends on. Tools render it to show how data moves through a pipeline.

use std::collections::BTreeSet;

use olive_ast::{
    Clause, ClauseKind, Discriminator, DiscriminatorKind, Expr, ExprKind, LetArgumentKind, Olive,
    TerminalKind,
};
use serde::Serialize;

use crate::capture;
use crate::clause::pattern_names;
use crate::scope::{Binding, Flavour, Scope};
use crate::table::Resolutions;

// ---------------------------------------------------------------------------
// Summary types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OliveSummary {
    pub line: u32,
    pub column: u32,
    pub format: String,
    pub kind: TerminalSummary,
    /// The definition name, for `Define` olives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub clauses: Vec<ClauseSummary>,
    /// Signable variables that decide which rows are distinct.
    pub signable: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalSummary {
    Run,
    Alert,
    Define,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClauseSummary {
    pub syntax: &'static str,
    pub line: u32,
    pub column: u32,
    pub variables: Vec<VariableInformation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableInformation {
    pub name: String,
    /// Type descriptor.
    #[serde(rename = "type")]
    pub ty: String,
    /// Stream variables of the clause's input the value depends on.
    pub inputs: Vec<String>,
    pub behaviour: Behaviour,
}

/// What a clause does with a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Behaviour {
    /// Computed by the clause.
    Definition,
    /// Copied unchanged into the clause's output.
    Passthrough,
    /// Read by the clause without affecting its output row.
    Observer,
}

// ---------------------------------------------------------------------------
// Building summaries
// ---------------------------------------------------------------------------

/// Summarize one olive. `scopes` holds the scope before each clause and
/// after the last one; without it, clauses are listed with no variables.
pub(crate) fn summarize(
    table: &Resolutions,
    olive: &Olive,
    scopes: Option<&[Scope]>,
    signable: BTreeSet<String>,
) -> OliveSummary {
    let (kind, name) = match &olive.node.terminal.node {
        TerminalKind::Run { .. } => (TerminalSummary::Run, None),
        TerminalKind::Alert { .. } => (TerminalSummary::Alert, None),
        TerminalKind::Define { name, .. } => (TerminalSummary::Define, Some(name.node.clone())),
    };
    let clauses = olive
        .node
        .clauses
        .iter()
        .enumerate()
        .map(|(index, clause)| {
            let variables = match scopes {
                Some(scopes) if index + 1 < scopes.len() => Summarizer {
                    table,
                    input: &scopes[index],
                    output: &scopes[index + 1],
                    variables: Vec::new(),
                }
                .clause(clause),
                _ => Vec::new(),
            };
            ClauseSummary {
                syntax: clause.node.syntax(),
                line: clause.span.line,
                column: clause.span.column,
                variables,
            }
        })
        .collect();
    OliveSummary {
        line: olive.span.line,
        column: olive.span.column,
        format: olive.node.format.node.clone(),
        kind,
        name,
        clauses,
        signable: signable.into_iter().collect(),
    }
}

struct Summarizer<'s> {
    table: &'s Resolutions,
    input: &'s Scope,
    output: &'s Scope,
    variables: Vec<VariableInformation>,
}

impl Summarizer<'_> {
    fn clause(mut self, clause: &Clause) -> Vec<VariableInformation> {
        match &clause.node {
            ClauseKind::Where(expr) | ClauseKind::Reject(expr) => self.observe([expr]),
            ClauseKind::Monitor { labels, .. } => self.observe(labels.iter().map(|l| &l.value)),
            ClauseKind::Pick {
                value,
                discriminators,
                ..
            } => {
                self.observe([value]);
                self.discriminators(discriminators, Behaviour::Observer);
            }
            ClauseKind::Flatten { pattern: _, value } | ClauseKind::Require { pattern: _, value } => {
                let inputs = self.inputs([value]);
                self.defined_since_input(&inputs);
            }
            ClauseKind::Group {
                discriminators,
                collectors,
                ..
            } => {
                self.discriminators(discriminators, Behaviour::Passthrough);
                for field in collectors {
                    let inputs = capture::free_variables_field(self.table, field, Flavour::is_stream);
                    self.output_variable(&field.name.node, inputs, Behaviour::Definition);
                }
            }
            ClauseKind::LeftJoin { collectors, .. } => {
                for field in collectors {
                    let inputs = capture::free_variables_field(self.table, field, Flavour::is_stream);
                    self.output_variable(&field.name.node, inputs, Behaviour::Definition);
                }
                self.passthrough_rest();
            }
            ClauseKind::Join { .. } => {
                self.defined_since_input(&BTreeSet::new());
                self.passthrough_rest();
            }
            ClauseKind::Let(arguments) => {
                for argument in arguments {
                    match &argument.node {
                        LetArgumentKind::Simple { pattern, value } => {
                            let inputs = self.inputs([value]);
                            let mut names = Vec::new();
                            pattern_names(pattern, &mut names);
                            for (name, _) in names {
                                let behaviour = match &value.node {
                                    ExprKind::Variable(source) if *source == name => {
                                        Behaviour::Passthrough
                                    }
                                    _ => Behaviour::Definition,
                                };
                                self.output_variable(&name, inputs.clone(), behaviour);
                            }
                        }
                        LetArgumentKind::Gang(_) => self.gang(argument.id, Behaviour::Passthrough),
                    }
                }
            }
            ClauseKind::Call(call) => {
                let inputs = self.inputs(&call.arguments);
                let names: Vec<String> = self.output.stream().map(|b| b.name.clone()).collect();
                for name in names {
                    self.output_variable(&name, inputs.clone(), Behaviour::Definition);
                }
            }
            ClauseKind::Matches(call) => self.observe(&call.arguments),
        }
        self.variables
    }

    fn inputs<'e>(&self, exprs: impl IntoIterator<Item = &'e Expr>) -> BTreeSet<String> {
        capture::free_variables_all(self.table, exprs, Flavour::is_stream)
    }

    fn push(&mut self, binding: &Binding, inputs: BTreeSet<String>, behaviour: Behaviour) {
        self.variables.push(VariableInformation {
            name: binding.name.clone(),
            ty: self.table.binding_type(binding).descriptor(),
            inputs: inputs.into_iter().collect(),
            behaviour,
        });
    }

    fn output_variable(&mut self, name: &str, inputs: BTreeSet<String>, behaviour: Behaviour) {
        if let Some(binding) = self.output.get_declared(name).cloned() {
            self.push(&binding, inputs, behaviour);
        }
    }

    fn observe<'e>(&mut self, exprs: impl IntoIterator<Item = &'e Expr>) {
        for name in self.inputs(exprs) {
            if let Some(binding) = self.input.get(&name) {
                self.push(&binding, BTreeSet::from([name]), Behaviour::Observer);
            }
        }
    }

    /// Stream variables of the output that the input did not have.
    fn defined_since_input(&mut self, inputs: &BTreeSet<String>) {
        let added: Vec<Binding> = self
            .output
            .stream()
            .filter(|b| self.input.get_declared(&b.name).is_none())
            .cloned()
            .collect();
        for binding in added {
            self.push(&binding, inputs.clone(), Behaviour::Definition);
        }
    }

    /// Output stream variables not yet listed, which came from the input.
    fn passthrough_rest(&mut self) {
        let listed: BTreeSet<String> = self.variables.iter().map(|v| v.name.clone()).collect();
        let rest: Vec<Binding> = self
            .output
            .stream()
            .filter(|b| !listed.contains(&b.name) && self.input.get_declared(&b.name).is_some())
            .cloned()
            .collect();
        for binding in rest {
            let inputs = BTreeSet::from([binding.name.clone()]);
            self.push(&binding, inputs, Behaviour::Passthrough);
        }
    }

    fn discriminators(&mut self, discriminators: &[Discriminator], behaviour: Behaviour) {
        for discriminator in discriminators {
            match &discriminator.node {
                DiscriminatorKind::Variable(name) => {
                    if let Some(binding) = self.input.get_declared(name).cloned() {
                        self.push(&binding, BTreeSet::from([name.clone()]), behaviour);
                    }
                }
                DiscriminatorKind::Rename { name, value } => {
                    let inputs = self.inputs([value]);
                    match behaviour {
                        Behaviour::Observer => self.observe([value]),
                        _ => self.output_variable(name, inputs, Behaviour::Definition),
                    }
                }
                DiscriminatorKind::Gang(_) => self.gang(discriminator.id, behaviour),
            }
        }
    }

    fn gang(&mut self, node: olive_ast::NodeId, behaviour: Behaviour) {
        let bindings = self.table.gang_bindings.get(&node).cloned().unwrap_or_default();
        for binding in bindings {
            let inputs = BTreeSet::from([binding.name.clone()]);
            self.push(&binding, inputs, behaviour);
        }
    }
}
