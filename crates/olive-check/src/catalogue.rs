//! The read-only snapshot of everything defined outside the program.
//!
//! A [`Catalogue`] is built once, usually from JSON, and borrowed by every
//! compilation that needs it. Types are written as descriptors.

use std::collections::BTreeMap;
use std::path::Path;

use olive_types::Type;
use serde::Deserialize;

use crate::scope::{Binding, Flavour};

#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    #[error("cannot read catalogue {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed catalogue: {0}")]
    Json(#[from] serde_json::Error),
    #[error("input format `{format}` declares variable `{name}` twice")]
    DuplicateVariable { format: String, name: String },
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FormatVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub signable: bool,
}

/// One member of a gang.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GangElement {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputFormat {
    pub name: String,
    pub variables: Vec<FormatVariable>,
    #[serde(default)]
    pub gangs: BTreeMap<String, Vec<GangElement>>,
}

impl InputFormat {
    /// The raw row shape of this format as stream bindings.
    pub fn stream(&self) -> impl Iterator<Item = Binding> + '_ {
        self.variables.iter().map(|variable| {
            let flavour = if variable.signable {
                Flavour::StreamSignable
            } else {
                Flavour::Stream
            };
            Binding::known(&variable.name, flavour, variable.ty.clone())
        })
    }

    pub fn gang(&self, name: &str) -> Option<&[GangElement]> {
        self.gangs.get(name).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub parameters: Vec<Type>,
    pub return_type: Type,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default = "required_by_default")]
    pub required: bool,
}

fn required_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ActionParameter>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConstantDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

/// A signature function every row carries, visible as a stream binding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SignatureDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default = "stream_flavour")]
    pub flavour: Flavour,
}

fn stream_flavour() -> Flavour {
    Flavour::Stream
}

/// An olive definition compiled elsewhere, usable by `Call` and `Matches`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OliveSignature {
    pub name: String,
    pub format: String,
    #[serde(default)]
    pub parameters: Vec<Type>,
    pub output: Vec<OutputVariable>,
    /// Whether the definition keeps one output row per input row.
    #[serde(default)]
    pub is_root: bool,
    /// Signable variables the definition reads.
    #[serde(default)]
    pub signable: Vec<String>,
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Catalogue {
    formats: Vec<InputFormat>,
    functions: Vec<FunctionDefinition>,
    actions: Vec<ActionDefinition>,
    constants: Vec<ConstantDefinition>,
    signatures: Vec<SignatureDefinition>,
    definitions: Vec<OliveSignature>,
}

impl Catalogue {
    pub fn from_json(text: &str) -> Result<Self, CatalogueError> {
        let catalogue: Catalogue = serde_json::from_str(text)?;
        catalogue.validate()?;
        Ok(catalogue)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogueError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogueError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<(), CatalogueError> {
        for format in &self.formats {
            let mut seen = std::collections::BTreeSet::new();
            for variable in &format.variables {
                if !seen.insert(variable.name.as_str()) {
                    return Err(CatalogueError::DuplicateVariable {
                        format: format.name.clone(),
                        name: variable.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn format(&self, name: &str) -> Option<&InputFormat> {
        self.formats.iter().find(|f| f.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&ActionDefinition> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn definition(&self, name: &str) -> Option<&OliveSignature> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// Constants and signatures, which every olive can see regardless of
    /// its input format.
    pub fn globals(&self) -> impl Iterator<Item = Binding> + '_ {
        let constants = self
            .constants
            .iter()
            .map(|c| Binding::known(&c.name, Flavour::Constant, c.ty.clone()));
        let signatures = self
            .signatures
            .iter()
            .map(|s| Binding::known(&s.name, Flavour::StreamSignature, s.ty.clone()));
        constants.chain(signatures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOGUE: &str = r#"{
        "formats": [{
            "name": "rows",
            "variables": [
                {"name": "id", "type": "i", "signable": true},
                {"name": "tag", "type": "s"}
            ],
            "gangs": {"key": [{"name": "id", "type": "i"}]}
        }],
        "functions": [{"name": "len", "parameters": ["s"], "return_type": "i"}],
        "actions": [{"name": "notify", "parameters": [{"name": "to", "type": "s"}]}],
        "constants": [{"name": "limit", "type": "i"}],
        "signatures": [{"name": "sig", "type": "s"}],
        "definitions": [{
            "name": "shared",
            "format": "rows",
            "parameters": ["i"],
            "output": [{"name": "id", "type": "i"}],
            "is_root": true,
            "signable": ["id"]
        }]
    }"#;

    #[test]
    fn loads_every_section() {
        let catalogue = Catalogue::from_json(CATALOGUE).expect("catalogue should load");
        let rows = catalogue.format("rows").expect("rows format");
        let flavours: Vec<_> = rows.stream().map(|b| (b.name, b.flavour)).collect();
        assert_eq!(
            flavours,
            [
                ("id".to_string(), Flavour::StreamSignable),
                ("tag".to_string(), Flavour::Stream)
            ]
        );
        assert_eq!(rows.gang("key").map(<[GangElement]>::len), Some(1));
        assert_eq!(
            catalogue.function("len").map(|f| &f.return_type),
            Some(&Type::Integer)
        );
        assert!(catalogue.action("notify").is_some_and(|a| a.parameters[0].required));
        assert_eq!(catalogue.globals().count(), 2);
        let shared = catalogue.definition("shared").expect("definition");
        assert_eq!(shared.output[0].flavour, Flavour::Stream);
        assert!(shared.is_root);
        assert_eq!(shared.signable, ["id"]);
    }

    #[test]
    fn rejects_duplicate_variables() {
        let text = r#"{"formats": [{"name": "f", "variables": [
            {"name": "a", "type": "i"}, {"name": "a", "type": "s"}
        ]}]}"#;
        assert!(matches!(
            Catalogue::from_json(text),
            Err(CatalogueError::DuplicateVariable { .. })
        ));
    }

    #[test]
    fn rejects_bad_descriptors() {
        let text = r#"{"constants": [{"name": "c", "type": "?"}]}"#;
        assert!(matches!(Catalogue::from_json(text), Err(CatalogueError::Json(_))));
    }
}
