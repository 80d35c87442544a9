//! Checker policy that is not part of the language itself.

use olive_diag::Severity;
use serde::Deserialize;

/// What to do with declarations that are never read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnusedPolicy {
    #[default]
    Error,
    Warning,
    Ignore,
}

impl UnusedPolicy {
    pub fn severity(self) -> Option<Severity> {
        match self {
            UnusedPolicy::Error => Some(Severity::Error),
            UnusedPolicy::Warning => Some(Severity::Warning),
            UnusedPolicy::Ignore => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckConfig {
    pub unused: UnusedPolicy,
}

impl CheckConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
