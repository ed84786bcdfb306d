use serde::{Deserialize, Serialize};
use std::fmt;

/// Module identifier: a string key naming one exported value in the registry.
///
/// Construction is infallible; the `define` boundary validates (identifier
/// inference has to run before validation, so the constructor cannot reject).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
