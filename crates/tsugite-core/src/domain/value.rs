//! Dependency values handed to factories.
//!
//! Three identifiers are reserved and never go through relative resolution
//! or the external loader; each declared slot synthesizes its own value.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::registry::{Registry, RegistryError};
use crate::resolve::resolve_relative;

use super::id::ModuleId;

/// Reserved slot: fresh mutable export object.
pub const EXPORTS: &str = "exports";
/// Reserved slot: context-bound registry accessor.
pub const REQUIRE: &str = "require";
/// Reserved slot: descriptor of the defining module.
pub const MODULE: &str = "module";

/// Descriptor exposed through the reserved `module` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDescriptor {
    pub id: ModuleId,
}

/// Registry accessor bound to the defining module's location.
///
/// `get` relativizes against that location, then performs a plain registry
/// lookup. There is no blocking-until-available: a module not yet committed
/// is simply `NotFound`.
#[derive(Clone)]
pub struct Require {
    registry: Registry,
    base: Option<String>,
}

impl Require {
    pub(crate) fn new(registry: Registry, base: Option<String>) -> Self {
        Self { registry, base }
    }

    pub fn get(&self, id: &str) -> Result<Value, RegistryError> {
        let absolute = match &self.base {
            Some(base) => resolve_relative(base, id),
            None => id.to_string(),
        };
        self.registry.get(&ModuleId::new(absolute))
    }
}

impl fmt::Debug for Require {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Require").field("base", &self.base).finish()
    }
}

/// One resolved dependency slot, in declared order.
#[derive(Debug, Clone)]
pub enum DependencyValue {
    /// A regular module's committed export.
    Resolved(Value),

    /// The reserved `exports` slot: an empty object the factory may fill
    /// and return.
    Exports(Value),

    /// The reserved `module` slot.
    Module(ModuleDescriptor),

    /// The reserved `require` slot.
    Require(Require),
}

impl DependencyValue {
    /// The export of a regular dependency, if this slot is one.
    pub fn resolved(&self) -> Option<&Value> {
        match self {
            DependencyValue::Resolved(v) => Some(v),
            _ => None,
        }
    }

    pub fn exports(&self) -> Option<&Value> {
        match self {
            DependencyValue::Exports(v) => Some(v),
            _ => None,
        }
    }

    pub fn module(&self) -> Option<&ModuleDescriptor> {
        match self {
            DependencyValue::Module(d) => Some(d),
            _ => None,
        }
    }

    pub fn require(&self) -> Option<&Require> {
        match self {
            DependencyValue::Require(r) => Some(r),
            _ => None,
        }
    }
}
