//! Error types for the define pipeline.
//!
//! Synchronous-phase errors (identifier validation, duplicate ids) and
//! asynchronous-phase errors (dependency loads, factory failures) both
//! surface through the single `Result` of `ModuleRuntime::define`.

use thiserror::Error;

use crate::registry::RegistryError;

use super::id::ModuleId;

/// Opaque error payload for factory failures (rethrown as-is).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The execution-context inspector could not produce a location.
#[derive(Debug, Clone, Error)]
#[error("cannot infer module identifier: {reason}")]
pub struct InferenceError {
    pub reason: String,
}

impl InferenceError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The external loader failed to load a module.
#[derive(Debug, Clone, Error)]
#[error("external load of '{id}' failed: {reason}")]
pub struct LoadError {
    pub id: ModuleId,
    pub reason: String,
}

impl LoadError {
    pub fn new(id: ModuleId, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

/// Completion result of one `define` call.
///
/// First-failure-wins: at most one of these is ever produced per call;
/// sibling dependency settlements after the first failure are discarded.
#[derive(Debug, Error)]
pub enum DefineError {
    /// Only forward-slash path separators are accepted.
    #[error("invalid module identifier '{id}': backslash path separators are not allowed")]
    InvalidIdentifier { id: String },

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The loader settled successfully but the module never appeared.
    #[error("dependency '{0}' did not appear in the registry after loading")]
    DependencyNotLoaded(ModuleId),

    #[error(transparent)]
    Load(#[from] LoadError),

    /// The factory itself failed; the source error is preserved untouched.
    #[error("factory for module '{id}' failed")]
    Factory {
        id: ModuleId,
        #[source]
        source: BoxError,
    },
}
