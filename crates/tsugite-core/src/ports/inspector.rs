//! ContextInspector port - 実行コンテキストの検査
//!
//! define が id を省略したとき、定義中ユニットの「現在地」からモジュール id
//! を推論します。相対依存の基準となる base location もここから得ます。
//!
//! # テスト容易性
//! - trait によりホストの ambient context を差し替え可能
//! - テストでは FixedContext を使用

use std::sync::{Mutex, PoisonError};

use crate::domain::{InferenceError, ModuleId};

/// What the execution-context inspector reports for the currently
/// executing unit of code.
#[derive(Debug, Clone)]
pub struct InferredLocation {
    /// Explicit alias the host assigned to the unit, if any.
    /// Takes precedence over the canonical location when inferring an id.
    pub alias: Option<ModuleId>,

    /// Canonical location string of the unit. Always the base for
    /// relative-dependency resolution, even when an explicit id was given.
    pub canonical_location: String,
}

impl InferredLocation {
    pub fn new(canonical_location: impl Into<String>) -> Self {
        Self {
            alias: None,
            canonical_location: canonical_location.into(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(ModuleId::new(alias));
        self
    }
}

/// Execution-context inspector. Called exactly once per define.
pub trait ContextInspector: Send + Sync {
    fn infer_current_location(&self) -> Result<InferredLocation, InferenceError>;
}

/// Host policy with no ambient context: every inference fails, so callers
/// must pass explicit ids and absolute dependencies.
pub struct ExplicitOnly;

impl ContextInspector for ExplicitOnly {
    fn infer_current_location(&self) -> Result<InferredLocation, InferenceError> {
        Err(InferenceError::new(
            "no execution context available; pass an explicit id",
        ))
    }
}

/// Inspector returning a configured location; settable between defines.
/// Test and demo host.
pub struct FixedContext {
    location: Mutex<InferredLocation>,
}

impl FixedContext {
    pub fn new(canonical_location: impl Into<String>) -> Self {
        Self {
            location: Mutex::new(InferredLocation::new(canonical_location)),
        }
    }

    pub fn set_location(&self, location: InferredLocation) {
        *self
            .location
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = location;
    }
}

impl ContextInspector for FixedContext {
    fn infer_current_location(&self) -> Result<InferredLocation, InferenceError> {
        Ok(self
            .location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
