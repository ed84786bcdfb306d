//! Registry - モジュール ID → export 値の対応表
//!
//! プロセス全体の共有状態。挿入は define 経由のみ（`put` は crate 内限定）、
//! 一度書かれた id は上書き・削除されない。
//!
//! # 設計原則
//! - 各 id は最大一度しか書かれない（single-writer-per-id）
//! - 読み取り専用の introspection 面（has / get / ids / snapshot）を公開
//! - テスト用に独立インスタンスを構築可能、トップレベル用に `global()` を用意

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::ModuleId;

/// One committed module: immutable after creation, never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleRecord {
    pub id: ModuleId,
    pub export: serde_json::Value,

    /// Timestamp for observability.
    pub defined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("module '{0}' is already defined")]
    AlreadyDefined(ModuleId),

    #[error("module '{0}' is not defined")]
    NotFound(ModuleId),
}

/// Serializable read-only view of the registry contents, sorted by id.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub modules: Vec<ModuleRecord>,
}

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// Cheap-clone handle to a module registry.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    state: Arc<RwLock<HashMap<ModuleId, ModuleRecord>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default instance.
    pub fn global() -> Registry {
        GLOBAL.clone()
    }

    // Lock poisoning is recovered by extracting the inner value: records are
    // write-once, so a panicked writer cannot leave a half-updated record.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ModuleId, ModuleRecord>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ModuleId, ModuleRecord>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has(&self, id: &ModuleId) -> bool {
        self.read().contains_key(id)
    }

    /// The committed export for `id`.
    pub fn get(&self, id: &ModuleId) -> Result<serde_json::Value, RegistryError> {
        self.read()
            .get(id)
            .map(|record| record.export.clone())
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Atomic check-and-insert. Crate-internal: external mutation happens
    /// only through `define`.
    pub(crate) fn put(
        &self,
        id: ModuleId,
        export: serde_json::Value,
    ) -> Result<(), RegistryError> {
        let mut state = self.write();
        if state.contains_key(&id) {
            return Err(RegistryError::AlreadyDefined(id));
        }
        debug!(id = %id, "module committed");
        state.insert(
            id.clone(),
            ModuleRecord {
                id,
                export,
                defined_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// All defined ids, sorted.
    pub fn ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut modules: Vec<ModuleRecord> = self.read().values().cloned().collect();
        modules.sort_by(|a, b| a.id.cmp(&b.id));
        RegistrySnapshot { modules }
    }
}
