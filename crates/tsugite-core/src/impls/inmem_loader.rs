//! InMemoryLoader - 開発用の外部ローダ
//!
//! モジュール id → DefineRequest の対応表を持ち、`load` が対象の define を
//! ランタイムに対して実行します（実物の「取得して実行する」副作用の代役）。
//!
//! # 実装詳細
//! - id ごとに固定遅延を指定可能、指定が無ければ jitter 範囲からサンプル
//! - load 前にレジストリを再確認（同一 id の並行ロードの重複排除）
//! - define の競り負け（AlreadyDefined だが対象は存在する）は成功扱い

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::domain::{DefineError, DefineRequest, LoadError, ModuleId};
use crate::ports::ExternalLoader;
use crate::registry::RegistryError;
use crate::runtime::ModuleRuntime;

#[derive(Clone)]
enum StoredOutcome {
    Define(DefineRequest),
    Fail(String),
}

#[derive(Clone)]
struct Stored {
    outcome: StoredOutcome,
    latency: Option<Duration>,
}

struct LoaderState {
    sources: HashMap<ModuleId, Stored>,
    requested: Vec<ModuleId>,
}

/// In-memory external loader.
pub struct InMemoryLoader {
    state: Mutex<LoaderState>,

    /// Latency range sampled for ids without an explicit latency. Makes
    /// completion order genuinely nondeterministic in demos.
    jitter: Option<(Duration, Duration)>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoaderState {
                sources: HashMap::new(),
                requested: Vec::new(),
            }),
            jitter: None,
        }
    }

    pub fn with_jitter(min: Duration, max: Duration) -> Self {
        Self {
            jitter: Some((min, max)),
            ..Self::new()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a module source: loading `id` runs `request` against the
    /// runtime.
    pub fn insert(&self, id: ModuleId, request: DefineRequest) {
        self.lock().sources.insert(
            id,
            Stored {
                outcome: StoredOutcome::Define(request),
                latency: None,
            },
        );
    }

    /// Register a module source with a fixed simulated latency.
    pub fn insert_with_latency(&self, id: ModuleId, request: DefineRequest, latency: Duration) {
        self.lock().sources.insert(
            id,
            Stored {
                outcome: StoredOutcome::Define(request),
                latency: Some(latency),
            },
        );
    }

    /// Register an id whose load always fails after `latency`.
    pub fn insert_failure(&self, id: ModuleId, reason: impl Into<String>, latency: Duration) {
        self.lock().sources.insert(
            id,
            Stored {
                outcome: StoredOutcome::Fail(reason.into()),
                latency: Some(latency),
            },
        );
    }

    /// Every id that reached this loader, in request order.
    pub fn requested_ids(&self) -> Vec<ModuleId> {
        self.lock().requested.clone()
    }

    fn delay_for(&self, stored: &Stored) -> Duration {
        if let Some(latency) = stored.latency {
            return latency;
        }
        match self.jitter {
            Some((min, max)) => rand::thread_rng().gen_range(min..=max),
            None => Duration::ZERO,
        }
    }
}

impl Default for InMemoryLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExternalLoader for InMemoryLoader {
    async fn load(&self, id: &ModuleId, runtime: &ModuleRuntime) -> Result<(), LoadError> {
        let stored = {
            let mut state = self.lock();
            state.requested.push(id.clone());
            state.sources.get(id).cloned()
        };

        let Some(stored) = stored else {
            return Err(LoadError::new(id.clone(), "no source registered"));
        };

        let delay = self.delay_for(&stored);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        // A concurrent load of the same id may already have won.
        if runtime.registry().has(id) {
            debug!(id = %id, "already defined, skipping load");
            return Ok(());
        }

        match stored.outcome {
            StoredOutcome::Fail(reason) => Err(LoadError::new(id.clone(), reason)),
            StoredOutcome::Define(request) => match runtime.define(request).await {
                Ok(_) => Ok(()),
                // Lost a define race, but the module is there: settled.
                Err(DefineError::Registry(RegistryError::AlreadyDefined(_)))
                    if runtime.registry().has(id) =>
                {
                    Ok(())
                }
                Err(error) => Err(LoadError::new(id.clone(), error.to_string())),
            },
        }
    }
}
