//! ModuleRuntime - define の解決本体（fan-out/fan-in ローダ）
//!
//! # 制御フロー
//! 1. 実行コンテキストを一度だけ検査し、id を決定（明示 > alias > location）
//! 2. id を検証（バックスラッシュ拒否 → 重複拒否）
//! 3. リテラル値ならそのままコミット
//! 4. 依存を宣言順に fan-out：予約 id は合成、レジストリヒットは即解決、
//!    ミスは外部ローダへ委譲（依存ごとに 1 タスク）
//! 5. fan-in は宣言順のスロットに書き戻す。最初の失敗が勝ち、以降の
//!    兄弟 settlement は破棄される
//! 6. 全スロットが揃ったら factory を同期的に呼び、結果をコミット

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::builder::RuntimeBuilder;
use crate::domain::{
    DefineError, DefineRequest, DependencyValue, EXPORTS, InferenceError, LoadError, MODULE,
    ModuleDescriptor, ModuleId, ModuleSource, REQUIRE, Require,
};
use crate::ports::{ContextInspector, ExternalLoader};
use crate::registry::{Registry, RegistryError};
use crate::resolve::{is_relative, resolve_relative};

/// AMD-style capability flag (the `define.amd = {}` equivalent).
/// Serializes to an empty object so third-party probes see `{}`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AmdMarker {}

pub const AMD: AmdMarker = AmdMarker {};

/// Cheap-clone handle over the registry and the host capabilities.
#[derive(Clone)]
pub struct ModuleRuntime {
    registry: Registry,
    inspector: Arc<dyn ContextInspector>,
    loader: Arc<dyn ExternalLoader>,
}

impl ModuleRuntime {
    pub(crate) fn new(
        registry: Registry,
        inspector: Arc<dyn ContextInspector>,
        loader: Arc<dyn ExternalLoader>,
    ) -> Self {
        Self {
            registry,
            inspector,
            loader,
        }
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Read-only view of the backing registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// AMD compatibility marker.
    pub fn amd(&self) -> AmdMarker {
        AMD
    }

    /// Define a module: infer/validate its id, resolve its dependencies,
    /// run its factory, commit the export.
    ///
    /// The call does not block the caller's thread while dependencies load;
    /// both synchronous-phase errors (id validation) and asynchronous-phase
    /// errors (dependency loads, factory failures) surface through the
    /// returned future. No retries; a failed attempt is final.
    pub async fn define(&self, request: DefineRequest) -> Result<ModuleId, DefineError> {
        let DefineRequest {
            id: explicit,
            dependencies,
            source,
        } = request;

        // Inference runs unconditionally, once per define. Its failure only
        // fails the call when the result is actually needed: for the id, or
        // as the base of a relative dependency.
        let inferred = self.inspector.infer_current_location();

        let id = match explicit {
            Some(id) => id,
            None => match &inferred {
                Ok(location) => location
                    .alias
                    .clone()
                    .unwrap_or_else(|| ModuleId::new(location.canonical_location.as_str())),
                Err(error) => return Err(error.clone().into()),
            },
        };

        if id.as_str().contains('\\') {
            return Err(DefineError::InvalidIdentifier {
                id: id.as_str().to_string(),
            });
        }
        if self.registry.has(&id) {
            return Err(RegistryError::AlreadyDefined(id).into());
        }

        let factory = match source {
            ModuleSource::Value(value) => {
                debug!(id = %id, "defining module from literal value");
                self.registry.put(id.clone(), value)?;
                return Ok(id);
            }
            ModuleSource::Factory(factory) => factory,
        };

        // Base for relative dependencies: always the inferred physical
        // location, never the explicit id.
        let base = inferred.ok().map(|location| location.canonical_location);

        if dependencies.is_empty() {
            let export = factory
                .build(Vec::new())
                .map_err(|source| DefineError::Factory {
                    id: id.clone(),
                    source,
                })?;
            self.registry.put(id.clone(), export)?;
            debug!(id = %id, "module defined (no dependencies)");
            return Ok(id);
        }

        // Fan-out. Slots keep declaration order; loads settle through the
        // channel in whatever order they complete.
        let mut slots: Vec<Option<DependencyValue>> = vec![None; dependencies.len()];
        let mut remaining = dependencies.len();
        let (tx, mut rx) =
            mpsc::channel::<(usize, Result<Value, DefineError>)>(dependencies.len());

        for (slot, declared) in dependencies.iter().enumerate() {
            let settled = match declared.as_str() {
                EXPORTS => Some(DependencyValue::Exports(Value::Object(Default::default()))),
                REQUIRE => Some(DependencyValue::Require(Require::new(
                    self.registry.clone(),
                    base.clone(),
                ))),
                MODULE => Some(DependencyValue::Module(ModuleDescriptor { id: id.clone() })),
                other => {
                    let dep_id = if is_relative(other) {
                        let Some(base) = base.as_deref() else {
                            return Err(InferenceError::new(format!(
                                "relative dependency '{other}' needs an inferable base location"
                            ))
                            .into());
                        };
                        ModuleId::new(resolve_relative(base, other))
                    } else {
                        ModuleId::new(other)
                    };

                    match self.registry.get(&dep_id) {
                        Ok(export) => Some(DependencyValue::Resolved(export)),
                        Err(_) => {
                            trace!(id = %id, dep = %dep_id, slot, "registry miss, delegating to loader");
                            let tx = tx.clone();
                            let runtime = self.clone();
                            tokio::spawn(async move {
                                let settled = runtime.load_dependency(dep_id).await;
                                // A closed channel means this define already
                                // failed; the settlement is discarded.
                                let _ = tx.send((slot, settled)).await;
                            });
                            None
                        }
                    }
                }
            };
            if let Some(value) = settled {
                slots[slot] = Some(value);
                remaining -= 1;
            }
        }
        drop(tx);

        // Fan-in. First failure wins: returning drops the receiver, which
        // closes the channel and discards every later sibling settlement.
        while remaining > 0 {
            match rx.recv().await {
                Some((slot, Ok(export))) => {
                    slots[slot] = Some(DependencyValue::Resolved(export));
                    remaining -= 1;
                }
                Some((_, Err(error))) => return Err(error),
                None => {
                    // A load task went away without settling (broken loader
                    // contract). Fail instead of hanging the define forever.
                    let unsettled = slots
                        .iter()
                        .position(|slot| slot.is_none())
                        .map(|slot| dependencies[slot].clone())
                        .unwrap_or_default();
                    return Err(LoadError::new(
                        ModuleId::new(unsettled),
                        "loader task ended without settling",
                    )
                    .into());
                }
            }
        }

        let resolved: Vec<DependencyValue> = slots
            .into_iter()
            .map(|slot| slot.expect("remaining hit zero with every slot settled"))
            .collect();

        let export = factory
            .build(resolved)
            .map_err(|source| DefineError::Factory {
                id: id.clone(),
                source,
            })?;
        self.registry.put(id.clone(), export)?;
        debug!(id = %id, deps = dependencies.len(), "module defined");
        Ok(id)
    }

    /// Delegate one missing dependency to the external loader, then read
    /// the export it was supposed to produce.
    async fn load_dependency(&self, id: ModuleId) -> Result<Value, DefineError> {
        self.loader.load(&id, self).await?;
        self.registry
            .get(&id)
            .map_err(|_| DefineError::DependencyNotLoaded(id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::domain::BoxError;
    use crate::impls::InMemoryLoader;
    use crate::ports::{ExplicitOnly, ExternalLoader, FixedContext, InferredLocation};

    fn runtime_with(loader: Arc<dyn ExternalLoader>, base: &str) -> ModuleRuntime {
        ModuleRuntime::builder()
            .registry(Registry::new())
            .inspector(Arc::new(FixedContext::new(base)))
            .loader(loader)
            .build()
    }

    fn explicit_runtime() -> ModuleRuntime {
        ModuleRuntime::builder().registry(Registry::new()).build()
    }

    #[tokio::test]
    async fn define_then_get_returns_committed_export() {
        let runtime = explicit_runtime();
        let id = runtime
            .define(DefineRequest::value(json!({"k": 1})).id("app/config"))
            .await
            .unwrap();

        assert_eq!(id, ModuleId::new("app/config"));
        assert_eq!(runtime.registry().get(&id).unwrap(), json!({"k": 1}));
    }

    #[tokio::test]
    async fn redefining_an_id_fails_regardless_of_payload() {
        let runtime = explicit_runtime();
        runtime
            .define(DefineRequest::value(json!(1)).id("m"))
            .await
            .unwrap();

        let again = runtime
            .define(
                DefineRequest::factory(|_: Vec<DependencyValue>| -> Result<Value, BoxError> {
                    Ok(json!(2))
                })
                .id("m"),
            )
            .await;
        assert!(matches!(
            again,
            Err(DefineError::Registry(RegistryError::AlreadyDefined(_)))
        ));
        assert_eq!(runtime.registry().get(&ModuleId::new("m")).unwrap(), json!(1));
    }

    #[tokio::test]
    async fn literal_value_commits_directly() {
        let runtime = explicit_runtime();
        runtime
            .define(DefineRequest::value(42).id("m"))
            .await
            .unwrap();
        assert_eq!(runtime.registry().get(&ModuleId::new("m")).unwrap(), json!(42));
    }

    #[tokio::test]
    async fn zero_dependency_factory_is_invoked_with_no_arguments() {
        let runtime = explicit_runtime();
        runtime
            .define(
                DefineRequest::factory(|deps: Vec<DependencyValue>| -> Result<Value, BoxError> {
                    assert!(deps.is_empty());
                    Ok(json!("built"))
                })
                .id("m"),
            )
            .await
            .unwrap();
        assert_eq!(
            runtime.registry().get(&ModuleId::new("m")).unwrap(),
            json!("built")
        );
    }

    #[tokio::test]
    async fn backslash_id_never_reaches_the_registry() {
        let runtime = explicit_runtime();
        let result = runtime
            .define(DefineRequest::value(1).id("app\\config"))
            .await;
        assert!(matches!(result, Err(DefineError::InvalidIdentifier { .. })));
        assert!(runtime.registry().is_empty());
    }

    #[tokio::test]
    async fn explicit_id_beats_alias_beats_canonical_location() {
        let inspector = Arc::new(FixedContext::new("app/main.js"));
        let runtime = ModuleRuntime::builder()
            .registry(Registry::new())
            .inspector(inspector.clone())
            .build();

        let id = runtime
            .define(DefineRequest::value(1).id("explicit"))
            .await
            .unwrap();
        assert_eq!(id, ModuleId::new("explicit"));

        inspector.set_location(InferredLocation::new("app/main.js").with_alias("aliased"));
        let id = runtime.define(DefineRequest::value(2)).await.unwrap();
        assert_eq!(id, ModuleId::new("aliased"));

        inspector.set_location(InferredLocation::new("app/other.js"));
        let id = runtime.define(DefineRequest::value(3)).await.unwrap();
        assert_eq!(id, ModuleId::new("app/other.js"));
    }

    #[tokio::test]
    async fn explicit_only_host_rejects_inferred_ids() {
        let runtime = ModuleRuntime::builder()
            .registry(Registry::new())
            .inspector(Arc::new(ExplicitOnly))
            .build();

        let result = runtime.define(DefineRequest::value(1)).await;
        assert!(matches!(result, Err(DefineError::Inference(_))));
    }

    #[tokio::test]
    async fn relative_dependency_without_base_fails_inference() {
        let runtime = explicit_runtime();
        let result = runtime
            .define(
                DefineRequest::factory(|_: Vec<DependencyValue>| -> Result<Value, BoxError> {
                    Ok(json!(null))
                })
                .id("m")
                .dependencies(["./x"]),
            )
            .await;
        assert!(matches!(result, Err(DefineError::Inference(_))));
    }

    #[tokio::test]
    async fn relative_dependencies_resolve_against_the_inferred_location() {
        // Explicit public name, physical location app/main.js: "./util"
        // must resolve to app/util, not against the explicit id.
        let runtime = runtime_with(Arc::new(crate::ports::NullLoader), "app/main.js");
        runtime
            .define(DefineRequest::value("u").id("app/util"))
            .await
            .unwrap();

        runtime
            .define(
                DefineRequest::factory(|deps: Vec<DependencyValue>| -> Result<Value, BoxError> {
                    Ok(deps[0].resolved().unwrap().clone())
                })
                .id("public/name")
                .dependencies(["./util"]),
            )
            .await
            .unwrap();

        assert_eq!(
            runtime.registry().get(&ModuleId::new("public/name")).unwrap(),
            json!("u")
        );
    }

    #[tokio::test]
    async fn declaration_order_survives_inverted_completion_order() {
        let loader = Arc::new(InMemoryLoader::new());
        loader.insert_with_latency(
            ModuleId::new("app/first"),
            DefineRequest::value("first").id("app/first"),
            Duration::from_millis(80),
        );
        loader.insert_with_latency(
            ModuleId::new("app/second"),
            DefineRequest::value("second").id("app/second"),
            Duration::from_millis(5),
        );

        let runtime = runtime_with(loader, "app/main.js");
        runtime
            .define(
                DefineRequest::factory(|deps: Vec<DependencyValue>| -> Result<Value, BoxError> {
                    Ok(json!([deps[0].resolved().unwrap(), deps[1].resolved().unwrap()]))
                })
                .id("app/main")
                .dependencies(["./first", "./second"]),
            )
            .await
            .unwrap();

        assert_eq!(
            runtime.registry().get(&ModuleId::new("app/main")).unwrap(),
            json!(["first", "second"])
        );
    }

    #[tokio::test]
    async fn first_failure_wins_and_factory_is_never_invoked() {
        let loader = Arc::new(InMemoryLoader::new());
        loader.insert_with_latency(
            ModuleId::new("app/ok"),
            DefineRequest::value("ok").id("app/ok"),
            Duration::from_millis(80),
        );
        loader.insert_failure(
            ModuleId::new("app/bad"),
            "fetch refused",
            Duration::from_millis(5),
        );

        let invoked = Arc::new(AtomicBool::new(false));
        let flag = invoked.clone();

        let runtime = runtime_with(loader, "app/main.js");
        let result = runtime
            .define(
                DefineRequest::factory(
                    move |_: Vec<DependencyValue>| -> Result<Value, BoxError> {
                        flag.store(true, Ordering::SeqCst);
                        Ok(json!(null))
                    },
                )
                .id("app/main")
                .dependencies(["./ok", "./bad"]),
            )
            .await;

        match result {
            Err(DefineError::Load(error)) => {
                assert_eq!(error.id, ModuleId::new("app/bad"));
                assert_eq!(error.reason, "fetch refused");
            }
            other => panic!("expected load error, got {other:?}"),
        }
        assert!(!invoked.load(Ordering::SeqCst));
        assert!(!runtime.registry().has(&ModuleId::new("app/main")));

        // Let the slower sibling settle into the closed channel.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!runtime.registry().has(&ModuleId::new("app/main")));
    }

    #[tokio::test]
    async fn only_the_first_in_time_error_surfaces() {
        let loader = Arc::new(InMemoryLoader::new());
        loader.insert_failure(
            ModuleId::new("app/slow-bad"),
            "slow failure",
            Duration::from_millis(80),
        );
        loader.insert_failure(
            ModuleId::new("app/fast-bad"),
            "fast failure",
            Duration::from_millis(5),
        );

        let runtime = runtime_with(loader, "app/main.js");
        let result = runtime
            .define(
                DefineRequest::factory(|_: Vec<DependencyValue>| -> Result<Value, BoxError> {
                    Ok(json!(null))
                })
                .id("app/main")
                .dependencies(["./slow-bad", "./fast-bad"]),
            )
            .await;

        match result {
            Err(DefineError::Load(error)) => assert_eq!(error.reason, "fast failure"),
            other => panic!("expected load error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reserved_ids_skip_resolution_and_loading() {
        let loader = Arc::new(InMemoryLoader::new());
        let runtime = runtime_with(loader.clone(), "app/main.js");
        runtime
            .define(DefineRequest::value("u").id("app/util"))
            .await
            .unwrap();

        runtime
            .define(
                DefineRequest::factory(|deps: Vec<DependencyValue>| -> Result<Value, BoxError> {
                    assert_eq!(deps[0].exports(), Some(&json!({})));
                    assert_eq!(deps[1].module().unwrap().id, ModuleId::new("app/main"));

                    // require is bound to the defining module's location.
                    let require = deps[2].require().unwrap();
                    assert_eq!(require.get("./util").unwrap(), json!("u"));
                    assert!(require.get("./missing").is_err());

                    Ok(json!("done"))
                })
                .id("app/main")
                .dependencies(["exports", "module", "require"]),
            )
            .await
            .unwrap();

        // None of the reserved ids ever reached the loader.
        assert!(loader.requested_ids().is_empty());
    }

    #[tokio::test]
    async fn exports_slot_can_be_filled_and_returned() {
        let runtime = explicit_runtime();
        runtime
            .define(
                DefineRequest::factory(
                    |mut deps: Vec<DependencyValue>| -> Result<Value, BoxError> {
                        let mut exports = match deps.remove(0) {
                            DependencyValue::Exports(value) => value,
                            other => panic!("expected exports slot, got {other:?}"),
                        };
                        exports["answer"] = json!(42);
                        Ok(exports)
                    },
                )
                .id("m")
                .dependencies(["exports"]),
            )
            .await
            .unwrap();

        assert_eq!(
            runtime.registry().get(&ModuleId::new("m")).unwrap(),
            json!({"answer": 42})
        );
    }

    #[tokio::test]
    async fn loader_settling_without_the_module_is_dependency_not_loaded() {
        struct SettlesWithoutDefining;

        #[async_trait]
        impl ExternalLoader for SettlesWithoutDefining {
            async fn load(&self, _id: &ModuleId, _rt: &ModuleRuntime) -> Result<(), LoadError> {
                Ok(())
            }
        }

        let runtime = runtime_with(Arc::new(SettlesWithoutDefining), "app/main.js");
        let result = runtime
            .define(
                DefineRequest::factory(|_: Vec<DependencyValue>| -> Result<Value, BoxError> {
                    Ok(json!(null))
                })
                .id("app/main")
                .dependencies(["./ghost"]),
            )
            .await;

        assert!(matches!(
            result,
            Err(DefineError::DependencyNotLoaded(id)) if id == ModuleId::new("app/ghost")
        ));
    }

    #[tokio::test]
    async fn null_loader_fails_any_miss() {
        let runtime = explicit_runtime();
        let result = runtime
            .define(
                DefineRequest::factory(|_: Vec<DependencyValue>| -> Result<Value, BoxError> {
                    Ok(json!(null))
                })
                .id("m")
                .dependencies(["missing"]),
            )
            .await;
        assert!(matches!(result, Err(DefineError::Load(_))));
    }

    #[tokio::test]
    async fn factory_errors_propagate_with_their_source() {
        let runtime = explicit_runtime();
        let result = runtime
            .define(
                DefineRequest::factory(|_: Vec<DependencyValue>| -> Result<Value, BoxError> {
                    Err("boom".into())
                })
                .id("m"),
            )
            .await;

        match result {
            Err(DefineError::Factory { id, source }) => {
                assert_eq!(id, ModuleId::new("m"));
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("expected factory error, got {other:?}"),
        }
        assert!(runtime.registry().is_empty());
    }

    #[tokio::test]
    async fn concurrent_defines_sharing_a_missing_dependency_both_succeed() {
        let loader = Arc::new(InMemoryLoader::new());
        loader.insert_with_latency(
            ModuleId::new("lib/shared"),
            DefineRequest::value("s").id("lib/shared"),
            Duration::from_millis(20),
        );

        let runtime = runtime_with(loader, "app/main.js");
        let a = runtime.define(
            DefineRequest::factory(|deps: Vec<DependencyValue>| -> Result<Value, BoxError> {
                Ok(deps[0].resolved().unwrap().clone())
            })
            .id("app/a")
            .dependencies(["lib/shared"]),
        );
        let b = runtime.define(
            DefineRequest::factory(|deps: Vec<DependencyValue>| -> Result<Value, BoxError> {
                Ok(deps[0].resolved().unwrap().clone())
            })
            .id("app/b")
            .dependencies(["lib/shared"]),
        );

        let (a, b) = tokio::join!(a, b);
        a.unwrap();
        b.unwrap();

        assert_eq!(runtime.registry().get(&ModuleId::new("app/a")).unwrap(), json!("s"));
        assert_eq!(runtime.registry().get(&ModuleId::new("app/b")).unwrap(), json!("s"));
        assert_eq!(runtime.registry().len(), 3);
    }

    #[test]
    fn amd_marker_serializes_to_an_empty_object() {
        assert_eq!(serde_json::to_value(AMD).unwrap(), json!({}));
    }
}
