//! RuntimeBuilder - ランタイムの構築とワイヤリング
//!
//! # デフォルト
//! - registry: `Registry::global()`（プロセス共通のデフォルトインスタンス）
//! - inspector: `ExplicitOnly`（ambient context を持たないホスト）
//! - loader: `NullLoader`（レジストリミスは即失敗）

use std::sync::Arc;

use crate::ports::{ContextInspector, ExplicitOnly, ExternalLoader, NullLoader};
use crate::registry::Registry;
use crate::runtime::ModuleRuntime;

/// Builder for [`ModuleRuntime`].
///
/// # 使用例
/// ```ignore
/// let runtime = ModuleRuntime::builder()
///     .registry(Registry::new())
///     .inspector(Arc::new(FixedContext::new("app/main.js")))
///     .loader(Arc::new(InMemoryLoader::new()))
///     .build();
/// ```
pub struct RuntimeBuilder {
    registry: Option<Registry>,
    inspector: Option<Arc<dyn ContextInspector>>,
    loader: Option<Arc<dyn ExternalLoader>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            inspector: None,
            loader: None,
        }
    }

    /// Use an isolated registry instead of the process-wide default.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn inspector(mut self, inspector: Arc<dyn ContextInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn ExternalLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn build(self) -> ModuleRuntime {
        ModuleRuntime::new(
            self.registry.unwrap_or_else(Registry::global),
            self.inspector.unwrap_or_else(|| Arc::new(ExplicitOnly)),
            self.loader.unwrap_or_else(|| Arc::new(NullLoader)),
        )
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
