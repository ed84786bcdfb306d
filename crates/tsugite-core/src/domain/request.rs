//! DefineRequest - define 操作への入力
//!
//! 元の API は引数位置のシフトで多重定義を表現していたが、ここでは
//! tagged variant + builder に置き換える（実行時の型検査は行わない）。

use std::fmt;
use std::sync::Arc;

use super::errors::BoxError;
use super::id::ModuleId;
use super::value::DependencyValue;

/// Produces a module's export value from its resolved dependencies.
///
/// Invoked exactly once per successful define, with the dependency values
/// in declared order. An error here fails the whole define; the source
/// error is preserved untouched.
pub trait ModuleFactory: Send + Sync {
    fn build(&self, deps: Vec<DependencyValue>) -> Result<serde_json::Value, BoxError>;
}

impl<F> ModuleFactory for F
where
    F: Fn(Vec<DependencyValue>) -> Result<serde_json::Value, BoxError> + Send + Sync,
{
    fn build(&self, deps: Vec<DependencyValue>) -> Result<serde_json::Value, BoxError> {
        (self)(deps)
    }
}

/// What the module exports: a literal value, or a factory to invoke.
///
/// A literal value skips dependency resolution entirely.
#[derive(Clone)]
pub enum ModuleSource {
    Value(serde_json::Value),
    Factory(Arc<dyn ModuleFactory>),
}

impl fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSource::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ModuleSource::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// One definition request: optional explicit id, ordered dependency list,
/// and the module source. Transient; lives only for one define call.
///
/// # 使用例
/// ```ignore
/// let request = DefineRequest::factory(|deps| Ok(serde_json::json!(42)))
///     .id("app/answer")
///     .dependencies(["./config", "exports"]);
/// runtime.define(request).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DefineRequest {
    pub(crate) id: Option<ModuleId>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) source: ModuleSource,
}

impl DefineRequest {
    /// Define a module as a plain value (no dependencies, no factory).
    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Self {
            id: None,
            dependencies: Vec::new(),
            source: ModuleSource::Value(value.into()),
        }
    }

    /// Define a module through a factory.
    pub fn factory(factory: impl ModuleFactory + 'static) -> Self {
        Self {
            id: None,
            dependencies: Vec::new(),
            source: ModuleSource::Factory(Arc::new(factory)),
        }
    }

    /// Explicit module id. When omitted, the id is inferred from the
    /// execution context.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(ModuleId::new(id));
        self
    }

    /// Ordered dependency list. Relative ids are resolved against the
    /// defining unit's inferred location.
    pub fn dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }
}
