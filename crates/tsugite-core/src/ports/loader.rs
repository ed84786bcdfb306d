//! ExternalLoader port - 未定義モジュールの取得
//!
//! レジストリに無い依存はここへ委譲されます。ロードの副作用として対象
//! モジュール自身の define が走り、戻ったときにはレジストリに現れている
//! ことが期待されます（現れなければ DependencyNotLoaded）。

use async_trait::async_trait;

use crate::domain::{LoadError, ModuleId};
use crate::runtime::ModuleRuntime;

/// External loader capability.
///
/// Design intent:
/// - Returning settles the load exactly once (the native-async rendition of
///   an at-most-once callback).
/// - The loaded unit's own `define` runs against the passed-in `runtime`
///   handle; there is no ambient global to define against.
/// - `Ok(())` does not by itself mean the module exists; the caller
///   re-checks the registry afterwards.
#[async_trait]
pub trait ExternalLoader: Send + Sync {
    async fn load(&self, id: &ModuleId, runtime: &ModuleRuntime) -> Result<(), LoadError>;
}

/// Loader for hosts that resolve everything from the registry: any miss
/// is a final failure.
pub struct NullLoader;

#[async_trait]
impl ExternalLoader for NullLoader {
    async fn load(&self, id: &ModuleId, _runtime: &ModuleRuntime) -> Result<(), LoadError> {
        Err(LoadError::new(id.clone(), "no external loader configured"))
    }
}
