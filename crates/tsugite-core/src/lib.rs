//! tsugite-core
//!
//! モジュール定義・解決ランタイムのコア。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（id, request, value, errors）
//! - **ports**: 抽象化レイヤー（ContextInspector, ExternalLoader）
//! - **impls**: 実装（InMemoryLoader など開発用）
//! - **registry**: モジュール ID → export 値のレジストリ
//! - **resolve**: 相対 ID 解決アルゴリズム（純粋な文字列操作）
//! - **runtime**: define の fan-out/fan-in ローダ本体
//! - **builder**: RuntimeBuilder によるワイヤリング

pub mod builder;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod registry;
pub mod resolve;
pub mod runtime;

// 主要な型を再エクスポート
pub use builder::RuntimeBuilder;
pub use domain::{
    BoxError, DefineError, DefineRequest, DependencyValue, InferenceError, LoadError,
    ModuleDescriptor, ModuleFactory, ModuleId, ModuleSource, Require,
};
pub use registry::{ModuleRecord, Registry, RegistryError, RegistrySnapshot};
pub use resolve::resolve_relative;
pub use runtime::{AMD, AmdMarker, ModuleRuntime};
