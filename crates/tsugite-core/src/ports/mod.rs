//! Ports - 抽象化レイヤー
//!
//! コアが環境に要求する capability を trait として定義します。
//! 実行コンテキストの検査（ContextInspector）と未定義モジュールの取得
//! （ExternalLoader）はホスト環境の関心事であり、ここで差し替え可能にします。

pub mod inspector;
pub mod loader;

// 主要な trait を再エクスポート
pub use self::inspector::{ContextInspector, ExplicitOnly, FixedContext, InferredLocation};
pub use self::loader::{ExternalLoader, NullLoader};
