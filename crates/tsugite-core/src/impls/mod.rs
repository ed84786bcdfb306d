//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryLoader**: ソースをメモリに保持する外部ローダ。遅延を
//!   シミュレートでき、完了順序に依存しないことのテストに使う
//!
//! # 本番用実装
//! 実際にコードを取得・実行するローダはホスト側のクレートに配置します。

pub mod inmem_loader;

pub use self::inmem_loader::InMemoryLoader;
