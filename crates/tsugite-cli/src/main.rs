use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use tsugite_core::impls::InMemoryLoader;
use tsugite_core::ports::{ExternalLoader, FixedContext};
use tsugite_core::{
    BoxError, DefineRequest, DependencyValue, LoadError, ModuleId, ModuleRuntime, Registry,
};

/// 最初の n 回だけ telemetry モジュールのロードに失敗するローダ。
/// first-failure-wins のデモ用。
struct FlakyLoader {
    inner: InMemoryLoader,
    remaining_failures: AtomicU32,
}

impl FlakyLoader {
    fn new(inner: InMemoryLoader, n: u32) -> Self {
        Self {
            inner,
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl ExternalLoader for FlakyLoader {
    async fn load(&self, id: &ModuleId, runtime: &ModuleRuntime) -> Result<(), LoadError> {
        if id.as_str() == "net/telemetry" {
            let left = self.remaining_failures.load(Ordering::Relaxed);
            if left > 0 {
                self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
                return Err(LoadError::new(
                    id.clone(),
                    format!("intentional failure (left={left})"),
                ));
            }
        }
        self.inner.load(id, runtime).await
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    // (A) リモートモジュールの置き場（取得と実行のシミュレーション）
    let sources = InMemoryLoader::with_jitter(Duration::from_millis(5), Duration::from_millis(40));
    sources.insert(
        ModuleId::new("lib/color"),
        DefineRequest::value(json!({"accent": "#d97706"})).id("lib/color"),
    );
    sources.insert(
        ModuleId::new("https://example.com/app/theme"),
        DefineRequest::factory(|deps: Vec<DependencyValue>| -> Result<serde_json::Value, BoxError> {
            let color = deps[0].resolved().expect("lib/color resolves first");
            Ok(json!({"name": "daylight", "accent": color["accent"]}))
        })
        .id("https://example.com/app/theme")
        .dependencies(["lib/color"]),
    );
    sources.insert(
        ModuleId::new("net/telemetry"),
        DefineRequest::value(json!({"endpoint": "https://telemetry.example.com"}))
            .id("net/telemetry"),
    );

    // (B) ランタイムを組み立てる
    let runtime = ModuleRuntime::builder()
        .registry(Registry::new())
        .inspector(Arc::new(FixedContext::new("https://example.com/app/main.js")))
        .loader(Arc::new(FlakyLoader::new(sources, 1)))
        .build();
    println!("amd marker: {}", serde_json::to_string(&runtime.amd()).unwrap());

    // (C) リテラル値のモジュール
    let id = runtime
        .define(DefineRequest::value(json!({"locale": "ja-JP"})).id("app/config"))
        .await
        .unwrap();
    println!("defined: {id}");

    // (D) 相対依存と予約 id を使う factory モジュール。
    //     "./theme" は base (https://example.com/app/main.js) に対して解決される。
    let id = runtime
        .define(
            DefineRequest::factory(
                |deps: Vec<DependencyValue>| -> Result<serde_json::Value, BoxError> {
                    let config = deps[0].resolved().expect("app/config");
                    let theme = deps[1].resolved().expect("./theme");
                    let me = deps[2].module().expect("module slot");
                    // require は定義元の場所に束縛されている
                    let require = deps[3].require().expect("require slot");
                    let color = require.get("lib/color")?;
                    Ok(json!({
                        "module": me.id,
                        "locale": config["locale"],
                        "theme": theme["name"],
                        "accent": color["accent"],
                    }))
                },
            )
            .id("app/main")
            .dependencies(["app/config", "./theme", "module", "require"]),
        )
        .await
        .unwrap();
    println!("defined: {id}");

    // (E) 失敗する define：telemetry の初回ロードは落ち、factory は呼ばれない
    let failed = runtime
        .define(
            DefineRequest::factory(
                |_: Vec<DependencyValue>| -> Result<serde_json::Value, BoxError> {
                    unreachable!("a failed dependency must never reach the factory")
                },
            )
            .id("app/status")
            .dependencies(["net/telemetry"]),
        )
        .await;
    println!("first attempt: {}", failed.unwrap_err());

    // (F) リトライはコアの外の判断。もう一度 define すれば今度は成功する
    let id = runtime
        .define(
            DefineRequest::factory(
                |deps: Vec<DependencyValue>| -> Result<serde_json::Value, BoxError> {
                    let telemetry = deps[0].resolved().expect("net/telemetry");
                    Ok(json!({"endpoint": telemetry["endpoint"]}))
                },
            )
            .id("app/status")
            .dependencies(["net/telemetry"]),
        )
        .await
        .unwrap();
    println!("second attempt defined: {id}");

    // (G) 最終状態
    let snapshot = runtime.registry().snapshot();
    println!(
        "registry:\n{}",
        serde_json::to_string_pretty(&snapshot).unwrap()
    );
}
