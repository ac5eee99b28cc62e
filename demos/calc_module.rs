//! A calculator module.
//!
//! Run with: cargo run --example calc_module
//! Then try: cargo run --bin modwire -- call calc add 2 3

use modwire::logging::{self, LogOptions};
use modwire::{
    Context, Module, ObjectError, ObjectTable, Publisher, RemoteObject, RpcServer, TaskGroup,
};
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

struct Calc {
    root: Arc<dyn RemoteObject>,
}

impl Module for Calc {
    fn name(&self) -> &str {
        "calc"
    }

    fn root(&self) -> Arc<dyn RemoteObject> {
        Arc::clone(&self.root)
    }

    fn notice(&self, msg: &str) {
        info!("notice: {}", msg);
    }

    fn alert(&self, msg: &str) {
        warn!("alert: {}", msg);
    }

    fn error(&self, msg: &str) {
        error!("error: {}", msg);
    }
}

fn build_root(memory: Arc<AtomicI64>) -> ObjectTable {
    let recall = Arc::clone(&memory);
    let store = Arc::clone(&memory);

    ObjectTable::builder("calc")
        .field("precision", 2)
        .method("add", |args| {
            let a: f64 = args.get(0)?;
            let b: f64 = args.get(1)?;
            Ok(json!(a + b))
        })
        .doc("add", "add(a, b) -> a + b")
        .method("div", |args| {
            let a: f64 = args.get(0)?;
            let b: f64 = args.get(1)?;
            if b == 0.0 {
                return Err(ObjectError::application("division by zero"));
            }
            Ok(json!(a / b))
        })
        .doc("div", "div(a, b) -> a / b")
        .async_method("slow_square", |args| async move {
            let x: f64 = args.get_or_kwarg(0, "x")?;
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, ObjectError>(json!(x * x))
        })
        .doc("slow_square", "slow_square(x) -> x * x, after half a second")
        .child(
            "memory",
            ObjectTable::builder("memory")
                .getter("value", move || Ok(json!(recall.load(Ordering::SeqCst))))
                .method("store", move |args| {
                    let v: i64 = args.get(0)?;
                    store.store(v, Ordering::SeqCst);
                    Ok(json!(v))
                })
                .build(),
        )
        .build()
}

#[tokio::main]
async fn main() -> modwire::Result<()> {
    logging::init(LogOptions::default());

    let ctx = Context::from_env()?;
    let tasks = TaskGroup::new();
    let memory = Arc::new(AtomicI64::new(0));

    let module = Arc::new(Calc {
        root: Arc::new(build_root(Arc::clone(&memory))),
    });
    let server = RpcServer::builder(&ctx, module)
        .ready_workers(1)
        .max_workers(4)
        .build();
    server.run(&tasks).await?;

    let mut publisher = Publisher::bind(&ctx, "calc").await?;
    tasks.spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let value = memory.load(Ordering::SeqCst);
            if let Err(e) = publisher.publish("memory", &json!({ "value": value })).await {
                warn!("publish failed: {}", e);
            }
        }
    });

    info!("calc module running, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("pool at shutdown: {}", server.status());
    tasks.shutdown().await;
    Ok(())
}
