#![allow(dead_code)]

use modwire::{Context, ObjectError, ObjectTable, RpcServer, SimpleModule, TaskGroup, WireFormat};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub ctx: Context,
    pub tasks: TaskGroup,
    pub servers: Vec<RpcServer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_format(WireFormat::Json)
    }

    pub fn with_format(format: WireFormat) -> Self {
        let dir = TempDir::new().unwrap();
        let ctx = Context::builder()
            .socket_root(dir.path())
            .wire_format(format)
            .request_timeout(Duration::from_secs(5))
            .member_timeout(Duration::from_millis(500))
            .build();
        Self {
            dir,
            ctx,
            tasks: TaskGroup::new(),
            servers: Vec::new(),
        }
    }

    /// Start a calc module and return its index in `servers`.
    pub async fn serve(&mut self, name: &str, ready_workers: usize, max_workers: usize) -> usize {
        let module = Arc::new(SimpleModule::new(name, calc(name)));
        let server = RpcServer::builder(&self.ctx, module)
            .ready_workers(ready_workers)
            .max_workers(max_workers)
            .build();
        server.run(&self.tasks).await.unwrap();
        self.servers.push(server);
        self.servers.len() - 1
    }

    pub fn server(&self, index: usize) -> &RpcServer {
        &self.servers[index]
    }

    pub async fn shutdown(self) {
        self.tasks.shutdown().await;
    }
}

pub fn calc(name: &str) -> ObjectTable {
    ObjectTable::builder(name)
        .field("precision", 2)
        .field("items", json!([1, 2, 3]))
        .method("add", |args| {
            let a: i64 = args.get(0)?;
            let b: i64 = args.get(1)?;
            Ok(json!(a + b))
        })
        .doc("add", "add(a, b)")
        .method("div", |args| {
            let a: i64 = args.get(0)?;
            let b: i64 = args.get(1)?;
            if b == 0 {
                return Err(ObjectError::application("division by zero"));
            }
            Ok(json!(a / b))
        })
        .async_method("echo_after", |args| async move {
            let ms: u64 = args.get(0)?;
            let tag: String = args.get(1)?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, ObjectError>(json!(tag))
        })
        .child(
            "memory",
            ObjectTable::builder("memory").field("slots", 4).build(),
        )
        .build()
}
