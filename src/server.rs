//! RPC server: binds a module's root address and runs its broker.

use crate::address::Address;
use crate::broker::{RpcBroker, WorkerPool};
use crate::context::Context;
use crate::error::Result;
use crate::logging::LogEvent;
use crate::metrics::PoolStatus;
use crate::module::{Module, TaskGroup};
use crate::socket::prepare_bind;
use crate::worker::Interpreter;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use zeromq::{RouterSocket, Socket as _};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// Idle workers kept alive between bursts.
    pub ready_workers: usize,
    /// Hard cap on live workers. Zero is treated as one.
    pub max_workers: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            ready_workers: 1,
            max_workers: usize::MAX,
        }
    }
}

pub struct RpcServer {
    ctx: Context,
    module: Arc<dyn Module>,
    options: ServerOptions,
    status: Arc<watch::Sender<PoolStatus>>,
}

impl RpcServer {
    pub fn new(ctx: &Context, module: Arc<dyn Module>, options: ServerOptions) -> Self {
        let (status, _) = watch::channel(PoolStatus::default());
        Self {
            ctx: ctx.clone(),
            module,
            options: ServerOptions {
                ready_workers: options.ready_workers,
                max_workers: options.max_workers.max(1),
            },
            status: Arc::new(status),
        }
    }

    pub fn builder(ctx: &Context, module: Arc<dyn Module>) -> RpcServerBuilder {
        RpcServerBuilder {
            ctx: ctx.clone(),
            module,
            options: ServerOptions::default(),
        }
    }

    pub fn options(&self) -> ServerOptions {
        self.options
    }

    pub fn address(&self) -> Address {
        Address::rpc(self.module.name())
    }

    /// Bind `rpc/<module>.sock` and start the broker inside `tasks`.
    ///
    /// Returns once the socket is bound; the broker and its workers run until
    /// the group shuts down. The socket file is removed when the broker stops.
    pub async fn run(&self, tasks: &TaskGroup) -> Result<()> {
        self.ctx.ensure_open()?;
        let address = self.address();
        let bound = prepare_bind(&self.ctx.path(&address)).await?;

        let mut router = RouterSocket::new();
        router.bind(&self.ctx.endpoint(&address)).await?;
        info!(
            event = %LogEvent::ServerStart,
            address = %address,
            ready_workers = self.options.ready_workers,
            max_workers = self.options.max_workers,
            "rpc server listening"
        );

        let interpreter = Arc::new(Interpreter::new(
            Arc::clone(&self.module),
            self.ctx.wire_format(),
        ));
        let broker = RpcBroker::new(
            self.module.name().to_string(),
            router,
            bound,
            WorkerPool::new(self.options.ready_workers, self.options.max_workers),
            interpreter,
            tasks.clone(),
            Arc::clone(&self.status),
        );

        tasks.spawn(async move {
            match broker.run().await {
                Ok(()) => info!(
                    event = %LogEvent::ServerStop,
                    address = %address,
                    "rpc server stopped"
                ),
                Err(e) => error!(
                    event = %LogEvent::ServerStop,
                    address = %address,
                    error = %e,
                    "rpc server failed"
                ),
            }
        });
        Ok(())
    }

    /// Latest pool snapshot.
    pub fn status(&self) -> PoolStatus {
        *self.status.borrow()
    }

    /// Receiver notified on every pool change.
    pub fn watch_status(&self) -> watch::Receiver<PoolStatus> {
        self.status.subscribe()
    }
}

pub struct RpcServerBuilder {
    ctx: Context,
    module: Arc<dyn Module>,
    options: ServerOptions,
}

impl RpcServerBuilder {
    pub fn ready_workers(mut self, n: usize) -> Self {
        self.options.ready_workers = n;
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.options.max_workers = n;
        self
    }

    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> RpcServer {
        RpcServer::new(&self.ctx, self.module, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::module::SimpleModule;
    use crate::object::ObjectTable;
    use std::time::Duration;
    use tempfile::TempDir;

    fn module(name: &str) -> Arc<dyn Module> {
        Arc::new(SimpleModule::new(name, ObjectTable::builder(name).build()))
    }

    #[test]
    fn test_builder_clamps_max_workers() {
        let server = RpcServer::builder(&Context::default(), module("calc"))
            .ready_workers(2)
            .max_workers(0)
            .build();
        assert_eq!(
            server.options(),
            ServerOptions {
                ready_workers: 2,
                max_workers: 1
            }
        );
        assert_eq!(server.address(), Address::rpc("calc"));
    }

    #[tokio::test]
    async fn test_run_spawns_initial_workers_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::builder().socket_root(dir.path()).build();
        let server = RpcServer::builder(&ctx, module("calc")).ready_workers(2).build();
        let tasks = TaskGroup::new();
        server.run(&tasks).await.unwrap();

        let path = ctx.path(&server.address());
        assert!(path.exists());

        let mut status = server.watch_status();
        tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| s.ready == 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(server.status().live, 2);

        tasks.shutdown().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_second_server_same_name_is_refused() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::builder().socket_root(dir.path()).build();
        let tasks = TaskGroup::new();
        RpcServer::builder(&ctx, module("calc"))
            .build()
            .run(&tasks)
            .await
            .unwrap();

        let second = RpcServer::builder(&ctx, module("calc")).build();
        assert!(matches!(second.run(&tasks).await, Err(RpcError::AddressInUse(_))));
        tasks.shutdown().await;
    }
}
