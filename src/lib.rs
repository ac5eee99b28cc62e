//! modwire - transparent remote objects between local daemon modules
//!
//! A module exposes one root object on `<socket-root>/rpc/<name>.sock`.
//! Clients hold [`RemoteProxy`] handles whose operations compile into request
//! chains; an LRU broker in the module routes each chain to an elastic pool of
//! workers that replay it against the root object.
//!
//! # Example
//!
//! ## Module
//! ```rust,no_run
//! use modwire::{Context, ObjectTable, RpcServer, SimpleModule, TaskGroup};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> modwire::Result<()> {
//!     let ctx = Context::from_env()?;
//!     let calc = ObjectTable::builder("calc")
//!         .method("add", |args| {
//!             let a: i64 = args.get(0)?;
//!             let b: i64 = args.get(1)?;
//!             Ok(json!(a + b))
//!         })
//!         .build();
//!
//!     let tasks = TaskGroup::new();
//!     let server = RpcServer::builder(&ctx, Arc::new(SimpleModule::new("calc", calc)))
//!         .ready_workers(1)
//!         .max_workers(4)
//!         .build();
//!     server.run(&tasks).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     tasks.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Client
//! ```rust,no_run
//! use modwire::{args, Context, RemoteProxy};
//!
//! #[tokio::main]
//! async fn main() -> modwire::Result<()> {
//!     let ctx = Context::from_env()?;
//!     let calc = RemoteProxy::connect(&ctx, "calc");
//!
//!     let sum: i64 = calc.call("add", args![10, 20]).await?.into_value()?;
//!     println!("10 + 20 = {}", sum);
//!     Ok(())
//! }
//! ```

mod address;
mod args;
mod broker;
mod codec;
mod context;
mod error;
mod message;
mod metrics;
mod module;
mod multi;
mod object;
mod proxy;
mod server;
mod socket;
mod worker;

pub mod logging;

pub use address::{Address, Pattern};
pub use args::Args;
pub use broker::{Fate, WorkerPool};
pub use codec::WireFormat;
pub use context::{Context, ContextBuilder, ContextOptions};
pub use error::{ObjectError, ReqError, Result, RpcError};
pub use message::{Operation, Reply, RequestChain};
pub use metrics::PoolStatus;
pub use module::{Module, SimpleModule, TaskGroup};
pub use multi::{discover, discover_pattern, subscribe_all, Member, MultiTarget};
pub use object::{ObjectResult, ObjectTable, ObjectTableBuilder, RemoteObject, Target};
pub use proxy::{Outcome, Remote, RemoteProxy};
pub use server::{RpcServer, RpcServerBuilder, ServerOptions};
pub use socket::{Publisher, Socket};
pub use worker::{Interpreter, WorkerId};

// Re-exported for implementors of `RemoteObject`.
pub use async_trait::async_trait;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
