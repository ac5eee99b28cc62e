//! RPC worker: replays request chains against a module's root object.

use crate::args::Args;
use crate::codec::WireFormat;
use crate::error::ObjectError;
use crate::logging::LogEvent;
use crate::message::{Operation, Reply, RequestChain};
use crate::module::Module;
use crate::object::{ObjectResult, RemoteObject, Target};
use bytes::Bytes;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Opaque routing token of one worker.
pub type WorkerId = Uuid;

/// Broker -> worker.
#[derive(Debug)]
pub(crate) enum WorkerTask {
    /// `envelope` holds the client routing frames, `request` the encoded chain.
    Request { envelope: Vec<Bytes>, request: Bytes },
    /// No more work; the worker exits.
    Destroy,
}

/// Worker -> broker.
#[derive(Debug)]
pub(crate) enum WorkerReport {
    Ready,
    Reply { envelope: Vec<Bytes>, reply: Bytes },
}

pub(crate) type ReportSender = mpsc::UnboundedSender<(WorkerId, WorkerReport)>;

/// Interprets request chains for one module.
pub struct Interpreter {
    module: Arc<dyn Module>,
    format: WireFormat,
}

impl Interpreter {
    pub fn new(module: Arc<dyn Module>, format: WireFormat) -> Self {
        Self { module, format }
    }

    /// Decode a request payload, run it and encode exactly one reply.
    pub async fn respond(&self, request: &[u8]) -> Bytes {
        let reply = match self.format.decode::<RequestChain>(request) {
            Ok(chain) if !chain.is_empty() => self.handle(&chain).await,
            Ok(_) => {
                warn!(
                    event = %LogEvent::RequestError,
                    module = self.module.name(),
                    "empty request chain"
                );
                Reply::Error(self.module.name().to_string())
            }
            Err(e) => {
                warn!(
                    event = %LogEvent::RequestError,
                    module = self.module.name(),
                    error = %e,
                    "undecodable request"
                );
                Reply::Error(self.module.name().to_string())
            }
        };
        self.encode(reply)
    }

    fn encode(&self, reply: Reply) -> Bytes {
        let encoded = match self.format.encode(&reply) {
            Ok(data) => Ok(data),
            Err(e) => match reply {
                Reply::Result(value) => {
                    debug!(error = %e, "result not encodable, answering with proxy marker");
                    self.format.encode(&Reply::Proxy(value.to_string()))
                }
                _ => Err(e),
            },
        };
        match encoded {
            Ok(data) => Bytes::from(data),
            Err(e) => {
                error!(event = %LogEvent::RequestError, error = %e, "reply could not be encoded");
                Bytes::new()
            }
        }
    }

    /// Run a chain to completion or to its first failing step.
    pub async fn handle(&self, chain: &RequestChain) -> Reply {
        let name = self.module.name();
        debug!(event = %LogEvent::RequestReceive, "[zmq] <~ {}{}", name, chain);

        let mut path = name.to_string();
        let outcome = AssertUnwindSafe(execute(self.module.root(), chain, &mut path))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ObjectError::Unexpected(panic_message(panic))));

        match outcome {
            Ok(Target::Value(value)) => Reply::Result(value),
            Ok(Target::Object(object)) => Reply::Proxy(object.describe()),
            Err(e) => {
                self.report(&path, &e);
                Reply::Error(path)
            }
        }
    }

    fn report(&self, path: &str, e: &ObjectError) {
        match e {
            ObjectError::AttributeNotFound(_) => {
                let msg = format!("AttributeError: '{}'", path);
                warn!(event = %LogEvent::RequestError, "{}", msg);
                self.module.alert(&msg);
            }
            ObjectError::Application(detail) => {
                warn!(event = %LogEvent::RequestError, path, "{}", detail);
                self.module.alert(detail);
            }
            ObjectError::Unexpected(detail) => {
                let msg = format!("{}: {}", path, detail);
                error!(event = %LogEvent::RequestError, "{}", msg);
                self.module.error(&msg);
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// Apply the chain left to right. `path` accumulates the rendering of every
/// step attempted so far, including the failing one.
async fn execute(
    root: Arc<dyn RemoteObject>,
    chain: &RequestChain,
    path: &mut String,
) -> ObjectResult<Target> {
    let mut result = Target::Object(root);

    for op in chain.operations() {
        result = match op {
            Operation::GetAttribute(name) => {
                path.push_str(&op.render());
                get_attr(&result, name).await?
            }
            Operation::SetAttribute(name, value) => {
                path.push_str(&op.render());
                set_attr(&result, name, value.clone()).await?;
                result
            }
            Operation::DeleteAttribute(name) => {
                path.push_str(&op.render());
                del_attr(&result, name).await?;
                result
            }
            Operation::Directory => Target::Value(Value::from(directory(&result))),
            Operation::Length => Target::Value(Value::from(length(&result).await?)),
            Operation::Invoke(args) => {
                path.push_str(&op.render());
                invoke(&result, args.clone()).await?
            }
            Operation::Named { name, args } => {
                let attr = match get_attr(&result, name).await {
                    Ok(attr) => attr,
                    Err(e) => {
                        path.push('.');
                        path.push_str(name);
                        return Err(e);
                    }
                };
                path.push_str(&op.render());
                if args.is_empty() {
                    attr
                } else {
                    invoke(&attr, args.clone()).await?
                }
            }
        };
    }

    Ok(result)
}

async fn get_attr(target: &Target, name: &str) -> ObjectResult<Target> {
    match target {
        Target::Object(object) => object.get_attr(name).await,
        Target::Value(_) => Err(ObjectError::AttributeNotFound(name.to_string())),
    }
}

async fn set_attr(target: &Target, name: &str, value: Value) -> ObjectResult<()> {
    match target {
        Target::Object(object) => object.set_attr(name, value).await,
        Target::Value(_) => Err(ObjectError::AttributeNotFound(name.to_string())),
    }
}

async fn del_attr(target: &Target, name: &str) -> ObjectResult<()> {
    match target {
        Target::Object(object) => object.del_attr(name).await,
        Target::Value(_) => Err(ObjectError::AttributeNotFound(name.to_string())),
    }
}

async fn invoke(target: &Target, args: Args) -> ObjectResult<Target> {
    match target {
        Target::Object(object) => object.invoke(args).await,
        Target::Value(value) => Err(ObjectError::unexpected(format!(
            "{} is not callable",
            value
        ))),
    }
}

fn directory(target: &Target) -> Vec<String> {
    match target {
        Target::Object(object) => object.directory(),
        Target::Value(Value::Object(map)) => map.keys().cloned().collect(),
        Target::Value(_) => Vec::new(),
    }
}

async fn length(target: &Target) -> ObjectResult<usize> {
    match target {
        Target::Object(object) => object.length().await,
        Target::Value(Value::Array(items)) => Ok(items.len()),
        Target::Value(Value::Object(map)) => Ok(map.len()),
        Target::Value(Value::String(s)) => Ok(s.chars().count()),
        Target::Value(value) => Err(ObjectError::unexpected(format!("{} has no length", value))),
    }
}

/// One cooperative worker task: announce readiness, then handle one chain at
/// a time until told to stop.
pub(crate) struct RpcWorker {
    id: WorkerId,
    interpreter: Arc<Interpreter>,
    inbox: mpsc::UnboundedReceiver<WorkerTask>,
    reports: ReportSender,
}

impl RpcWorker {
    pub(crate) fn new(
        id: WorkerId,
        interpreter: Arc<Interpreter>,
        inbox: mpsc::UnboundedReceiver<WorkerTask>,
        reports: ReportSender,
    ) -> Self {
        Self {
            id,
            interpreter,
            inbox,
            reports,
        }
    }

    pub(crate) async fn run(mut self) {
        if self.reports.send((self.id, WorkerReport::Ready)).is_err() {
            return;
        }

        while let Some(task) = self.inbox.recv().await {
            match task {
                WorkerTask::Destroy => break,
                WorkerTask::Request { envelope, request } => {
                    let reply = self.interpreter.respond(&request).await;
                    let report = WorkerReport::Reply { envelope, reply };
                    if self.reports.send((self.id, report)).is_err() {
                        break;
                    }
                }
            }
        }

        debug!(event = %LogEvent::WorkerExit, worker = %self.id, "worker exited");
    }
}
