//! Client-side stand-ins for remote objects.
//!
//! A [`RemoteProxy`] holds a request chain and the socket it travels over.
//! Every operation extends a copy of the chain and sends the whole of it, so
//! a proxy obtained from a `proxy` marker keeps resending its prefix from the
//! module root on each round trip.

use crate::address::Address;
use crate::args::Args;
use crate::context::Context;
use crate::error::{ReqError, Result, RpcError};
use crate::message::{Operation, Reply, RequestChain};
use crate::socket::Socket;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A successful reply: a decoded value or a handle on a remote value that
/// could not travel over the wire.
#[derive(Debug, Clone)]
pub enum Remote {
    Value(Value),
    Handle(RemoteProxy),
}

impl Remote {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Remote::Value(v) => Some(v),
            Remote::Handle(_) => None,
        }
    }

    pub fn into_value<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Remote::Value(v) => Ok(serde_json::from_value(v)?),
            Remote::Handle(handle) => Err(RpcError::Decode(format!(
                "remote handle {} carries no value",
                handle
            ))),
        }
    }

    pub fn into_handle(self) -> Option<RemoteProxy> {
        match self {
            Remote::Handle(h) => Some(h),
            Remote::Value(_) => None,
        }
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remote::Value(v) => write!(f, "{}", v),
            Remote::Handle(h) => write!(f, "{}", h),
        }
    }
}

/// Local mirror of a remote object's interface.
///
/// Cloning is cheap; clones share the underlying socket and round trips on
/// one socket are serialized.
#[derive(Clone)]
pub struct RemoteProxy {
    address: Address,
    socket: Arc<Mutex<Socket>>,
    chain: RequestChain,
    description: Option<String>,
}

impl RemoteProxy {
    pub fn new(socket: Socket) -> Self {
        Self {
            address: socket.address().clone(),
            socket: Arc::new(Mutex::new(socket)),
            chain: RequestChain::new(),
            description: None,
        }
    }

    /// Root proxy for the module named `name`.
    pub fn connect(ctx: &Context, name: impl Into<String>) -> Self {
        Self::new(Socket::rpc(ctx, name))
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Operations this proxy resends ahead of each new one.
    pub fn chain(&self) -> &RequestChain {
        &self.chain
    }

    /// Remote rendering from the `proxy` marker this handle came from.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Keep the socket connected across round trips.
    pub async fn open(&self) -> Result<()> {
        self.socket.lock().await.open().await
    }

    pub async fn close(&self) {
        self.socket.lock().await.close();
    }

    pub async fn get(&self, name: &str) -> Result<Remote> {
        self.send(self.chain.then(Operation::get(name))).await
    }

    pub async fn set(&self, name: &str, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.send(self.chain.then(Operation::set(name, value)))
            .await
            .map(|_| ())
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.send(self.chain.then(Operation::delete(name)))
            .await
            .map(|_| ())
    }

    pub async fn invoke(&self, args: Args) -> Result<Remote> {
        self.send(self.chain.then(Operation::invoke(args))).await
    }

    /// Look up `name` and invoke it in the same round trip.
    pub async fn call(&self, name: &str, args: Args) -> Result<Remote> {
        let chain = self
            .chain
            .then(Operation::get(name))
            .then(Operation::invoke(args));
        self.send(chain).await
    }

    pub async fn directory(&self) -> Result<Vec<String>> {
        self.send(self.chain.then(Operation::Directory))
            .await?
            .into_value()
    }

    pub async fn length(&self) -> Result<usize> {
        self.send(self.chain.then(Operation::Length))
            .await?
            .into_value()
    }

    async fn send(&self, chain: RequestChain) -> Result<Remote> {
        let reply = self.socket.lock().await.request(&chain).await?;
        match reply {
            Reply::Result(value) => Ok(Remote::Value(value)),
            Reply::Error(msg) => Err(RpcError::Remote(ReqError::new(msg))),
            Reply::Proxy(description) => Ok(Remote::Handle(RemoteProxy {
                address: self.address.clone(),
                socket: Arc::clone(&self.socket),
                chain,
                description: Some(description),
            })),
        }
    }
}

impl fmt::Debug for RemoteProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProxy")
            .field("address", &self.address)
            .field("chain", &self.chain.to_string())
            .field("description", &self.description)
            .finish()
    }
}

impl fmt::Display for RemoteProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(d) => write!(f, "{}", d),
            None => write!(f, "<remote {}{}>", self.address.name, self.chain),
        }
    }
}

/// Result wrapper for chaining without checking every step.
///
/// Every operation on an `Error` returns that same error unchanged, so a
/// chain can be written out in full and tested once at the end.
#[derive(Debug, Clone)]
pub enum Outcome {
    Value(Value),
    Handle(RemoteProxy),
    Error(ReqError),
}

impl Outcome {
    /// Errors are never truthy; values follow JSON emptiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Outcome::Value(v) => truthy(v),
            Outcome::Handle(_) => true,
            Outcome::Error(e) => e.is_truthy(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn error(&self) -> Option<&ReqError> {
        match self {
            Outcome::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_result(self) -> std::result::Result<Remote, ReqError> {
        match self {
            Outcome::Value(v) => Ok(Remote::Value(v)),
            Outcome::Handle(h) => Ok(Remote::Handle(h)),
            Outcome::Error(e) => Err(e),
        }
    }

    fn handle(&self, op: &str) -> std::result::Result<&RemoteProxy, Outcome> {
        match self {
            Outcome::Handle(h) => Ok(h),
            Outcome::Error(_) => Err(self.clone()),
            Outcome::Value(v) => Err(Outcome::Error(ReqError::new(format!(
                "{} applied to plain value {}",
                op, v
            )))),
        }
    }

    pub async fn get(&self, name: &str) -> Outcome {
        match self.handle("get") {
            Ok(h) => h.get(name).await.into(),
            Err(o) => o,
        }
    }

    /// On success the receiver itself is returned.
    pub async fn set(&self, name: &str, value: impl Serialize) -> Outcome {
        match self.handle("set") {
            Ok(h) => match h.set(name, value).await {
                Ok(()) => self.clone(),
                Err(e) => Outcome::from(e),
            },
            Err(o) => o,
        }
    }

    pub async fn delete(&self, name: &str) -> Outcome {
        match self.handle("delete") {
            Ok(h) => match h.delete(name).await {
                Ok(()) => self.clone(),
                Err(e) => Outcome::from(e),
            },
            Err(o) => o,
        }
    }

    pub async fn invoke(&self, args: Args) -> Outcome {
        match self.handle("invoke") {
            Ok(h) => h.invoke(args).await.into(),
            Err(o) => o,
        }
    }

    pub async fn call(&self, name: &str, args: Args) -> Outcome {
        match self.handle("call") {
            Ok(h) => h.call(name, args).await.into(),
            Err(o) => o,
        }
    }

    pub async fn directory(&self) -> Outcome {
        match self.handle("directory") {
            Ok(h) => h.directory().await.map(Value::from).into(),
            Err(o) => o,
        }
    }

    pub async fn length(&self) -> Outcome {
        match self.handle("length") {
            Ok(h) => h.length().await.map(Value::from).into(),
            Err(o) => o,
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

impl From<RpcError> for Outcome {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Remote(e) => Outcome::Error(e),
            other => Outcome::Error(ReqError::new(other.to_string())),
        }
    }
}

impl From<Remote> for Outcome {
    fn from(remote: Remote) -> Self {
        match remote {
            Remote::Value(v) => Outcome::Value(v),
            Remote::Handle(h) => Outcome::Handle(h),
        }
    }
}

impl From<RemoteProxy> for Outcome {
    fn from(proxy: RemoteProxy) -> Self {
        Outcome::Handle(proxy)
    }
}

impl<T: Into<Outcome>> From<Result<T>> for Outcome {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => v.into(),
            Err(e) => e.into(),
        }
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Value(value)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(v) => write!(f, "{}", v),
            Outcome::Handle(h) => write!(f, "{}", h),
            Outcome::Error(e) => write!(f, "{}", e),
        }
    }
}
