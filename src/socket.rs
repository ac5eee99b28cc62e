//! Addressable sockets over `ipc://` endpoints under the context's socket root.

use crate::address::{Address, Pattern};
use crate::context::Context;
use crate::error::{Result, RpcError};
use crate::logging::LogEvent;
use crate::message::{Reply, RequestChain};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::{debug, warn};
use zeromq::{PubSocket, ReqSocket, Socket as _, SocketRecv, SocketSend, SubSocket, ZmqMessage};

enum Connection {
    Req(ReqSocket),
    Sub(SubSocket),
}

/// Client end of an address: request-reply or subscriber.
///
/// A request-reply socket that was never explicitly opened connects for one
/// request and disconnects afterwards.
pub struct Socket {
    ctx: Context,
    address: Address,
    topic: String,
    timeout: Option<Duration>,
    conn: Option<Connection>,
}

impl Socket {
    pub fn new(ctx: &Context, address: Address) -> Self {
        Self {
            ctx: ctx.clone(),
            timeout: ctx.options().request_timeout,
            address,
            topic: String::new(),
            conn: None,
        }
    }

    /// Request-reply socket for a module's root address.
    pub fn rpc(ctx: &Context, name: impl Into<String>) -> Self {
        Self::new(ctx, Address::rpc(name))
    }

    /// Subscriber to `pub/<name>.sock` receiving topics starting with `topic`.
    pub fn subscriber(ctx: &Context, name: impl Into<String>, topic: impl Into<String>) -> Self {
        let mut socket = Self::new(ctx, Address::publisher(name));
        socket.topic = topic.into();
        socket
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Connect and keep the connection for subsequent requests.
    pub async fn open(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        self.ctx.ensure_open()?;
        let endpoint = self.ctx.endpoint(&self.address);

        let conn = match self.address.pattern {
            Pattern::RequestReply => {
                let mut socket = ReqSocket::new();
                socket.connect(&endpoint).await?;
                Connection::Req(socket)
            }
            Pattern::PublishSubscribe => {
                let mut socket = SubSocket::new();
                socket.connect(&endpoint).await?;
                socket.subscribe(&self.topic).await?;
                Connection::Sub(socket)
            }
        };

        debug!(event = %LogEvent::SocketConnect, address = %self.address, "connected");
        self.conn = Some(conn);
        Ok(())
    }

    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            debug!(event = %LogEvent::SocketClose, address = %self.address, "closed");
        }
    }

    /// Send one chain and wait for its reply.
    pub async fn request(&mut self, chain: &RequestChain) -> Result<Reply> {
        if self.address.pattern != Pattern::RequestReply {
            return Err(RpcError::WrongPattern {
                expected: Pattern::RequestReply,
                actual: self.address.pattern,
            });
        }
        let format = self.ctx.wire_format();
        let payload = format.encode(chain)?;

        let transient = !self.is_open();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.round_trip(payload)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(RpcError::Timeout),
            },
            None => self.round_trip(payload).await,
        };

        // A REQ socket that lost its reply cannot send again.
        if transient || outcome.is_err() {
            self.close();
        }

        let frame = outcome?;
        format.decode(&frame)
    }

    async fn round_trip(&mut self, payload: Vec<u8>) -> Result<Bytes> {
        self.open().await?;
        let Some(Connection::Req(socket)) = self.conn.as_mut() else {
            return Err(RpcError::NotConnected);
        };

        socket.send(ZmqMessage::from(payload)).await?;
        let reply = socket.recv().await?;
        reply
            .into_vec()
            .pop()
            .ok_or_else(|| RpcError::MalformedFrame("empty reply".to_string()))
    }

    /// Next published `(topic, value)` pair; opens the subscription if needed.
    pub async fn recv(&mut self) -> Result<(String, Value)> {
        if self.address.pattern != Pattern::PublishSubscribe {
            return Err(RpcError::WrongPattern {
                expected: Pattern::PublishSubscribe,
                actual: self.address.pattern,
            });
        }
        self.open().await?;
        let Some(Connection::Sub(socket)) = self.conn.as_mut() else {
            return Err(RpcError::NotConnected);
        };

        let message = socket.recv().await?;
        let mut frames = message.into_vec().into_iter();
        match (frames.next(), frames.next()) {
            (Some(topic), Some(payload)) => {
                let topic = String::from_utf8_lossy(&topic).into_owned();
                let value = self.ctx.wire_format().decode(&payload)?;
                Ok((topic, value))
            }
            _ => Err(RpcError::MalformedFrame(
                "publication must be [topic, payload]".to_string(),
            )),
        }
    }
}

/// A socket file this process bound; removed again when dropped.
#[derive(Debug)]
pub(crate) struct BoundPath(PathBuf);

impl BoundPath {
    pub(crate) fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for BoundPath {
    fn drop(&mut self) {
        if std::fs::remove_file(&self.0).is_ok() {
            debug!(event = %LogEvent::SocketClose, path = %self.0.display(), "removed socket file");
        }
    }
}

/// Make `path` bindable: create its directory and clear a stale socket file.
///
/// A file that still accepts connections belongs to a live process.
pub(crate) async fn prepare_bind(path: &Path) -> Result<BoundPath> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::try_exists(path).await? {
        if UnixStream::connect(path).await.is_ok() {
            return Err(RpcError::AddressInUse(path.to_path_buf()));
        }
        warn!(event = %LogEvent::SocketStale, path = %path.display(), "removing stale socket file");
        tokio::fs::remove_file(path).await?;
    }
    Ok(BoundPath(path.to_path_buf()))
}

/// Fan-out end of a publish-subscribe address.
pub struct Publisher {
    ctx: Context,
    address: Address,
    socket: PubSocket,
    bound: BoundPath,
}

impl Publisher {
    pub async fn bind(ctx: &Context, name: impl Into<String>) -> Result<Self> {
        ctx.ensure_open()?;
        let address = Address::publisher(name);
        let bound = prepare_bind(&ctx.path(&address)).await?;

        let mut socket = PubSocket::new();
        socket.bind(&ctx.endpoint(&address)).await?;
        debug!(event = %LogEvent::SocketBind, address = %address, "publisher bound");

        Ok(Self {
            ctx: ctx.clone(),
            address,
            socket,
            bound,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn path(&self) -> &Path {
        self.bound.path()
    }

    pub async fn publish<T: Serialize + ?Sized>(&mut self, topic: &str, value: &T) -> Result<()> {
        let payload = self.ctx.wire_format().encode(value)?;
        let message = ZmqMessage::try_from(vec![
            Bytes::copy_from_slice(topic.as_bytes()),
            Bytes::from(payload),
        ])
        .map_err(|e| RpcError::MalformedFrame(e.to_string()))?;

        self.socket.send(message).await?;
        debug!(event = %LogEvent::Publish, address = %self.address, topic, "published");
        Ok(())
    }
}
