//! Transport context: socket root, wire format and timeouts shared by every
//! socket a process opens.
//!
//! A context is created once at process start and passed explicitly to every
//! server, socket and multi-target wrapper. Closing it makes further opens fail.

use crate::address::Address;
use crate::codec::WireFormat;
use crate::error::{Result, RpcError};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SOCKET_ROOT_ENV: &str = "MODWIRE_SOCKET_ROOT";
pub const WIRE_FORMAT_ENV: &str = "MODWIRE_WIRE_FORMAT";
pub const TIMEOUT_ENV: &str = "MODWIRE_TIMEOUT_MS";

const DEFAULT_SOCKET_ROOT: &str = "tmp/sockets";
const DEFAULT_MEMBER_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub struct ContextOptions {
    pub socket_root: PathBuf,
    pub wire_format: WireFormat,
    /// Bound on a single request round trip; `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Bound on each member's round trip inside a multi-target wrapper.
    pub member_timeout: Duration,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            socket_root: PathBuf::from(DEFAULT_SOCKET_ROOT),
            wire_format: WireFormat::Json,
            request_timeout: None,
            member_timeout: DEFAULT_MEMBER_TIMEOUT,
        }
    }
}

impl ContextOptions {
    /// Defaults overridden by `MODWIRE_SOCKET_ROOT`, `MODWIRE_WIRE_FORMAT`
    /// and `MODWIRE_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        let mut options = Self::default();
        if let Ok(root) = env::var(SOCKET_ROOT_ENV) {
            options.socket_root = PathBuf::from(root);
        }
        if let Ok(format) = env::var(WIRE_FORMAT_ENV) {
            options.wire_format = format.parse()?;
        }
        if let Ok(timeout) = env::var(TIMEOUT_ENV) {
            let ms: u64 = timeout.parse().map_err(|_| {
                RpcError::Decode(format!("{} must be milliseconds, got '{}'", TIMEOUT_ENV, timeout))
            })?;
            options.request_timeout = Some(Duration::from_millis(ms));
        }
        Ok(options)
    }
}

#[derive(Debug)]
struct ContextInner {
    options: ContextOptions,
    closed: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn new(options: ContextOptions) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                options,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ContextOptions::from_env()?))
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn options(&self) -> &ContextOptions {
        &self.inner.options
    }

    pub fn socket_root(&self) -> &Path {
        &self.inner.options.socket_root
    }

    pub fn wire_format(&self) -> WireFormat {
        self.inner.options.wire_format
    }

    pub fn path(&self, address: &Address) -> PathBuf {
        address.path(self.socket_root())
    }

    pub fn endpoint(&self, address: &Address) -> String {
        address.endpoint(self.socket_root())
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(RpcError::ContextClosed)
        } else {
            Ok(())
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(ContextOptions::default())
    }
}

/// Builder for [`Context`].
#[derive(Debug, Default)]
pub struct ContextBuilder {
    options: ContextOptions,
}

impl ContextBuilder {
    pub fn socket_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.socket_root = root.into();
        self
    }

    pub fn wire_format(mut self, format: WireFormat) -> Self {
        self.options.wire_format = format;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = Some(timeout);
        self
    }

    pub fn member_timeout(mut self, timeout: Duration) -> Self {
        self.options.member_timeout = timeout;
        self
    }

    pub fn build(self) -> Context {
        Context::new(self.options)
    }
}
