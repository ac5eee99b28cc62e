//! Structured logging setup and the standard event names.
//!
//! Every record emitted by this crate carries an `event` field naming one of
//! the [`LogEvent`] variants, so logs can be filtered by event regardless of
//! output format.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "MODWIRE_LOG";

/// Standard log events for RPC operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    // Server lifecycle
    ServerStart,
    ServerStop,

    // Pool
    WorkerSpawn,
    WorkerReady,
    WorkerDestroy,
    WorkerExit,

    // Requests
    RequestReceive,
    RequestForward,
    RequestError,
    ReplyRoute,

    // Connection
    SocketBind,
    SocketConnect,
    SocketClose,
    SocketStale,

    // Publish/subscribe
    Publish,

    // Discovery
    Discover,
}

impl LogEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEvent::ServerStart => "server_start",
            LogEvent::ServerStop => "server_stop",
            LogEvent::WorkerSpawn => "worker_spawn",
            LogEvent::WorkerReady => "worker_ready",
            LogEvent::WorkerDestroy => "worker_destroy",
            LogEvent::WorkerExit => "worker_exit",
            LogEvent::RequestReceive => "request_receive",
            LogEvent::RequestForward => "request_forward",
            LogEvent::RequestError => "request_error",
            LogEvent::ReplyRoute => "reply_route",
            LogEvent::SocketBind => "socket_bind",
            LogEvent::SocketConnect => "socket_connect",
            LogEvent::SocketClose => "socket_close",
            LogEvent::SocketStale => "socket_stale",
            LogEvent::Publish => "publish",
            LogEvent::Discover => "discover",
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub format: LogFormat,
    /// Directive used when `MODWIRE_LOG` is unset, e.g. `info` or `modwire=debug`.
    pub default_directive: String,
    pub with_target: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            default_directive: "info".to_string(),
            with_target: false,
        }
    }
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed.
pub fn init(options: LogOptions) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(&options.default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(options.with_target);

    match options.format {
        LogFormat::Json => builder.json().try_init().is_ok(),
        LogFormat::Pretty => builder.compact().try_init().is_ok(),
    }
}
