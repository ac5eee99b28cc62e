use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::address::Pattern;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("ZMQ error: {0}")]
    Zmq(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for reply")]
    Timeout,

    #[error("Socket not connected")]
    NotConnected,

    #[error("Transport context closed")]
    ContextClosed,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Wrong socket pattern: expected {expected}, got {actual}")]
    WrongPattern { expected: Pattern, actual: Pattern },

    #[error("Address already in use: {}", .0.display())]
    AddressInUse(PathBuf),

    #[error("{0}")]
    Remote(ReqError),
}

impl From<zeromq::ZmqError> for RpcError {
    fn from(e: zeromq::ZmqError) -> Self {
        RpcError::Zmq(e.to_string())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            RpcError::Decode(e.to_string())
        } else {
            RpcError::Encode(e.to_string())
        }
    }
}

impl From<rmp_serde::encode::Error> for RpcError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        RpcError::Encode(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for RpcError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        RpcError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

/// A failure reported by the remote side of a request chain.
///
/// Never truthy. Renders as `(error: <message>)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReqError {
    msg: String,
}

impl ReqError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    pub fn is_truthy(&self) -> bool {
        false
    }
}

impl fmt::Display for ReqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(error: {})", self.msg)
    }
}

impl std::error::Error for ReqError {}

impl From<ReqError> for RpcError {
    fn from(e: ReqError) -> Self {
        RpcError::Remote(e)
    }
}

/// Failure raised by a target object while a chain step runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    #[error("AttributeError: '{0}'")]
    AttributeNotFound(String),

    #[error("{0}")]
    Application(String),

    #[error("{0}")]
    Unexpected(String),
}

impl ObjectError {
    pub fn application(msg: impl Into<String>) -> Self {
        ObjectError::Application(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        ObjectError::Unexpected(msg.into())
    }
}
