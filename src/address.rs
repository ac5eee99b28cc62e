//! Filesystem addressing of module sockets.
//!
//! Every socket lives at `<socket-root>/<pattern-dir>/<name>.sock` where the
//! pattern directory is `rpc` for request/reply and `pub` for
//! publish/subscribe.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

const SOCKET_EXTENSION: &str = "sock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pattern {
    RequestReply,
    PublishSubscribe,
}

impl Pattern {
    pub const ALL: [Pattern; 2] = [Pattern::RequestReply, Pattern::PublishSubscribe];

    pub fn dir(&self) -> &'static str {
        match self {
            Pattern::RequestReply => "rpc",
            Pattern::PublishSubscribe => "pub",
        }
    }

    pub fn from_dir(dir: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.dir() == dir)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::RequestReply => write!(f, "request-reply"),
            Pattern::PublishSubscribe => write!(f, "publish-subscribe"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub pattern: Pattern,
    pub name: String,
}

impl Address {
    pub fn new(pattern: Pattern, name: impl Into<String>) -> Self {
        Self {
            pattern,
            name: name.into(),
        }
    }

    /// The root address of a module: request/reply at its own name.
    pub fn rpc(name: impl Into<String>) -> Self {
        Self::new(Pattern::RequestReply, name)
    }

    pub fn publisher(name: impl Into<String>) -> Self {
        Self::new(Pattern::PublishSubscribe, name)
    }

    pub fn path(&self, root: &Path) -> PathBuf {
        root.join(self.pattern.dir())
            .join(format!("{}.{}", self.name, SOCKET_EXTENSION))
    }

    pub fn endpoint(&self, root: &Path) -> String {
        format!("ipc://{}", self.path(root).display())
    }

    /// Recover `(pattern, name)` from a socket file path.
    pub fn from_path(path: &Path) -> Option<Self> {
        if path.extension()?.to_str()? != SOCKET_EXTENSION {
            return None;
        }
        let name = path.file_stem()?.to_str()?;
        let dir = path.parent()?.file_name()?.to_str()?;
        let pattern = Pattern::from_dir(dir)?;
        Some(Self::new(pattern, name))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pattern.dir(), self.name)
    }
}
