//! Fan-out over every live address whose name matches a glob.

use crate::address::{Address, Pattern};
use crate::args::Args;
use crate::context::Context;
use crate::error::{Result, RpcError};
use crate::logging::LogEvent;
use crate::proxy::{Outcome, RemoteProxy};
use crate::socket::Socket;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::ops::Index;
use tracing::debug;

/// List socket files under both pattern directories whose module name
/// matches `name_glob`, `rpc/` entries first, each directory sorted by name.
pub fn discover(ctx: &Context, name_glob: &str) -> Result<Vec<Address>> {
    let matcher = compile(name_glob)?;
    let mut found = Vec::new();
    for pattern in Pattern::ALL {
        found.extend(list_dir(ctx, pattern, &matcher)?);
    }
    debug!(
        event = %LogEvent::Discover,
        glob = name_glob,
        found = found.len(),
        "discovered addresses"
    );
    Ok(found)
}

/// Like [`discover`], restricted to one pattern directory.
pub fn discover_pattern(ctx: &Context, pattern: Pattern, name_glob: &str) -> Result<Vec<Address>> {
    let found = list_dir(ctx, pattern, &compile(name_glob)?)?;
    debug!(
        event = %LogEvent::Discover,
        glob = name_glob,
        %pattern,
        found = found.len(),
        "discovered addresses"
    );
    Ok(found)
}

/// One unopened subscriber per publisher whose name matches `name_glob`.
pub fn subscribe_all(ctx: &Context, name_glob: &str, topic: &str) -> Result<Vec<Socket>> {
    Ok(discover_pattern(ctx, Pattern::PublishSubscribe, name_glob)?
        .into_iter()
        .map(|address| Socket::subscriber(ctx, address.name, topic))
        .collect())
}

fn list_dir(ctx: &Context, pattern: Pattern, matcher: &glob::Pattern) -> Result<Vec<Address>> {
    let root = glob::Pattern::escape(&ctx.socket_root().to_string_lossy());
    let listing = format!("{}/{}/*.sock", root, pattern.dir());
    let paths = glob::glob(&listing).map_err(|e| RpcError::Decode(e.to_string()))?;

    let mut addresses: Vec<Address> = paths
        .filter_map(|entry| entry.ok())
        .filter_map(|path| Address::from_path(&path))
        .filter(|address| address.pattern == pattern && matcher.matches(&address.name))
        .collect();
    addresses.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(addresses)
}

fn compile(name_glob: &str) -> Result<glob::Pattern> {
    glob::Pattern::new(name_glob)
        .map_err(|e| RpcError::Decode(format!("invalid name pattern '{}': {}", name_glob, e)))
}

/// One discovered address and the latest outcome applied to it.
#[derive(Debug, Clone)]
pub struct Member {
    pub address: Address,
    pub outcome: Outcome,
}

/// Broadcasting proxy over every `rpc/` address matching a glob. Each
/// operation is applied to every member in turn and yields a new wrapper
/// holding the per-member outcomes, in the same order, so further
/// operations keep fanning out.
#[derive(Debug, Clone)]
pub struct MultiTarget {
    ctx: Context,
    name_glob: String,
    members: Vec<Member>,
}

impl MultiTarget {
    pub fn new(ctx: &Context, name_glob: impl Into<String>) -> Result<Self> {
        let mut multi = Self {
            ctx: ctx.clone(),
            name_glob: name_glob.into(),
            members: Vec::new(),
        };
        multi.refresh()?;
        Ok(multi)
    }

    /// Re-run discovery and reset every member to its root.
    pub fn refresh(&mut self) -> Result<()> {
        let timeout = self.ctx.options().member_timeout;
        self.members = discover_pattern(&self.ctx, Pattern::RequestReply, &self.name_glob)?
            .into_iter()
            .map(|address| {
                let socket = Socket::new(&self.ctx, address.clone()).with_timeout(timeout);
                Member {
                    address,
                    outcome: Outcome::Handle(RemoteProxy::new(socket)),
                }
            })
            .collect();
        Ok(())
    }

    pub fn name_glob(&self) -> &str {
        &self.name_glob
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn member(&self, name: &str) -> Option<&Outcome> {
        self.members
            .iter()
            .find(|m| m.address.name == name)
            .map(|m| &m.outcome)
    }

    async fn fan_out<F, Fut>(&self, op: F) -> Self
    where
        F: Fn(Outcome) -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let mut members = Vec::with_capacity(self.members.len());
        for member in &self.members {
            members.push(Member {
                address: member.address.clone(),
                outcome: op(member.outcome.clone()).await,
            });
        }
        Self {
            ctx: self.ctx.clone(),
            name_glob: self.name_glob.clone(),
            members,
        }
    }

    pub async fn get(&self, name: &str) -> Self {
        self.fan_out(|o| async move { o.get(name).await }).await
    }

    pub async fn set<T: Serialize + Sync>(&self, name: &str, value: &T) -> Self {
        self.fan_out(|o| async move { o.set(name, value).await }).await
    }

    pub async fn delete(&self, name: &str) -> Self {
        self.fan_out(|o| async move { o.delete(name).await }).await
    }

    pub async fn invoke(&self, args: Args) -> Self {
        let args = &args;
        self.fan_out(|o| async move { o.invoke(args.clone()).await })
            .await
    }

    pub async fn call(&self, name: &str, args: Args) -> Self {
        let args = &args;
        self.fan_out(|o| async move { o.call(name, args.clone()).await })
            .await
    }

    pub async fn directory(&self) -> Self {
        self.fan_out(|o| async move { o.directory().await }).await
    }

    pub async fn length(&self) -> Self {
        self.fan_out(|o| async move { o.length().await }).await
    }

    /// Member values keyed by module name; errors and handles render as text.
    pub fn to_values(&self) -> Vec<(String, Value)> {
        self.members
            .iter()
            .map(|m| {
                let value = match &m.outcome {
                    Outcome::Value(v) => v.clone(),
                    other => Value::String(other.to_string()),
                };
                (m.address.name.clone(), value)
            })
            .collect()
    }
}

impl Index<usize> for MultiTarget {
    type Output = Outcome;

    fn index(&self, index: usize) -> &Self::Output {
        &self.members[index].outcome
    }
}

impl fmt::Display for MultiTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for member in &self.members {
            writeln!(f, "{}: {}", member.address, member.outcome)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, rel: &str) {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_discover_orders_rpc_first() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "rpc/worker_b.sock");
        touch(&dir, "rpc/worker_a.sock");
        touch(&dir, "pub/worker_a.sock");
        touch(&dir, "rpc/logger.sock");
        touch(&dir, "rpc/notes.txt");

        let ctx = Context::builder().socket_root(dir.path()).build();
        let found = discover(&ctx, "worker_*").unwrap();
        assert_eq!(
            found,
            vec![
                Address::rpc("worker_a"),
                Address::rpc("worker_b"),
                Address::publisher("worker_a"),
            ]
        );
        assert_eq!(discover(&ctx, "*").unwrap().len(), 4);
    }

    #[test]
    fn test_discover_empty_root() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::builder().socket_root(dir.path().join("absent")).build();
        assert!(discover(&ctx, "*").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_glob() {
        let ctx = Context::default();
        assert!(MultiTarget::new(&ctx, "[").is_err());
    }

    #[test]
    fn test_discover_pattern_skips_other_directory() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "rpc/calc.sock");
        touch(&dir, "pub/calc.sock");
        touch(&dir, "pub/news.sock");
        let ctx = Context::builder().socket_root(dir.path()).build();

        assert_eq!(
            discover_pattern(&ctx, Pattern::PublishSubscribe, "*").unwrap(),
            vec![Address::publisher("calc"), Address::publisher("news")]
        );
        assert_eq!(
            discover_pattern(&ctx, Pattern::RequestReply, "*").unwrap(),
            vec![Address::rpc("calc")]
        );
    }

    #[tokio::test]
    async fn test_publishers_are_not_members() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "rpc/calc.sock");
        touch(&dir, "pub/calc.sock");
        touch(&dir, "pub/news.sock");
        let ctx = Context::builder().socket_root(dir.path()).build();

        let multi = MultiTarget::new(&ctx, "*").unwrap();
        assert_eq!(multi.len(), 1);
        assert_eq!(multi.members()[0].address, Address::rpc("calc"));
        assert!(matches!(multi[0], Outcome::Handle(_)));
    }

    #[test]
    fn test_subscribe_all_targets_publishers() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "rpc/calc.sock");
        touch(&dir, "pub/calc.sock");
        touch(&dir, "pub/news.sock");
        let ctx = Context::builder().socket_root(dir.path()).build();

        let subscribers = subscribe_all(&ctx, "*", "memory").unwrap();
        let addresses: Vec<&Address> = subscribers.iter().map(|s| s.address()).collect();
        assert_eq!(
            addresses,
            vec![&Address::publisher("calc"), &Address::publisher("news")]
        );
        assert!(subscribers.iter().all(|s| !s.is_open()));
    }

    #[tokio::test]
    async fn test_refresh_picks_up_new_sockets() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::builder().socket_root(dir.path()).build();
        let mut multi = MultiTarget::new(&ctx, "*").unwrap();
        assert!(multi.is_empty());

        touch(&dir, "rpc/calc.sock");
        multi.refresh().unwrap();
        assert_eq!(multi.len(), 1);
        assert!(multi.member("calc").is_some());
    }
}
