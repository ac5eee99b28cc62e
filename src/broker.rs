//! LRU queue broker between the module's client-facing ROUTER socket and its
//! elastic worker pool.
//!
//! The ready queue and the pool are owned by the single broker task, which
//! multiplexes client requests (forward) and worker reports (backward) with
//! one `select!`. Workers talk to it over channels.

use crate::error::{Result, RpcError};
use crate::logging::LogEvent;
use crate::metrics::PoolStatus;
use crate::module::TaskGroup;
use crate::socket::BoundPath;
use crate::worker::{Interpreter, RpcWorker, WorkerId, WorkerReport, WorkerTask};
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zeromq::{RouterSocket, SocketRecv, SocketSend, ZmqMessage};

/// What happens to a worker after it reports in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Ready,
    Destroy,
}

/// Pool bookkeeping, free of any I/O.
///
/// Invariants: an identity is queued as ready at most once, and the number of
/// live workers never exceeds `max_workers`.
#[derive(Debug)]
pub struct WorkerPool {
    ready_workers: usize,
    max_workers: usize,
    live: HashSet<WorkerId>,
    ready: VecDeque<WorkerId>,
    spawned_total: u64,
    destroyed_total: u64,
    requests_total: u64,
    replies_total: u64,
}

impl WorkerPool {
    pub fn new(ready_workers: usize, max_workers: usize) -> Self {
        Self {
            ready_workers,
            max_workers: max_workers.max(1),
            live: HashSet::new(),
            ready: VecDeque::new(),
            spawned_total: 0,
            destroyed_total: 0,
            requests_total: 0,
            replies_total: 0,
        }
    }

    /// Workers to start before the first request.
    pub fn initial(&self) -> usize {
        self.ready_workers.min(self.max_workers)
    }

    pub fn live(&self) -> usize {
        self.live.len()
    }

    pub fn ready(&self) -> usize {
        self.ready.len()
    }

    pub fn can_spawn(&self) -> bool {
        self.live.len() < self.max_workers
    }

    /// A request arrived and nobody is idle.
    pub fn needs_worker(&self) -> bool {
        self.ready.is_empty() && self.can_spawn()
    }

    pub fn register(&mut self, id: WorkerId) -> Result<()> {
        if !self.can_spawn() {
            return Err(RpcError::MalformedFrame(format!(
                "pool already holds max_workers={}",
                self.max_workers
            )));
        }
        if !self.live.insert(id) {
            return Err(RpcError::MalformedFrame(format!("worker {} registered twice", id)));
        }
        self.spawned_total += 1;
        Ok(())
    }

    /// Take the least recently used idle worker for a request.
    pub fn pop_ready(&mut self) -> Option<WorkerId> {
        let id = self.ready.pop_front()?;
        self.requests_total += 1;
        Some(id)
    }

    /// A worker finished its handshake or a reply. Decide whether it stays.
    pub fn report(&mut self, id: WorkerId, replied: bool) -> Result<Fate> {
        if !self.live.contains(&id) {
            return Err(RpcError::MalformedFrame(format!("report from unknown worker {}", id)));
        }
        if self.ready.contains(&id) {
            return Err(RpcError::MalformedFrame(format!("worker {} reported ready twice", id)));
        }
        if replied {
            self.replies_total += 1;
        }

        if self.ready.len() >= self.ready_workers.max(1) {
            self.live.remove(&id);
            self.destroyed_total += 1;
            Ok(Fate::Destroy)
        } else {
            self.ready.push_back(id);
            Ok(Fate::Ready)
        }
    }

    /// Drop a worker that can no longer be reached.
    pub fn forget(&mut self, id: WorkerId) {
        self.ready.retain(|w| *w != id);
        if self.live.remove(&id) {
            self.destroyed_total += 1;
        }
    }

    pub fn status(&self, pending: usize) -> PoolStatus {
        PoolStatus {
            live: self.live.len(),
            ready: self.ready.len(),
            busy: self.live.len() - self.ready.len(),
            pending,
            spawned_total: self.spawned_total,
            destroyed_total: self.destroyed_total,
            requests_total: self.requests_total,
            replies_total: self.replies_total,
        }
    }
}

struct Pending {
    envelope: Vec<Bytes>,
    request: Bytes,
}

enum Event {
    Client(zeromq::ZmqResult<ZmqMessage>),
    Worker(Option<(WorkerId, WorkerReport)>),
}

pub(crate) struct RpcBroker {
    module: String,
    router: RouterSocket,
    _bound: BoundPath,
    pool: WorkerPool,
    workers: HashMap<WorkerId, mpsc::UnboundedSender<WorkerTask>>,
    reports_tx: mpsc::UnboundedSender<(WorkerId, WorkerReport)>,
    reports_rx: mpsc::UnboundedReceiver<(WorkerId, WorkerReport)>,
    interpreter: Arc<Interpreter>,
    tasks: TaskGroup,
    status: Arc<watch::Sender<PoolStatus>>,
    pending: Option<Pending>,
}

impl RpcBroker {
    pub(crate) fn new(
        module: String,
        router: RouterSocket,
        bound: BoundPath,
        pool: WorkerPool,
        interpreter: Arc<Interpreter>,
        tasks: TaskGroup,
        status: Arc<watch::Sender<PoolStatus>>,
    ) -> Self {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Self {
            module,
            router,
            _bound: bound,
            pool,
            workers: HashMap::new(),
            reports_tx,
            reports_rx,
            interpreter,
            tasks,
            status,
            pending: None,
        }
    }

    /// Serve until the owning task group is cancelled or a frame violates
    /// the envelope contract.
    pub(crate) async fn run(mut self) -> Result<()> {
        for _ in 0..self.pool.initial() {
            self.spawn_worker()?;
        }
        self.publish_status();

        loop {
            // While a request waits for a worker, further client traffic stays
            // queued in the transport.
            let event = tokio::select! {
                msg = self.router.recv(), if self.pending.is_none() => Event::Client(msg),
                report = self.reports_rx.recv() => Event::Worker(report),
            };

            match event {
                Event::Client(msg) => self.forward(msg?)?,
                Event::Worker(Some((id, report))) => self.backward(id, report).await?,
                Event::Worker(None) => return Ok(()),
            }
            self.publish_status();
        }
    }

    /// client -> worker
    fn forward(&mut self, msg: ZmqMessage) -> Result<()> {
        let mut envelope = msg.into_vec();
        let request = match envelope.pop() {
            Some(request) if envelope.len() >= 2 => request,
            _ => {
                error!(
                    event = %LogEvent::RequestError,
                    module = %self.module,
                    "client envelope too short"
                );
                return Err(RpcError::MalformedFrame(
                    "client message must be [client-id, empty, request]".to_string(),
                ));
            }
        };
        if envelope.last().map_or(true, |delimiter| !delimiter.is_empty()) {
            error!(
                event = %LogEvent::RequestError,
                module = %self.module,
                "missing envelope delimiter"
            );
            return Err(RpcError::MalformedFrame(
                "client envelope must end with an empty delimiter".to_string(),
            ));
        }

        self.dispatch(Pending { envelope, request })
    }

    fn dispatch(&mut self, pending: Pending) -> Result<()> {
        let mut task = WorkerTask::Request {
            envelope: pending.envelope,
            request: pending.request,
        };

        while let Some(id) = self.pool.pop_ready() {
            let Some(inbox) = self.workers.get(&id) else {
                self.pool.forget(id);
                continue;
            };
            match inbox.send(task) {
                Ok(()) => {
                    debug!(
                        event = %LogEvent::RequestForward,
                        module = %self.module,
                        worker = %id,
                        "forwarded request"
                    );
                    return Ok(());
                }
                Err(mpsc::error::SendError(returned)) => {
                    warn!(
                        event = %LogEvent::WorkerExit,
                        module = %self.module,
                        worker = %id,
                        "worker gone, dropping it"
                    );
                    self.workers.remove(&id);
                    self.pool.forget(id);
                    task = returned;
                }
            }
        }

        // Nobody idle: grow if the bound allows, then hold the request until
        // some worker reports in.
        if self.pool.needs_worker() {
            self.spawn_worker()?;
        }
        let WorkerTask::Request { envelope, request } = task else {
            return Ok(());
        };
        self.pending = Some(Pending { envelope, request });
        Ok(())
    }

    /// worker -> client
    async fn backward(&mut self, id: WorkerId, report: WorkerReport) -> Result<()> {
        let replied = match report {
            WorkerReport::Ready => {
                debug!(
                    event = %LogEvent::WorkerReady,
                    module = %self.module,
                    worker = %id,
                    "worker ready"
                );
                false
            }
            WorkerReport::Reply { mut envelope, reply } => {
                envelope.push(reply);
                let message = ZmqMessage::try_from(envelope)
                    .map_err(|e| RpcError::MalformedFrame(e.to_string()))?;
                // The client may have given up and disconnected.
                match self.router.send(message).await {
                    Ok(()) => {
                        debug!(
                            event = %LogEvent::ReplyRoute,
                            module = %self.module,
                            worker = %id,
                            "routed reply"
                        )
                    }
                    Err(e) => {
                        warn!(
                            event = %LogEvent::ReplyRoute,
                            module = %self.module,
                            error = %e,
                            "reply undeliverable"
                        )
                    }
                }
                true
            }
        };

        match self.pool.report(id, replied)? {
            Fate::Destroy => {
                if let Some(inbox) = self.workers.remove(&id) {
                    let _ = inbox.send(WorkerTask::Destroy);
                }
                info!(
                    event = %LogEvent::WorkerDestroy,
                    module = %self.module,
                    worker = %id,
                    live = self.pool.live(),
                    "retired idle worker"
                );
            }
            Fate::Ready => {
                if let Some(pending) = self.pending.take() {
                    self.dispatch(pending)?;
                }
            }
        }
        Ok(())
    }

    fn spawn_worker(&mut self) -> Result<()> {
        let id = Uuid::new_v4();
        self.pool.register(id)?;

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        self.workers.insert(id, inbox_tx);
        let worker = RpcWorker::new(
            id,
            Arc::clone(&self.interpreter),
            inbox_rx,
            self.reports_tx.clone(),
        );
        self.tasks.spawn(worker.run());

        info!(
            event = %LogEvent::WorkerSpawn,
            module = %self.module,
            worker = %id,
            live = self.pool.live(),
            "spawned worker"
        );
        Ok(())
    }

    fn publish_status(&self) {
        let pending = usize::from(self.pending.is_some());
        self.status.send_replace(self.pool.status(pending));
    }
}
