//! Connection handle and lifecycle
//!
//! A [`Connection`] is a cheap, cloneable reference to one bridge
//! instance: a command queue plus the worker thread draining it. Requests
//! are queued and the call returns at once; results arrive later at the
//! reply address given with each request.
//!
//! When the last clone is dropped the registered finalizer shuts the
//! connection down: it queues `close` then `stop`, joins the worker
//! thread and discards anything left in the queue. A live handle always
//! refers to a running connection; the closing and terminated phases are
//! only visible in the logs.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::command::{Command, ReplyTo};
use crate::config::BridgeConfig;
use crate::engine::Engine;
use crate::error::{RequestError, StartError};
use crate::host::{HostValue, Pid, Ref};
use crate::metrics;
use crate::queue::CommandQueue;
use crate::registry::{self, ResourceSlot};
use crate::workers::WorkerLoop;

/// Unique connection identifier
pub type ConnectionId = Uuid;

/// Handle to a running bridge instance
#[derive(Clone)]
pub struct Connection {
    shared: Arc<ConnectionShared>,
}

/// State shared by all clones of a connection
pub(crate) struct ConnectionShared {
    id: ConnectionId,
    queue: Arc<CommandQueue<Command>>,
    worker: Option<JoinHandle<()>>,
    /// Released after the finalizer has run
    slot: ResourceSlot,
}

impl Connection {
    /// Start a connection: claim a resource slot, create the queue and
    /// spawn the worker thread.
    ///
    /// Every failure releases whatever was created before it, so no
    /// partially built connection is ever returned.
    pub fn start(engine: Arc<dyn Engine>, config: BridgeConfig) -> Result<Self, StartError> {
        let rtype = registry::connection_type().ok_or(StartError::NotLoaded)?;
        let slot = rtype
            .try_acquire(config.max_connections)
            .ok_or(StartError::NoMemory)?;

        let queue = CommandQueue::with_capacity(config.initial_queue_capacity, config.queue_capacity)
            .map(Arc::new)
            .map_err(StartError::CommandQueueCreateFailed)?;

        let id = Uuid::new_v4();
        let worker = WorkerLoop::new(id, Arc::clone(&queue), engine, &config);
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker.run())?;

        metrics::record_connection_started();
        info!(
            connection_id = %id,
            profile = %config.profile,
            queue_capacity = ?config.queue_capacity,
            "Connection started"
        );

        Ok(Self {
            shared: Arc::new(ConnectionShared {
                id,
                queue,
                worker: Some(handle),
                slot,
            }),
        })
    }

    /// Queue an `open` of the network at `path`.
    ///
    /// Returns once the command is queued. The outcome is sent to
    /// `reply_to` tagged with `token`.
    pub fn open(&self, token: Ref, reply_to: &Pid, path: &str) -> Result<(), RequestError> {
        let path = HostValue::try_charlist(path).map_err(|_| RequestError::CommandCreateFailed)?;
        self.submit(Command::open(token, reply_to.clone(), path))
    }

    /// Queue an `open` whose path is still a raw host value. The value is
    /// copied; validation happens on the worker thread.
    pub(crate) fn open_value(
        &self,
        token: Ref,
        reply_to: Pid,
        path: &HostValue,
    ) -> Result<(), RequestError> {
        let path = path
            .try_clone()
            .map_err(|_| RequestError::CommandCreateFailed)?;
        self.submit(Command::open(token, reply_to, path))
    }

    /// Queue a `close`. Closing a connection with no open network is not
    /// an error; the reply is always `ok`.
    pub fn close(&self, token: Ref, reply_to: &Pid) -> Result<(), RequestError> {
        self.submit(Command::close(Some(ReplyTo {
            token,
            pid: reply_to.clone(),
        })))
    }

    fn submit(&self, command: Command) -> Result<(), RequestError> {
        let kind = command.kind();
        match self.shared.queue.push(command) {
            Ok(()) => {
                let depth = self.shared.queue.len();
                metrics::record_push(depth);
                debug!(connection_id = %self.shared.id, %kind, depth, "Command queued");
                Ok(())
            }
            Err(e) => {
                metrics::record_push_failure();
                warn!(connection_id = %self.shared.id, %kind, error = %e, "Command push failed");
                Err(e.into())
            }
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Commands waiting for the worker
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Hand the connection to the host as a resource reference
    pub fn into_resource(self) -> HostValue {
        let rtype = self.shared.slot.resource_type();
        rtype.make_resource(self)
    }

    /// Resolve a host resource reference to a connection
    pub fn from_resource(value: &HostValue) -> Option<&Self> {
        registry::connection_type()?.get_resource::<Self>(value)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("pending", &self.pending())
            .finish()
    }
}

impl Drop for ConnectionShared {
    fn drop(&mut self) {
        let rtype = self.slot.resource_type();
        rtype.finalize(self);
    }
}

/// Connection finalizer, registered with the resource type
pub(crate) fn destruct(conn: &mut ConnectionShared) {
    info!(connection_id = %conn.id, "Connection closing");

    // Close before stop so an open network is released before the loop ends
    let queued = conn
        .queue
        .push_internal(Command::close(None))
        .and_then(|()| conn.queue.push_internal(Command::stop()));

    if let Err(e) = queued {
        // The worker holds its own queue reference and outlives this handle
        error!(connection_id = %conn.id, error = %e, "Failed to queue shutdown, detaching worker");
        conn.worker.take();
        metrics::record_connection_stopped();
        return;
    }

    if let Some(worker) = conn.worker.take() {
        if worker.thread().id() == thread::current().id() {
            // Last reference was dropped by a command running on the worker
            // itself. It exits on the stop just queued.
            debug!(connection_id = %conn.id, "Connection released on its worker thread");
            metrics::record_connection_stopped();
            return;
        }
        if worker.join().is_err() {
            error!(connection_id = %conn.id, "Worker thread panicked");
        }
    }

    if conn.queue.has_item() {
        let mut drained = 0usize;
        while let Some(command) = conn.queue.try_pop() {
            debug!(connection_id = %conn.id, kind = %command.kind(), "Discarding queued command");
            drained += 1;
        }
        warn!(connection_id = %conn.id, drained, "Commands left after worker exit");
        metrics::record_drained(drained);
    }

    metrics::record_connection_stopped();
    info!(connection_id = %conn.id, "Connection terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NetHandle;
    use crate::host::Mailbox;
    use crate::message::ReplyError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingEngine {
        created: AtomicUsize,
        destroyed: AtomicUsize,
    }

    impl Engine for CountingEngine {
        fn create(&self, _profile: &str, path: &str) -> Result<NetHandle, String> {
            if path == "missing" {
                return Err("File not found".to_string());
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(NetHandle::new(()))
        }

        fn destroy(&self, _handle: NetHandle) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn start(engine: &Arc<CountingEngine>) -> Connection {
        registry::load();
        let engine: Arc<dyn Engine> = engine.clone();
        Connection::start(engine, BridgeConfig::default()).unwrap()
    }

    #[test]
    fn test_start_and_open() {
        let engine = Arc::new(CountingEngine::default());
        let conn = start(&engine);
        let mut mailbox = Mailbox::new();
        assert_eq!(conn.pending(), 0);

        let token = Ref::new();
        conn.open(token, &mailbox.pid(), "valid_model").unwrap();
        let reply = mailbox.blocking_recv().unwrap();
        assert_eq!(reply.token, token);
        assert!(reply.is_ok());
    }

    #[test]
    fn test_empty_path_is_invalid_filename() {
        let engine = Arc::new(CountingEngine::default());
        let conn = start(&engine);
        let mut mailbox = Mailbox::new();

        conn.open(Ref::new(), &mailbox.pid(), "").unwrap();
        assert_eq!(
            mailbox.blocking_recv().unwrap().result,
            Err(ReplyError::InvalidFilename)
        );
        assert_eq!(engine.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_releases_open_network_once() {
        let engine = Arc::new(CountingEngine::default());
        let conn = start(&engine);
        let mut mailbox = Mailbox::new();

        conn.open(Ref::new(), &mailbox.pid(), "valid_model").unwrap();
        assert!(mailbox.blocking_recv().unwrap().is_ok());

        drop(conn);
        assert_eq!(engine.created.load(Ordering::SeqCst), 1);
        assert_eq!(engine.destroyed.load(Ordering::SeqCst), 1);
        // Teardown close has no reply address
        assert!(mailbox.try_recv().is_none());
    }

    #[test]
    fn test_drop_waits_for_queued_commands() {
        let engine = Arc::new(CountingEngine::default());
        let conn = start(&engine);
        let mut mailbox = Mailbox::new();

        for _ in 0..5 {
            conn.open(Ref::new(), &mailbox.pid(), "valid_model").unwrap();
        }
        drop(conn);

        // Everything queued before the drop ran and replied
        for _ in 0..5 {
            assert!(mailbox.try_recv().unwrap().is_ok());
        }
        assert_eq!(engine.created.load(Ordering::SeqCst), 5);
        assert_eq!(engine.destroyed.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_drop_without_network_finishes() {
        let engine = Arc::new(CountingEngine::default());
        let conn = start(&engine);
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            drop(conn);
            tx.send(()).unwrap();
        });

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(engine.destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clones_share_one_worker() {
        let engine = Arc::new(CountingEngine::default());
        let conn = start(&engine);
        let clone = conn.clone();
        let mut mailbox = Mailbox::new();

        assert_eq!(conn.id(), clone.id());
        drop(conn);

        // The remaining clone keeps the connection running
        clone.open(Ref::new(), &mailbox.pid(), "valid_model").unwrap();
        assert!(mailbox.blocking_recv().unwrap().is_ok());
    }

    #[test]
    fn test_native_error_text() {
        let engine = Arc::new(CountingEngine::default());
        let conn = start(&engine);
        let mut mailbox = Mailbox::new();

        conn.open(Ref::new(), &mailbox.pid(), "missing").unwrap();
        assert_eq!(
            mailbox.blocking_recv().unwrap().result,
            Err(ReplyError::Native("File not found".to_string()))
        );
    }

    #[test]
    fn test_connection_limit() {
        registry::load();
        let engine: Arc<dyn Engine> = Arc::new(CountingEngine::default());
        let config = BridgeConfig::default().with_max_connections(0);

        let err = Connection::start(engine, config).unwrap_err();
        assert!(matches!(err, StartError::NoMemory));
        assert_eq!(err.as_atom(), "no_memory");
    }

    #[test]
    fn test_resource_round_trip() {
        let engine = Arc::new(CountingEngine::default());
        let conn = start(&engine);
        let id = conn.id();

        let resource = conn.into_resource();
        let resolved = Connection::from_resource(&resource).unwrap();
        assert_eq!(resolved.id(), id);
        assert!(Connection::from_resource(&HostValue::Int(3)).is_none());
    }
}
