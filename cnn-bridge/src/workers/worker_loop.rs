//! Connection worker loop
//!
//! Each connection runs one `WorkerLoop` on a dedicated OS thread. The
//! loop is the only code that calls into the engine, and it owns the
//! loaded network outright, so the handle is never visible to submitters.
//!
//! # States
//!
//! - waiting: parked in `CommandQueue::pop`
//! - dispatching: executing one command, then replying
//! - terminated: a `stop` command was popped
//!
//! A failing command is reported to its own reply address and does not
//! affect the commands after it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandKind, Payload};
use crate::config::BridgeConfig;
use crate::connection::ConnectionId;
use crate::engine::{Engine, NetHandle};
use crate::host::HostValue;
use crate::message::{Reply, ReplyError};
use crate::metrics;
use crate::queue::CommandQueue;

/// Worker state moved onto the connection thread
pub struct WorkerLoop {
    connection_id: ConnectionId,
    queue: Arc<CommandQueue<Command>>,
    engine: Arc<dyn Engine>,
    profile: String,
    max_path_len: usize,
    /// Network loaded by the last successful `open`
    net: Option<NetHandle>,
}

impl WorkerLoop {
    pub(crate) fn new(
        connection_id: ConnectionId,
        queue: Arc<CommandQueue<Command>>,
        engine: Arc<dyn Engine>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            connection_id,
            queue,
            engine,
            profile: config.profile.clone(),
            max_path_len: config.max_path_len,
            net: None,
        }
    }

    /// Process commands until `stop` is popped
    pub(crate) fn run(mut self) {
        debug!(connection_id = %self.connection_id, "Worker loop started");

        loop {
            let command = self.queue.pop();
            if command.kind() == CommandKind::Stop {
                break;
            }
            self.dispatch(command);
        }

        info!(connection_id = %self.connection_id, "Worker loop stopped");
    }

    /// Execute one command and post its reply
    fn dispatch(&mut self, command: Command) {
        let started = Instant::now();
        let (kind, reply_to, payload) = command.into_parts();
        debug!(connection_id = %self.connection_id, %kind, "Dispatching command");

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.evaluate(kind, payload)))
            .unwrap_or_else(|_| {
                error!(connection_id = %self.connection_id, %kind, "Engine panicked");
                Err(ReplyError::Native("native engine panicked".to_string()))
            });
        metrics::record_command(kind.as_str(), started.elapsed());

        if let Some(reply_to) = reply_to {
            metrics::record_reply(result.is_ok());
            reply_to.pid.send(Reply::new(reply_to.token, result));
        }
    }

    fn evaluate(&mut self, kind: CommandKind, payload: Payload) -> Result<(), ReplyError> {
        match (kind, payload) {
            (CommandKind::Open, Payload::Path(path)) => self.net_open(&path),
            (CommandKind::Close, _) => {
                self.net_close();
                Ok(())
            }
            _ => Err(ReplyError::InvalidCommand),
        }
    }

    fn net_open(&mut self, path: &HostValue) -> Result<(), ReplyError> {
        let Some(filename) = path
            .latin1_string(self.max_path_len)
            .filter(|name| !name.is_empty())
        else {
            return Err(ReplyError::InvalidFilename);
        };

        // Opening again replaces the current network
        self.net_close();

        match self.engine.create(&self.profile, &filename) {
            Ok(net) => {
                info!(connection_id = %self.connection_id, path = %filename, "Network opened");
                self.net = Some(net);
                Ok(())
            }
            Err(text) => {
                warn!(connection_id = %self.connection_id, path = %filename, error = %text, "Network open failed");
                Err(ReplyError::Native(text))
            }
        }
    }

    fn net_close(&mut self) {
        if let Some(net) = self.net.take() {
            self.engine.destroy(net);
            debug!(connection_id = %self.connection_id, "Network closed");
        }
    }
}
