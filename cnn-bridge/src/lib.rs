//! CNN Bridge - asynchronous command bridge for a blocking inference engine
//!
//! This crate lets a single-threaded, callback-driven host drive a native
//! CNN engine whose calls (model load, release) may block for arbitrary
//! time, without ever blocking the host's own thread.
//!
//! # Architecture
//!
//! Each [`Connection`] owns a [`CommandQueue`] and one dedicated worker
//! thread:
//! - Submitters build a command, push it and return immediately
//! - The worker pops commands in FIFO order and runs them against the
//!   [`Engine`]
//! - The result is posted to the reply address given with the request,
//!   tagged with the caller's correlation token
//! - Dropping the last reference to a connection queues `close` and
//!   `stop`, then joins the worker thread
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cnn_bridge::{registry, BridgeConfig, Connection, Mailbox, ModelFileEngine, Ref};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     registry::load();
//!     let conn = Connection::start(Arc::new(ModelFileEngine), BridgeConfig::default())?;
//!
//!     let mut mailbox = Mailbox::new();
//!     let token = Ref::new();
//!     conn.open(token, &mailbox.pid(), "models/face.sod")?;
//!
//!     let reply = mailbox.recv().await.expect("mailbox closed");
//!     assert_eq!(reply.token, token);
//!     println!("{}", reply.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod host;
pub mod message;
pub mod metrics;
pub mod nif;
pub mod queue;
pub mod registry;
mod workers;

// Re-export main types for convenience
pub use command::{Command, CommandKind};
pub use config::BridgeConfig;
pub use connection::{Connection, ConnectionId};
pub use engine::{Engine, ModelFileEngine, NetHandle, DEFAULT_PROFILE};
pub use error::{NifError, RequestError, StartError};
pub use host::{HostValue, Mailbox, Pid, Ref};
pub use message::{Reply, ReplyError, BRIDGE_TAG};
pub use nif::Nif;
pub use queue::{CommandQueue, QueueError};
