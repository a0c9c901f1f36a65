//! Host runtime surface
//!
//! The bridge only touches the host through a narrow surface:
//! - [`Ref`]: opaque correlation token chosen by the submitter
//! - [`Pid`]: local process address with fire-and-forget `send`
//! - [`Mailbox`]: the receiving end of a process address
//! - [`HostValue`]: loosely typed argument values passed by host calls
//!
//! Mailboxes are backed by unbounded tokio channels so the worker thread
//! can post replies without an async context, while host tasks await them.

use serde::Serialize;
use std::any::Any;
use std::collections::TryReserveError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::message::Reply;
use crate::registry::ResourceType;

/// Correlation token, unique per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Ref(Uuid);

impl Ref {
    /// Make a fresh, unique reference
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Ref {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Global process counter for generating unique process ids
static PROCESS_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Address of a local host process
#[derive(Clone)]
pub struct Pid {
    id: u64,
    tx: mpsc::UnboundedSender<Reply>,
}

impl Pid {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the owning mailbox still exists
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Deliver a reply. Fire-and-forget: a reply for a process that has
    /// gone away is dropped.
    pub fn send(&self, reply: Reply) {
        if self.tx.send(reply).is_err() {
            debug!(pid = self.id, "Reply dropped, mailbox closed");
        }
    }
}

impl PartialEq for Pid {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Pid {}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.id)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid:{}", self.id)
    }
}

/// Receiving side of a host process
pub struct Mailbox {
    pid: Pid,
    rx: mpsc::UnboundedReceiver<Reply>,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    /// Create a mailbox with a freshly allocated process id
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = PROCESS_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            pid: Pid { id, tx },
            rx,
        }
    }

    /// Address replies should be sent to
    pub fn pid(&self) -> Pid {
        self.pid.clone()
    }

    /// Wait for the next reply.
    ///
    /// The mailbox holds its own address, so this only returns `None` if
    /// the channel was explicitly closed.
    pub async fn recv(&mut self) -> Option<Reply> {
        self.rx.recv().await
    }

    /// Take a reply if one is already waiting
    pub fn try_recv(&mut self) -> Option<Reply> {
        self.rx.try_recv().ok()
    }

    /// Block the current (non-async) thread until a reply arrives
    pub fn blocking_recv(&mut self) -> Option<Reply> {
        self.rx.blocking_recv()
    }
}

/// Host reference to a resource object of a registered type
#[derive(Clone)]
pub struct ResourceTerm {
    rtype: &'static ResourceType,
    object: Arc<dyn Any + Send + Sync>,
}

impl ResourceTerm {
    pub(crate) fn new(rtype: &'static ResourceType, object: Arc<dyn Any + Send + Sync>) -> Self {
        Self { rtype, object }
    }

    pub fn resource_type(&self) -> &'static ResourceType {
        self.rtype
    }

    pub(crate) fn object(&self) -> &(dyn Any + Send + Sync) {
        self.object.as_ref()
    }
}

impl PartialEq for ResourceTerm {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}

impl fmt::Debug for ResourceTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTerm")
            .field("type", &self.rtype.name())
            .finish_non_exhaustive()
    }
}

/// Loosely typed value passed across the host call boundary
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Atom(String),
    Int(i64),
    Binary(Vec<u8>),
    List(Vec<HostValue>),
    Tuple(Vec<HostValue>),
    Ref(Ref),
    Pid(Pid),
    /// Process living on another node; cannot receive replies from here
    RemotePid { node: String, id: u64 },
    Resource(ResourceTerm),
}

impl HostValue {
    pub fn atom(name: &str) -> Self {
        Self::Atom(name.to_string())
    }

    /// Character list holding the code points of `text`
    pub fn charlist(text: &str) -> Self {
        Self::List(text.chars().map(|c| Self::Int(i64::from(u32::from(c)))).collect())
    }

    /// Fallible variant of [`HostValue::charlist`]
    pub fn try_charlist(text: &str) -> Result<Self, TryReserveError> {
        let mut items = Vec::new();
        items.try_reserve_exact(text.chars().count())?;
        items.extend(text.chars().map(|c| Self::Int(i64::from(u32::from(c)))));
        Ok(Self::List(items))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Deep copy that reports allocation failure instead of aborting.
    ///
    /// Resource and process references are shared, not duplicated.
    pub fn try_clone(&self) -> Result<Self, TryReserveError> {
        Ok(match self {
            Self::Atom(name) => {
                let mut copy = String::new();
                copy.try_reserve_exact(name.len())?;
                copy.push_str(name);
                Self::Atom(copy)
            }
            Self::Int(value) => Self::Int(*value),
            Self::Binary(bytes) => {
                let mut copy = Vec::new();
                copy.try_reserve_exact(bytes.len())?;
                copy.extend_from_slice(bytes);
                Self::Binary(copy)
            }
            Self::List(items) => Self::List(try_clone_all(items)?),
            Self::Tuple(items) => Self::Tuple(try_clone_all(items)?),
            Self::Ref(r) => Self::Ref(*r),
            Self::Pid(pid) => Self::Pid(pid.clone()),
            Self::RemotePid { node, id } => Self::RemotePid {
                node: node.clone(),
                id: *id,
            },
            Self::Resource(term) => Self::Resource(term.clone()),
        })
    }

    /// Extract a Latin-1 string from a character list of at most
    /// `max_len` characters.
    ///
    /// Returns `None` for anything that is not a list, for lists holding
    /// values outside `0..=255`, and for lists longer than `max_len`.
    pub fn latin1_string(&self, max_len: usize) -> Option<String> {
        let Self::List(items) = self else {
            return None;
        };
        if items.len() > max_len {
            return None;
        }

        items
            .iter()
            .map(|item| match item {
                Self::Int(code) => u8::try_from(*code).ok().map(char::from),
                _ => None,
            })
            .collect()
    }
}

fn try_clone_all(items: &[HostValue]) -> Result<Vec<HostValue>, TryReserveError> {
    let mut copy = Vec::new();
    copy.try_reserve_exact(items.len())?;
    for item in items {
        copy.push(item.try_clone()?);
    }
    Ok(copy)
}
