//! Commands carried from submitters to the worker loop
//!
//! A command owns everything it needs. Payloads are copied out of the
//! caller's values when the command is built, so the submitter is free to
//! return to the host before the command runs.

use std::fmt;

use crate::host::{HostValue, Pid, Ref};

/// Requested operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// No dispatch entry; answered with `invalid_command`
    Unknown,
    /// Ends the worker loop without a reply
    Stop,
    Open,
    Close,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Stop => "stop",
            Self::Open => "open",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and under which token the result of a command is reported
#[derive(Debug, Clone)]
pub struct ReplyTo {
    pub token: Ref,
    pub pid: Pid,
}

/// Operation-specific data
#[derive(Debug)]
pub enum Payload {
    None,
    /// Model path as passed by the host, not yet validated
    Path(HostValue),
}

/// A single unit of work for the worker loop
#[derive(Debug)]
pub struct Command {
    kind: CommandKind,
    reply_to: Option<ReplyTo>,
    payload: Payload,
}

impl Command {
    pub(crate) fn new(kind: CommandKind, reply_to: Option<ReplyTo>, payload: Payload) -> Self {
        Self {
            kind,
            reply_to,
            payload,
        }
    }

    /// Open request; `path` must already be an owned copy
    pub(crate) fn open(token: Ref, pid: Pid, path: HostValue) -> Self {
        Self::new(
            CommandKind::Open,
            Some(ReplyTo { token, pid }),
            Payload::Path(path),
        )
    }

    /// Close request. Teardown closes pass `None` and get no reply.
    pub(crate) fn close(reply_to: Option<ReplyTo>) -> Self {
        Self::new(CommandKind::Close, reply_to, Payload::None)
    }

    pub(crate) fn stop() -> Self {
        Self::new(CommandKind::Stop, None, Payload::None)
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn reply_to(&self) -> Option<&ReplyTo> {
        self.reply_to.as_ref()
    }

    pub(crate) fn into_parts(self) -> (CommandKind, Option<ReplyTo>, Payload) {
        (self.kind, self.reply_to, self.payload)
    }
}
