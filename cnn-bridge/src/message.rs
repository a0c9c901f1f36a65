//! Reply messages posted by the worker loop
//!
//! Every command except `stop` produces exactly one [`Reply`], sent to the
//! command's reply address. The reply carries the bridge tag and the
//! caller's correlation token so the receiver can match it to a request.

use serde::Serialize;
use thiserror::Error;

use crate::host::Ref;

/// Tag identifying replies produced by this bridge
pub const BRIDGE_TAG: &str = "cnn_bridge";

/// Errors reported asynchronously, after a command was queued
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    /// Path payload was empty, too long or not a Latin-1 character list
    #[error("invalid_filename")]
    InvalidFilename,

    /// Error text produced by the native engine, forwarded verbatim
    #[error("{0}")]
    Native(String),

    /// Command tag with no dispatch entry
    #[error("invalid_command")]
    InvalidCommand,
}

impl ReplyError {
    /// Short machine-readable reason
    pub fn reason(&self) -> &str {
        match self {
            Self::InvalidFilename => "invalid_filename",
            Self::Native(text) => text,
            Self::InvalidCommand => "invalid_command",
        }
    }
}

/// Completion message: `(bridge, token, result)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub bridge: &'static str,
    pub token: Ref,
    pub result: Result<(), ReplyError>,
}

/// JSON shape of a reply
#[derive(Serialize)]
struct ReplyRecord<'a> {
    bridge: &'a str,
    token: Ref,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Reply {
    pub fn new(token: Ref, result: Result<(), ReplyError>) -> Self {
        Self {
            bridge: BRIDGE_TAG,
            token,
            result,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Render the reply as a single JSON object
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let record = ReplyRecord {
            bridge: self.bridge,
            token: self.token,
            status: if self.is_ok() { "ok" } else { "error" },
            error: self.result.as_ref().err().map(ReplyError::reason),
        };
        serde_json::to_string(&record)
    }
}
