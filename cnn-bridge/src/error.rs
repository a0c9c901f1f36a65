//! Synchronous error types
//!
//! Errors here are returned directly from the call that detected them.
//! Failures that happen on the worker thread are only reported through
//! [`crate::message::ReplyError`].

use thiserror::Error;

use crate::queue::QueueError;

/// Errors that can occur while starting a connection
#[derive(Error, Debug)]
pub enum StartError {
    #[error("connection resource type is not registered")]
    NotLoaded,

    #[error("no memory for a new connection resource")]
    NoMemory,

    #[error("failed to create command queue: {0}")]
    CommandQueueCreateFailed(QueueError),

    #[error("failed to spawn worker thread: {0}")]
    ThreadCreateFailed(#[from] std::io::Error),
}

impl StartError {
    /// Reason reported to the host
    pub fn as_atom(&self) -> &'static str {
        match self {
            Self::NotLoaded | Self::NoMemory => "no_memory",
            Self::CommandQueueCreateFailed(_) => "command_queue_create_failed",
            Self::ThreadCreateFailed(_) => "thread_create_failed",
        }
    }
}

/// Errors that can occur while submitting a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("failed to allocate command")]
    CommandCreateFailed,

    #[error("failed to push command: {0}")]
    CommandPushFailed(#[from] QueueError),
}

impl RequestError {
    /// Reason reported to the host
    pub fn as_atom(&self) -> &'static str {
        match self {
            Self::CommandCreateFailed => "command_create_failed",
            Self::CommandPushFailed(_) => "command_push_failed",
        }
    }
}

/// Errors returned by the dynamic host call surface
#[derive(Error, Debug)]
pub enum NifError {
    /// Unknown function, wrong arity, or a first argument that is not a
    /// connection resource
    #[error("bad argument")]
    BadArg,

    #[error("invalid_ref")]
    InvalidRef,

    #[error("invalid_pid")]
    InvalidPid,

    #[error("invalid_arg")]
    InvalidArg,

    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Request(#[from] RequestError),
}

impl NifError {
    /// Reason reported to the host
    pub fn as_atom(&self) -> &'static str {
        match self {
            Self::BadArg => "badarg",
            Self::InvalidRef => "invalid_ref",
            Self::InvalidPid => "invalid_pid",
            Self::InvalidArg => "invalid_arg",
            Self::Start(e) => e.as_atom(),
            Self::Request(e) => e.as_atom(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_error_atoms() {
        assert_eq!(StartError::NoMemory.as_atom(), "no_memory");
        assert_eq!(
            StartError::CommandQueueCreateFailed(QueueError::AllocationFailed).as_atom(),
            "command_queue_create_failed"
        );

        let spawn_err = StartError::from(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "no threads left",
        ));
        assert_eq!(spawn_err.as_atom(), "thread_create_failed");
        assert!(spawn_err.to_string().contains("no threads left"));
    }

    #[test]
    fn test_request_error_atoms() {
        let push = RequestError::from(QueueError::Full { capacity: 1 });
        assert_eq!(push.as_atom(), "command_push_failed");
        assert_eq!(
            RequestError::CommandCreateFailed.as_atom(),
            "command_create_failed"
        );
    }

    #[test]
    fn test_nif_error_atoms() {
        assert_eq!(NifError::BadArg.as_atom(), "badarg");
        assert_eq!(NifError::InvalidRef.as_atom(), "invalid_ref");
        assert_eq!(NifError::InvalidPid.as_atom(), "invalid_pid");
        assert_eq!(NifError::InvalidArg.as_atom(), "invalid_arg");
        assert_eq!(
            NifError::from(RequestError::CommandCreateFailed).as_atom(),
            "command_create_failed"
        );
        assert_eq!(NifError::from(StartError::NoMemory).as_atom(), "no_memory");
    }
}
