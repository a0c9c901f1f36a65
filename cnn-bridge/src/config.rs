//! Bridge configuration

use bridge_core::{env_opt, env_or};
use serde::Serialize;

use crate::engine::DEFAULT_PROFILE;

/// Longest path accepted by `open`: a 512-byte buffer minus the terminator
pub const MAX_PATHNAME: usize = 511;

/// Slots reserved in a new command queue
pub const INITIAL_QUEUE_CAPACITY: usize = 16;

/// Name given to worker threads
pub const WORKER_THREAD_NAME: &str = "cnn_bridge_connection";

/// Per-connection configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BridgeConfig {
    /// Engine configuration profile used for every `open`
    pub profile: String,

    /// Maximum accepted path length, in characters
    pub max_path_len: usize,

    /// Slots reserved when the command queue is created
    pub initial_queue_capacity: usize,

    /// Depth at which `push` starts rejecting commands; `None` = unbounded
    pub queue_capacity: Option<usize>,

    /// Upper bound on simultaneously live connections; `None` = unbounded
    pub max_connections: Option<usize>,

    /// Worker thread name
    pub thread_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            profile: DEFAULT_PROFILE.to_string(),
            max_path_len: MAX_PATHNAME,
            initial_queue_capacity: INITIAL_QUEUE_CAPACITY,
            queue_capacity: None,
            max_connections: None,
            thread_name: WORKER_THREAD_NAME.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            profile: env_or("CNN_BRIDGE_PROFILE", defaults.profile),
            max_path_len: env_or("CNN_BRIDGE_MAX_PATH_LEN", defaults.max_path_len),
            initial_queue_capacity: env_or(
                "CNN_BRIDGE_INITIAL_QUEUE_CAPACITY",
                defaults.initial_queue_capacity,
            ),
            queue_capacity: env_opt("CNN_BRIDGE_QUEUE_CAPACITY"),
            max_connections: env_opt("CNN_BRIDGE_MAX_CONNECTIONS"),
            thread_name: env_or("CNN_BRIDGE_THREAD_NAME", defaults.thread_name),
        }
    }

    /// Reject new commands once `capacity` are waiting
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }
}
