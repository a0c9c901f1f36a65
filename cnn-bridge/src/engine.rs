//! Native inference engine capability
//!
//! The bridge consumes the engine through two blocking operations,
//! `create` and `destroy`. Both only ever run on a connection's worker
//! thread.

use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// Configuration profile passed to `create` unless configured otherwise
pub const DEFAULT_PROFILE: &str = ":fast";

/// Opaque handle to a loaded network
pub struct NetHandle {
    inner: Box<dyn Any + Send>,
}

impl NetHandle {
    pub fn new<T: Any + Send>(net: T) -> Self {
        Self {
            inner: Box::new(net),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    /// Recover the engine's own type, or give the handle back on mismatch
    pub fn into_inner<T: Any>(self) -> Result<Box<T>, Self> {
        self.inner.downcast().map_err(|inner| Self { inner })
    }
}

impl fmt::Debug for NetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetHandle").finish_non_exhaustive()
    }
}

/// Blocking network loader
pub trait Engine: Send + Sync {
    /// Load the network at `path` using the named configuration profile.
    /// The error string is forwarded to the requester verbatim.
    fn create(&self, profile: &str, path: &str) -> Result<NetHandle, String>;

    /// Release a handle returned by `create`
    fn destroy(&self, handle: NetHandle);
}

/// Profiles understood by [`ModelFileEngine`]
pub const KNOWN_PROFILES: &[&str] = &[":fast", ":full", ":tiny"];

/// Model loaded by [`ModelFileEngine`]
#[derive(Debug)]
pub struct LoadedModel {
    pub path: PathBuf,
    pub profile: String,
    pub weights: Vec<u8>,
}

/// Engine that loads model files from disk without running them.
///
/// Lets the bridge be exercised end to end where no native engine is
/// linked: a missing, unreadable or empty file fails the way a real
/// loader would.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelFileEngine;

impl Engine for ModelFileEngine {
    fn create(&self, profile: &str, path: &str) -> Result<NetHandle, String> {
        if !KNOWN_PROFILES.contains(&profile) {
            return Err(format!("Unknown network configuration '{profile}'"));
        }

        let path = PathBuf::from(path);
        let metadata = std::fs::metadata(&path)
            .map_err(|e| format!("Cannot open model file '{}': {e}", path.display()))?;
        if !metadata.is_file() {
            return Err(format!("'{}' is not a regular file", path.display()));
        }

        let weights = std::fs::read(&path)
            .map_err(|e| format!("Cannot read model file '{}': {e}", path.display()))?;
        if weights.is_empty() {
            return Err(format!("Model file '{}' is empty", path.display()));
        }

        debug!(path = %path.display(), profile, bytes = weights.len(), "Model loaded");
        Ok(NetHandle::new(LoadedModel {
            path,
            profile: profile.to_string(),
            weights,
        }))
    }

    fn destroy(&self, handle: NetHandle) {
        if let Some(model) = handle.downcast_ref::<LoadedModel>() {
            debug!(path = %model.path.display(), "Model released");
        }
    }
}
