//! Process-wide resource type registration
//!
//! Connections are exposed to the host as resources of a single type,
//! registered once before any connection exists. The registration holds
//! the teardown routine run when the last reference to a connection is
//! released, and counts live connections so start can enforce a limit.

use once_cell::sync::OnceCell;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::connection::{self, ConnectionShared};
use crate::host::{HostValue, ResourceTerm};

/// Module the resource type is registered under
pub const MODULE_NAME: &str = "cnn_bridge";

/// Name of the connection resource type
pub const CONNECTION_TYPE_NAME: &str = "cnn_bridge_connection";

/// Teardown routine run once per connection
pub(crate) type Finalizer = fn(&mut ConnectionShared);

static CONNECTION_TYPE: OnceCell<ResourceType> = OnceCell::new();

/// A registered kind of host resource
pub struct ResourceType {
    module: &'static str,
    name: &'static str,
    finalizer: Finalizer,
    live: AtomicUsize,
}

/// Register the connection resource type. Later calls return the
/// existing registration.
pub fn load() -> &'static ResourceType {
    CONNECTION_TYPE.get_or_init(|| {
        crate::metrics::describe();
        info!(
            module = MODULE_NAME,
            name = CONNECTION_TYPE_NAME,
            "Connection resource type registered"
        );
        ResourceType::new(MODULE_NAME, CONNECTION_TYPE_NAME, connection::destruct)
    })
}

/// The connection resource type, if [`load`] has run
pub fn connection_type() -> Option<&'static ResourceType> {
    CONNECTION_TYPE.get()
}

impl ResourceType {
    pub(crate) const fn new(
        module: &'static str,
        name: &'static str,
        finalizer: Finalizer,
    ) -> Self {
        Self {
            module,
            name,
            finalizer,
            live: AtomicUsize::new(0),
        }
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of resources of this type not yet finalized
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Claim a slot for a new resource, unless `limit` are already live
    pub(crate) fn try_acquire(&'static self, limit: Option<usize>) -> Option<ResourceSlot> {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| match limit {
                Some(max) if live >= max => None,
                _ => Some(live + 1),
            })
            .ok()
            .map(|_| ResourceSlot { rtype: self })
    }

    pub(crate) fn finalize(&self, shared: &mut ConnectionShared) {
        (self.finalizer)(shared);
    }

    /// Wrap `object` in a host reference of this type
    pub fn make_resource<T: Any + Send + Sync>(&'static self, object: T) -> HostValue {
        HostValue::Resource(ResourceTerm::new(self, Arc::new(object)))
    }

    /// Resolve a host value to an object of this resource type.
    ///
    /// Returns `None` when the value is not a resource, belongs to another
    /// resource type, or holds a different Rust type.
    pub fn get_resource<'a, T: Any>(&self, value: &'a HostValue) -> Option<&'a T> {
        let HostValue::Resource(term) = value else {
            return None;
        };
        if !std::ptr::eq(term.resource_type(), self) {
            return None;
        }
        term.object().downcast_ref::<T>()
    }
}

impl std::fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceType")
            .field("module", &self.module)
            .field("name", &self.name)
            .field("live", &self.live())
            .finish()
    }
}

/// A claimed live-resource slot, returned to its type on drop
#[derive(Debug)]
pub(crate) struct ResourceSlot {
    rtype: &'static ResourceType,
}

impl ResourceSlot {
    pub(crate) fn resource_type(&self) -> &'static ResourceType {
        self.rtype
    }
}

impl Drop for ResourceSlot {
    fn drop(&mut self) {
        self.rtype.live.fetch_sub(1, Ordering::SeqCst);
    }
}
