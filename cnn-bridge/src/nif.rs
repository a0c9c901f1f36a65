//! Dynamic host call surface
//!
//! Hosts that pass loosely typed values call the bridge by function name
//! and arity. Arguments are validated here, before any command is built:
//!
//! | function      | arguments                        |
//! |---------------|----------------------------------|
//! | `start/0`     |                                  |
//! | `net_open/4`  | connection, ref, pid, path list  |
//! | `net_close/3` | connection, ref, pid             |
//!
//! Validation errors are returned synchronously. Everything that happens
//! after a command is queued is reported through the reply message.

use std::sync::Arc;
use tracing::debug;

use crate::config::BridgeConfig;
use crate::connection::Connection;
use crate::engine::Engine;
use crate::error::NifError;
use crate::host::{HostValue, Pid, Ref};
use crate::registry::{self, ResourceType};

type NifFn = fn(&Nif, &[HostValue]) -> Result<HostValue, NifError>;

/// Entry in the function table
pub struct NifFunc {
    pub name: &'static str,
    pub arity: usize,
    fun: NifFn,
}

/// Functions exported to the host
pub static NIF_FUNCS: &[NifFunc] = &[
    NifFunc {
        name: "start",
        arity: 0,
        fun: start,
    },
    NifFunc {
        name: "net_open",
        arity: 4,
        fun: net_open,
    },
    NifFunc {
        name: "net_close",
        arity: 3,
        fun: net_close,
    },
];

/// Loaded bridge library: engine and configuration shared by every
/// connection started through it.
pub struct Nif {
    engine: Arc<dyn Engine>,
    config: BridgeConfig,
    rtype: &'static ResourceType,
}

impl Nif {
    /// Register the connection resource type and bind the engine
    pub fn load(engine: Arc<dyn Engine>, config: BridgeConfig) -> Self {
        let rtype = registry::load();
        debug!(functions = NIF_FUNCS.len(), "Bridge library loaded");
        Self {
            engine,
            config,
            rtype,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Call an exported function. Unknown names and arities are `badarg`.
    pub fn call(&self, name: &str, args: &[HostValue]) -> Result<HostValue, NifError> {
        let func = NIF_FUNCS
            .iter()
            .find(|f| f.name == name && f.arity == args.len())
            .ok_or(NifError::BadArg)?;
        (func.fun)(self, args)
    }

    fn connection<'a>(&self, value: &'a HostValue) -> Result<&'a Connection, NifError> {
        self.rtype
            .get_resource::<Connection>(value)
            .ok_or(NifError::BadArg)
    }
}

fn start(nif: &Nif, _args: &[HostValue]) -> Result<HostValue, NifError> {
    let conn = Connection::start(Arc::clone(&nif.engine), nif.config.clone())?;
    Ok(conn.into_resource())
}

/// Common validation for requests addressed to a connection
fn request_target<'a>(
    nif: &Nif,
    conn: &'a HostValue,
    token: &HostValue,
    pid: &HostValue,
) -> Result<(&'a Connection, Ref, Pid), NifError> {
    let conn = nif.connection(conn)?;
    let HostValue::Ref(token) = token else {
        return Err(NifError::InvalidRef);
    };
    // Remote processes cannot be addressed from the worker thread
    let HostValue::Pid(pid) = pid else {
        return Err(NifError::InvalidPid);
    };
    Ok((conn, *token, pid.clone()))
}

fn net_open(nif: &Nif, args: &[HostValue]) -> Result<HostValue, NifError> {
    let [conn, token, pid, path] = args else {
        return Err(NifError::BadArg);
    };
    let (conn, token, pid) = request_target(nif, conn, token, pid)?;

    // Only the shape is checked here; the contents are validated when the
    // command runs.
    if !path.is_list() {
        return Err(NifError::InvalidArg);
    }

    conn.open_value(token, pid, path)?;
    Ok(HostValue::atom("ok"))
}

fn net_close(nif: &Nif, args: &[HostValue]) -> Result<HostValue, NifError> {
    let [conn, token, pid] = args else {
        return Err(NifError::BadArg);
    };
    let (conn, token, pid) = request_target(nif, conn, token, pid)?;

    conn.close(token, &pid)?;
    Ok(HostValue::atom("ok"))
}
