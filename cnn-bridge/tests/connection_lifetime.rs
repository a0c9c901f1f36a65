//! Connection lifetime tests
//!
//! These read the process-wide live-connection count, so they run in their
//! own test binary and take `SERIAL` to keep each other out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use cnn_bridge::{
    registry, BridgeConfig, Engine, HostValue, Mailbox, NetHandle, Nif, NifError, Ref, Reply,
    ReplyError, StartError,
};

const WAIT_LIMIT: Duration = Duration::from_secs(5);

static SERIAL: Mutex<()> = Mutex::new(());

struct AcceptAll;

impl Engine for AcceptAll {
    fn create(&self, _profile: &str, path: &str) -> Result<NetHandle, String> {
        Ok(NetHandle::new(path.to_string()))
    }

    fn destroy(&self, _handle: NetHandle) {}
}

/// Engine whose `create` blocks until the test opens the gate
struct GatedEngine {
    gate: Mutex<mpsc::Receiver<()>>,
    entered: AtomicUsize,
    destroyed: AtomicUsize,
}

impl Engine for GatedEngine {
    fn create(&self, _profile: &str, path: &str) -> Result<NetHandle, String> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.gate
            .lock()
            .unwrap()
            .recv()
            .map_err(|e| e.to_string())?;
        Ok(NetHandle::new(path.to_string()))
    }

    fn destroy(&self, _handle: NetHandle) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_LIMIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

fn recv_within(mailbox: &mut Mailbox) -> Reply {
    let deadline = Instant::now() + WAIT_LIMIT;
    loop {
        if let Some(reply) = mailbox.try_recv() {
            return reply;
        }
        assert!(Instant::now() < deadline, "no reply within {WAIT_LIMIT:?}");
        thread::sleep(Duration::from_millis(1));
    }
}

fn live() -> usize {
    registry::connection_type().unwrap().live()
}

#[test]
fn test_dropped_connection_frees_its_slot() {
    let _serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    registry::load();
    let before = live();

    let nif = Nif::load(
        Arc::new(AcceptAll),
        BridgeConfig::default().with_max_connections(before + 1),
    );

    let first = nif.call("start", &[]).unwrap();
    assert_eq!(live(), before + 1);

    let err = nif.call("start", &[]).unwrap_err();
    assert!(matches!(err, NifError::Start(StartError::NoMemory)));
    assert_eq!(err.as_atom(), "no_memory");
    assert_eq!(live(), before + 1);

    // Teardown without an open network returns the count right away
    drop(first);
    assert_eq!(live(), before);

    let again = nif.call("start", &[]).unwrap();
    assert_eq!(live(), before + 1);
    drop(again);
    assert_eq!(live(), before);
}

#[test]
fn test_last_reference_released_on_worker_thread() {
    let _serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    let (release, gate) = mpsc::channel();
    let engine = Arc::new(GatedEngine {
        gate: Mutex::new(gate),
        entered: AtomicUsize::new(0),
        destroyed: AtomicUsize::new(0),
    });
    let nif = Nif::load(engine.clone(), BridgeConfig::default());
    let before = live();

    let conn = nif.call("start", &[]).unwrap();
    let mut mailbox = Mailbox::new();

    // Park the worker inside the engine
    let loading = Ref::new();
    nif.call(
        "net_open",
        &[
            conn.clone(),
            HostValue::Ref(loading),
            HostValue::Pid(mailbox.pid()),
            HostValue::charlist("gated_model"),
        ],
    )
    .unwrap();
    assert!(wait_until(|| engine.entered.load(Ordering::SeqCst) == 1));

    // The queued path holds the only other reference to the connection
    let self_ref = Ref::new();
    nif.call(
        "net_open",
        &[
            conn.clone(),
            HostValue::Ref(self_ref),
            HostValue::Pid(mailbox.pid()),
            HostValue::List(vec![conn.clone()]),
        ],
    )
    .unwrap();
    drop(conn);
    assert_eq!(live(), before + 1);

    release.send(()).unwrap();

    let reply = recv_within(&mut mailbox);
    assert_eq!(reply.token, loading);
    assert!(reply.is_ok());

    let reply = recv_within(&mut mailbox);
    assert_eq!(reply.token, self_ref);
    assert_eq!(reply.result, Err(ReplyError::InvalidFilename));

    // Teardown ran on the worker, closed the loaded network and let it exit
    assert!(wait_until(|| live() == before), "teardown did not finish");
    assert!(wait_until(|| engine.destroyed.load(Ordering::SeqCst) == 1));
}
