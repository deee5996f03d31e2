//! The connection pool, per spec §4.9: admission, health checking, idle
//! eviction, FIFO borrower fairness, and cancellation-safe borrow/return.
//!
//! The teacher's `tokio::pool::Pool` (`crossbeam_queue::ArrayQueue` of idle
//! `Conn`s, a reset task spawned on check-in) only covers the idle-list
//! half of spec §4.9; this module adds the node state machine, pending
//! count, wait group, FIFO waiter fairness, health-ping scheduling, and
//! timeout/cancellation handling the distilled spec names but the teacher
//! doesn't implement, grounded additionally in `original_source`'s
//! `detail/connection_pool/idle_connection_list.hpp` (LIFO idle list) and
//! `wait_group.hpp` (via [`wait_group::WaitGroup`]).
//!
//! **Borrow/return concurrency design** (an Open Question resolution, see
//! DESIGN.md): rather than a single idle-list `Mutex` that a waiter
//! actively re-polls, an idle connection is handed to the oldest queued
//! waiter directly through a one-shot channel the instant it becomes
//! available (see [`admit_locked`]), which is what gives borrowers FIFO
//! order "for free" instead of requiring a fair lock. A borrower that times
//! out simply stops polling its receiver; if a connection is delivered to
//! it anyway in the race between the timer and the deliverer, the
//! `Sender::send` call observes the receiver is gone and hands the
//! connection back to [`admit_locked`] instead — so a timed-out/cancelled
//! wait can never silently drop a live connection.

pub mod wait_group;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, Notify};

use crate::conn::Conn;
use crate::engine::Transport;
use crate::error::{Error, Result};
use crate::opts::{ConnectOpts, PoolConfig};
use wait_group::WaitGroup;

/// How a pool opens a brand-new transport for a connecting node. Split out
/// from [`Transport`] because opening a socket (resolving `opts.address`)
/// is itself an external collaborator per spec §1, not part of the sans-I/O
/// core — the `tokio` feature's [`crate::tokio::TokioTransport`] is the one
/// concrete implementation this crate ships.
///
/// Spelled with an explicit `-> impl Future<...> + Send` return, like
/// [`Transport`], so the pool's background tasks (spawned with
/// `tokio::spawn`, which requires `Send + 'static` futures) can be generic
/// over `T: Connect` at all.
pub trait Connect: Transport + Sized + Send + 'static {
    fn open(opts: &ConnectOpts) -> impl Future<Output = Result<Self>> + Send;
}

struct IdleSlot<T> {
    conn: Conn<T>,
    since: Instant,
}

struct State<T: Transport> {
    idle: VecDeque<IdleSlot<T>>,
    /// Count of node "slots" that exist: connecting + idle + in_use,
    /// capped at `max_size`. A slot is retired only when the pool is
    /// cancelled; a fatal error recycles the slot into `connecting` rather
    /// than freeing it, per spec §4.9's node state machine.
    total: usize,
    /// FIFO queue of borrowers waiting for a connection, per spec §4.9
    /// item 3's fairness invariant.
    waiters: VecDeque<oneshot::Sender<Result<Conn<T>>>>,
    cancelled: bool,
}

enum Take<T: Transport> {
    Ready(Conn<T>),
    Pending {
        rx: oneshot::Receiver<Result<Conn<T>>>,
        spawn_new: bool,
    },
}

struct Shared<T: Transport> {
    opts: ConnectOpts,
    config: PoolConfig,
    state: Mutex<State<T>>,
    wait_group: Arc<WaitGroup>,
    returns_tx: mpsc::UnboundedSender<Conn<T>>,
    cancel_notify: Notify,
    cancelled: AtomicBool,
    last_connect_error: Mutex<Option<String>>,
}

/// Admits `conn` into the pool: handed directly to the oldest queued
/// waiter if one exists, otherwise pushed onto the idle list. See the
/// module doc comment for why this is what gives borrowers FIFO fairness.
fn admit_locked<T: Transport>(state: &mut State<T>, mut conn: Conn<T>) {
    loop {
        match state.waiters.pop_front() {
            Some(tx) => match tx.send(Ok(conn)) {
                Ok(()) => return,
                Err(Ok(returned)) => {
                    conn = returned;
                    continue;
                }
                Err(Err(_)) => unreachable!("admit_locked only ever sends Ok"),
            },
            None => {
                state.idle.push_back(IdleSlot { conn, since: Instant::now() });
                return;
            }
        }
    }
}

impl<T: Connect> Shared<T> {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn record_connect_error(&self, err: &Error) {
        *self.last_connect_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.to_string());
    }

    /// Implements spec §4.9's borrow protocol steps 1-2 as a single atomic
    /// decision under the pool lock: serve from idle immediately if no one
    /// is ahead in line, otherwise join the waiter queue (reserving a new
    /// node slot if the pool has room to grow).
    fn enqueue(self: &Arc<Self>) -> Take<T> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.cancelled {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(Err(Error::Cancelled));
            return Take::Pending { rx, spawn_new: false };
        }
        if state.waiters.is_empty() {
            if let Some(slot) = state.idle.pop_back() {
                return Take::Ready(slot.conn);
            }
        }
        let spawn_new = state.total < self.config.max_size;
        if spawn_new {
            state.total += 1;
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        Take::Pending { rx, spawn_new }
    }

    /// Borrows a connection, per spec §4.9's full borrow protocol
    /// including the `connect_timeout` bound (step 4) and the
    /// cancellation-safety guarantee (step 5).
    #[tracing::instrument(skip_all)]
    async fn acquire(self: &Arc<Self>) -> Result<Conn<T>> {
        match self.enqueue() {
            Take::Ready(conn) => Ok(conn),
            Take::Pending { mut rx, spawn_new } => {
                if spawn_new {
                    let guard = self.wait_group.spawn_guard();
                    tokio::spawn(connect_task(Arc::clone(self), guard));
                }
                tokio::select! {
                    biased;
                    res = &mut rx => match res {
                        Ok(result) => result,
                        Err(_) => Err(Error::Cancelled),
                    },
                    () = tokio::time::sleep(self.config.connect_timeout) => {
                        // The deliverer may have raced the timer; give it
                        // one last chance to have landed before declaring
                        // a timeout (see module doc comment).
                        match rx.try_recv() {
                            Ok(result) => result,
                            Err(_) => {
                                let last = self.last_connect_error.lock().unwrap_or_else(|e| e.into_inner()).clone();
                                Err(Error::Timeout(last))
                            }
                        }
                    }
                }
            }
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cancelled = true;
        state.idle.clear();
        while let Some(tx) = state.waiters.pop_front() {
            let _ = tx.send(Err(Error::Cancelled));
        }
        drop(state);
        self.cancel_notify.notify_waiters();
    }
}

/// Drives one node slot's `connecting` state, per spec §4.9's node state
/// machine: retries forever on failure (back off `retry_interval` between
/// attempts) until either a connection is established or the pool is
/// cancelled, in which case the reserved slot is released.
#[tracing::instrument(skip_all)]
async fn connect_task<T: Connect>(shared: Arc<Shared<T>>, _guard: wait_group::TaskGuard) {
    loop {
        if shared.is_cancelled() {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            state.total = state.total.saturating_sub(1);
            return;
        }

        match try_connect(&shared.opts).await {
            Ok(conn) => {
                let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
                if state.cancelled {
                    state.total = state.total.saturating_sub(1);
                    return;
                }
                admit_locked(&mut state, conn);
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "pool connect attempt failed, retrying");
                shared.record_connect_error(&err);
                tokio::select! {
                    () = tokio::time::sleep(shared.config.retry_interval) => {}
                    () = shared.cancel_notify.notified() => {}
                }
            }
        }
    }
}

async fn try_connect<T: Connect>(opts: &ConnectOpts) -> Result<Conn<T>> {
    let transport = T::open(opts).await?;
    Conn::connect(transport, opts).await
}

/// Processes connections returned to the pool (handle drop), per spec
/// §4.9's `in_use -> resetting -> idle` / `in_use -> connecting` edges.
/// Runs as a single long-lived background task rather than one task per
/// check-in so `reset_on_return` work is naturally serialized against
/// itself without extra bookkeeping — a slow reset on one connection never
/// blocks the return of another, since each is spawned off this loop.
async fn return_loop<T: Connect>(
    shared: Arc<Shared<T>>,
    mut returns_rx: mpsc::UnboundedReceiver<Conn<T>>,
    _guard: wait_group::TaskGuard,
) {
    while let Some(conn) = returns_rx.recv().await {
        if shared.is_cancelled() {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            state.total = state.total.saturating_sub(1);
            continue;
        }
        if conn.is_broken() {
            respawn_slot(Arc::clone(&shared));
        } else if shared.config.reset_on_return {
            let guard = shared.wait_group.spawn_guard();
            let shared = Arc::clone(&shared);
            tokio::spawn(reset_and_admit(shared, conn, guard));
        } else {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            admit_locked(&mut state, conn);
        }
    }
}

fn respawn_slot<T: Connect>(shared: Arc<Shared<T>>) {
    let guard = shared.wait_group.spawn_guard();
    tokio::spawn(connect_task(shared, guard));
}

async fn reset_and_admit<T: Connect>(shared: Arc<Shared<T>>, mut conn: Conn<T>, _guard: wait_group::TaskGuard) {
    match conn.reset().await {
        Ok(()) => {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            admit_locked(&mut state, conn);
        }
        Err(err) if err.is_fatal() => respawn_slot(shared),
        Err(_) => {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            admit_locked(&mut state, conn);
        }
    }
}

/// Periodically pings idle connections that have sat unused for longer
/// than `ping_interval`, per spec §4.9/§8's health-ping requirement.
/// Disabled entirely when `ping_interval` is zero.
async fn ping_loop<T: Connect>(shared: Arc<Shared<T>>, _guard: wait_group::TaskGuard) {
    if shared.config.ping_interval.is_zero() {
        return;
    }
    loop {
        tokio::select! {
            () = tokio::time::sleep(shared.config.ping_interval) => {}
            () = shared.cancel_notify.notified() => return,
        }
        if shared.is_cancelled() {
            return;
        }
        ping_due_connections(&shared).await;
    }
}

async fn ping_due_connections<T: Connect>(shared: &Arc<Shared<T>>) {
    let due = {
        let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.cancelled {
            return;
        }
        let interval = shared.config.ping_interval;
        let now = Instant::now();
        let mut keep = VecDeque::with_capacity(state.idle.len());
        let mut due = Vec::new();
        while let Some(slot) = state.idle.pop_front() {
            if now.saturating_duration_since(slot.since) >= interval {
                due.push(slot.conn);
            } else {
                keep.push_back(slot);
            }
        }
        state.idle = keep;
        due
    };

    for conn in due {
        let shared = Arc::clone(shared);
        let guard = shared.wait_group.spawn_guard();
        tokio::spawn(ping_one(shared, conn, guard));
    }
}

async fn ping_one<T: Connect>(shared: Arc<Shared<T>>, mut conn: Conn<T>, _guard: wait_group::TaskGuard) {
    match tokio::time::timeout(shared.config.ping_timeout, conn.ping()).await {
        Ok(Ok(())) => {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            admit_locked(&mut state, conn);
        }
        _ => respawn_slot(shared),
    }
}

/// A connection on loan from a [`Pool`]. Returned to the pool automatically
/// when dropped; never returned twice, since [`Drop`] takes the inner
/// [`Conn`] out of an `Option` the first time it runs.
pub struct PooledConnection<T: Transport> {
    conn: Option<Conn<T>>,
    shared: Arc<Shared<T>>,
}

impl<T: Connect> std::ops::Deref for PooledConnection<T> {
    type Target = Conn<T>;
    fn deref(&self) -> &Conn<T> {
        self.conn.as_ref().expect("PooledConnection dropped its Conn before being used")
    }
}

impl<T: Connect> std::ops::DerefMut for PooledConnection<T> {
    fn deref_mut(&mut self) -> &mut Conn<T> {
        self.conn.as_mut().expect("PooledConnection dropped its Conn before being used")
    }
}

impl<T: Transport> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Err means the pool's return_loop already shut down; the
            // connection (and its socket) is simply dropped with it.
            let _ = self.shared.returns_tx.send(conn);
        }
    }
}

/// A concurrency-safe pool of MySQL/MariaDB connections, per spec §4.9.
///
/// `Pool` is a thin, cheaply-`Clone`-able handle: all mutable state lives
/// behind the shared `Arc`, matching spec §4.9's `thread_safe` option
/// (always on here — there is no single-threaded pool mode, since `tokio`
/// tasks already hop threads freely; see DESIGN.md).
pub struct Pool<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T: Connect> Pool<T> {
    /// Validates `config`, then starts its background tasks: `initial_size`
    /// eager connects, the return-processing loop, and (if enabled) the
    /// health-ping loop. Returns immediately; connecting happens in the
    /// background.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let (returns_tx, returns_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            opts: config.connect.clone(),
            state: Mutex::new(State {
                idle: VecDeque::new(),
                total: 0,
                waiters: VecDeque::new(),
                cancelled: false,
            }),
            wait_group: WaitGroup::new(),
            returns_tx,
            cancel_notify: Notify::new(),
            cancelled: AtomicBool::new(false),
            last_connect_error: Mutex::new(None),
            config,
        });

        {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            state.total = shared.config.initial_size;
        }
        for _ in 0..shared.config.initial_size {
            let guard = shared.wait_group.spawn_guard();
            tokio::spawn(connect_task(Arc::clone(&shared), guard));
        }

        let guard = shared.wait_group.spawn_guard();
        tokio::spawn(return_loop(Arc::clone(&shared), returns_rx, guard));

        let guard = shared.wait_group.spawn_guard();
        tokio::spawn(ping_loop(Arc::clone(&shared), guard));

        Ok(Self { shared })
    }

    /// Borrows a connection, per spec §4.9's borrow protocol. Fails with
    /// `timeout` if no connection becomes available within `connect_timeout`,
    /// or `cancelled` if the pool is (or becomes, mid-wait) shut down.
    pub async fn get(&self) -> Result<PooledConnection<T>> {
        let conn = self.shared.acquire().await?;
        Ok(PooledConnection {
            conn: Some(conn),
            shared: Arc::clone(&self.shared),
        })
    }

    /// Number of connections currently idle, ready to be borrowed
    /// immediately. For diagnostics/tests; not part of any invariant.
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner()).idle.len()
    }

    /// Total node slots (connecting + idle + in_use), always `<= max_size`.
    pub fn total_count(&self) -> usize {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner()).total
    }

    /// Cancels every background task and every queued waiter, then waits
    /// for them all to finish, per spec §4.9's shutdown contract. After
    /// this returns, every subsequent [`Pool::get`] fails immediately with
    /// `cancelled`.
    pub async fn shutdown(&self) {
        self.shared.cancel();
        self.shared.wait_group.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opts::Address;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// An in-process `Connect`/`Transport` that never touches a real
    /// socket: each `open` call hands back an end of an in-memory duplex
    /// pipe whose other end is wired up to answer the handshake and every
    /// subsequent command with a canned OK, so `Conn::connect`/`ping`/
    /// `reset` all succeed without a live server.
    #[derive(Debug)]
    struct FakeTransport {
        script: std::collections::VecDeque<u8>,
        out: Vec<u8>,
    }

    fn framed(payload: &[u8], seq: u8) -> Vec<u8> {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
        wire.push(seq);
        wire.extend_from_slice(payload);
        wire
    }

    fn greeting_payload() -> Vec<u8> {
        let mut p = Vec::new();
        p.push(10);
        p.extend_from_slice(b"8.0.34\0");
        p.extend_from_slice(&1u32.to_le_bytes());
        p.extend_from_slice(&[1u8; 8]);
        p.push(0);
        let caps =
            crate::constant::CapabilityFlags::CLIENT_PROTOCOL_41 | crate::constant::CapabilityFlags::CLIENT_PLUGIN_AUTH;
        p.extend_from_slice(&(caps.bits() as u16).to_le_bytes());
        p.push(45);
        p.extend_from_slice(&2u16.to_le_bytes());
        p.extend_from_slice(&((caps.bits() >> 16) as u16).to_le_bytes());
        p.push(21);
        p.extend_from_slice(&[0u8; 10]);
        p.extend_from_slice(&[2u8; 12]);
        p.push(0);
        p.extend_from_slice(b"mysql_native_password\0");
        p
    }

    fn ok_payload() -> Vec<u8> {
        let mut p = vec![0x00, 0, 0];
        p.extend_from_slice(&2u16.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p
    }

    impl FakeTransport {
        /// The handshake (greeting at seq 0, OK at seq 2) followed by a
        /// generous run of pre-framed single-round-trip OK replies, each at
        /// seq 1 — every top-level command resets the sequence counter to
        /// 0, so a ping/reset's reply always lands at seq 1 regardless of
        /// how many commands came before it, per spec §4.2.
        fn new() -> Self {
            let mut script = Vec::new();
            script.extend_from_slice(&framed(&greeting_payload(), 0));
            for _ in 0..64 {
                script.extend_from_slice(&framed(&ok_payload(), 1));
            }
            Self {
                script: script.into(),
                out: Vec::new(),
            }
        }
    }

    impl Transport for FakeTransport {
        async fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.script.len());
            if n == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "script exhausted"));
            }
            for slot in buf.iter_mut().take(n) {
                *slot = self.script.pop_front().unwrap();
            }
            Ok(n)
        }

        async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
            self.out.extend_from_slice(buf);
            Ok(())
        }
    }

    impl Connect for FakeTransport {
        async fn open(_opts: &ConnectOpts) -> Result<Self> {
            Ok(Self::new())
        }
    }

    fn test_config(max_size: usize) -> PoolConfig {
        let mut config = PoolConfig::new(ConnectOpts {
            username: "root".into(),
            address: Address::Tcp {
                host: "unused".into(),
                port: 0,
            },
            ..ConnectOpts::default()
        });
        config.initial_size = 0;
        config.max_size = max_size;
        config.connect_timeout = Duration::from_millis(200);
        config.ping_interval = Duration::from_secs(0);
        config.reset_on_return = false;
        config
    }

    #[tokio::test]
    async fn get_then_drop_returns_connection_to_idle() {
        let pool: Pool<FakeTransport> = Pool::new(test_config(2)).unwrap();
        let conn = pool.get().await.unwrap();
        assert_eq!(pool.idle_count(), 0);
        drop(conn);
        // the return travels through an unbounded channel processed by a
        // background task; yield until it lands.
        for _ in 0..50 {
            if pool.idle_count() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.total_count(), 1);
    }

    #[tokio::test]
    async fn max_size_one_serves_three_borrowers_in_arrival_order() {
        let pool: Pool<FakeTransport> = Pool::new(test_config(1)).unwrap();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let started = Arc::new(AtomicU32::new(0));

        let first = pool.get().await.unwrap();

        let mut handles = Vec::new();
        for id in [2, 3] {
            let pool = pool.clone();
            let order = Arc::clone(&order);
            let started = Arc::clone(&started);
            handles.push(tokio::spawn(async move {
                started.fetch_add(1, Ordering::SeqCst);
                let _conn = pool.get().await.unwrap();
                order.lock().unwrap().push(id);
            }));
        }

        // let both borrowers enqueue before releasing the only connection.
        while started.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;
        drop(first);

        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn borrow_times_out_when_pool_is_exhausted() {
        let pool: Pool<FakeTransport> = Pool::new(test_config(1)).unwrap();
        let _held = pool.get().await.unwrap();
        let err = pool.get().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn shutdown_fails_pending_and_future_borrows_with_cancelled() {
        let pool: Pool<FakeTransport> = Pool::new(test_config(1)).unwrap();
        let held = pool.get().await.unwrap();

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move { pool2.get().await });

        while pool.total_count() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;

        pool.shutdown().await;
        drop(held);

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        let err = pool.get().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
