//! # Connection with Dispatch Pump
//!
//! One socket to one peer, carrying any number of concurrent calls.
//!
//! `call()` registers a [`Call`] in the pending table and queues its request
//! frame for the writer task. A background pump task reads response frames one
//! at a time and routes each to its call by id, so responses may arrive in any
//! order.
//!
//! ## Lifecycle
//!
//! `Initializing → Connecting → Open → Closed`. `Closed` is terminal. Any
//! transport error, end of stream, protocol violation, explicit shutdown or the
//! last [`Connection`] handle going away closes the connection, and closing
//! fails every call still pending.
//!
//! ## Invariants
//! - **Single Reader**: Only the pump reads the socket, and it never starts a
//!   frame before the previous one is fully consumed.
//! - **Single Writer**: Only the writer task writes the socket, one whole frame
//!   at a time. Callers never hold the stream, so nothing they cancel can leave
//!   half a frame behind.
//! - **No Orphans**: A call registered while the connection closes is either
//!   drained or fails itself on the post-insert state check.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use hwire::Value;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::call::Call;
use crate::call::PendingCall;
use crate::call::next_call_id;
use crate::config::RemoteIdentity;
use crate::error::Error;
use crate::error::Result;
use crate::frame;
use crate::frame::PREFIX_LEN;
use crate::frame::ResponseBody;
use crate::frame::ResponsePrefix;
use crate::handshake;
use crate::handshake::ConnectionHeader;
use crate::invocation::Invocation;
use crate::pending::PendingTable;
use crate::transport::BoxStream;
use crate::transport::Dialer;
use crate::transport::Stream;
use crate::transport::TcpDialer;

/// Starts at zero when the process starts and is never reset.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

/// Largest response payload the pump will buffer.
pub const MAX_PAYLOAD_LEN: usize = 256 * 1024 * 1024;

/// Capacity of the lifecycle event channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initializing,
    Connecting,
    Open,
    Closed,
}

/// Lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The handshake was written and the pump is running.
    Connected,
    /// The connection closed; carries the error every pending call was failed with.
    Closed(Error),
    /// A call hit its deadline before a response arrived.
    CallTimedOut(u32),
}

/// Receives every lifecycle event from the handshake on.
pub type Events = broadcast::Receiver<ConnectionEvent>;

struct Inner {
    id: u64,
    identity: RemoteIdentity,
    header: ConnectionHeader,
    state: watch::Sender<State>,
    pending: PendingTable,
    outbound: mpsc::UnboundedSender<Arc<Call>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ConnectionEvent>,
}

/// The user-facing half of a connection. Closes it when the last clone drops.
struct Owner {
    inner: Arc<Inner>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.inner.close(Error::ConnectionClosed);
    }
}

/// A multiplexed client connection.
///
/// Cheap to clone; every clone drives the same socket. Dropping the last clone
/// closes the socket and fails whatever is still pending.
#[derive(Clone)]
pub struct Connection {
    owner: Arc<Owner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner().id)
            .field("address", &self.inner().identity.address())
            .field("state", &self.state())
            .field("pending", &self.inner().pending.len())
            .finish()
    }
}

impl Connection {
    /// Dials `identity` over TCP and performs the handshake.
    pub async fn connect(identity: RemoteIdentity) -> Result<Self> {
        Self::connect_with(identity, &TcpDialer).await
    }

    /// Dials `identity` through `dialer` and performs the handshake.
    pub async fn connect_with(identity: RemoteIdentity, dialer: &dyn Dialer) -> Result<Self> {
        let (conn, _events) = Self::connect_observed(identity, dialer).await?;
        Ok(conn)
    }

    /// Like [`Connection::connect_with`], also returning an event receiver that
    /// was subscribed before the handshake, so it sees `Connected`.
    pub async fn connect_observed(identity: RemoteIdentity, dialer: &dyn Dialer) -> Result<(Self, Events)> {
        let (inner, outbound) = Inner::new(identity);
        inner.state.send_replace(State::Connecting);
        debug!(conn = inner.id, address = inner.identity.address(), "connecting");

        let stream = match dialer.dial(&inner.identity).await {
            Ok(stream) => stream,
            Err(e) => {
                inner.state.send_replace(State::Closed);
                warn!(conn = inner.id, error = %e, "dial failed");
                return Err(e);
            }
        };
        Self::establish(inner, outbound, stream).await
    }

    /// Runs the handshake over an already connected stream.
    pub async fn open<S: Stream>(identity: RemoteIdentity, stream: S) -> Result<Self> {
        let (conn, _events) = Self::open_observed(identity, stream).await?;
        Ok(conn)
    }

    /// Like [`Connection::open`], also returning an event receiver that sees `Connected`.
    pub async fn open_observed<S: Stream>(identity: RemoteIdentity, stream: S) -> Result<(Self, Events)> {
        let (inner, outbound) = Inner::new(identity);
        inner.state.send_replace(State::Connecting);
        Self::establish(inner, outbound, Box::new(stream)).await
    }

    async fn establish(
        inner: Inner,
        outbound: mpsc::UnboundedReceiver<Arc<Call>>,
        stream: BoxStream,
    ) -> Result<(Self, Events)> {
        let events = inner.events.subscribe();
        let (reader, mut writer) = tokio::io::split(stream);

        if inner.identity.credential_value().is_some() {
            debug!(conn = inner.id, "credential configured, header carries none");
        }

        let preamble = handshake::encode_preamble(&inner.header)?;
        if let Err(e) = write_frame(&mut writer, &preamble).await {
            inner.state.send_replace(State::Closed);
            warn!(conn = inner.id, error = %e, "handshake failed");
            return Err(e.into());
        }

        inner.state.send_replace(State::Open);
        let inner = Arc::new(inner);

        tokio::spawn(Self::pump(inner.clone(), reader));
        let writer_task = tokio::spawn(Self::write_loop(inner.clone(), writer, outbound));
        *inner.writer_task.lock().unwrap_or_else(|p| p.into_inner()) = Some(writer_task);

        info!(
            conn = inner.id,
            address = inner.identity.address(),
            protocol = inner.header.protocol().unwrap_or(""),
            "connection open"
        );
        let _ = inner.events.send(ConnectionEvent::Connected);

        Ok((Self { owner: Arc::new(Owner { inner }) }, events))
    }

    fn inner(&self) -> &Arc<Inner> {
        &self.owner.inner
    }

    /// Process-unique connection id.
    pub fn id(&self) -> u64 {
        self.inner().id
    }

    pub fn identity(&self) -> &RemoteIdentity {
        &self.inner().identity
    }

    pub fn state(&self) -> State {
        *self.inner().state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.inner().pending.len()
    }

    /// Subscribes to lifecycle events from this point on.
    pub fn subscribe(&self) -> Events {
        self.inner().events.subscribe()
    }

    /// Resolves once the connection has closed.
    pub async fn closed(&self) {
        wait_closed(&mut self.inner().state.subscribe()).await;
    }

    /// Issues `method(params)` and returns the future of its outcome.
    ///
    /// Never waits on the socket: the frame is queued for the writer task and
    /// the deadline runs from here. `timeout` overrides the identity's default
    /// deadline; a zero duration disables it. Every returned future resolves
    /// exactly once. On a closed connection it resolves immediately with
    /// `Error::ConnectionClosed` and nothing is written.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn call(&self, method: &str, params: Vec<Value>, timeout: Option<Duration>) -> PendingCall {
        let inner = self.inner();
        let id = next_call_id();
        if self.is_closed() {
            return PendingCall::failed(id, Error::ConnectionClosed);
        }

        let invocation = Invocation::new(method, params);
        let request = match frame::encode_request(id, &invocation) {
            Ok(bytes) => bytes,
            Err(e) => return PendingCall::failed(id, e),
        };

        let (call, pending) = Call::new(id, method, request);
        let call = Arc::new(call);
        inner.pending.insert(call.clone());

        if self.is_closed() {
            if let Some(call) = inner.pending.remove(id) {
                call.complete_with_error(Error::ConnectionClosed);
            }
            return pending;
        }

        let deadline = timeout.unwrap_or(inner.identity.default_timeout());
        if !deadline.is_zero() {
            Self::arm_timer(inner, &call, deadline);
        }

        trace!(conn = inner.id, call = id, method, "queueing request");
        if inner.outbound.send(call).is_err() {
            inner.close(Error::ConnectionClosed);
        }

        pending
    }

    /// Issues a call with the default deadline and waits for its outcome.
    pub async fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.call(method, params, None).await
    }

    /// Closes the connection and waits until the write half is shut.
    ///
    /// Pending calls fail with `Error::ConnectionClosed`.
    pub async fn shutdown(&self) {
        debug!(conn = self.inner().id, "shutdown requested");
        self.inner().close(Error::ConnectionClosed);

        let writer_task = self.inner().writer_task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(task) = writer_task {
            let _ = task.await;
        }
    }

    fn arm_timer(inner: &Arc<Inner>, call: &Arc<Call>, after: Duration) {
        let inner: Weak<Inner> = Arc::downgrade(inner);
        let id = call.id();

        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let Some(inner) = inner.upgrade() else { return };
            let Some(call) = inner.pending.remove(id) else { return };

            debug!(conn = inner.id, call = id, method = call.method(), "call timed out");
            call.complete_with_error(Error::Timeout(after));
            let _ = inner.events.send(ConnectionEvent::CallTimedOut(id));
        });

        call.arm_timer(timer.abort_handle());
    }

    /// Reads and routes response frames until the stream fails or the connection closes.
    async fn pump(inner: Arc<Inner>, mut reader: ReadHalf<BoxStream>) {
        let mut state = inner.state.subscribe();
        let error = loop {
            let next = tokio::select! {
                _ = wait_closed(&mut state) => return,
                next = inner.read_response(&mut reader) => next,
            };
            if let Err(e) = next {
                break e;
            }
        };
        inner.close(error);
    }

    /// Writes queued request frames, whole and in order, until the connection closes.
    async fn write_loop(
        inner: Arc<Inner>,
        mut writer: WriteHalf<BoxStream>,
        mut outbound: mpsc::UnboundedReceiver<Arc<Call>>,
    ) {
        let mut state = inner.state.subscribe();
        loop {
            let call = tokio::select! {
                _ = wait_closed(&mut state) => break,
                next = outbound.recv() => match next {
                    Some(call) => call,
                    None => break,
                },
            };

            // Timed out while queued; the server need not see it.
            if call.is_done() {
                continue;
            }

            trace!(conn = inner.id, call = call.id(), bytes = call.frame().len(), "writing request");
            let written = tokio::select! {
                _ = wait_closed(&mut state) => break,
                written = write_frame(&mut writer, call.frame()) => written,
            };
            if let Err(e) = written {
                warn!(conn = inner.id, call = call.id(), error = %e, "request write failed");
                inner.close(e.into());
                break;
            }
        }
        let _ = writer.shutdown().await;
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

async fn wait_closed(state: &mut watch::Receiver<State>) {
    loop {
        let closed = *state.borrow_and_update() == State::Closed;
        if closed || state.changed().await.is_err() {
            return;
        }
    }
}

impl Inner {
    fn new(identity: RemoteIdentity) -> (Self, mpsc::UnboundedReceiver<Arc<Call>>) {
        let header = ConnectionHeader::new(identity.protocol_name().map(str::to_string));
        let (state, _) = watch::channel(State::Initializing);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let inner = Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            identity,
            header,
            state,
            pending: PendingTable::new(),
            outbound,
            writer_task: Mutex::new(None),
            events,
        };
        (inner, outbound_rx)
    }

    /// Reads exactly one response frame and completes its call.
    ///
    /// Returns `Err` only for failures that desynchronize the stream. A payload
    /// that was fully read but does not decode fails just its own call.
    async fn read_response<R: AsyncRead + Unpin>(&self, reader: &mut R) -> Result<()> {
        let mut head = [0u8; PREFIX_LEN];
        reader.read_exact(&mut head).await?;
        let prefix = ResponsePrefix::parse(&head);
        let call = self.pending.remove(prefix.call_id);

        let fail = |call: Option<Arc<Call>>, e: Error| -> Result<()> {
            if let Some(call) = call {
                call.complete_with_error(e.clone());
            }
            Err(e)
        };

        if !prefix.flag.has_length() {
            let e = Error::Protocol(format!(
                "response for call {} has no declared length (flag {:#04x})",
                prefix.call_id,
                prefix.flag.bits()
            ));
            return fail(call, e);
        }

        let len = match prefix.payload_len() {
            Ok(len) if len <= MAX_PAYLOAD_LEN => len,
            Ok(len) => return fail(call, Error::Protocol(format!("payload of {} bytes exceeds limit", len))),
            Err(e) => return fail(call, e),
        };

        let mut payload = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut payload).await {
            return fail(call, e.into());
        }

        let Some(call) = call else {
            trace!(conn = self.id, call = prefix.call_id, "discarding response for unknown call");
            return Ok(());
        };

        trace!(
            conn = self.id,
            call = call.id(),
            latency_us = call.started().elapsed().as_micros() as u64,
            "response received"
        );

        match ResponseBody::decode(prefix.flag, &payload) {
            Ok(ResponseBody::Value(value)) => {
                call.complete_with_value(value);
            }
            Ok(ResponseBody::Remote { class, message }) => {
                debug!(conn = self.id, call = call.id(), %class, "remote exception");
                call.complete_with_error(Error::Remote { class, message });
            }
            Err(e) => {
                warn!(conn = self.id, call = call.id(), error = %e, "undecodable response payload");
                call.complete_with_error(e);
            }
        }
        Ok(())
    }

    /// Marks the connection closed and fails every pending call with `error`.
    ///
    /// Safe to call any number of times; only the first reports the close. The
    /// pump and writer tasks see the state change and stop.
    fn close(&self, error: Error) {
        let first = self.state.send_if_modified(|state| {
            if *state == State::Closed {
                false
            } else {
                *state = State::Closed;
                true
            }
        });

        let drained = self.pending.drain();
        let n = drained.len();
        for call in drained {
            call.complete_with_error(error.clone());
        }

        if first {
            info!(conn = self.id, error = %error, drained = n, "connection closed");
            let _ = self.events.send(ConnectionEvent::Closed(error));
        }
    }
}

#[cfg(test)]
impl Connection {
    pub(crate) fn fail_all(&self, error: Error) {
        self.inner().close(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::DuplexStream;

    use crate::handshake::MAGIC;
    use crate::handshake::VERSION;

    /// Opens a connection over a duplex pipe and swallows the handshake.
    async fn open_pair() -> (Connection, DuplexStream) {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let conn = Connection::open(RemoteIdentity::new("mem"), client).await.unwrap();

        let mut head = [0u8; 9];
        server.read_exact(&mut head).await.unwrap();
        assert_eq!(&head[..4], MAGIC);
        assert_eq!(head[4], VERSION);
        let len = u32::from_be_bytes([head[5], head[6], head[7], head[8]]) as usize;
        let mut header = vec![0u8; len];
        server.read_exact(&mut header).await.unwrap();

        (conn, server)
    }

    #[tokio::test]
    async fn test_double_close_completes_each_call_once() {
        let (conn, _server) = open_pair().await;
        let mut events = conn.subscribe();

        let a = conn.call("a", vec![], Some(Duration::ZERO));
        let b = conn.call("b", vec![], Some(Duration::ZERO));
        assert_eq!(conn.pending_calls(), 2);

        conn.fail_all(Error::ConnectionClosed);
        conn.fail_all(Error::Transport("late duplicate".into()));

        assert_eq!(a.await, Err(Error::ConnectionClosed));
        assert_eq!(b.await, Err(Error::ConnectionClosed));
        assert_eq!(conn.pending_calls(), 0);
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Closed(Error::ConnectionClosed));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_call_on_closed_connection_writes_nothing() {
        let (conn, mut server) = open_pair().await;
        conn.fail_all(Error::ConnectionClosed);

        let pending = conn.call("echo", vec![], None);
        assert_eq!(pending.await, Err(Error::ConnectionClosed));
        assert_eq!(conn.pending_calls(), 0);

        // The writer shut the write half on its way out, so the server sees EOF and nothing else.
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_removes_call_and_keeps_connection_open() {
        let (conn, _server) = open_pair().await;
        let mut events = conn.subscribe();

        let started = tokio::time::Instant::now();
        let pending = conn.call("slow", vec![], Some(Duration::from_millis(50)));
        let id = pending.id();

        assert_eq!(pending.await, Err(Error::Timeout(Duration::from_millis(50))));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(conn.pending_calls(), 0);
        assert!(!conn.is_closed());
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::CallTimedOut(id));
    }

    #[tokio::test]
    async fn test_connection_ids_increase() {
        let (a, _sa) = open_pair().await;
        let (b, _sb) = open_pair().await;
        assert!(b.id() > a.id());
    }

    #[tokio::test]
    async fn test_observed_open_sees_connected() {
        let (client, _server) = tokio::io::duplex(1024);
        let (conn, mut events) = Connection::open_observed(RemoteIdentity::new("mem"), client).await.unwrap();

        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);
        conn.fail_all(Error::ConnectionClosed);
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Closed(Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_last_clone_drop_closes_socket() {
        let (conn, mut server) = open_pair().await;
        let clone = conn.clone();
        let pending = conn.call("never", vec![], Some(Duration::ZERO));

        drop(conn);
        assert!(!clone.is_closed());

        drop(clone);
        assert_eq!(pending.await, Err(Error::ConnectionClosed));

        let mut request = Vec::new();
        let eof = tokio::time::timeout(Duration::from_secs(2), server.read_to_end(&mut request)).await;
        assert!(matches!(eof, Ok(Ok(_))), "server never saw EOF");
    }
}
