//! # Calls
//!
//! One outstanding request and its single-shot completion.
//!
//! ## Invariants
//! - **Identity**: Ids come from one process-wide counter, are strictly increasing
//!   and are never handed out twice.
//! - **Exactly Once**: Whichever of response, timeout or drain reaches `complete`
//!   first wins. Every later attempt is a no-op.
//! - **No Stray Timers**: Completing a call aborts its deadline timer, and a timer
//!   armed after completion is aborted on the spot.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::OnceLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;
use std::time::Instant;

use hwire::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::error::Error;
use crate::error::Result;

/// Starts at zero when the process starts and is never reset.
static NEXT_CALL_ID: AtomicU32 = AtomicU32::new(0);

/// Hands out the next process-wide call id.
pub fn next_call_id() -> u32 {
    NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Completion state is only ever touched in short, non-async sections, so a
/// poisoned lock still holds consistent data.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A registered, in-flight call.
///
/// Owned by the connection's pending table until completion.
#[derive(Debug)]
pub struct Call {
    id: u32,
    method: String,
    frame: Vec<u8>,
    started: Instant,
    done: AtomicBool,
    elapsed: OnceLock<Duration>,
    waiter: Mutex<Option<oneshot::Sender<Result<Value>>>>,
    timer: Mutex<Option<AbortHandle>>,
}

impl Call {
    /// Creates a call around an already encoded request frame, plus the future
    /// its caller awaits.
    pub fn new(id: u32, method: impl Into<String>, frame: Vec<u8>) -> (Self, PendingCall) {
        let (tx, rx) = oneshot::channel();
        let call = Self {
            id,
            method: method.into(),
            frame,
            started: Instant::now(),
            done: AtomicBool::new(false),
            elapsed: OnceLock::new(),
            waiter: Mutex::new(Some(tx)),
            timer: Mutex::new(None),
        };
        (call, PendingCall { id, rx })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The encoded request frame, length prefix included.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Time from creation to completion, once completed.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed.get().copied()
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Whether a deadline timer is still attached.
    pub fn has_timer(&self) -> bool {
        lock(&self.timer).is_some()
    }

    /// Attaches the deadline timer task.
    pub fn arm_timer(&self, handle: AbortHandle) {
        let mut slot = lock(&self.timer);
        if self.is_done() {
            handle.abort();
            return;
        }
        *slot = Some(handle);
    }

    pub fn complete_with_value(&self, value: Value) -> bool {
        self.complete(Ok(value))
    }

    pub fn complete_with_error(&self, error: Error) -> bool {
        self.complete(Err(error))
    }

    /// Returns `true` only for the invocation that actually completed the call.
    fn complete(&self, outcome: Result<Value>) -> bool {
        let first = !self.done.swap(true, Ordering::AcqRel);

        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }

        if !first {
            return false;
        }

        let _ = self.elapsed.set(self.started.elapsed());
        if let Some(tx) = lock(&self.waiter).take() {
            // The caller may have stopped waiting; that is not our concern.
            let _ = tx.send(outcome);
        }
        true
    }
}

/// The caller's side of a call: resolves exactly once with a value or an error.
#[derive(Debug)]
pub struct PendingCall {
    id: u32,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingCall {
    /// A call that never reached the wire.
    pub(crate) fn failed(id: u32, error: Error) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self { id, rx }
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The sender only disappears without sending if the call was dropped
            // along with its connection.
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let ids: Vec<u32> = (0..1000).map(|_| next_call_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..500).map(|_| next_call_id()).collect::<Vec<_>>()))
            .collect();

        let mut all: Vec<u32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let n = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), n);
    }

    #[tokio::test]
    async fn test_first_completion_wins() {
        let (call, pending) = Call::new(1, "echo", Vec::new());

        assert!(call.complete_with_value(Value::from("first")));
        assert!(!call.complete_with_error(Error::Timeout(Duration::from_millis(1))));
        assert!(!call.complete_with_error(Error::ConnectionClosed));

        assert_eq!(pending.await, Ok(Value::from("first")));
        assert!(call.is_done());
        assert!(call.elapsed().is_some());
    }

    #[tokio::test]
    async fn test_completion_aborts_timer() {
        let (call, _pending) = Call::new(2, "slow", Vec::new());
        let timer = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        call.arm_timer(timer.abort_handle());
        assert!(call.has_timer());

        call.complete_with_value(Value::Null);
        assert!(!call.has_timer());
        assert!(timer.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_timer_armed_after_completion_is_aborted() {
        let (call, _pending) = Call::new(3, "late", Vec::new());
        call.complete_with_value(Value::Null);

        let timer = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        call.arm_timer(timer.abort_handle());
        assert!(!call.has_timer());
        assert!(timer.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_failed_pending_call_resolves_immediately() {
        let pending = PendingCall::failed(9, Error::ConnectionClosed);
        assert_eq!(pending.id(), 9);
        assert_eq!(pending.await, Err(Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_dropped_call_reads_as_closed() {
        let (call, pending) = Call::new(4, "orphan", Vec::new());
        drop(call);
        assert_eq!(pending.await, Err(Error::ConnectionClosed));
    }
}
