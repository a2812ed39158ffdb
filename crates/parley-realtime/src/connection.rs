//! Live connection state and the per-connection push primitive.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parley_core::{ConnectionId, IdentityId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One live transport instance, owned by exactly one identity.
///
/// Pushes go through a bounded queue drained by the transport's writer task.
/// [`ClientConnection::push`] never waits: a full or closed queue drops the
/// frame and bumps the drop counter.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Owning identity.
    pub identity: IdentityId,
    /// Send channel to the transport's write task.
    tx: mpsc::Sender<Arc<String>>,
    /// Cancelled when the engine closes the connection.
    closed: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last heartbeat check.
    is_alive: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl ClientConnection {
    /// Create a connection pushing into `tx`.
    pub fn new(id: ConnectionId, identity: IdentityId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            identity,
            tx,
            closed: CancellationToken::new(),
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a frame without waiting.
    ///
    /// Returns `false` if the queue is full or the connection is closed.
    pub fn push(&self, frame: Arc<String>) -> bool {
        if self.closed.is_cancelled() {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self.tx.try_send(frame).is_ok() {
            let _ = self.delivered.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize a value and enqueue it.
    pub fn push_json<T: serde::Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.push(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Signal the transport to shut this connection down.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed by the engine.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Frames successfully enqueued.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Frames dropped because the queue was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or inbound frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new(
            ConnectionId::from_raw("conn_1"),
            IdentityId::from_raw("agent-1"),
            tx,
        );
        (conn, rx)
    }

    #[tokio::test]
    async fn push_success() {
        let (conn, mut rx) = make_connection(8);
        assert!(conn.push(Arc::new("hello".into())));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
        assert_eq!(conn.delivered_count(), 1);
    }

    #[test]
    fn push_to_full_queue_drops() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.push(Arc::new("one".into())));
        assert!(!conn.push(Arc::new("two".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn push_to_dropped_receiver_fails() {
        let (conn, rx) = make_connection(8);
        drop(rx);
        assert!(!conn.push(Arc::new("x".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn push_after_close_fails() {
        let (conn, _rx) = make_connection(8);
        conn.close();
        assert!(conn.is_closed());
        assert!(!conn.push(Arc::new("late".into())));
    }

    #[tokio::test]
    async fn closed_future_resolves() {
        let (conn, _rx) = make_connection(8);
        conn.close();
        conn.closed().await;
    }

    #[tokio::test]
    async fn push_json_serializes() {
        let (conn, mut rx) = make_connection(8);
        assert!(conn.push_json(&serde_json::json!({"key": "value"})));
        let parsed: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(parsed["key"], "value");
    }

    #[test]
    fn check_alive_resets_flag() {
        let (conn, _rx) = make_connection(8);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = make_connection(8);
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(conn.age() > age1);
    }
}
