//! Thread-safe façade over exactly one [`Transport`].
//!
//! Capture, clipboard, and the inbound dispatcher all run on tasks that
//! do not own the transport's lifetime. The proxy lets any of them
//! attempt a send — or pull the next inbound event — without taking a
//! liveness dependency on the transport: once the owner calls
//! [`notify_destroying`](ChannelProxy::notify_destroying), every
//! subsequent call observes the nulled handle and fails cleanly instead
//! of touching a transport that is being torn down.
//!
//! The handle is nulled under the same mutex that guards every send, so
//! destroy-versus-use is a serialized, observable state transition, not
//! a race. The companion "gone" signal is a level-triggered broadcast:
//! waiters that subscribe after it fired still return immediately.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::ipc::transport::{Outbound, Transport, TransportEvent};

// ── SendAck ──────────────────────────────────────────────────────

/// Pending acknowledgement for one acked send.
///
/// Resolves `true` once the frame was flushed to the wire, `false` if
/// the transport died first. Dropping it simply discards the result.
pub struct SendAck(oneshot::Receiver<bool>);

impl SendAck {
    /// Wait for the send to complete.
    pub async fn acked(self) -> bool {
        self.0.await.unwrap_or(false)
    }
}

// ── ChannelProxy ─────────────────────────────────────────────────

/// Serializes all access to one transport and broadcasts its teardown.
pub struct ChannelProxy {
    /// The transport handle. `None` forever once teardown has begun.
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    /// Inbound events; a single dispatcher pulls from here.
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    /// One-shot, level-triggered teardown broadcast.
    gone: CancellationToken,
}

impl ChannelProxy {
    /// Take ownership of both directions of `transport`.
    pub fn new(transport: Transport) -> Self {
        Self {
            outbound: Mutex::new(Some(transport.outbound)),
            events: tokio::sync::Mutex::new(transport.events),
            gone: CancellationToken::new(),
        }
    }

    /// Queue an acked send.
    ///
    /// Returns `None` when the channel is gone: the message was dropped
    /// and will never be delivered. `None` is final, not retryable.
    pub fn send(&self, bytes: Bytes) -> Option<SendAck> {
        let guard = self.handle();
        let tx = guard.as_ref()?;
        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(Outbound {
            bytes,
            ack: Some(ack_tx),
        })
        .ok()?;
        Some(SendAck(ack_rx))
    }

    /// Queue a fire-and-forget send (status, clipboard, config traffic —
    /// not subject to the one-frame-in-flight throttle).
    ///
    /// Returns `false` when the channel is gone; the caller must stop
    /// producing rather than retry.
    pub fn post(&self, bytes: Bytes) -> bool {
        let guard = self.handle();
        match guard.as_ref() {
            Some(tx) => tx.send(Outbound { bytes, ack: None }).is_ok(),
            None => false,
        }
    }

    /// Pull the next inbound event.
    ///
    /// This is the receive side: an internal `select!` re-arms the
    /// receiver automatically and observes the gone signal, so a
    /// forgotten re-arm cannot stall the session. Returns `None` once
    /// the channel is gone or the reader task has finished.
    pub async fn next_event(&self) -> Option<TransportEvent> {
        let mut events = self.events.lock().await;
        tokio::select! {
            _ = self.gone.cancelled() => None,
            ev = events.recv() => ev,
        }
    }

    /// Announce that the transport is about to be torn down.
    ///
    /// Nulls the handle under the send mutex and fires the gone signal:
    /// any `send`/`post` beginning after this returns is guaranteed to
    /// observe the null handle. Called by the transport's owner before
    /// teardown; safe to call more than once.
    pub fn notify_destroying(&self) {
        self.handle().take();
        self.gone.cancel();
    }

    /// Block until the gone signal has fired.
    ///
    /// Level triggered: returns immediately if it already fired, and
    /// supports any number of concurrent waiters.
    pub async fn wait_for_gone(&self) {
        self.gone.cancelled().await;
    }

    /// Whether the gone signal has fired.
    pub fn is_gone(&self) -> bool {
        self.gone.is_cancelled()
    }

    /// Lock the handle, recovering from a poisoned mutex — a panicked
    /// sender must not wedge teardown.
    fn handle(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Outbound>>> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::duplex;

    fn proxy_pair() -> (Arc<ChannelProxy>, tokio::io::DuplexStream) {
        let (near, far) = duplex(64 * 1024);
        let proxy = Arc::new(ChannelProxy::new(Transport::new(near)));
        (proxy, far)
    }

    #[tokio::test]
    async fn send_and_post_fail_after_destroy() {
        let (proxy, _far) = proxy_pair();

        assert!(proxy.post(Bytes::from_static(b"ok")));
        proxy.notify_destroying();

        assert!(proxy.send(Bytes::from_static(b"late")).is_none());
        assert!(!proxy.post(Bytes::from_static(b"late")));
        assert!(proxy.next_event().await.is_none());
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let (proxy, _far) = proxy_pair();
        proxy.notify_destroying();
        proxy.notify_destroying();
        assert!(proxy.is_gone());
    }

    #[tokio::test]
    async fn wait_for_gone_wakes_every_waiter_including_late_ones() {
        let (proxy, _far) = proxy_pair();

        let mut early = Vec::new();
        for _ in 0..8 {
            let proxy = Arc::clone(&proxy);
            early.push(tokio::spawn(async move { proxy.wait_for_gone().await }));
        }

        proxy.notify_destroying();
        for waiter in early {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("early waiter timed out")
                .unwrap();
        }

        // Late subscriber: the signal is level triggered.
        tokio::time::timeout(Duration::from_secs(1), proxy.wait_for_gone())
            .await
            .expect("late waiter timed out");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_senders_never_crash_against_destroy() {
        for _ in 0..50 {
            let (proxy, _far) = proxy_pair();

            let mut producers = Vec::new();
            for _ in 0..8 {
                let proxy = Arc::clone(&proxy);
                producers.push(tokio::spawn(async move {
                    loop {
                        // Either queued or cleanly refused; never a panic.
                        if !proxy.post(Bytes::from_static(b"racing")) {
                            break;
                        }
                        tokio::task::yield_now().await;
                    }
                }));
            }

            let destroyer = {
                let proxy = Arc::clone(&proxy);
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    proxy.notify_destroying();
                })
            };

            destroyer.await.unwrap();
            for producer in producers {
                tokio::time::timeout(Duration::from_secs(1), producer)
                    .await
                    .expect("producer did not observe the gone signal")
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn acked_send_resolves_false_once_gone() {
        let (proxy, far) = proxy_pair();
        drop(far);

        // Burn through the dead pipe until the writer task notices.
        let mut resolved_false = false;
        for _ in 0..64 {
            match proxy.send(Bytes::from(vec![0u8; 128])) {
                Some(ack) => {
                    if !ack.acked().await {
                        resolved_false = true;
                        break;
                    }
                }
                None => {
                    resolved_false = true;
                    break;
                }
            }
        }
        assert!(resolved_false);
    }
}
