//! Duplex, message-framed channel to the broker process.
//!
//! Wraps any byte stream (a Unix socket in production, an in-memory
//! duplex pipe in tests) in length-delimited framing and splits it into
//! a background writer task and a background reader task, bridged to
//! the caller by mpsc channels.
//!
//! ## Contract
//!
//! - The first wire frame after connect must be an 8-byte little-endian
//!   correlation token; it is surfaced as [`TransportEvent::Connected`].
//! - Every subsequent frame is one protocol message
//!   ([`TransportEvent::Message`]).
//! - Exactly one [`TransportEvent::Disconnected`] is delivered, after
//!   which no further events follow.
//! - Every queued send is acknowledged exactly once: `true` once the
//!   frame was handed to the OS, `false` if the wire died first. Sends
//!   after death fail fast and never panic.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};

/// Byte width of the correlation preamble.
pub const CORRELATION_LEN: usize = 8;

// ── Events ───────────────────────────────────────────────────────

/// Notifications delivered by the reader task, in order.
#[derive(Debug)]
pub enum TransportEvent {
    /// The channel is up; carries the broker-assigned correlation token.
    Connected(u64),
    /// One complete inbound message.
    Message(Bytes),
    /// The channel is down. Terminal.
    Disconnected,
}

/// One outbound frame queued for the writer task.
pub(crate) struct Outbound {
    pub(crate) bytes: Bytes,
    /// Resolved exactly once: `true` on flush, `false` on a dead wire.
    pub(crate) ack: Option<oneshot::Sender<bool>>,
}

// ── Transport ────────────────────────────────────────────────────

/// Handle pair for a framed duplex channel.
///
/// Constructed from a raw stream; consumed by
/// [`ChannelProxy::new`](crate::ipc::ChannelProxy::new), which takes
/// over both directions.
pub struct Transport {
    pub(crate) outbound: mpsc::UnboundedSender<Outbound>,
    pub(crate) events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Transport {
    /// Frame `stream` and spawn the reader and writer tasks.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let framed = Framed::new(stream, LengthDelimitedCodec::new());
        let (mut sink, mut source) = framed.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel::<TransportEvent>();

        // Writer: drain the outbound queue, acknowledging each frame.
        // On a write error the queue is closed and everything still
        // buffered is failed, so producers observe the death promptly.
        tokio::spawn(async move {
            while let Some(out) = out_rx.recv().await {
                let ok = sink.send(out.bytes).await.is_ok();
                if let Some(ack) = out.ack {
                    let _ = ack.send(ok);
                }
                if !ok {
                    warn!("channel write failed; failing queued sends");
                    out_rx.close();
                    while let Some(rest) = out_rx.recv().await {
                        if let Some(ack) = rest.ack {
                            let _ = ack.send(false);
                        }
                    }
                    break;
                }
            }
            debug!("channel writer task finished");
        });

        // Reader: correlation preamble first, then messages, then one
        // terminal Disconnected.
        tokio::spawn(async move {
            match source.next().await {
                Some(Ok(first)) if first.len() == CORRELATION_LEN => {
                    let mut token = [0u8; CORRELATION_LEN];
                    token.copy_from_slice(&first);
                    let token = u64::from_le_bytes(token);
                    if ev_tx.send(TransportEvent::Connected(token)).is_err() {
                        return;
                    }
                }
                Some(Ok(first)) => {
                    warn!(len = first.len(), "bad correlation preamble");
                    let _ = ev_tx.send(TransportEvent::Disconnected);
                    return;
                }
                Some(Err(e)) => {
                    warn!("channel read error before connect: {e}");
                    let _ = ev_tx.send(TransportEvent::Disconnected);
                    return;
                }
                None => {
                    let _ = ev_tx.send(TransportEvent::Disconnected);
                    return;
                }
            }

            loop {
                match source.next().await {
                    Some(Ok(frame)) => {
                        if ev_tx
                            .send(TransportEvent::Message(frame.freeze()))
                            .is_err()
                        {
                            // Receiver side already torn down.
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("channel read error: {e}");
                        break;
                    }
                    None => break,
                }
            }
            let _ = ev_tx.send(TransportEvent::Disconnected);
            debug!("channel reader task finished");
        });

        Self {
            outbound: out_tx,
            events: ev_rx,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
