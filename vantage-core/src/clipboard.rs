//! Clipboard bridging between the local desktop and the remote peer.
//!
//! The bridge owns one task that watches the local clipboard device and
//! posts every genuine change through the channel proxy. Two kinds of
//! traffic must be suppressed:
//!
//! - **echoes** — a change the bridge itself just applied from a remote
//!   event must not be re-broadcast, or the two peers ping-pong the
//!   same content forever;
//! - **duplicates** — content identical to the last one sent is skipped
//!   to avoid redundant traffic.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::ipc::ChannelProxy;
use crate::proto::{ClipboardEvent, HostToClient};

// ── ClipboardDevice ──────────────────────────────────────────────

/// Access to the local OS clipboard.
///
/// `next_change` must be cancel safe: the bridge drops the pending
/// future whenever a remote event arrives or the session shuts down.
#[async_trait]
pub trait ClipboardDevice: Send {
    /// Wait for the next local clipboard change and return its text.
    async fn next_change(&mut self) -> Result<String, SessionError>;

    /// Replace the local clipboard contents.
    fn set_text(&mut self, text: &str) -> Result<(), SessionError>;
}

/// Device for hosts without OS clipboard access: never reports a
/// change, swallows writes.
pub struct IdleClipboard;

#[async_trait]
impl ClipboardDevice for IdleClipboard {
    async fn next_change(&mut self) -> Result<String, SessionError> {
        std::future::pending().await
    }

    fn set_text(&mut self, _text: &str) -> Result<(), SessionError> {
        Ok(())
    }
}

// ── ClipboardBridge ──────────────────────────────────────────────

enum BridgeCmd {
    Apply(String),
}

enum Wake {
    Stopped,
    Cmd(Option<BridgeCmd>),
    Change(Result<String, SessionError>),
}

/// Handle to the clipboard task owned by the session.
pub struct ClipboardBridge {
    cmd: mpsc::UnboundedSender<BridgeCmd>,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl ClipboardBridge {
    /// Spawn the bridge task over `device`, posting outbound clipboard
    /// events through `proxy`.
    pub fn start(mut device: Box<dyn ClipboardDevice>, proxy: Arc<ChannelProxy>) -> Self {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let token = stop.clone();

        let task = tokio::spawn(async move {
            let mut last_applied: Option<String> = None;
            let mut last_sent: Option<String> = None;

            loop {
                let wake = tokio::select! {
                    _ = token.cancelled() => Wake::Stopped,
                    cmd = cmd_rx.recv() => Wake::Cmd(cmd),
                    change = device.next_change() => Wake::Change(change),
                };

                match wake {
                    Wake::Stopped | Wake::Cmd(None) => break,
                    Wake::Cmd(Some(BridgeCmd::Apply(text))) => {
                        if let Err(e) = device.set_text(&text) {
                            warn!("failed to apply remote clipboard: {e}");
                            continue;
                        }
                        last_applied = Some(text);
                    }
                    Wake::Change(Ok(text)) => {
                        if last_applied.as_deref() == Some(text.as_str()) {
                            debug!("suppressed clipboard echo");
                            continue;
                        }
                        if last_sent.as_deref() == Some(text.as_str()) {
                            continue;
                        }

                        let msg = HostToClient::Clipboard(ClipboardEvent::text(text.clone()));
                        let bytes = match msg.to_bytes() {
                            Ok(b) => b,
                            Err(e) => {
                                warn!("failed to encode clipboard event: {e}");
                                continue;
                            }
                        };
                        if !proxy.post(bytes.into()) {
                            // Channel gone: stop producing.
                            break;
                        }
                        last_sent = Some(text);
                    }
                    Wake::Change(Err(e)) => {
                        warn!("clipboard watch failed: {e}");
                        break;
                    }
                }
            }
            debug!("clipboard bridge task finished");
        });

        Self {
            cmd: cmd_tx,
            stop,
            task,
        }
    }

    /// Apply clipboard content received from the remote peer. The
    /// content is remembered so it is never re-broadcast as local.
    pub fn apply_remote(&self, text: String) {
        let _ = self.cmd.send(BridgeCmd::Apply(text));
    }

    /// Stop the bridge task and wait for it to finish.
    pub async fn stop(self) {
        self.stop.cancel();
        let _ = self.task.await;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::Transport;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::io::duplex;
    use tokio_util::codec::{Framed, LengthDelimitedCodec};

    /// Scripted device: local changes are fed through a channel and
    /// applied texts are recorded.
    struct ScriptedClipboard {
        changes: mpsc::UnboundedReceiver<String>,
        applied: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl ClipboardDevice for ScriptedClipboard {
        async fn next_change(&mut self) -> Result<String, SessionError> {
            match self.changes.recv().await {
                Some(text) => Ok(text),
                None => std::future::pending().await,
            }
        }

        fn set_text(&mut self, text: &str) -> Result<(), SessionError> {
            let _ = self.applied.send(text.to_owned());
            Ok(())
        }
    }

    struct Fixture {
        bridge: ClipboardBridge,
        local_changes: mpsc::UnboundedSender<String>,
        applied: mpsc::UnboundedReceiver<String>,
        wire: Framed<tokio::io::DuplexStream, LengthDelimitedCodec>,
    }

    fn fixture() -> Fixture {
        let (near, far) = duplex(64 * 1024);
        let proxy = Arc::new(ChannelProxy::new(Transport::new(near)));
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let (applied_tx, applied_rx) = mpsc::unbounded_channel();
        let device = ScriptedClipboard {
            changes: change_rx,
            applied: applied_tx,
        };
        Fixture {
            bridge: ClipboardBridge::start(Box::new(device), proxy),
            local_changes: change_tx,
            applied: applied_rx,
            wire: Framed::new(far, LengthDelimitedCodec::new()),
        }
    }

    async fn expect_clipboard(fx: &mut Fixture) -> String {
        let frame = tokio::time::timeout(Duration::from_secs(1), fx.wire.next())
            .await
            .expect("no clipboard message arrived")
            .unwrap()
            .unwrap();
        match HostToClient::from_bytes(&frame).unwrap() {
            HostToClient::Clipboard(ev) => ev.as_text().unwrap().to_owned(),
            other => panic!("expected Clipboard, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_change_is_posted() {
        let mut fx = fixture();
        fx.local_changes.send("fresh".into()).unwrap();
        assert_eq!(expect_clipboard(&mut fx).await, "fresh");
        fx.bridge.stop().await;
    }

    #[tokio::test]
    async fn applied_remote_content_is_not_echoed() {
        let mut fx = fixture();

        fx.bridge.apply_remote("from-peer".into());
        assert_eq!(fx.applied.recv().await.unwrap(), "from-peer");

        // The device reports the change the bridge itself just made,
        // then a genuine local change.
        fx.local_changes.send("from-peer".into()).unwrap();
        fx.local_changes.send("genuine".into()).unwrap();

        // Only the genuine one reaches the wire.
        assert_eq!(expect_clipboard(&mut fx).await, "genuine");
        fx.bridge.stop().await;
    }

    #[tokio::test]
    async fn duplicate_content_is_sent_once() {
        let mut fx = fixture();
        fx.local_changes.send("same".into()).unwrap();
        fx.local_changes.send("same".into()).unwrap();
        fx.local_changes.send("different".into()).unwrap();

        assert_eq!(expect_clipboard(&mut fx).await, "same");
        assert_eq!(expect_clipboard(&mut fx).await, "different");
        fx.bridge.stop().await;
    }

    #[tokio::test]
    async fn stop_terminates_the_task() {
        let fx = fixture();
        let Fixture { bridge, .. } = fx;
        tokio::time::timeout(Duration::from_secs(1), bridge.stop())
            .await
            .expect("bridge did not stop");
    }
}
