//! Per-session orchestration.
//!
//! [`DesktopSession`] owns the channel proxy and the lifecycle of every
//! per-session subsystem: the capture pipeline, the clipboard bridge,
//! and the input injector. It decodes inbound messages and dispatches
//! them, encodes outbound updates, and drives the
//! [`ChannelState`] machine from `Idle` to `Closed`.
//!
//! ## Outbound capture path
//!
//! ```text
//! FrameSource ─► VideoEncoder / CursorEncoder ─► ScreenUpdate
//!      ▲                                             │
//!      └───────────── ack ◄── ChannelProxy::send ◄───┘
//! ```
//!
//! The next capture cycle is requested only once the previous frame's
//! send is acknowledged, so at most one encoded frame is ever
//! unacknowledged — memory stays O(1) no matter how fast the source
//! produces and how slowly the transport drains.
//!
//! ## Teardown
//!
//! Every fatal condition funnels into one path: stop the capture
//! pipeline, stop the clipboard bridge, release the injector, then tell
//! the proxy the transport is going away — the reverse of creation
//! order, so no subsystem outlives a dependency it needs.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{FrameSource, FrameSourceFactory};
use crate::clipboard::{ClipboardBridge, ClipboardDevice};
use crate::codec::{CursorEncoder, VideoEncoder};
use crate::error::SessionError;
use crate::input::InputInjector;
use crate::ipc::{ChannelProxy, Transport, TransportEvent};
use crate::proto::{ClientToHost, HostToClient, PointerEvent, SessionConfig, StatusCode};
use crate::state::ChannelState;

// ── SessionParts ─────────────────────────────────────────────────

/// Collaborators handed to the session at construction.
pub struct SessionParts {
    /// Opens a frame source sized to an accepted configuration.
    pub source_factory: FrameSourceFactory,
    /// Applies remote input to the local desktop.
    pub injector: Box<dyn InputInjector>,
    /// Local clipboard access; `None` disables clipboard sync.
    pub clipboard: Option<Box<dyn ClipboardDevice>>,
}

// ── DesktopSession ───────────────────────────────────────────────

/// The session-side worker: bridges desktop capture, input injection,
/// and clipboard access with the broker over one duplex channel.
pub struct DesktopSession {
    proxy: Arc<ChannelProxy>,
    state: ChannelState,
    config: Option<SessionConfig>,

    source_factory: FrameSourceFactory,
    injector: Option<Box<dyn InputInjector>>,
    clipboard_device: Option<Box<dyn ClipboardDevice>>,

    pipeline: Option<CapturePipeline>,
    bridge: Option<ClipboardBridge>,

    fatal_tx: mpsc::UnboundedSender<SessionError>,
    fatal_rx: mpsc::UnboundedReceiver<SessionError>,
}

impl DesktopSession {
    /// Build a session over an already-identified channel.
    pub fn new(transport: Transport, parts: SessionParts) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        Self {
            proxy: Arc::new(ChannelProxy::new(transport)),
            state: ChannelState::default(),
            config: None,
            source_factory: parts.source_factory,
            injector: Some(parts.injector),
            clipboard_device: parts.clipboard,
            pipeline: None,
            bridge: None,
            fatal_tx,
            fatal_rx,
        }
    }

    /// Shared handle to the channel proxy, e.g. for an owner thread
    /// that wants to `wait_for_gone` or request shutdown.
    pub fn proxy(&self) -> Arc<ChannelProxy> {
        Arc::clone(&self.proxy)
    }

    /// Current channel state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Drive the session until the channel closes.
    ///
    /// Returns `Ok(())` for an orderly end (peer disconnect, transport
    /// gone, external shutdown) and the fatal error otherwise. Either
    /// way the session is fully torn down when this returns.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        info!("session started, awaiting channel connect");

        let mut failure: Option<SessionError> = None;
        loop {
            let event = tokio::select! {
                Some(err) = self.fatal_rx.recv() => {
                    if matches!(err, SessionError::TransportGone) {
                        debug!("producer observed transport gone");
                    } else {
                        failure = Some(err);
                    }
                    break;
                }
                event = self.proxy.next_event() => event,
            };

            match event {
                None => break, // proxy gone
                Some(TransportEvent::Connected(token)) => {
                    if let Err(e) = self.state.on_connected() {
                        failure = Some(e);
                        break;
                    }
                    info!(correlation = token, "channel connected");
                    if !self.post(&HostToClient::ConfigRequest) {
                        break;
                    }
                }
                Some(TransportEvent::Message(bytes)) => {
                    if let Err(e) = self.dispatch(&bytes).await {
                        if e.is_fatal() {
                            failure = Some(e);
                            break;
                        }
                        warn!("dropped inbound message: {e}");
                    }
                }
                Some(TransportEvent::Disconnected) => {
                    info!("channel disconnected");
                    break;
                }
            }
        }

        self.shutdown().await;
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ── Inbound dispatch ─────────────────────────────────────────

    async fn dispatch(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        match ClientToHost::from_bytes(bytes)? {
            ClientToHost::Pointer(event) => {
                self.handle_pointer(event);
                Ok(())
            }
            ClientToHost::Key(event) => {
                if self.accepts_input() {
                    if let Some(injector) = self.injector.as_mut() {
                        if let Err(e) = injector.inject_key(&event) {
                            warn!("key injection failed: {e}");
                        }
                    }
                }
                Ok(())
            }
            ClientToHost::Clipboard(event) => {
                match (&self.bridge, event.as_text()) {
                    (Some(bridge), Some(text)) => bridge.apply_remote(text.to_owned()),
                    (None, _) => debug!("clipboard event before bridge start, dropped"),
                    (_, None) => warn!("unsupported clipboard mime type: {}", event.mime_type),
                }
                Ok(())
            }
            ClientToHost::Config(config) => self.apply_config(config).await,
        }
    }

    fn handle_pointer(&mut self, event: PointerEvent) {
        if !self.accepts_input() {
            return;
        }
        let Some(config) = &self.config else { return };
        let in_bounds = event.x >= 0
            && event.y >= 0
            && (event.x as u32) < config.width
            && (event.y as u32) < config.height;
        if !in_bounds {
            warn!(x = event.x, y = event.y, "pointer event out of bounds, dropped");
            return;
        }
        if let Some(injector) = self.injector.as_mut() {
            if let Err(e) = injector.inject_pointer(&event) {
                warn!("pointer injection failed: {e}");
            }
        }
    }

    fn accepts_input(&self) -> bool {
        self.state.is_configured()
            && self.config.as_ref().is_some_and(SessionConfig::accepts_input)
    }

    // ── Configuration ────────────────────────────────────────────

    /// Validate and apply a session configuration, (re)starting the
    /// capture pipeline sized to it.
    ///
    /// A rejected configuration emits exactly one failure status and is
    /// fatal — it signals protocol desynchronization, not a retryable
    /// condition.
    async fn apply_config(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        if let Err(e) = config.validate() {
            warn!("rejected session config: {e}");
            self.post(&HostToClient::Status(StatusCode::InvalidConfig));
            return Err(e);
        }

        // Re-configuration: the old pipeline stops before the new
        // geometry takes effect.
        if let Some(pipeline) = self.pipeline.take() {
            debug!("stopping capture pipeline for re-configuration");
            pipeline.stop().await;
        }

        let source = (self.source_factory)(&config)?;
        self.state.on_configured()?;
        info!(
            session_type = %config.session_type,
            width = config.width,
            height = config.height,
            "session configured"
        );

        // Bridge first, pipeline second: teardown runs the reverse.
        if self.bridge.is_none() && config.options.clipboard {
            if let Some(device) = self.clipboard_device.take() {
                self.bridge = Some(ClipboardBridge::start(device, Arc::clone(&self.proxy)));
            }
        }
        self.pipeline = Some(CapturePipeline::start(
            source,
            Arc::clone(&self.proxy),
            self.fatal_tx.clone(),
        ));

        self.config = Some(config);
        Ok(())
    }

    // ── Outbound helpers ─────────────────────────────────────────

    /// Fire-and-forget outbound message. Returns `false` when the
    /// channel is gone, which callers treat as "start closing".
    fn post(&self, message: &HostToClient) -> bool {
        match message.to_bytes() {
            Ok(bytes) => self.proxy.post(bytes.into()),
            Err(e) => {
                warn!("failed to encode outbound message: {e}");
                false
            }
        }
    }

    // ── Teardown ─────────────────────────────────────────────────

    /// The single teardown path. Safe against repeated triggers.
    async fn shutdown(&mut self) {
        if self.state.is_closed() {
            return;
        }
        if self.state.begin_closing().is_err() {
            return;
        }
        info!("session closing");

        if let Some(pipeline) = self.pipeline.take() {
            pipeline.stop().await;
        }
        if let Some(bridge) = self.bridge.take() {
            bridge.stop().await;
        }
        self.injector.take();

        self.proxy.notify_destroying();
        if self.state.close().is_ok() {
            info!("session closed");
        }
    }
}

// ── CapturePipeline ──────────────────────────────────────────────

/// The capture → encode → send → ack chain, running as one owned task.
struct CapturePipeline {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl CapturePipeline {
    fn start(
        mut source: Box<dyn FrameSource>,
        proxy: Arc<ChannelProxy>,
        fatal: mpsc::UnboundedSender<SessionError>,
    ) -> Self {
        let stop = CancellationToken::new();
        let token = stop.clone();

        let task = tokio::spawn(async move {
            // Encoders are exclusively owned by this task; the chain
            // below serializes every use.
            let mut video = VideoEncoder::new();
            let mut cursor_enc = CursorEncoder::new();

            loop {
                let update = tokio::select! {
                    _ = token.cancelled() => break,
                    update = source.next_update() => update,
                };
                let update = match update {
                    Ok(update) => update,
                    Err(e) => {
                        let _ = fatal.send(e);
                        break;
                    }
                };

                let frame = match video.encode(&update.frame) {
                    Ok(delta) => delta,
                    Err(e) => {
                        let _ = fatal.send(e);
                        break;
                    }
                };
                let cursor = match update
                    .cursor
                    .as_ref()
                    .map(|shape| cursor_enc.encode(shape))
                    .transpose()
                {
                    Ok(encoded) => encoded.flatten(),
                    Err(e) => {
                        let _ = fatal.send(e);
                        break;
                    }
                };

                // Neither the frame nor the cursor changed: next cycle.
                if frame.is_empty() && cursor.is_none() {
                    continue;
                }

                let message = HostToClient::ScreenUpdate { frame, cursor };
                let bytes = match message.to_bytes() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = fatal.send(e);
                        break;
                    }
                };

                let Some(ack) = proxy.send(bytes.into()) else {
                    let _ = fatal.send(SessionError::TransportGone);
                    break;
                };
                let flushed = tokio::select! {
                    _ = token.cancelled() => break,
                    flushed = ack.acked() => flushed,
                };
                if !flushed {
                    let _ = fatal.send(SessionError::TransportGone);
                    break;
                }
                // Ack received: request the next capture cycle.
            }
            debug!("capture pipeline task finished");
        });

        Self { stop, task }
    }

    async fn stop(self) {
        self.stop.cancel();
        let _ = self.task.await;
    }
}

// ── Tests ────────────────────────────────────────────────────────
