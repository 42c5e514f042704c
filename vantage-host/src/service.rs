//! Worker service: attach to the broker channel and run one session.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::info;

use vantage_core::{
    DesktopSession, FrameSource, IdleClipboard, NullInjector, SessionParts, TestPatternSource,
    Transport,
};

use crate::config::HostConfig;

/// One worker lifetime: connect, run the session, tear down.
pub struct HostService {
    config: HostConfig,
}

impl HostService {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    /// Attach to the channel endpoint and drive the session to
    /// completion. The endpoint is a TCP socket address, or a Unix
    /// socket path on Unix.
    pub async fn run(self, channel: &str) -> Result<(), Box<dyn std::error::Error>> {
        if let Ok(addr) = channel.parse::<std::net::SocketAddr>() {
            info!(%addr, "attaching to TCP channel");
            let stream = TcpStream::connect(addr).await?;
            return self.run_over(stream).await;
        }

        #[cfg(unix)]
        {
            info!(path = channel, "attaching to Unix channel");
            let stream = tokio::net::UnixStream::connect(channel).await?;
            return self.run_over(stream).await;
        }

        #[cfg(not(unix))]
        Err(format!("not a socket address: {channel}").into())
    }

    async fn run_over<S>(self, stream: S) -> Result<(), Box<dyn std::error::Error>>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let fps = self.config.capture.fps.clamp(1, 60);
        let parts = SessionParts {
            // TODO: swap in the platform capturer once the capture
            // backend crate lands; the test pattern keeps the worker
            // end-to-end exercisable until then.
            source_factory: Box::new(move |config| {
                Ok(Box::new(TestPatternSource::new(config.width, config.height, fps))
                    as Box<dyn FrameSource>)
            }),
            injector: Box::new(NullInjector),
            clipboard: self
                .config
                .clipboard
                .enabled
                .then(|| Box::new(IdleClipboard) as _),
        };

        let mut session = DesktopSession::new(Transport::new(stream), parts);

        // Ctrl-C requests teardown through the proxy; the session loop
        // observes the channel as gone and winds down on its own.
        let proxy = session.proxy();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl-C received, shutting down");
            proxy.notify_destroying();
        });

        session.run().await?;
        info!("session ended");
        Ok(())
    }
}
