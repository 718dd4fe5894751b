//! WebSocket relay server
//!
//! Handles the TCP accept loop and spawns one session task per viewer
//! connection. All sessions share the process-wide registry and stream
//! controller.

mod session;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::config::VideoConfig;
use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::source::{CameraProxySource, FrameSource};
use crate::stream::StreamController;

/// Camera frame relay server
pub struct VideoServer {
    config: VideoConfig,
    registry: Arc<SessionRegistry>,
    controller: Arc<StreamController>,
    next_session_id: AtomicU64,
}

impl VideoServer {
    /// Create a server polling the configured upstream camera proxy
    pub fn new(config: VideoConfig) -> Result<Self> {
        let source = Arc::new(CameraProxySource::new(&config)?);
        Ok(Self::with_source(config, source))
    }

    /// Create a server with a custom frame source
    pub fn with_source(config: VideoConfig, source: Arc<dyn FrameSource>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let controller = Arc::new(StreamController::new(
            &config,
            Arc::clone(&registry),
            source,
        ));

        Self {
            config,
            registry,
            controller,
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Get a reference to the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get a reference to the stream controller
    pub fn controller(&self) -> &Arc<StreamController> {
        &self.controller
    }

    /// Run the server
    ///
    /// Binds the configured address and blocks until shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        tracing::info!(addr = %self.config.bind_addr(), "Video server listening");

        self.serve(listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        tracing::info!(addr = %self.config.bind_addr(), "Video server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                self.controller.stop();
                Ok(())
            }
            result = self.serve(listener) => result,
        }
    }

    /// Accept viewers on an already-bound listener
    ///
    /// Exposed so tests can bind an ephemeral port themselves.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                    let registry = Arc::clone(&self.registry);
                    let controller = Arc::clone(&self.controller);

                    tokio::spawn(async move {
                        if let Err(e) =
                            session::run(session_id, socket, peer_addr, registry, controller).await
                        {
                            tracing::debug!(
                                session_id = session_id,
                                error = %e,
                                "Session ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Configure a freshly accepted socket
pub(crate) fn configure_socket(socket: &TcpStream) {
    // Frames should go out as soon as they are encoded
    if let Err(e) = socket.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
    }
}
