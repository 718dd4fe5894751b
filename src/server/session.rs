//! Per-viewer session handling
//!
//! One task per connection: WebSocket handshake, then a message loop that
//! decodes control messages and drives the stream controller. A writer
//! task forwards the session's outbound queue (direct replies and
//! broadcast frames share it) into the sink. No message-level error ever
//! terminates the connection; only a close frame or a transport error
//! does.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::Result;
use crate::protocol::{ControlMessage, ServerMessage};
use crate::registry::{SessionRegistry, ViewerSession};
use crate::stream::StreamController;

/// Handle one viewer connection from handshake to disconnect
pub(crate) async fn run(
    session_id: u64,
    socket: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    controller: Arc<StreamController>,
) -> Result<()> {
    super::configure_socket(&socket);
    let ws_stream = accept_async(socket).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // The writer task owns the sink; everything outbound goes through the
    // channel, so broadcasts and replies never contend for the socket
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let session = ViewerSession::new(session_id, peer_addr, tx);
    registry.add(session.clone()).await;
    tracing::info!(session_id = session_id, peer = %peer_addr, "Viewer connected");

    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_control(&session, &controller, text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            // Binary payloads and ping/pong frames carry no control semantics
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(session_id = session_id, error = %e, "Receive error");
                break;
            }
        }
    }

    tracing::info!(session_id = session_id, peer = %peer_addr, "Viewer disconnected");
    registry.remove(session_id).await;

    // Last viewer out: flip the controller to Idle so the loop winds down
    if registry.is_empty().await {
        controller.stop();
    }

    drop(session);
    let _ = writer.await;

    Ok(())
}

/// Decode and apply one control message
async fn handle_control(
    session: &ViewerSession,
    controller: &Arc<StreamController>,
    text: &str,
) {
    let message = match serde_json::from_str::<ControlMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(
                session_id = session.id,
                peer = %session.peer_addr,
                error = %e,
                "Ignoring malformed control message"
            );
            return;
        }
    };

    match message {
        ControlMessage::StartVideo { entity_id } => match controller.start(entity_id).await {
            Some(entity) => {
                tracing::info!(session_id = session.id, camera = %entity, "Starting video stream");
                session.send(&ServerMessage::VideoStarted { entity_id: entity });
            }
            None => {
                tracing::warn!(
                    session_id = session.id,
                    "start_video without a camera entity, ignoring"
                );
            }
        },
        ControlMessage::StopVideo => {
            tracing::info!(session_id = session.id, "Stopping video stream");
            controller.stop();
            session.send(&ServerMessage::VideoStopped);
        }
        ControlMessage::Ping => {
            session.send(&ServerMessage::Pong);
        }
    }
}
