//! Viewer session registry
//!
//! The central registry of connected viewers and the broadcast fan-out.
//! Thread-safe via `RwLock`; the read-heavy path (per-tick broadcast)
//! takes a consistent snapshot while sessions come and go concurrently.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

use crate::protocol::ServerMessage;

/// Handle to one connected viewer
///
/// The session's writer task owns the actual WebSocket sink; this handle
/// only queues outbound messages. A closed channel means the connection
/// is gone.
#[derive(Debug, Clone)]
pub struct ViewerSession {
    /// Process-unique session id
    pub id: u64,
    /// Remote address, for logging only
    pub peer_addr: SocketAddr,
    tx: mpsc::UnboundedSender<Message>,
}

impl ViewerSession {
    /// Create a session handle
    pub fn new(id: u64, peer_addr: SocketAddr, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { id, peer_addr, tx }
    }

    /// Queue one message for this viewer; `false` if the connection is gone
    pub fn send(&self, message: &ServerMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(json) => self.tx.send(Message::Text(json.into())).is_ok(),
            Err(e) => {
                tracing::error!(session_id = self.id, error = %e, "Failed to serialize message");
                false
            }
        }
    }

    fn send_raw(&self, payload: Utf8Bytes) -> bool {
        self.tx.send(Message::Text(payload)).is_ok()
    }
}

/// Registry of all connected viewer sessions
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u64, ViewerSession>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session; re-adding the same id is a no-op overwrite
    pub async fn add(&self, session: ViewerSession) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, session);
    }

    /// Deregister a session; no-op when absent
    pub async fn remove(&self, id: u64) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id);
    }

    /// Whether no viewers are connected
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Number of connected viewers
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Deliver a message to every registered session.
    ///
    /// The payload is serialized once into a cheap-to-clone text frame.
    /// Sessions whose send fails are removed as part of this call; a
    /// delivery failure is an implicit disconnect, never an error for
    /// the caller.
    pub async fn broadcast(&self, message: &ServerMessage) {
        let payload: Utf8Bytes = match serde_json::to_string(message) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize broadcast payload");
                return;
            }
        };

        let mut dropped = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for session in sessions.values() {
                if !session.send_raw(payload.clone()) {
                    dropped.push(session.id);
                }
            }
        }

        if !dropped.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in dropped {
                if let Some(session) = sessions.remove(&id) {
                    tracing::debug!(
                        session_id = id,
                        peer = %session.peer_addr,
                        "Viewer dropped during broadcast"
                    );
                }
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
