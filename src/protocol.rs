//! Wire protocol messages
//!
//! Text WebSocket frames carrying JSON bodies, internally tagged on
//! `"type"`. Control messages flow viewer → server; server messages
//! (acknowledgements and video frames) flow back.

use serde::{Deserialize, Serialize};

/// Control message sent by a viewer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Begin (or retarget) the camera stream
    StartVideo {
        /// Camera entity to poll; falls back to the current/default target
        #[serde(default)]
        entity_id: Option<String>,
    },
    /// Stop the camera stream for everyone
    StopVideo,
    /// Liveness probe
    Ping,
}

/// Message sent by the server to a viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Acknowledges a start, echoing the effective camera entity
    VideoStarted {
        /// Camera entity now being polled
        entity_id: String,
    },
    /// Acknowledges a stop
    VideoStopped,
    /// Reply to a ping
    Pong,
    /// One encoded video frame
    VideoFrame {
        /// Base64-encoded JPEG bytes
        data: String,
        /// Frame width in pixels
        width: u32,
        /// Frame height in pixels
        height: u32,
    },
}

/// A transcoded frame ready for transport
///
/// Constructed per tick and discarded after broadcast; nothing retains
/// frames once they have been fanned out.
#[derive(Debug, Clone)]
pub struct FramePayload {
    /// Base64-encoded JPEG bytes
    pub data: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl From<FramePayload> for ServerMessage {
    fn from(frame: FramePayload) -> Self {
        ServerMessage::VideoFrame {
            data: frame.data,
            width: frame.width,
            height: frame.height,
        }
    }
}
