//! camrelay — camera frame relay
//!
//! A companion process that polls still images from an HTTP camera proxy
//! and fans them out to WebSocket viewers at a bounded frame rate and
//! size. One background polling loop per process, torn down automatically
//! when the last viewer disconnects.
//!
//! ```text
//! viewer ──ws── SessionHandler ──┐
//! viewer ──ws── SessionHandler ──┤ SessionRegistry
//!                                │      ▲ broadcast
//!         StreamController ──────┘      │
//!           └─ loop: FrameSource → codec ┘  (fetch → encode → fan out)
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod source;
pub mod stream;

pub use config::{Resolution, VideoConfig};
pub use error::{Result, VideoError};
pub use server::VideoServer;
