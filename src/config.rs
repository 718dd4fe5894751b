//! Relay configuration
//!
//! All knobs come from the environment and are fixed for the process
//! lifetime. Bad values never abort startup: each one falls back to its
//! default with a warning.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Default output resolution when `VIDEO_RESOLUTION` is missing or invalid
pub const DEFAULT_RESOLUTION: Resolution = Resolution {
    width: 320,
    height: 240,
};

/// Timeout for one upstream snapshot request
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Output resolution (positive dimensions)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Resolution {
    /// Create a new resolution
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = crate::error::VideoError;

    /// Parse a `WxH` string such as `"640x480"`; zero dimensions are rejected
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::error::VideoError::Config(format!("invalid resolution '{}'", s));

        let (w, h) = s.split_once('x').ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;

        if width == 0 || height == 0 {
            return Err(invalid());
        }

        Ok(Self { width, height })
    }
}

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct VideoConfig {
    /// Port the WebSocket listener binds on (all interfaces)
    pub port: u16,

    /// Whether the relay serves at all; when false the process starts,
    /// logs, and exits without binding
    pub enabled: bool,

    /// Target frame rate (frames per second, at least 1)
    pub fps: u32,

    /// JPEG quality (0-100)
    pub quality: u8,

    /// Output resolution frames are resized to
    pub resolution: Resolution,

    /// Default camera entity id (possibly empty until a viewer picks one)
    pub camera_entity: String,

    /// Base URL of the upstream image proxy
    pub base_url: String,

    /// Bearer credential forwarded to the upstream proxy
    pub token: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            port: 8082,
            enabled: true,
            fps: 10,
            quality: 70,
            resolution: DEFAULT_RESOLUTION,
            camera_entity: String::new(),
            base_url: "http://supervisor/core".to_string(),
            token: String::new(),
        }
    }
}

impl VideoConfig {
    /// Load configuration from the environment.
    ///
    /// Recognized variables: `VIDEO_PORT`, `ENABLE_VIDEO`, `VIDEO_FPS`,
    /// `VIDEO_QUALITY`, `VIDEO_RESOLUTION`, `VIDEO_CAMERA_ENTITY`,
    /// `HA_URL`, `SUPERVISOR_TOKEN`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            port: parse_var("VIDEO_PORT", defaults.port),
            enabled: std::env::var("ENABLE_VIDEO")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.enabled),
            fps: parse_var("VIDEO_FPS", defaults.fps).max(1),
            quality: parse_var("VIDEO_QUALITY", defaults.quality).min(100),
            resolution: match std::env::var("VIDEO_RESOLUTION") {
                Ok(s) => s.parse().unwrap_or_else(|_| {
                    tracing::warn!(
                        value = %s,
                        fallback = %DEFAULT_RESOLUTION,
                        "Invalid VIDEO_RESOLUTION, using fallback"
                    );
                    DEFAULT_RESOLUTION
                }),
                Err(_) => defaults.resolution,
            },
            camera_entity: std::env::var("VIDEO_CAMERA_ENTITY").unwrap_or(defaults.camera_entity),
            base_url: std::env::var("HA_URL").unwrap_or(defaults.base_url),
            token: std::env::var("SUPERVISOR_TOKEN").unwrap_or(defaults.token),
        }
    }

    /// Address the listener binds to
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Pacing delay between two ticks
    pub fn frame_delay(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }

    /// Set the frame rate
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    /// Set the JPEG quality
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(100);
        self
    }

    /// Set the output resolution
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the default camera entity
    pub fn camera_entity(mut self, entity: impl Into<String>) -> Self {
        self.camera_entity = entity.into();
        self
    }
}

/// Read an environment variable, falling back to `default` (with a warning)
/// when it is missing or unparsable
fn parse_var<T: FromStr + fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %value, fallback = %default, "Unparsable value, using fallback");
            default
        }),
        Err(_) => default,
    }
}
