//! Stream lifecycle controller
//!
//! Owns the on/off state of the polling loop and the shared camera
//! target, and drives fetch → encode → broadcast on each tick. At most
//! one loop task is alive per process: `start` is idempotent while a
//! loop runs and only retargets the camera, and the loop tears itself
//! down once the last viewer leaves or a stop arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::codec;
use crate::config::{Resolution, VideoConfig};
use crate::registry::SessionRegistry;
use crate::source::FrameSource;

/// Backoff after an unclassified tick error
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Controller for the single background streaming loop
pub struct StreamController {
    registry: Arc<SessionRegistry>,
    source: Arc<dyn FrameSource>,
    resolution: Resolution,
    quality: u8,
    frame_delay: Duration,

    /// Streaming flag; the loop re-checks it at the top of every tick
    streaming: AtomicBool,
    /// Current camera target, last writer wins (shared across all viewers)
    camera: RwLock<String>,
    /// Slot for the one live loop task; spawn only when empty or finished
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamController {
    /// Create a controller wired to the given registry and frame source
    pub fn new(
        config: &VideoConfig,
        registry: Arc<SessionRegistry>,
        source: Arc<dyn FrameSource>,
    ) -> Self {
        Self {
            registry,
            source,
            resolution: config.resolution,
            quality: config.quality,
            frame_delay: config.frame_delay(),
            streaming: AtomicBool::new(false),
            camera: RwLock::new(config.camera_entity.clone()),
            loop_task: Mutex::new(None),
        }
    }

    /// Whether the controller is in the Streaming state
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Whether a loop task is currently alive
    pub async fn is_loop_alive(&self) -> bool {
        let task = self.loop_task.lock().await;
        task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Current camera target
    pub async fn camera(&self) -> String {
        self.camera.read().await.clone()
    }

    /// Transition to Streaming.
    ///
    /// A non-empty `requested` id overwrites the shared camera target for
    /// every viewer. Returns the effective target, or `None` when no
    /// camera entity is known (in which case nothing starts). While a
    /// loop is already alive this only retargets; it never spawns a
    /// second loop.
    pub async fn start(self: &Arc<Self>, requested: Option<String>) -> Option<String> {
        if let Some(id) = requested.filter(|id| !id.is_empty()) {
            *self.camera.write().await = id;
        }

        let entity = self.camera.read().await.clone();
        if entity.is_empty() {
            return None;
        }

        self.streaming.store(true, Ordering::Release);

        // The slot lock serializes starts against each other and against
        // the loop's own exit: a clean exit clears the slot under this
        // lock, so an empty or finished slot proves no loop survives
        let mut task = self.loop_task.lock().await;
        if task.as_ref().map_or(true, |t| t.is_finished()) {
            let controller = Arc::clone(self);
            *task = Some(tokio::spawn(controller.stream_loop()));
        }

        Some(entity)
    }

    /// Transition to Idle.
    ///
    /// Cooperative: the loop observes the cleared flag at the top of its
    /// next iteration; in-flight tick work completes or times out first.
    pub fn stop(&self) {
        self.streaming.store(false, Ordering::Release);
    }

    /// The background polling loop: fetch → encode → broadcast → pace.
    ///
    /// Exits only on an explicit stop or an empty registry; per-tick
    /// failures are logged and skipped.
    async fn stream_loop(self: Arc<Self>) {
        let camera = self.camera().await;
        tracing::info!(
            camera = %camera,
            resolution = %self.resolution,
            "Stream loop started"
        );

        loop {
            if self.is_streaming() && !self.registry.is_empty().await {
                match self.tick().await {
                    Ok(()) => sleep(self.frame_delay).await,
                    Err(e) if e.is_transient() => {
                        tracing::warn!(error = %e, "Skipping frame");
                        sleep(self.frame_delay).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Stream loop error, backing off");
                        sleep(ERROR_BACKOFF).await;
                    }
                }
                continue;
            }

            // Exit path. Clearing the slot must be mutually exclusive with
            // start()'s spawn decision: a start that lands between the
            // observation above and the task actually finishing would see
            // a live-looking handle, skip its spawn, and leave an acked
            // viewer with no loop. Under the lock, re-check and either
            // keep running or hand the slot back empty.
            let mut task = self.loop_task.lock().await;
            if self.is_streaming() && !self.registry.is_empty().await {
                continue;
            }
            *task = None;

            if self.is_streaming() {
                tracing::info!("Stream loop exited: no viewers left");
            } else {
                tracing::info!("Stream loop exited: stop requested");
            }
            break;
        }
    }

    /// One tick: acquire, transcode, fan out
    async fn tick(&self) -> crate::error::Result<()> {
        let entity = self.camera.read().await.clone();

        let raw = self.source.fetch(&entity).await?;
        let frame = codec::encode_frame(&raw, self.resolution, self.quality)?;

        self.registry.broadcast(&frame.into()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VideoError;
    use crate::registry::ViewerSession;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::io::Cursor;
    use std::sync::atomic::AtomicU64;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    /// Frame source returning a fixed in-memory still, counting fetches
    struct MockSource {
        still: Bytes,
        fetches: AtomicU64,
        fail_with_503: bool,
    }

    impl MockSource {
        fn new() -> Self {
            let img = image::RgbImage::from_pixel(64, 48, image::Rgb([10, 20, 30]));
            let mut bytes = Vec::new();
            image::DynamicImage::ImageRgb8(img)
                .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
                .unwrap();

            Self {
                still: Bytes::from(bytes),
                fetches: AtomicU64::new(0),
                fail_with_503: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_with_503: true,
                ..Self::new()
            }
        }

        fn fetch_count(&self) -> u64 {
            self.fetches.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl FrameSource for MockSource {
        async fn fetch(&self, _entity_id: &str) -> crate::error::Result<Bytes> {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            if self.fail_with_503 {
                Err(VideoError::UpstreamStatus(
                    reqwest::StatusCode::SERVICE_UNAVAILABLE,
                ))
            } else {
                Ok(self.still.clone())
            }
        }
    }

    fn test_controller(
        source: Arc<MockSource>,
    ) -> (Arc<StreamController>, Arc<SessionRegistry>) {
        let config = VideoConfig::default()
            .fps(100)
            .resolution(Resolution::new(32, 24))
            .camera_entity("camera.test");
        let registry = Arc::new(SessionRegistry::new());
        let controller = Arc::new(StreamController::new(
            &config,
            Arc::clone(&registry),
            source,
        ));
        (controller, registry)
    }

    fn viewer(id: u64) -> (ViewerSession, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ViewerSession::new(id, "127.0.0.1:9999".parse().unwrap(), tx), rx)
    }

    #[tokio::test]
    async fn test_start_requires_a_camera_entity() {
        let source = Arc::new(MockSource::new());
        let config = VideoConfig::default(); // empty camera_entity
        let registry = Arc::new(SessionRegistry::new());
        let controller = Arc::new(StreamController::new(&config, registry, source));

        assert_eq!(controller.start(None).await, None);
        assert!(!controller.is_streaming());
        assert!(!controller.is_loop_alive().await);

        // An explicit entity gets things going
        let started = controller.start(Some("camera.front".into())).await;
        assert_eq!(started.as_deref(), Some("camera.front"));
        assert!(controller.is_streaming());
    }

    #[tokio::test]
    async fn test_duplicate_start_spawns_one_loop() {
        let source = Arc::new(MockSource::new());
        let (controller, registry) = test_controller(Arc::clone(&source));
        let (session, _rx) = viewer(1);
        registry.add(session).await;

        for _ in 0..5 {
            controller.start(None).await;
        }
        assert!(controller.is_loop_alive().await);

        // Retarget while streaming: still one loop, new camera
        controller.start(Some("camera.back".into())).await;
        assert_eq!(controller.camera().await, "camera.back");
        assert!(controller.is_loop_alive().await);

        controller.stop();
        sleep(Duration::from_millis(100)).await;
        assert!(!controller.is_loop_alive().await);
    }

    #[tokio::test]
    async fn test_frames_reach_viewer() {
        let source = Arc::new(MockSource::new());
        let (controller, registry) = test_controller(Arc::clone(&source));
        let (session, mut rx) = viewer(1);
        registry.add(session).await;

        controller.start(None).await;

        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no frame within deadline")
            .expect("channel closed");

        match msg {
            Message::Text(text) => {
                let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(json["type"], "video_frame");
                assert_eq!(json["width"], 32);
                assert_eq!(json["height"], 24);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        controller.stop();
    }

    #[tokio::test]
    async fn test_loop_exits_when_registry_empties() {
        let source = Arc::new(MockSource::new());
        let (controller, registry) = test_controller(Arc::clone(&source));
        let (session, _rx) = viewer(1);
        registry.add(session).await;

        controller.start(None).await;
        sleep(Duration::from_millis(50)).await;
        assert!(controller.is_loop_alive().await);

        registry.remove(1).await;
        sleep(Duration::from_millis(100)).await;
        assert!(!controller.is_loop_alive().await);

        // No further upstream fetches once the loop is gone
        let settled = source.fetch_count();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(source.fetch_count(), settled);
    }

    #[tokio::test]
    async fn test_upstream_503_keeps_loop_alive() {
        let source = Arc::new(MockSource::failing());
        let (controller, registry) = test_controller(Arc::clone(&source));
        let (session, mut rx) = viewer(1);
        registry.add(session).await;

        controller.start(None).await;

        // Let several failing ticks elapse
        sleep(Duration::from_millis(100)).await;
        assert!(source.fetch_count() >= 3);
        assert!(controller.is_loop_alive().await);
        assert_eq!(registry.len().await, 1);

        // Not a single frame was broadcast
        assert!(rx.try_recv().is_err());

        controller.stop();
    }

    #[tokio::test]
    async fn test_start_racing_loop_exit_never_loses_the_stream() {
        let source = Arc::new(MockSource::new());
        let (controller, registry) = test_controller(Arc::clone(&source));

        // Churn viewers with no pause between the last one leaving and
        // the next one starting, so each start races the previous loop's
        // empty-registry exit. Every acked start must leave a loop that
        // actually delivers frames.
        for id in 0..25 {
            let (session, mut rx) = viewer(id);
            registry.add(session).await;

            let started = controller.start(None).await;
            assert!(started.is_some());

            let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap_or_else(|_| panic!("start #{} left no live loop", id))
                .expect("channel closed");
            assert!(matches!(msg, Message::Text(_)));

            registry.remove(id).await;
        }

        controller.stop();
    }

    #[tokio::test]
    async fn test_restart_after_stop_spawns_fresh_loop() {
        let source = Arc::new(MockSource::new());
        let (controller, registry) = test_controller(Arc::clone(&source));
        let (session, _rx) = viewer(1);
        registry.add(session).await;

        controller.start(None).await;
        controller.stop();
        sleep(Duration::from_millis(100)).await;
        assert!(!controller.is_loop_alive().await);

        // A stale finished handle in the slot must not block a restart
        let started = controller.start(None).await;
        assert_eq!(started.as_deref(), Some("camera.test"));
        assert!(controller.is_loop_alive().await);

        controller.stop();
    }
}
