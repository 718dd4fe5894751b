//! Relay entry point
//!
//! Loads configuration from the environment and runs the WebSocket relay
//! until interrupted. With `ENABLE_VIDEO=false` the process starts, logs,
//! and exits without binding anything.

use camrelay::{VideoConfig, VideoServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("camrelay=info".parse()?),
        )
        .init();

    let config = VideoConfig::from_env();
    tracing::info!(
        fps = config.fps,
        quality = config.quality,
        resolution = %config.resolution,
        camera = %config.camera_entity,
        "Video relay config"
    );

    if !config.enabled {
        tracing::info!("Video streaming is disabled");
        return Ok(());
    }

    let server = VideoServer::new(config)?;
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("Video server stopped");
    Ok(())
}
