mod app;
#[cfg_attr(not(feature = "opencv"), allow(dead_code))]
mod models;
mod spotify;

use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use moodtune_core::config::MoodConfig;
use moodtune_core::pipeline::PipelineHandle;
use moodtune_core::stream::{frame_channel, FrameSender};
use moodtune_core::SharedEmotion;

use app::AppState;
use spotify::SpotifyClient;

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();

    let config = MoodConfig::load().context("Failed to load configuration")?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let signals = {
        let _guard = runtime.enter();
        ShutdownSignals::install()?
    };

    let shared = SharedEmotion::new();
    let (frames_tx, frames_rx) = frame_channel();

    let pipeline = start_pipeline(&config, shared.clone(), frames_tx)?;

    let client = SpotifyClient::new(&config.spotify);
    if !client.has_token() {
        warn!("No Spotify access token configured; /recommend and /play will fail until one is set");
    }

    let state = AppState::new(
        shared,
        frames_rx,
        Arc::new(client),
        config.genres.clone(),
        config.server.recommend_cache_ttl(),
    );

    let served = runtime.block_on(serve(&config.server.bind, state, signals, pipeline.stop_flag()));

    // Always join the pipeline so the camera is released, even if serving failed.
    match pipeline.shutdown() {
        Some(exit) => info!("Frame pipeline exited: {:?}", exit),
        None => warn!("Frame pipeline did not exit cleanly"),
    }

    served
}

#[cfg(feature = "opencv")]
fn start_pipeline(config: &MoodConfig, shared: SharedEmotion, frames: FrameSender) -> Result<PipelineHandle> {
    use moodtune_core::camera::Webcam;
    use moodtune_core::classifier::FaceEmotionClassifier;
    use moodtune_core::render::JpegRenderer;
    use moodtune_core::{EmotionStabilizer, FramePipeline};
    use std::time::Instant;

    let dwell = config.stabilizer.dwell()?;

    // Downloads and model loading can take a while; the camera is only
    // opened once nothing slow stands between it and the pipeline thread.
    models::ensure_models(&config.classifier);
    let classifier = FaceEmotionClassifier::load(&config.classifier);

    let webcam = Webcam::open(&config.camera).context("Webcam is not accessible")?;

    let stabilizer = EmotionStabilizer::with_dwell(Instant::now(), dwell);
    let pipeline = FramePipeline::new(webcam, classifier, JpegRenderer::default(), stabilizer, shared, frames)
        .with_read_retry(config.camera.read_retry());

    moodtune_core::pipeline::spawn(pipeline).context("Failed to start frame pipeline thread")
}

#[cfg(not(feature = "opencv"))]
fn start_pipeline(_config: &MoodConfig, _shared: SharedEmotion, _frames: FrameSender) -> Result<PipelineHandle> {
    anyhow::bail!("moodtune was built without the `opencv` feature; no camera backend is available")
}

async fn serve(bind: &str, state: AppState, signals: ShutdownSignals, stop: Arc<AtomicBool>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", listener.local_addr().context("Listener has no address")?);

    axum::serve(listener, app::router(state))
        .with_graceful_shutdown(signals.wait(stop))
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Ctrl-C / SIGTERM listeners. They are registered before the camera is
/// opened, so a signal during startup is queued instead of killing the
/// process with the device still held.
struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    /// Must be called inside a tokio runtime context.
    #[cfg(unix)]
    fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("Failed to listen for Ctrl-C")?,
            terminate: signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?,
        })
    }

    #[cfg(not(unix))]
    fn install() -> Result<Self> {
        Ok(Self {})
    }

    /// Resolves on the first signal. Stopping the pipeline drops the frame
    /// sender, which ends every open `/video_feed` stream so the server can drain.
    #[cfg(unix)]
    async fn wait(mut self, stop: Arc<AtomicBool>) {
        tokio::select! {
            _ = self.interrupt.recv() => {},
            _ = self.terminate.recv() => {},
        }
        Self::stop(&stop);
    }

    #[cfg(not(unix))]
    async fn wait(self, stop: Arc<AtomicBool>) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        Self::stop(&stop);
    }

    fn stop(stop: &AtomicBool) {
        info!("Shutting down");
        stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_before_serving_is_not_lost() {
        let signals = ShutdownSignals::install().unwrap();

        // Delivered while nothing is waiting yet, like a Ctrl-C during startup.
        let status = Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let stop = Arc::new(AtomicBool::new(false));
        tokio::time::timeout(Duration::from_secs(5), signals.wait(stop.clone()))
            .await
            .unwrap();
        assert!(stop.load(Ordering::Relaxed));
    }
}
