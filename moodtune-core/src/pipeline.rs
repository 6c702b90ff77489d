//! The frame loop: camera -> classifier -> stabilizer -> shared emotion ->
//! overlay -> JPEG -> stream fan-out.
//!
//! Transient failures are absorbed: a failed read is logged and retried on
//! the next iteration, a failed overlay or encode drops that one frame.
//! Neither ever ends the stream. The loop only exits when the camera stops
//! being accessible or a stop is requested.

use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::camera::FrameSource;
use crate::classifier::EmotionClassifier;
use crate::render::{overlay_text, FrameRenderer};
use crate::shared::SharedEmotion;
use crate::stabilizer::EmotionStabilizer;
use crate::stream::{multipart_part, FrameSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    CameraLost,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_read: u64,
    pub read_failures: u64,
    pub encode_failures: u64,
    pub frames_sent: u64,
    pub emotion_changes: u64,
}

pub struct FramePipeline<S, C, R> {
    source: S,
    classifier: C,
    renderer: R,
    stabilizer: EmotionStabilizer,
    shared: SharedEmotion,
    frames: FrameSender,
    read_retry: Duration,
    stats: PipelineStats,
}

impl<S, C, R> FramePipeline<S, C, R>
where
    S: FrameSource,
    C: EmotionClassifier<S::Frame>,
    R: FrameRenderer<S::Frame>,
{
    pub fn new(
        source: S,
        classifier: C,
        renderer: R,
        stabilizer: EmotionStabilizer,
        shared: SharedEmotion,
        frames: FrameSender,
    ) -> Self {
        Self {
            source,
            classifier,
            renderer,
            stabilizer,
            shared,
            frames,
            read_retry: Duration::ZERO,
            stats: PipelineStats::default(),
        }
    }

    /// Pause after a failed frame read so a flapping device does not spin.
    pub fn with_read_retry(mut self, delay: Duration) -> Self {
        self.read_retry = delay;
        self
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Run until the camera goes away or `stop` is set. The frame source is
    /// dropped (and with it the device released) when the pipeline is.
    pub fn run(&mut self, stop: &AtomicBool) -> PipelineExit {
        info!("Frame pipeline started");

        let exit = loop {
            if stop.load(Ordering::Relaxed) {
                break PipelineExit::Stopped;
            }
            if !self.source.is_accessible() {
                error!("Webcam is not accessible, stopping frame capture");
                break PipelineExit::CameraLost;
            }
            self.step();
        };

        info!(
            "Frame pipeline finished ({:?}): {} frames read, {} sent, {} read failures, {} encode failures",
            exit,
            self.stats.frames_read,
            self.stats.frames_sent,
            self.stats.read_failures,
            self.stats.encode_failures,
        );
        exit
    }

    fn step(&mut self) {
        let mut frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.read_failures += 1;
                error!("Failed to read frame from webcam: {}", e);
                if !self.read_retry.is_zero() {
                    thread::sleep(self.read_retry);
                }
                return;
            }
        };
        self.stats.frames_read += 1;

        let raw = self.classifier.classify(&frame);
        let stable = self.stabilizer.stabilize(raw, Instant::now());

        if self.shared.publish(stable) {
            self.stats.emotion_changes += 1;
            info!("Updated emotion: {}", stable);
        }

        let text = overlay_text(self.shared.get());
        let encoded = self
            .renderer
            .overlay(&mut frame, &text)
            .and_then(|()| self.renderer.encode(&frame));

        match encoded {
            Ok(jpeg) => {
                self.frames.send_replace(Some(multipart_part(&jpeg)));
                self.stats.frames_sent += 1;
            }
            Err(e) => {
                self.stats.encode_failures += 1;
                error!("Failed to encode frame: {}", e);
            }
        }
    }
}

/// Handle to a pipeline running on its own thread.
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<PipelineExit>,
}

impl PipelineHandle {
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Ask the loop to stop and wait for it. The camera is released before
    /// this returns.
    pub fn shutdown(self) -> Option<PipelineExit> {
        self.stop.store(true, Ordering::Relaxed);
        match self.thread.join() {
            Ok(exit) => Some(exit),
            Err(_) => {
                warn!("Frame pipeline thread panicked");
                None
            }
        }
    }
}

/// Move the pipeline onto a dedicated thread. It owns the camera from here
/// on; nothing else may read from it.
pub fn spawn<S, C, R>(pipeline: FramePipeline<S, C, R>) -> std::io::Result<PipelineHandle>
where
    S: FrameSource + 'static,
    C: EmotionClassifier<S::Frame> + 'static,
    R: FrameRenderer<S::Frame> + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();

    let thread = thread::Builder::new()
        .name("frame-pipeline".to_string())
        .spawn(move || {
            let mut pipeline = pipeline;
            pipeline.run(&flag)
        })?;

    Ok(PipelineHandle { stop, thread })
}
