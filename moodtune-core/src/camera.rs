use crate::error::CameraError;

/// Exclusive source of video frames. Only the frame pipeline reads from it.
pub trait FrameSource: Send {
    type Frame;

    /// False once the device is gone for good; the pipeline stops then.
    fn is_accessible(&mut self) -> bool;

    fn read_frame(&mut self) -> Result<Self::Frame, CameraError>;
}

#[cfg(feature = "opencv")]
pub use self::webcam::Webcam;

#[cfg(feature = "opencv")]
mod webcam {
    use log::{info, warn};
    use opencv::{
        core::Mat,
        prelude::*,
        videoio::{self, VideoCapture},
    };

    use super::FrameSource;
    use crate::config::CameraConfig;
    use crate::error::CameraError;

    /// OpenCV webcam handle. The device is released exactly once, when the
    /// handle is dropped.
    pub struct Webcam {
        capture: VideoCapture,
        device_id: i32,
    }

    impl Webcam {
        pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
            let device_id = config.device_index;
            let open_err = |reason: String| CameraError::Open { device: device_id, reason };

            let mut capture = VideoCapture::new(device_id, videoio::CAP_ANY)
                .map_err(|e| open_err(e.to_string()))?;

            if !capture.is_opened().unwrap_or(false) {
                let _ = capture.release();
                return Err(open_err("device did not open".to_string()));
            }

            if let Err(e) = capture.set(videoio::CAP_PROP_FRAME_WIDTH, config.frame_width as f64) {
                warn!("Could not set frame width on video{}: {}", device_id, e);
            }
            if let Err(e) = capture.set(videoio::CAP_PROP_FRAME_HEIGHT, config.frame_height as f64) {
                warn!("Could not set frame height on video{}: {}", device_id, e);
            }

            info!("Opened webcam video{} ({}x{})", device_id, config.frame_width, config.frame_height);

            Ok(Self { capture, device_id })
        }
    }

    impl FrameSource for Webcam {
        type Frame = Mat;

        fn is_accessible(&mut self) -> bool {
            self.capture.is_opened().unwrap_or(false)
        }

        fn read_frame(&mut self) -> Result<Mat, CameraError> {
            let mut frame = Mat::default();
            let grabbed = self
                .capture
                .read(&mut frame)
                .map_err(|e| CameraError::Read(e.to_string()))?;

            if !grabbed || frame.empty() {
                return Err(CameraError::EmptyFrame);
            }

            Ok(frame)
        }
    }

    impl Drop for Webcam {
        fn drop(&mut self) {
            match self.capture.release() {
                Ok(()) => info!("Webcam video{} released", self.device_id),
                Err(e) => warn!("Releasing webcam video{} failed: {}", self.device_id, e),
            }
        }
    }
}
