use crate::emotion::CurrentEmotion;
use crate::error::FrameError;

/// Draws the status overlay and turns a frame into JPEG bytes.
pub trait FrameRenderer<F>: Send {
    fn overlay(&self, frame: &mut F, text: &str) -> Result<(), FrameError>;
    fn encode(&self, frame: &F) -> Result<Vec<u8>, FrameError>;
}

pub fn overlay_text(current: CurrentEmotion) -> String {
    format!("Emotion: {}", current)
}

#[cfg(feature = "opencv")]
pub use self::jpeg::JpegRenderer;

#[cfg(feature = "opencv")]
mod jpeg {
    use opencv::{
        core::{Mat, Point, Scalar, Vector},
        imgcodecs, imgproc,
    };

    use super::FrameRenderer;
    use crate::error::FrameError;

    #[derive(Debug, Clone)]
    pub struct JpegRenderer {
        origin: Point,
        font_scale: f64,
        color: Scalar,
        thickness: i32,
    }

    impl Default for JpegRenderer {
        fn default() -> Self {
            Self {
                origin: Point::new(50, 50),
                font_scale: 1.0,
                // BGR green
                color: Scalar::new(0.0, 255.0, 0.0, 0.0),
                thickness: 2,
            }
        }
    }

    impl FrameRenderer<Mat> for JpegRenderer {
        fn overlay(&self, frame: &mut Mat, text: &str) -> Result<(), FrameError> {
            imgproc::put_text(
                frame,
                text,
                self.origin,
                imgproc::FONT_HERSHEY_SIMPLEX,
                self.font_scale,
                self.color,
                self.thickness,
                imgproc::LINE_8,
                false,
            )
            .map_err(|e| FrameError::Overlay(e.to_string()))
        }

        fn encode(&self, frame: &Mat) -> Result<Vec<u8>, FrameError> {
            let mut buffer = Vector::<u8>::new();
            let ok = imgcodecs::imencode(".jpg", frame, &mut buffer, &Vector::<i32>::new())
                .map_err(|e| FrameError::Encode(e.to_string()))?;
            if !ok {
                return Err(FrameError::Encode("imencode returned false".to_string()));
            }
            Ok(buffer.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::Emotion;

    #[test]
    fn overlay_text_uses_current_label() {
        assert_eq!(overlay_text(CurrentEmotion::Waiting), "Emotion: Waiting...");
        assert_eq!(overlay_text(CurrentEmotion::Detected(Emotion::Happy)), "Emotion: happy");
    }
}
