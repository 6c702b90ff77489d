//! Classifier adapter: one frame in, one emotion label out.
//!
//! Every kind of uncertainty (missing model, no face, empty crop, failed
//! inference, low confidence) collapses to [`Emotion::DEFAULT`]. The
//! classifier never returns an error to the pipeline.

use log::debug;

use crate::emotion::Emotion;

pub trait EmotionClassifier<F>: Send {
    fn classify(&mut self, frame: &F) -> Emotion;
}

/// Arg-max over the model scores, or the default label when the best score
/// is under `threshold` or the output is too short.
pub fn pick_emotion(scores: &[f32], threshold: f32) -> Emotion {
    if scores.len() < Emotion::ALL.len() {
        debug!("Model returned {} scores, expected {}", scores.len(), Emotion::ALL.len());
        return Emotion::DEFAULT;
    }

    let best = scores[..Emotion::ALL.len()]
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, p)| match best {
            Some((_, bp)) if bp >= p => best,
            _ => Some((i, p)),
        });

    match best.and_then(|(i, p)| Emotion::from_index(i).map(|e| (e, p))) {
        Some((emotion, p)) if p >= threshold => emotion,
        Some((emotion, p)) => {
            debug!("Low confidence ({:.2}) for {}, using {}", p, emotion, Emotion::DEFAULT);
            Emotion::DEFAULT
        }
        None => Emotion::DEFAULT,
    }
}

/// Grow a face box by `margin` of its shorter side on every edge, clamped
/// to the frame. Returns `(x, y, width, height)`.
pub fn expand_face(
    face: (i32, i32, i32, i32),
    margin: f64,
    frame_width: i32,
    frame_height: i32,
) -> (i32, i32, i32, i32) {
    let (x, y, w, h) = face;
    let m = (w.min(h) as f64 * margin) as i32;

    let x = (x - m).max(0);
    let y = (y - m).max(0);
    let w = (w + 2 * m).min(frame_width - x);
    let h = (h + 2 * m).min(frame_height - y);

    (x, y, w, h)
}

#[cfg(feature = "opencv")]
pub use self::face::FaceEmotionClassifier;

#[cfg(feature = "opencv")]
mod face {
    use log::{debug, error, info, warn};
    use opencv::{
        core::{self, Mat, Rect, Scalar, Size, Vector},
        dnn::{self, Net},
        imgproc,
        objdetect::CascadeClassifier,
        prelude::*,
    };
    use std::path::Path;

    use super::{expand_face, pick_emotion, EmotionClassifier};
    use crate::config::ClassifierConfig;
    use crate::emotion::Emotion;

    /// Haar-cascade face detection followed by an ONNX emotion model.
    pub struct FaceEmotionClassifier {
        detector: Option<CascadeClassifier>,
        model: Option<Net>,
        threshold: f32,
        input_size: i32,
        margin: f64,
        min_neighbors: i32,
    }

    impl std::fmt::Debug for FaceEmotionClassifier {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("FaceEmotionClassifier")
                .field("has_detector", &self.detector.is_some())
                .field("has_model", &self.model.is_some())
                .field("threshold", &self.threshold)
                .finish()
        }
    }

    impl FaceEmotionClassifier {
        /// Loads whatever is available. Missing files leave the classifier
        /// in degraded mode where it always answers the default label.
        pub fn load(config: &ClassifierConfig) -> Self {
            let detector = load_detector(&config.cascade_path());
            let model = load_model(&config.model_path());

            if detector.is_none() || model.is_none() {
                error!("Emotion model unavailable, every frame will be classified as {}", Emotion::DEFAULT);
            }

            Self {
                detector,
                model,
                threshold: config.confidence_threshold,
                input_size: config.input_size,
                margin: config.face_margin,
                min_neighbors: config.min_detection_neighbors,
            }
        }

        fn predict(&mut self, frame: &Mat) -> opencv::Result<Emotion> {
            let (Some(detector), Some(model)) = (self.detector.as_mut(), self.model.as_mut()) else {
                return Ok(Emotion::DEFAULT);
            };

            if frame.empty() || frame.rows() == 0 || frame.cols() == 0 {
                warn!("Invalid frame received for classification");
                return Ok(Emotion::DEFAULT);
            }

            let gray = if frame.channels() == 1 {
                frame.try_clone()?
            } else {
                let mut gray = Mat::default();
                imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
                gray
            };

            let mut faces = Vector::<Rect>::new();
            detector.detect_multi_scale(
                &gray,
                &mut faces,
                1.1,
                self.min_neighbors,
                0,
                Size::new(30, 30),
                Size::new(0, 0),
            )?;

            let Some(face) = faces.iter().max_by_key(|r| r.width * r.height) else {
                debug!("No face detected in the frame");
                return Ok(Emotion::DEFAULT);
            };

            let (x, y, w, h) = expand_face(
                (face.x, face.y, face.width, face.height),
                self.margin,
                gray.cols(),
                gray.rows(),
            );
            if w <= 0 || h <= 0 {
                warn!("Extracted face region is empty, skipping frame");
                return Ok(Emotion::DEFAULT);
            }

            let crop = Mat::roi(&gray, Rect::new(x, y, w, h))?.try_clone()?;
            let size = Size::new(self.input_size, self.input_size);
            let mut resized = Mat::default();
            imgproc::resize(&crop, &mut resized, size, 0.0, 0.0, imgproc::INTER_AREA)?;

            let blob = dnn::blob_from_image(
                &resized,
                1.0 / 255.0,
                size,
                Scalar::default(),
                false,
                false,
                core::CV_32F,
            )?;
            model.set_input(&blob, "", 1.0, Scalar::default())?;
            let output = model.forward_single("")?;
            let scores = output.data_typed::<f32>()?;
            debug!("Model predictions: {:?}", scores);

            Ok(pick_emotion(scores, self.threshold))
        }
    }

    impl EmotionClassifier<Mat> for FaceEmotionClassifier {
        fn classify(&mut self, frame: &Mat) -> Emotion {
            match self.predict(frame) {
                Ok(emotion) => emotion,
                Err(e) => {
                    warn!("Prediction failed: {}", e);
                    Emotion::DEFAULT
                }
            }
        }
    }

    fn load_detector(path: &Path) -> Option<CascadeClassifier> {
        let path_str = path.to_str()?;
        if !path.exists() {
            warn!("Face cascade not found at {:?}", path);
            return None;
        }
        match CascadeClassifier::new(path_str) {
            Ok(c) if !c.empty().unwrap_or(true) => {
                info!("Loaded face cascade from {:?}", path);
                Some(c)
            }
            Ok(_) => {
                warn!("Face cascade at {:?} is empty", path);
                None
            }
            Err(e) => {
                warn!("Failed to load face cascade: {}", e);
                None
            }
        }
    }

    fn load_model(path: &Path) -> Option<Net> {
        let path_str = path.to_str()?;
        if !path.exists() {
            warn!("Emotion model not found at {:?}", path);
            return None;
        }
        match dnn::read_net_from_onnx(path_str) {
            Ok(net) => {
                info!("Emotion model loaded from {:?}", path);
                Some(net)
            }
            Err(e) => {
                error!("Failed to load emotion model: {}", e);
                None
            }
        }
    }
}
