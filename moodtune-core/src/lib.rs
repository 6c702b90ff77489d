//! Core of MoodTune: turns a webcam feed into a stable emotion label and
//! the label into a playlist.

pub mod camera;
pub mod classifier;
pub mod config;
pub mod emotion;
pub mod error;
pub mod pipeline;
pub mod playlist;
pub mod recommend;
pub mod render;
pub mod shared;
pub mod stabilizer;
pub mod stream;

pub use emotion::{CurrentEmotion, Emotion, GenreMap};
pub use pipeline::{FramePipeline, PipelineExit, PipelineHandle};
pub use shared::SharedEmotion;
pub use stabilizer::EmotionStabilizer;
