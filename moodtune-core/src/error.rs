use thiserror::Error;

use crate::emotion::Emotion;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to open camera {device}: {reason}")]
    Open { device: i32, reason: String },
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("empty frame captured")]
    EmptyFrame,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to draw overlay: {0}")]
    Overlay(String),
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

/// Failure reported by the music streaming client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Emotion not detected yet. Please wait.")]
    NotReady,
    #[error("Failed to retrieve or create playlist")]
    PlaylistUnavailable(#[source] ClientError),
    #[error("No tracks found for emotion '{0}'.")]
    NoTracks(Emotion),
    #[error("Failed to update playlist: {0}")]
    Client(#[source] ClientError),
}

#[derive(Debug, Error)]
pub enum PlayError {
    #[error("Failed to retrieve playlist")]
    PlaylistUnavailable(#[source] ClientError),
    #[error("No active Spotify device. Open Spotify and try again.")]
    NoDevice,
    #[error("Spotify authentication failed.")]
    Auth(#[source] ClientError),
    #[error("Playback failed. Try again.")]
    Playback(#[source] ClientError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
