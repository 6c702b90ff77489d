use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::emotion::{CurrentEmotion, Emotion, GenreMap, DEFAULT_GENRE};
use crate::error::{PlayError, RecommendError};
use crate::playlist::{playlist_url, PlaylistClient, Track};
use crate::shared::SharedEmotion;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub emotion: Emotion,
    pub genre: String,
    pub message: String,
    #[serde(rename = "spotify_playlist_url")]
    pub playlist_url: String,
    pub tracks: Vec<Track>,
}

/// Reads the current stable emotion and fills the playlist with music for it.
#[derive(Clone)]
pub struct RecommendationService {
    shared: SharedEmotion,
    client: Arc<dyn PlaylistClient>,
    genres: GenreMap,
}

impl RecommendationService {
    pub fn new(shared: SharedEmotion, client: Arc<dyn PlaylistClient>, genres: GenreMap) -> Self {
        Self { shared, client, genres }
    }

    pub fn recommend(&self) -> Result<Recommendation, RecommendError> {
        let current = self.shared.get();
        info!("Current emotion for recommendation: {}", current.as_str().to_lowercase());

        let emotion = match current {
            CurrentEmotion::Detected(emotion) => emotion,
            CurrentEmotion::Waiting | CurrentEmotion::Error => return Err(RecommendError::NotReady),
        };

        let genre = match self.genres.get(emotion) {
            Some(genre) => genre.to_string(),
            None => {
                warn!("Emotion '{}' not in genre mapping, using '{}'", emotion, DEFAULT_GENRE);
                DEFAULT_GENRE.to_string()
            }
        };

        let playlist_id = self.client.ensure_playlist().map_err(|e| {
            error!("Failed to retrieve or create playlist: {}", e);
            RecommendError::PlaylistUnavailable(e)
        })?;

        let tracks = self.client.update_playlist(&playlist_id, &genre).map_err(|e| {
            error!("Failed to update playlist {} for '{}': {}", playlist_id, genre, e);
            RecommendError::Client(e)
        })?;

        if tracks.is_empty() {
            warn!("No tracks found for genre '{}' ({})", genre, emotion);
            return Err(RecommendError::NoTracks(emotion));
        }

        info!("Playlist {} updated with {} {} tracks", playlist_id, tracks.len(), genre);

        Ok(Recommendation {
            emotion,
            message: format!("🎵 Playlist updated with {} tracks!", capitalize(emotion.as_str())),
            genre,
            playlist_url: playlist_url(&playlist_id),
            tracks,
        })
    }
}

/// Starts playback of the app playlist on the user's active device.
#[derive(Clone)]
pub struct PlaybackTrigger {
    client: Arc<dyn PlaylistClient>,
}

impl PlaybackTrigger {
    pub fn new(client: Arc<dyn PlaylistClient>) -> Self {
        Self { client }
    }

    pub fn play(&self) -> Result<(), PlayError> {
        let playlist_id = self.client.ensure_playlist().map_err(|e| {
            error!("Failed to retrieve playlist: {}", e);
            PlayError::PlaylistUnavailable(e)
        })?;

        let devices = self.client.devices().map_err(|e| {
            error!("Error fetching playback devices: {}", e);
            PlayError::Auth(e)
        })?;
        if devices.is_empty() {
            return Err(PlayError::NoDevice);
        }

        self.client.play(&playlist_id).map_err(|e| {
            error!("Playback of {} failed: {}", playlist_id, e);
            PlayError::Playback(e)
        })?;

        info!("Playing playlist {}", playlist_id);
        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
