use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub artist: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: Option<String>,
    pub name: String,
    pub is_active: bool,
}

/// Authenticated music-service client. Token handling lives behind this
/// trait; callers only see playlists, devices and playback.
pub trait PlaylistClient: Send + Sync {
    /// Id of the app's playlist, creating it on first use.
    fn ensure_playlist(&self) -> Result<String, ClientError>;

    /// Replace the playlist contents with tracks for `genre` and return them.
    fn update_playlist(&self, playlist_id: &str, genre: &str) -> Result<Vec<Track>, ClientError>;

    fn devices(&self) -> Result<Vec<Device>, ClientError>;

    fn play(&self, playlist_id: &str) -> Result<(), ClientError>;
}

pub fn playlist_url(playlist_id: &str) -> String {
    format!("https://open.spotify.com/playlist/{}", playlist_id)
}
