//! Spotify Web API client behind [`PlaylistClient`].
//!
//! Authentication is opaque here: a bearer token comes from the config or
//! `SPOTIFY_ACCESS_TOKEN`, and an expired token surfaces as
//! `ClientError::Unauthorized`.

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use moodtune_core::config::SpotifyConfig;
use moodtune_core::error::ClientError;
use moodtune_core::playlist::{Device, PlaylistClient, Track};

pub struct SpotifyClient {
    agent: ureq::Agent,
    api_base: String,
    token: Option<String>,
    playlist_name: String,
    track_limit: u32,
    playlist_id: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserProfile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Paging<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    name: String,
    uri: String,
    #[serde(default)]
    artists: Vec<ArtistItem>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ArtistItem {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: String,
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    devices: Vec<DeviceItem>,
}

#[derive(Debug, Deserialize)]
struct DeviceItem {
    id: Option<String>,
    name: String,
    #[serde(default)]
    is_active: bool,
}

impl SpotifyClient {
    pub fn new(config: &SpotifyConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Self {
            agent,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.resolve_token(),
            playlist_name: config.playlist_name.clone(),
            track_limit: config.track_limit,
            playlist_id: Mutex::new(None),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn request(&self, method: &str, path: &str) -> Result<ureq::Request, ClientError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| ClientError::Unauthorized("no access token configured".to_string()))?;

        Ok(self
            .agent
            .request(method, &format!("{}{}", self.api_base, path))
            .set("Authorization", &format!("Bearer {}", token)))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ClientError> {
        let request = query
            .iter()
            .fold(self.request("GET", path)?, |req, (k, v)| req.query(k, v));

        request
            .call()
            .map_err(map_error)?
            .into_json()
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    fn send_json(&self, method: &str, path: &str, body: Value) -> Result<ureq::Response, ClientError> {
        self.request(method, path)?.send_json(body).map_err(map_error)
    }

    fn find_playlist(&self) -> Result<Option<String>, ClientError> {
        let page: Paging<PlaylistItem> = self.get_json("/me/playlists", &[("limit", "50")])?;
        Ok(page
            .items
            .into_iter()
            .find(|p| p.name == self.playlist_name)
            .map(|p| p.id))
    }

    fn create_playlist(&self) -> Result<String, ClientError> {
        let me: UserProfile = self.get_json("/me", &[])?;
        let created: PlaylistItem = self
            .send_json(
                "POST",
                &format!("/users/{}/playlists", me.id),
                json!({
                    "name": self.playlist_name,
                    "public": false,
                    "description": "Tracks picked from your current mood",
                }),
            )?
            .into_json()
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        info!("Created playlist '{}' ({})", created.name, created.id);
        Ok(created.id)
    }
}

impl PlaylistClient for SpotifyClient {
    fn ensure_playlist(&self) -> Result<String, ClientError> {
        // Held across the lookup so two first requests cannot both create a
        // playlist; later callers only wait for the first round trip.
        let mut cached = self.playlist_id.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let id = match self.find_playlist()? {
            Some(id) => {
                debug!("Found existing playlist {}", id);
                id
            }
            None => self.create_playlist()?,
        };
        *cached = Some(id.clone());
        Ok(id)
    }

    fn update_playlist(&self, playlist_id: &str, genre: &str) -> Result<Vec<Track>, ClientError> {
        let query = format!("genre:\"{}\"", genre);
        let limit = self.track_limit.to_string();
        let search: SearchResponse = self.get_json(
            "/search",
            &[("q", query.as_str()), ("type", "track"), ("limit", limit.as_str())],
        )?;

        let (tracks, uris) = collect_tracks(search);
        if uris.is_empty() {
            return Ok(tracks);
        }

        self.send_json("PUT", &format!("/playlists/{}/tracks", playlist_id), json!({ "uris": uris }))?;
        debug!("Replaced playlist {} with {} tracks", playlist_id, uris.len());
        Ok(tracks)
    }

    fn devices(&self) -> Result<Vec<Device>, ClientError> {
        let response: DevicesResponse = self.get_json("/me/player/devices", &[])?;
        Ok(response
            .devices
            .into_iter()
            .map(|d| Device { id: d.id, name: d.name, is_active: d.is_active })
            .collect())
    }

    fn play(&self, playlist_id: &str) -> Result<(), ClientError> {
        self.send_json(
            "PUT",
            "/me/player/play",
            json!({ "context_uri": format!("spotify:playlist:{}", playlist_id) }),
        )?;
        Ok(())
    }
}

fn collect_tracks(search: SearchResponse) -> (Vec<Track>, Vec<String>) {
    search
        .tracks
        .items
        .into_iter()
        .map(|item| {
            let artist = item
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let track = Track { name: item.name, artist, url: item.external_urls.spotify };
            (track, item.uri)
        })
        .unzip()
}

fn map_error(err: ureq::Error) -> ClientError {
    match err {
        ureq::Error::Status(status @ (401 | 403), response) => {
            let body = response.into_string().unwrap_or_default();
            ClientError::Unauthorized(format!("{}: {}", status, body))
        }
        ureq::Error::Status(status, response) => ClientError::Status {
            status,
            message: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => ClientError::Transport(transport.to_string()),
    }
}
