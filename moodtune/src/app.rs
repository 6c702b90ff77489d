use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_stream::{wrappers::WatchStream, StreamExt};

use moodtune_core::error::{PlayError, RecommendError};
use moodtune_core::playlist::PlaylistClient;
use moodtune_core::recommend::{PlaybackTrigger, RecommendationService};
use moodtune_core::stream::{FrameReceiver, STREAM_CONTENT_TYPE};
use moodtune_core::{GenreMap, SharedEmotion};

const INDEX_HTML: &str = include_str!("../assets/index.html");

#[derive(Clone)]
pub struct AppState {
    shared: SharedEmotion,
    frames: FrameReceiver,
    recommender: RecommendationService,
    playback: PlaybackTrigger,
    cache: Arc<RecommendCache>,
}

impl AppState {
    pub fn new(
        shared: SharedEmotion,
        frames: FrameReceiver,
        client: Arc<dyn PlaylistClient>,
        genres: GenreMap,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            recommender: RecommendationService::new(shared.clone(), client.clone(), genres),
            playback: PlaybackTrigger::new(client),
            cache: Arc::new(RecommendCache::new(cache_ttl)),
            shared,
            frames,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .route("/get_emotion", get(get_emotion))
        .route("/recommend", get(recommend))
        .route("/play", post(play))
        .with_state(state)
}

/// Keeps the last successful `/recommend` body for a short window.
/// Error responses are never cached.
pub struct RecommendCache {
    ttl: Duration,
    slot: Mutex<Option<(Instant, Value)>>,
}

impl RecommendCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: Mutex::new(None) }
    }

    pub fn get(&self) -> Option<Value> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((stored_at, body)) if stored_at.elapsed() < self.ttl => Some(body.clone()),
            _ => None,
        }
    }

    pub fn put(&self, body: Value) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some((Instant::now(), body));
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Recommend(#[from] RecommendError),
    #[error(transparent)]
    Play(#[from] PlayError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, key) = match &self {
            ApiError::Recommend(RecommendError::NotReady) => (StatusCode::BAD_REQUEST, "message"),
            ApiError::Recommend(RecommendError::NoTracks(_)) => (StatusCode::NOT_FOUND, "error"),
            ApiError::Recommend(RecommendError::PlaylistUnavailable(_) | RecommendError::Client(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "error")
            }
            ApiError::Play(PlayError::NoDevice | PlayError::Playback(_)) => (StatusCode::BAD_REQUEST, "error"),
            ApiError::Play(PlayError::PlaylistUnavailable(_) | PlayError::Auth(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "error")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "error"),
        };

        if status.is_server_error() {
            error!("{}", message);
        }

        let mut body = serde_json::Map::new();
        body.insert(key.to_string(), Value::String(message));
        (status, Json(Value::Object(body))).into_response()
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn video_feed(State(state): State<AppState>) -> Response {
    let parts = WatchStream::new(state.frames.clone())
        .filter_map(|part| part)
        .map(Ok::<_, Infallible>);

    (
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

async fn get_emotion(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "emotion": state.shared.get() }))
}

async fn recommend(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if let Some(body) = state.cache.get() {
        return Ok(Json(body));
    }

    let recommender = state.recommender.clone();
    let recommendation = tokio::task::spawn_blocking(move || recommender.recommend()).await??;

    let body = serde_json::to_value(&recommendation).map_err(|e| ApiError::Internal(e.to_string()))?;
    state.cache.put(body.clone());
    Ok(Json(body))
}

async fn play(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let playback = state.playback.clone();
    tokio::task::spawn_blocking(move || playback.play()).await??;

    info!("Playback started");
    Ok(Json(json!({ "message": "🎶 Playing playlist on Spotify!" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use moodtune_core::error::ClientError;
    use moodtune_core::playlist::{Device, Track};
    use moodtune_core::stream::{frame_channel, multipart_part};
    use moodtune_core::Emotion;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakeClient {
        no_tracks: bool,
        no_devices: bool,
        devices_fail: bool,
        updates: AtomicUsize,
        plays: AtomicUsize,
    }

    impl PlaylistClient for FakeClient {
        fn ensure_playlist(&self) -> Result<String, ClientError> {
            Ok("pl42".to_string())
        }

        fn update_playlist(&self, _playlist_id: &str, genre: &str) -> Result<Vec<Track>, ClientError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if self.no_tracks {
                return Ok(Vec::new());
            }
            Ok(vec![Track {
                name: format!("{} song", genre),
                artist: "Someone".to_string(),
                url: "https://open.spotify.com/track/x".to_string(),
            }])
        }

        fn devices(&self) -> Result<Vec<Device>, ClientError> {
            if self.devices_fail {
                return Err(ClientError::Unauthorized("expired".to_string()));
            }
            if self.no_devices {
                return Ok(Vec::new());
            }
            Ok(vec![Device { id: None, name: "Phone".to_string(), is_active: true }])
        }

        fn play(&self, _playlist_id: &str) -> Result<(), ClientError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn setup(client: Arc<FakeClient>) -> (Router, SharedEmotion) {
        let shared = SharedEmotion::new();
        let (_tx, rx) = frame_channel();
        let state = AppState::new(shared.clone(), rx, client, GenreMap::default(), Duration::from_secs(10));
        (router(state), shared)
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn emotion_is_waiting_before_first_frame() {
        let (app, _) = setup(Arc::new(FakeClient::default()));
        let (status, body) = call(app, "GET", "/get_emotion").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "emotion": "Waiting..." }));
    }

    #[tokio::test]
    async fn emotion_reflects_shared_value() {
        let (app, shared) = setup(Arc::new(FakeClient::default()));
        shared.publish(Emotion::Surprise);

        let (_, body) = call(app, "GET", "/get_emotion").await;
        assert_eq!(body["emotion"], "surprise");
    }

    #[tokio::test]
    async fn recommend_before_detection_is_bad_request() {
        let client = Arc::new(FakeClient::default());
        let (app, _) = setup(client.clone());

        let (status, body) = call(app, "GET", "/recommend").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Emotion not detected yet. Please wait.");
        assert_eq!(client.updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn recommend_success_body_and_cache() {
        let client = Arc::new(FakeClient::default());
        let (app, shared) = setup(client.clone());
        shared.publish(Emotion::Happy);

        let (status, body) = call(app.clone(), "GET", "/recommend").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["emotion"], "happy");
        assert_eq!(body["spotify_playlist_url"], "https://open.spotify.com/playlist/pl42");
        assert_eq!(body["message"], "🎵 Playlist updated with Happy tracks!");
        assert_eq!(body["tracks"][0]["name"], "pop song");

        // Within the cache window the stale body is served even after a change.
        shared.publish(Emotion::Sad);
        let (_, cached) = call(app, "GET", "/recommend").await;
        assert_eq!(cached, body);
        assert_eq!(client.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recommend_without_tracks_is_not_found_and_not_cached() {
        let client = Arc::new(FakeClient { no_tracks: true, ..Default::default() });
        let (app, shared) = setup(client.clone());
        shared.publish(Emotion::Sad);

        let (status, body) = call(app.clone(), "GET", "/recommend").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No tracks found for emotion 'sad'.");

        call(app, "GET", "/recommend").await;
        assert_eq!(client.updates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn play_without_device_is_bad_request() {
        let client = Arc::new(FakeClient { no_devices: true, ..Default::default() });
        let (app, _) = setup(client.clone());

        let (status, body) = call(app, "POST", "/play").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No active Spotify device. Open Spotify and try again.");
        assert_eq!(client.plays.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn play_with_broken_auth_is_server_error() {
        let client = Arc::new(FakeClient { devices_fail: true, ..Default::default() });
        let (app, _) = setup(client);

        let (status, body) = call(app, "POST", "/play").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Spotify authentication failed.");
    }

    #[tokio::test]
    async fn play_success() {
        let client = Arc::new(FakeClient::default());
        let (app, _) = setup(client.clone());

        let (status, body) = call(app, "POST", "/play").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "🎶 Playing playlist on Spotify!");
        assert_eq!(client.plays.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn video_feed_streams_multipart_parts() {
        let shared = SharedEmotion::new();
        let (tx, rx) = frame_channel();
        let state = AppState::new(shared, rx, Arc::new(FakeClient::default()), GenreMap::default(), Duration::ZERO);

        let part = multipart_part(b"jpeg-bytes");
        tx.send_replace(Some(part.clone()));
        drop(tx);

        let request = Request::builder().uri("/video_feed").body(Body::empty()).unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, part);
    }

    #[test]
    fn cache_expires() {
        let cache = RecommendCache::new(Duration::ZERO);
        cache.put(json!({ "a": 1 }));
        assert!(cache.get().is_none());

        let cache = RecommendCache::new(Duration::from_secs(60));
        assert!(cache.get().is_none());
        cache.put(json!({ "a": 1 }));
        assert_eq!(cache.get(), Some(json!({ "a": 1 })));
    }
}
