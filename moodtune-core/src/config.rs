use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::emotion::GenreMap;
use crate::error::ConfigError;

pub const CONFIG_ENV: &str = "MOODTUNE_CONFIG";
pub const TOKEN_ENV: &str = "SPOTIFY_ACCESS_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoodConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub stabilizer: StabilizerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub genres: GenreMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: i32,
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
    #[serde(default = "default_read_retry_ms")]
    pub read_retry_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default = "default_cascade_file")]
    pub cascade_file: String,
    #[serde(default = "default_model_file")]
    pub model_file: String,
    #[serde(default = "default_cascade_url")]
    pub cascade_url: Option<String>,
    #[serde(default)]
    pub model_url: Option<String>,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_input_size")]
    pub input_size: i32,
    #[serde(default = "default_face_margin")]
    pub face_margin: f64,
    #[serde(default = "default_min_neighbors")]
    pub min_detection_neighbors: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilizerConfig {
    #[serde(default = "default_dwell_secs")]
    pub dwell_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_recommend_cache_secs")]
    pub recommend_cache_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_playlist_name")]
    pub playlist_name: String,
    #[serde(default = "default_track_limit")]
    pub track_limit: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub access_token: Option<String>,
}

fn default_frame_width() -> u32 { 640 }
fn default_frame_height() -> u32 { 480 }
fn default_read_retry_ms() -> u64 { 10 }
fn default_cascade_file() -> String { "haarcascade_frontalface_default.xml".to_string() }
fn default_model_file() -> String { "emotion_model.onnx".to_string() }
fn default_cascade_url() -> Option<String> {
    Some("https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml".to_string())
}
fn default_download_timeout_secs() -> u64 { 120 }
fn default_confidence_threshold() -> f32 { 0.50 }
fn default_input_size() -> i32 { 48 }
fn default_face_margin() -> f64 { 0.10 }
fn default_min_neighbors() -> i32 { 3 }
fn default_dwell_secs() -> f64 { crate::stabilizer::DWELL_SECONDS }
fn default_bind() -> String { "127.0.0.1:5000".to_string() }
fn default_recommend_cache_secs() -> u64 { 10 }
fn default_api_base() -> String { "https://api.spotify.com/v1".to_string() }
fn default_playlist_name() -> String { "Emotion Playlist".to_string() }
fn default_track_limit() -> u32 { 20 }
fn default_timeout_secs() -> u64 { 10 }

fn default_models_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("moodtune").join("models");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("share").join("moodtune").join("models");
    }
    PathBuf::from("./models")
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            read_retry_ms: default_read_retry_ms(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            cascade_file: default_cascade_file(),
            model_file: default_model_file(),
            cascade_url: default_cascade_url(),
            model_url: None,
            download_timeout_secs: default_download_timeout_secs(),
            confidence_threshold: default_confidence_threshold(),
            input_size: default_input_size(),
            face_margin: default_face_margin(),
            min_detection_neighbors: default_min_neighbors(),
        }
    }
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self { dwell_secs: default_dwell_secs() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            recommend_cache_secs: default_recommend_cache_secs(),
        }
    }
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            playlist_name: default_playlist_name(),
            track_limit: default_track_limit(),
            timeout_secs: default_timeout_secs(),
            access_token: None,
        }
    }
}

impl CameraConfig {
    pub fn read_retry(&self) -> Duration {
        Duration::from_millis(self.read_retry_ms)
    }
}

impl ClassifierConfig {
    pub fn cascade_path(&self) -> PathBuf {
        self.models_dir.join(&self.cascade_file)
    }

    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(&self.model_file)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl StabilizerConfig {
    /// Negative values mean no dwell at all.
    pub fn dwell(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.dwell_secs.max(0.0)).map_err(|e| ConfigError::Invalid {
            field: "stabilizer.dwell_secs",
            reason: e.to_string(),
        })
    }
}

impl ServerConfig {
    pub fn recommend_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.recommend_cache_secs)
    }
}

impl SpotifyConfig {
    /// Token from the environment wins over the one in the file.
    pub fn resolve_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.access_token.clone())
    }
}

impl MoodConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stabilizer.dwell()?;
        Ok(())
    }

    /// Load from the first config file that exists, or defaults if none does.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::locate() {
            Some(path) => {
                log::info!("Loading config from {:?}", path);
                Self::from_file(&path)
            }
            None => {
                log::info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn locate() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }

        let mut candidates = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("moodtune").join("config.json"));
        }
        candidates.push(PathBuf::from("/etc/moodtune/config.json"));

        candidates.into_iter().find(|p| p.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::Emotion;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config: MoodConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.camera.frame_width, 640);
        assert_eq!(config.classifier.input_size, 48);
        assert_eq!(config.classifier.download_timeout(), Duration::from_secs(120));
        assert_eq!(config.stabilizer.dwell().unwrap(), Duration::from_secs(5));
        assert_eq!(config.server.bind, "127.0.0.1:5000");
        assert_eq!(config.server.recommend_cache_ttl(), Duration::from_secs(10));
        assert_eq!(config.genres.genre_for(Emotion::Happy), "pop");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: MoodConfig = serde_json::from_str(
            r#"{
                "camera": { "device_index": 2 },
                "spotify": { "playlist_name": "Moods" },
                "genres": { "happy": "funk" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.camera.device_index, 2);
        assert_eq!(config.camera.frame_height, 480);
        assert_eq!(config.spotify.playlist_name, "Moods");
        assert_eq!(config.spotify.track_limit, 20);
        assert_eq!(config.genres.genre_for(Emotion::Happy), "funk");
        assert_eq!(config.genres.get(Emotion::Sad), None);
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "stabilizer": {{ "dwell_secs": 2.5 }} }}"#).unwrap();

        let config = MoodConfig::from_file(file.path()).unwrap();
        assert_eq!(config.stabilizer.dwell().unwrap(), Duration::from_millis(2500));
    }

    #[test]
    fn invalid_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = MoodConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn oversized_dwell_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "stabilizer": {{ "dwell_secs": 1e300 }} }}"#).unwrap();

        let err = MoodConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "stabilizer.dwell_secs", .. }));

        let stabilizer = StabilizerConfig { dwell_secs: f64::INFINITY };
        assert!(stabilizer.dwell().is_err());
    }

    #[test]
    fn negative_dwell_is_zero() {
        let stabilizer = StabilizerConfig { dwell_secs: -3.0 };
        assert_eq!(stabilizer.dwell().unwrap(), Duration::ZERO);
    }

    #[test]
    fn model_paths_are_joined() {
        let mut classifier = ClassifierConfig::default();
        classifier.models_dir = PathBuf::from("/tmp/models");
        assert_eq!(classifier.model_path(), PathBuf::from("/tmp/models/emotion_model.onnx"));
        assert_eq!(
            classifier.cascade_path(),
            PathBuf::from("/tmp/models/haarcascade_frontalface_default.xml")
        );
    }
}
