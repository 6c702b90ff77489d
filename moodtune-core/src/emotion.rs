use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Genre used when the table has no entry for a label.
pub const DEFAULT_GENRE: &str = "pop";

/// Text published before the first frame has been stabilised.
pub const WAITING_TEXT: &str = "Waiting...";
pub const ERROR_TEXT: &str = "error";

/// Labels the classifier can produce, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Disgusted,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgusted,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    /// Returned by the classifier whenever it cannot give a confident answer.
    pub const DEFAULT: Emotion = Emotion::Neutral;

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgusted => "disgusted",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
        }
    }

    pub fn from_index(index: usize) -> Option<Emotion> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEmotion(pub String);

impl fmt::Display for UnknownEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown emotion label '{}'", self.0)
    }
}

impl std::error::Error for UnknownEmotion {}

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == lower)
            .ok_or(UnknownEmotion(lower))
    }
}

/// Value held by the process-wide emotion cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentEmotion {
    Waiting,
    Error,
    Detected(Emotion),
}

impl CurrentEmotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            CurrentEmotion::Waiting => WAITING_TEXT,
            CurrentEmotion::Error => ERROR_TEXT,
            CurrentEmotion::Detected(emotion) => emotion.as_str(),
        }
    }

    pub fn detected(&self) -> Option<Emotion> {
        match self {
            CurrentEmotion::Detected(emotion) => Some(*emotion),
            _ => None,
        }
    }
}

impl Default for CurrentEmotion {
    fn default() -> Self {
        CurrentEmotion::Waiting
    }
}

impl fmt::Display for CurrentEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CurrentEmotion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Static emotion -> genre table. Labels may be missing, lookups then fall
/// back to [`DEFAULT_GENRE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenreMap(HashMap<Emotion, String>);

impl GenreMap {
    pub fn new(entries: HashMap<Emotion, String>) -> Self {
        Self(entries)
    }

    pub fn get(&self, emotion: Emotion) -> Option<&str> {
        self.0.get(&emotion).map(String::as_str)
    }

    pub fn genre_for(&self, emotion: Emotion) -> &str {
        self.get(emotion).unwrap_or(DEFAULT_GENRE)
    }
}

impl Default for GenreMap {
    fn default() -> Self {
        let entries = [
            (Emotion::Angry, "metal"),
            (Emotion::Disgusted, "punk"),
            (Emotion::Fear, "ambient"),
            (Emotion::Happy, "pop"),
            (Emotion::Sad, "acoustic"),
            (Emotion::Surprise, "edm"),
            (Emotion::Neutral, "chill"),
        ];
        Self(
            entries
                .into_iter()
                .map(|(e, g)| (e, g.to_string()))
                .collect(),
        )
    }
}
