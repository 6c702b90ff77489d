use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::emotion::{CurrentEmotion, Emotion};

/// Process-wide current stable emotion.
///
/// Cloning gives another handle to the same cell. The frame pipeline is the
/// only writer; HTTP handlers and the playlist services only read. The lock
/// is held for a single read or write and never across inference, encoding
/// or network calls.
#[derive(Debug, Clone, Default)]
pub struct SharedEmotion {
    inner: Arc<Mutex<CurrentEmotion>>,
}

impl SharedEmotion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> CurrentEmotion {
        *self.lock()
    }

    /// Store `emotion` if it differs from the published value.
    /// Returns true when the value changed.
    pub fn publish(&self, emotion: Emotion) -> bool {
        let next = CurrentEmotion::Detected(emotion);
        let mut current = self.lock();
        if *current == next {
            return false;
        }
        *current = next;
        true
    }

    #[cfg(test)]
    pub(crate) fn set(&self, value: CurrentEmotion) {
        *self.lock() = value;
    }

    // The guarded value is a Copy enum that is always fully written, so a
    // poisoned lock still holds a valid label.
    fn lock(&self) -> MutexGuard<'_, CurrentEmotion> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
