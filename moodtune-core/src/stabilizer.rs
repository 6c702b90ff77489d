//! Smooths the noisy per-frame classifier output into a stable label.
//!
//! A new label replaces the stable one only when at least the dwell
//! interval has passed since the last change. Labels equal to the stable
//! one never touch the timer.

use std::time::{Duration, Instant};

use crate::emotion::Emotion;

pub const DWELL_SECONDS: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct EmotionStabilizer {
    last_emitted: Option<Emotion>,
    last_change: Instant,
    dwell: Duration,
}

impl EmotionStabilizer {
    pub fn new(started_at: Instant) -> Self {
        Self::with_dwell(started_at, Duration::from_secs_f64(DWELL_SECONDS))
    }

    pub fn with_dwell(started_at: Instant, dwell: Duration) -> Self {
        Self {
            last_emitted: None,
            last_change: started_at,
            dwell,
        }
    }

    pub fn last_emitted(&self) -> Option<Emotion> {
        self.last_emitted
    }

    /// Feed one raw label observed at `now` and get the stable label back.
    ///
    /// Before anything has been emitted the first label is always accepted
    /// and starts the dwell timer.
    pub fn stabilize(&mut self, label: Emotion, now: Instant) -> Emotion {
        match self.last_emitted {
            Some(last) if last == label => last,
            Some(last) => {
                if now.saturating_duration_since(self.last_change) >= self.dwell {
                    self.emit(label, now)
                } else {
                    last
                }
            }
            None => self.emit(label, now),
        }
    }

    fn emit(&mut self, label: Emotion, now: Instant) -> Emotion {
        self.last_emitted = Some(label);
        self.last_change = now;
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(start: Instant, secs: f64) -> Instant {
        start + Duration::from_secs_f64(secs)
    }

    #[test]
    fn first_label_is_emitted_immediately() {
        let start = Instant::now();
        let mut stabilizer = EmotionStabilizer::new(start);

        assert_eq!(stabilizer.last_emitted(), None);
        assert_eq!(stabilizer.stabilize(Emotion::Sad, at(start, 0.1)), Emotion::Sad);
        assert_eq!(stabilizer.last_emitted(), Some(Emotion::Sad));
    }

    #[test]
    fn first_label_restarts_the_dwell_timer() {
        let start = Instant::now();
        let mut stabilizer = EmotionStabilizer::new(start);

        stabilizer.stabilize(Emotion::Happy, at(start, 3.0));
        assert_eq!(stabilizer.stabilize(Emotion::Sad, at(start, 7.0)), Emotion::Happy);
        assert_eq!(stabilizer.stabilize(Emotion::Sad, at(start, 8.0)), Emotion::Sad);
    }

    #[test]
    fn change_after_dwell_is_emitted() {
        let start = Instant::now();
        let mut stabilizer = EmotionStabilizer::new(start);

        let outputs: Vec<_> = [(Emotion::Happy, 0.0), (Emotion::Happy, 1.0), (Emotion::Sad, 6.0)]
            .into_iter()
            .map(|(label, t)| stabilizer.stabilize(label, at(start, t)))
            .collect();

        assert_eq!(outputs, vec![Emotion::Happy, Emotion::Happy, Emotion::Sad]);
    }

    #[test]
    fn changes_inside_dwell_are_held_back() {
        let start = Instant::now();
        let mut stabilizer = EmotionStabilizer::new(start);

        let outputs: Vec<_> = [(Emotion::Happy, 0.0), (Emotion::Sad, 1.0), (Emotion::Angry, 2.0)]
            .into_iter()
            .map(|(label, t)| stabilizer.stabilize(label, at(start, t)))
            .collect();

        assert_eq!(outputs, vec![Emotion::Happy, Emotion::Happy, Emotion::Happy]);
    }

    #[test]
    fn many_distinct_labels_do_not_shorten_dwell() {
        let start = Instant::now();
        let mut stabilizer = EmotionStabilizer::new(start);
        stabilizer.stabilize(Emotion::Neutral, start);

        let mut t = 0.0;
        for label in Emotion::ALL.iter().cycle().take(40) {
            t += 0.12;
            if t >= DWELL_SECONDS {
                break;
            }
            assert_eq!(stabilizer.stabilize(*label, at(start, t)), Emotion::Neutral);
        }
    }

    #[test]
    fn same_label_does_not_reset_timer() {
        let start = Instant::now();
        let mut stabilizer = EmotionStabilizer::new(start);

        stabilizer.stabilize(Emotion::Happy, start);
        for t in [1.0, 2.0, 3.0, 4.0, 4.9] {
            assert_eq!(stabilizer.stabilize(Emotion::Happy, at(start, t)), Emotion::Happy);
        }
        // Dwell still counts from t=0, not from the repeated observations.
        assert_eq!(stabilizer.stabilize(Emotion::Fear, at(start, 5.0)), Emotion::Fear);
    }

    #[test]
    fn emission_resets_timer_to_that_instant() {
        let start = Instant::now();
        let mut stabilizer = EmotionStabilizer::new(start);

        stabilizer.stabilize(Emotion::Happy, start);
        assert_eq!(stabilizer.stabilize(Emotion::Sad, at(start, 5.5)), Emotion::Sad);
        assert_eq!(stabilizer.stabilize(Emotion::Angry, at(start, 10.0)), Emotion::Sad);
        assert_eq!(stabilizer.stabilize(Emotion::Angry, at(start, 10.5)), Emotion::Angry);
    }

    #[test]
    fn custom_dwell() {
        let start = Instant::now();
        let mut stabilizer = EmotionStabilizer::with_dwell(start, Duration::ZERO);

        stabilizer.stabilize(Emotion::Happy, start);
        assert_eq!(stabilizer.stabilize(Emotion::Sad, start), Emotion::Sad);
    }
}
