use std::time::Duration;

use crate::handle::TrackHandle;

/// A re-seek performed by a drift tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub track: String,
    pub from: f64,
    pub to: f64,
}

/// Periodic loop that pulls playing tracks back onto the master's position.
///
/// Small differences are left alone: re-seeking costs an audible glitch, so
/// only tracks further than `threshold` from the master are moved.
#[derive(Debug, Clone)]
pub struct DriftCorrector {
    period: Duration,
    threshold: f64,
    next_tick: Option<Duration>,
}

impl DriftCorrector {
    pub fn new(period: Duration, threshold_secs: f64) -> Self {
        Self {
            period,
            threshold: threshold_secs,
            next_tick: None,
        }
    }

    /// Schedule the first tick one period from `now`. Already running loops
    /// keep their schedule.
    pub fn start(&mut self, now: Duration) {
        if self.next_tick.is_none() {
            self.next_tick = Some(now + self.period);
            tracing::trace!(period_ms = self.period.as_millis() as u64, "Drift correction started");
        }
    }

    pub fn stop(&mut self) {
        if self.next_tick.take().is_some() {
            tracing::trace!("Drift correction stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn is_due(&self, now: Duration) -> bool {
        self.next_tick.is_some_and(|at| now >= at)
    }

    /// Run one tick if it is due. Returns the corrections made.
    pub fn tick(&mut self, now: Duration, tracks: &mut [TrackHandle]) -> Vec<Correction> {
        let Some(at) = self.next_tick else {
            return Vec::new();
        };
        if now < at {
            return Vec::new();
        }
        // A poll loop that stalled for several periods gets one tick, not a burst.
        let next = at + self.period;
        self.next_tick = Some(if next <= now { now + self.period } else { next });

        self.correct(tracks)
    }

    /// Compare every playing non-master track with the master (index 0) and
    /// re-seek the ones beyond the threshold.
    pub fn correct(&self, tracks: &mut [TrackHandle]) -> Vec<Correction> {
        let mut corrections = Vec::new();
        let Some((master, others)) = tracks.split_first_mut() else {
            return corrections;
        };
        if others.is_empty() {
            return corrections;
        }
        if !master.is_playing() {
            // A finished or paused master is no reference for the others.
            return corrections;
        }
        let Some(master_position) = master.position() else {
            tracing::trace!(track = %master.name(), "Master position unavailable, skipping tick");
            return corrections;
        };

        for track in others.iter_mut().filter(|t| t.is_playing()) {
            let Some(position) = track.position() else {
                tracing::trace!(track = %track.name(), "Position unavailable, skipping track");
                continue;
            };
            let drift = (position - master_position).abs();
            tracing::trace!(track = %track.name(), drift, "Drift reading");
            if drift > self.threshold {
                track.seek(master_position);
                tracing::debug!(
                    track = %track.name(),
                    from = position,
                    to = master_position,
                    "Corrected drift"
                );
                corrections.push(Correction {
                    track: track.name().to_string(),
                    from: position,
                    to: master_position,
                });
            }
        }
        corrections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDeck;

    fn ready_tracks(names: &[&str]) -> (Vec<TrackHandle>, Vec<FakeDeck>) {
        let mut handles = Vec::new();
        let mut decks = Vec::new();
        for name in names {
            let deck = FakeDeck::new(120.0);
            let mut handle = TrackHandle::new(*name, Box::new(deck.clone()));
            handle.load("memory://stem");
            deck.finish_loading();
            handle.pump();
            handles.push(handle);
            decks.push(deck);
        }
        (handles, decks)
    }

    fn corrector() -> DriftCorrector {
        DriftCorrector::new(Duration::from_millis(200), 0.050)
    }

    #[test]
    fn test_only_tracks_beyond_threshold_move() {
        let (mut tracks, decks) = ready_tracks(&["Vocals", "Drums", "Bass"]);
        for track in tracks.iter_mut() {
            track.play();
        }
        decks[0].force_position(10.0);
        decks[1].force_position(10.08);
        decks[2].force_position(10.03);

        let corrections = corrector().correct(&mut tracks);

        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].track, "Drums");
        assert_eq!(decks[1].position(), 10.0);
        assert_eq!(decks[2].position(), 10.03);
    }

    #[test]
    fn test_paused_tracks_are_left_alone() {
        let (mut tracks, decks) = ready_tracks(&["Vocals", "Drums"]);
        tracks[0].play();
        decks[1].force_position(3.0);

        assert!(corrector().correct(&mut tracks).is_empty());
        assert_eq!(decks[1].position(), 3.0);
    }

    #[test]
    fn test_stopped_master_is_no_reference() {
        let (mut tracks, decks) = ready_tracks(&["Vocals", "Drums"]);
        tracks[1].play();
        decks[0].force_position(100.0);
        decks[1].force_position(100.4);

        assert!(corrector().correct(&mut tracks).is_empty());
        assert_eq!(decks[1].position(), 100.4);
    }

    #[test]
    fn test_single_track_is_noop() {
        let (mut tracks, _decks) = ready_tracks(&["Vocals"]);
        tracks[0].play();
        assert!(corrector().correct(&mut tracks).is_empty());
    }

    #[test]
    fn test_invalid_positions_are_skipped() {
        let (mut tracks, decks) = ready_tracks(&["Vocals", "Drums", "Bass"]);
        for track in tracks.iter_mut() {
            track.play();
        }
        decks[0].force_position(5.0);
        decks[1].force_position(f64::NAN);
        decks[2].force_position(6.0);

        let corrections = corrector().correct(&mut tracks);
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].track, "Bass");

        decks[0].force_position(f64::INFINITY);
        decks[2].force_position(9.0);
        assert!(corrector().correct(&mut tracks).is_empty());
        assert_eq!(decks[2].position(), 9.0);
    }

    #[test]
    fn test_tick_schedule() {
        let (mut tracks, decks) = ready_tracks(&["Vocals", "Drums"]);
        for track in tracks.iter_mut() {
            track.play();
        }
        decks[1].force_position(1.0);

        let mut drift = corrector();
        assert!(drift.tick(Duration::ZERO, &mut tracks).is_empty());

        drift.start(Duration::ZERO);
        assert!(!drift.is_due(Duration::from_millis(199)));
        assert!(drift.tick(Duration::from_millis(199), &mut tracks).is_empty());
        assert_eq!(drift.tick(Duration::from_millis(200), &mut tracks).len(), 1);
        assert!(!drift.is_due(Duration::from_millis(399)));
        assert!(drift.is_due(Duration::from_millis(400)));
    }

    #[test]
    fn test_stalled_loop_does_not_burst() {
        let (mut tracks, _decks) = ready_tracks(&["Vocals", "Drums"]);
        let mut drift = corrector();
        drift.start(Duration::ZERO);

        drift.tick(Duration::from_millis(1000), &mut tracks);
        assert!(!drift.is_due(Duration::from_millis(1100)));
        assert!(drift.is_due(Duration::from_millis(1200)));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut drift = corrector();
        drift.stop();
        drift.start(Duration::ZERO);
        assert!(drift.is_running());
        drift.stop();
        drift.stop();
        assert!(!drift.is_running());
    }
}
