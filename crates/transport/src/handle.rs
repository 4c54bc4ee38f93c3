//! Per-stem handle over an external single-track player.
//!
//! A [`PlaybackBackend`] is whatever actually decodes and outputs one stem.
//! [`TrackHandle`] wraps it with the rules the ensemble relies on: nothing
//! happens before the backend reports ready, seeks are clamped to the track,
//! and a muted track keeps running at a tiny positive gain instead of zero.

use crossbeam::channel::Sender;

use crate::config::MUTE_GAIN;

/// Notifications a backend raises on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    /// Decode finished; the backend accepts transport commands from now on.
    Ready,
    /// Playback reached the end of the material.
    Finished,
    /// The user moved this track's playhead directly (seconds).
    UserSeeked(f64),
    /// Decode failed; the track will never become ready.
    LoadFailed(String),
}

/// A [`TrackEvent`] tagged with the stem it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackNotification {
    pub track: String,
    pub event: TrackEvent,
}

/// The single-track playback capability the transport drives.
///
/// Positions and durations are in seconds. Implementations report events
/// through [`poll_event`](PlaybackBackend::poll_event), which is drained on
/// the controller's thread; they must not call back into the transport.
pub trait PlaybackBackend {
    /// Start loading `url`. Completion is reported as [`TrackEvent::Ready`]
    /// or [`TrackEvent::LoadFailed`].
    fn load(&mut self, url: &str);
    fn play(&mut self);
    fn pause(&mut self);
    fn set_position(&mut self, seconds: f64);
    fn set_gain(&mut self, gain: f32);
    fn position(&self) -> f64;
    fn duration(&self) -> f64;
    fn is_playing(&self) -> bool;
    fn poll_event(&mut self) -> Option<TrackEvent>;
}

pub struct TrackHandle {
    name: String,
    backend: Box<dyn PlaybackBackend>,
    ready: bool,
    failed: Option<String>,
    volume: f32,
    muted: bool,
    mute_gain: f32,
    subscribers: Vec<Sender<TrackNotification>>,
}

impl TrackHandle {
    pub fn new(name: impl Into<String>, backend: Box<dyn PlaybackBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
            ready: false,
            failed: None,
            volume: 1.0,
            muted: false,
            mute_gain: MUTE_GAIN,
            subscribers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Load failure reason, if decoding failed.
    pub fn failure(&self) -> Option<&str> {
        self.failed.as_deref()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Gain actually sent to the backend.
    pub fn effective_gain(&self) -> f32 {
        if self.muted { self.mute_gain } else { self.volume }
    }

    pub fn load(&mut self, url: &str) {
        if self.ready || self.failed.is_some() {
            tracing::warn!(track = %self.name, url, "Track already loaded, ignoring load");
            return;
        }
        tracing::debug!(track = %self.name, url, "Loading track");
        self.backend.load(url);
    }

    pub fn play(&mut self) {
        if self.ready {
            self.backend.play();
        }
    }

    pub fn pause(&mut self) {
        if self.ready {
            self.backend.pause();
        }
    }

    /// Move the playhead, clamped to `[0, duration]`.
    pub fn seek(&mut self, seconds: f64) {
        if !self.ready {
            return;
        }
        let target = self.clamp_to_track(seconds);
        self.backend.set_position(target);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.apply_gain();
    }

    pub fn set_muted(&mut self, muted: bool) {
        if self.muted != muted {
            self.muted = muted;
            self.apply_gain();
        }
    }

    pub(crate) fn set_mute_gain(&mut self, gain: f32) {
        self.mute_gain = gain;
        self.apply_gain();
    }

    /// Current position, or `None` if the track is not ready or the backend
    /// reported something unusable.
    pub fn position(&self) -> Option<f64> {
        if !self.ready {
            return None;
        }
        let position = self.backend.position();
        (position.is_finite() && position >= 0.0).then_some(position)
    }

    pub fn duration(&self) -> Option<f64> {
        if !self.ready {
            return None;
        }
        let duration = self.backend.duration();
        (duration.is_finite() && duration >= 0.0).then_some(duration)
    }

    pub fn is_playing(&self) -> bool {
        self.ready && self.backend.is_playing()
    }

    pub fn subscribe(&mut self, subscriber: Sender<TrackNotification>) {
        self.subscribers.push(subscriber);
    }

    /// Drain pending backend events, update readiness, and forward every
    /// event to the subscribers. Returns the number of events drained.
    pub fn pump(&mut self) -> usize {
        let mut drained = 0;
        while let Some(event) = self.backend.poll_event() {
            drained += 1;
            match &event {
                TrackEvent::Ready => {
                    if self.failed.is_some() {
                        continue;
                    }
                    self.ready = true;
                    self.apply_gain();
                    tracing::debug!(track = %self.name, duration = self.backend.duration(), "Track ready");
                }
                TrackEvent::LoadFailed(reason) => {
                    self.ready = false;
                    self.failed = Some(reason.clone());
                    tracing::warn!(track = %self.name, reason = %reason, "Track failed to load");
                }
                TrackEvent::Finished | TrackEvent::UserSeeked(_) => {
                    if !self.ready {
                        continue;
                    }
                }
            }
            self.notify(event);
        }
        drained
    }

    fn notify(&mut self, event: TrackEvent) {
        let notification = TrackNotification {
            track: self.name.clone(),
            event,
        };
        // Drop subscribers whose receiving end is gone.
        self.subscribers
            .retain(|subscriber| subscriber.send(notification.clone()).is_ok());
    }

    fn apply_gain(&mut self) {
        let gain = self.effective_gain();
        self.backend.set_gain(gain);
    }

    fn clamp_to_track(&self, seconds: f64) -> f64 {
        let seconds = if seconds.is_finite() { seconds } else { 0.0 };
        match self.duration() {
            Some(duration) => seconds.clamp(0.0, duration),
            None => seconds.max(0.0),
        }
    }
}

impl std::fmt::Debug for TrackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackHandle")
            .field("name", &self.name)
            .field("ready", &self.ready)
            .field("failed", &self.failed)
            .field("volume", &self.volume)
            .field("muted", &self.muted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDeck;
    use crossbeam::channel::unbounded;

    fn ready_handle(name: &str, duration: f64) -> (TrackHandle, FakeDeck) {
        let deck = FakeDeck::new(duration);
        let mut handle = TrackHandle::new(name, Box::new(deck.clone()));
        handle.load("memory://track");
        deck.finish_loading();
        handle.pump();
        (handle, deck)
    }

    #[test]
    fn test_operations_are_inert_before_ready() {
        let deck = FakeDeck::new(10.0);
        let mut handle = TrackHandle::new("Vocals", Box::new(deck.clone()));
        handle.load("memory://vocals");

        handle.play();
        handle.seek(4.0);
        assert!(!deck.is_playing());
        assert_eq!(deck.position(), 0.0);
        assert_eq!(handle.position(), None);
        assert_eq!(handle.duration(), None);
        assert!(!handle.is_ready());

        deck.finish_loading();
        handle.pump();
        assert!(handle.is_ready());
        handle.play();
        assert!(deck.is_playing());
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let (mut handle, deck) = ready_handle("Drums", 30.0);

        handle.seek(45.0);
        assert_eq!(deck.position(), 30.0);

        handle.seek(-3.0);
        assert_eq!(deck.position(), 0.0);

        handle.seek(f64::NAN);
        assert_eq!(deck.position(), 0.0);
    }

    #[test]
    fn test_muted_gain_is_small_but_positive() {
        let (mut handle, deck) = ready_handle("Bass", 10.0);
        handle.set_volume(0.8);
        assert_eq!(deck.gain(), 0.8);

        handle.set_muted(true);
        assert!(deck.gain() > 0.0);
        assert!(deck.gain() < 0.001);
        assert_eq!(handle.volume(), 0.8);

        handle.set_muted(false);
        assert_eq!(deck.gain(), 0.8);
    }

    #[test]
    fn test_volume_is_clamped() {
        let (mut handle, _deck) = ready_handle("Piano", 10.0);
        handle.set_volume(1.7);
        assert_eq!(handle.volume(), 1.0);
        handle.set_volume(-0.2);
        assert_eq!(handle.volume(), 0.0);
    }

    #[test]
    fn test_invalid_position_reads_as_none() {
        let (handle, deck) = ready_handle("Other", 10.0);
        deck.force_position(f64::NAN);
        assert_eq!(handle.position(), None);
        deck.force_position(-1.0);
        assert_eq!(handle.position(), None);
    }

    #[test]
    fn test_events_are_forwarded_to_subscribers() {
        let deck = FakeDeck::new(10.0);
        let mut handle = TrackHandle::new("Guitar", Box::new(deck.clone()));
        let (tx, rx) = unbounded();
        handle.subscribe(tx);

        handle.load("memory://guitar");
        deck.finish_loading();
        deck.user_seek(2.5);
        assert_eq!(handle.pump(), 2);

        let received: Vec<_> = rx.try_iter().map(|n| n.event).collect();
        assert_eq!(received, vec![TrackEvent::Ready, TrackEvent::UserSeeked(2.5)]);
    }

    #[test]
    fn test_load_failure_is_permanent() {
        let deck = FakeDeck::new(10.0);
        let mut handle = TrackHandle::new("Vocals", Box::new(deck.clone()));
        handle.load("memory://broken");
        deck.fail_loading("unsupported codec");
        handle.pump();

        assert!(!handle.is_ready());
        assert_eq!(handle.failure(), Some("unsupported codec"));

        // A late ready from the backend does not resurrect the track.
        deck.finish_loading();
        handle.pump();
        assert!(!handle.is_ready());
    }
}
