//! The ensemble: N stems driven as one timeline.
//!
//! Every operation fans out to all registered handles synchronously and in
//! registration order. The first registered track is the master; its
//! position is the reference every alignment and drift correction uses.
//! Timers (drift ticks, the coordinated-finish check) only run inside
//! [`TransportController::poll`], so they can never interleave with an
//! operation.

use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, unbounded};

use crate::clock::Clock;
use crate::config::TransportConfig;
use crate::drift::{Correction, DriftCorrector};
use crate::error::TransportError;
use crate::handle::{TrackEvent, TrackHandle, TrackNotification};
use crate::history::{HistoryLog, HistoryPatch, MuteSet};
use crate::markers::{Marker, MarkerId, MarkerStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    /// Every track ran out of material.
    Finished,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// Things that happened during a [`poll`](TransportController::poll).
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Every expected track is registered and ready.
    EnsembleReady,
    TrackFailed { track: String, reason: String },
    /// A user seek on one track was propagated to the others.
    Seeked { source: String, time: f64 },
    DriftCorrected(Correction),
    /// All tracks reached the end; the ensemble stopped.
    Finished,
}

pub struct TransportController {
    config: TransportConfig,
    clock: Box<dyn Clock>,
    expected_tracks: usize,
    tracks: Vec<TrackHandle>,
    state: PlaybackState,
    drift: DriftCorrector,
    history: HistoryLog,
    finish_check_at: Option<Duration>,
    announced_ready: bool,
    next_marker_id: u64,
    notifications_tx: Sender<TrackNotification>,
    notifications_rx: Receiver<TrackNotification>,
}

impl TransportController {
    /// Create an empty ensemble that becomes operable once
    /// `expected_tracks` handles are registered and ready.
    pub fn new(expected_tracks: usize, config: TransportConfig, clock: impl Clock + 'static) -> Self {
        let (notifications_tx, notifications_rx) = unbounded();
        let drift = DriftCorrector::new(config.drift_period(), config.drift_threshold_secs());
        Self {
            config,
            clock: Box::new(clock),
            expected_tracks,
            tracks: Vec::with_capacity(expected_tracks),
            state: PlaybackState::Stopped,
            drift,
            history: HistoryLog::new(),
            finish_check_at: None,
            announced_ready: false,
            next_marker_id: 0,
            notifications_tx,
            notifications_rx,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub fn register_track(&mut self, mut handle: TrackHandle) -> Result<(), TransportError> {
        let name = handle.name().to_string();
        if self.index_of(&name).is_some() {
            return Err(TransportError::DuplicateTrack(name));
        }
        if self.tracks.len() >= self.expected_tracks {
            return Err(TransportError::TooManyTracks {
                name,
                expected: self.expected_tracks,
            });
        }

        handle.set_mute_gain(self.config.effective_mute_gain());
        handle.set_muted(self.history.current().muted().contains(&name));
        handle.subscribe(self.notifications_tx.clone());
        self.tracks.push(handle);

        tracing::debug!(
            track = %name,
            registered = self.tracks.len(),
            expected = self.expected_tracks,
            master = self.tracks.len() == 1,
            "Track registered"
        );
        Ok(())
    }

    /// Release a non-master track. The ensemble then expects one track fewer.
    pub fn remove_track(&mut self, name: &str) -> Result<(), TransportError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| TransportError::UnknownTrack(name.to_string()))?;
        if index == 0 {
            return Err(TransportError::MasterTrack(name.to_string()));
        }
        let mut handle = self.tracks.remove(index);
        handle.pause();
        drop(handle);
        self.expected_tracks -= 1;
        self.history.forget_track(name);
        tracing::info!(track = name, remaining = self.tracks.len(), "Track removed");
        Ok(())
    }

    /// Stop everything and release every handle.
    pub fn teardown(&mut self) {
        self.drift.stop();
        self.finish_check_at = None;
        for track in self.tracks.iter_mut() {
            track.pause();
        }
        let released = self.tracks.len();
        self.tracks.clear();
        self.expected_tracks = 0;
        self.state = PlaybackState::Stopped;
        tracing::info!(released, "Transport torn down");
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn is_ensemble_ready(&self) -> bool {
        self.expected_tracks > 0
            && self.tracks.len() == self.expected_tracks
            && self.tracks.iter().all(TrackHandle::is_ready)
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state
    }

    pub fn mute_set(&self) -> &MuteSet {
        self.history.current().muted()
    }

    pub fn markers(&self) -> &[Marker] {
        self.history.current().markers().as_slice()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn expected_track_count(&self) -> usize {
        self.expected_tracks
    }

    pub fn ready_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_ready()).count()
    }

    pub fn tracks(&self) -> &[TrackHandle] {
        &self.tracks
    }

    pub fn track(&self, name: &str) -> Option<&TrackHandle> {
        self.tracks.iter().find(|t| t.name() == name)
    }

    pub fn track_names(&self) -> impl Iterator<Item = &str> {
        self.tracks.iter().map(TrackHandle::name)
    }

    pub fn master_name(&self) -> Option<&str> {
        self.tracks.first().map(TrackHandle::name)
    }

    pub fn master_position(&self) -> Option<f64> {
        self.tracks.first().and_then(TrackHandle::position)
    }

    /// Tracks that failed to load, with the reason.
    pub fn failed_tracks(&self) -> Vec<(&str, &str)> {
        self.tracks
            .iter()
            .filter_map(|t| t.failure().map(|reason| (t.name(), reason)))
            .collect()
    }

    /// True if `name` is playing and not muted.
    pub fn is_audible(&self, name: &str) -> bool {
        self.is_playing() && self.index_of(name).is_some() && !self.mute_set().contains(name)
    }

    pub fn is_drift_correction_running(&self) -> bool {
        self.drift.is_running()
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    pub fn play_all(&mut self) {
        if !self.ensure_ready("play_all") {
            return;
        }
        self.start_playback();
    }

    pub fn pause_all(&mut self) {
        if !self.ensure_ready("pause_all") {
            return;
        }
        self.pause_each();
        self.drift.stop();
        self.finish_check_at = None;
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
        tracing::debug!(position = self.master_position(), "Ensemble paused");
    }

    pub fn stop_all(&mut self) {
        if !self.ensure_ready("stop_all") {
            return;
        }
        self.pause_each();
        for track in self.tracks.iter_mut() {
            track.seek(0.0);
        }
        self.drift.stop();
        self.finish_check_at = None;
        self.state = PlaybackState::Stopped;
        tracing::debug!("Ensemble stopped");
    }

    /// Propagate a seek that `source` already performed on itself.
    /// Returns `false` if the seek was ignored.
    pub fn seek(&mut self, source: &str, time: f64) -> bool {
        if !self.ensure_ready("seek") {
            return false;
        }
        let Some(source_index) = self.index_of(source) else {
            tracing::warn!(track = source, "Seek from unknown track ignored");
            return false;
        };

        let was_playing = self.is_playing();
        self.pause_each();
        for (i, track) in self.tracks.iter_mut().enumerate() {
            if i != source_index {
                track.seek(time);
            }
        }
        if was_playing {
            self.resume_each();
        } else {
            self.settle_after_seek();
        }
        tracing::debug!(source, time, was_playing, "Seek propagated");
        true
    }

    /// Move every track to `time`, resuming if the ensemble was playing.
    pub fn seek_all(&mut self, time: f64) {
        if !self.ensure_ready("seek_all") {
            return;
        }
        let was_playing = self.is_playing();
        self.pause_each();
        for track in self.tracks.iter_mut() {
            track.seek(time);
        }
        if was_playing {
            self.resume_each();
        } else {
            self.settle_after_seek();
        }
        tracing::debug!(time, was_playing, "Seeked all tracks");
    }

    // ------------------------------------------------------------------
    // Mute / solo / volume
    // ------------------------------------------------------------------

    pub fn toggle_mute(&mut self, name: &str) {
        if !self.ensure_ready("toggle_mute") {
            return;
        }
        let Some(index) = self.index_of(name) else {
            tracing::warn!(track = name, "Mute toggle for unknown track ignored");
            return;
        };

        let mut muted = self.mute_set().clone();
        let unmuting = !muted.insert(name.to_string());
        if unmuting {
            muted.remove(name);
        }
        let label = if unmuting {
            format!("Unmute {name}")
        } else {
            format!("Mute {name}")
        };
        self.history.push(&label, HistoryPatch::muted(muted));

        // Realign before the track becomes audible again.
        if unmuting && self.is_playing() && index != 0 {
            self.snap_to_master(index);
        }
        self.apply_visible_state();
    }

    pub fn unmute_all(&mut self) {
        if !self.ensure_ready("unmute_all") {
            return;
        }
        self.history.push("Unmute all", HistoryPatch::muted(MuteSet::new()));
        if self.is_playing() {
            for index in 1..self.tracks.len() {
                self.snap_to_master(index);
            }
        }
        self.apply_visible_state();
    }

    /// Mute every track except `name` and make sure the ensemble plays.
    /// Calling it again on the already-soloed, playing track pauses instead.
    pub fn solo_play(&mut self, name: &str) {
        if !self.ensure_ready("solo_play") {
            return;
        }
        let Some(index) = self.index_of(name) else {
            tracing::warn!(track = name, "Solo for unknown track ignored");
            return;
        };

        if self.is_playing() && self.is_sole_unmuted(index) {
            tracing::debug!(track = name, "Solo toggled off");
            // The solo mute set stays in place.
            self.pause_all();
            return;
        }

        let was_muted = self.mute_set().contains(name);
        let muted: MuteSet = self
            .tracks
            .iter()
            .map(TrackHandle::name)
            .filter(|other| *other != name)
            .map(str::to_string)
            .collect();
        self.history.push(&format!("Solo {name}"), HistoryPatch::muted(muted));

        if self.is_playing() {
            if was_muted && index != 0 {
                self.snap_to_master(index);
            }
            self.apply_visible_state();
        } else {
            self.apply_visible_state();
            self.start_playback();
        }
    }

    /// Set a track's explicit volume. Not recorded in history.
    pub fn set_volume(&mut self, name: &str, volume: f32) -> Result<(), TransportError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| TransportError::UnknownTrack(name.to_string()))?;
        self.tracks[index].set_volume(volume);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Markers
    // ------------------------------------------------------------------

    /// Drop a marker at the master's current position.
    pub fn add_marker(&mut self) -> Result<MarkerId, TransportError> {
        if !self.ensure_ready("add_marker") {
            return Err(TransportError::NotReady);
        }
        let current = self.history.current().markers();
        if current.is_full() {
            tracing::warn!(count = current.len(), "Marker limit reached, marker not added");
            return Err(TransportError::MarkerCapacity);
        }

        let time = self.master_position().unwrap_or(0.0);
        let id = MarkerId(self.next_marker_id);
        let markers = current.with_marker(id, time)?;
        self.next_marker_id += 1;
        self.history.push("Add marker", HistoryPatch::markers(markers));
        tracing::debug!(id = id.0, time, "Marker added");
        Ok(id)
    }

    pub fn remove_marker(&mut self, index: usize) -> Result<(), TransportError> {
        if !self.ensure_ready("remove_marker") {
            return Err(TransportError::NotReady);
        }
        let markers: MarkerStore = self.history.current().markers().without_marker(index)?;
        self.history.push("Remove marker", HistoryPatch::markers(markers));
        Ok(())
    }

    pub fn jump_to_marker(&mut self, time: f64) {
        self.seek_all(time);
    }

    pub fn jump_to_marker_index(&mut self, index: usize) -> Result<(), TransportError> {
        let time = self
            .markers()
            .get(index)
            .map(|m| m.time)
            .ok_or(TransportError::MarkerIndex(index))?;
        self.jump_to_marker(time);
        Ok(())
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Step the mute/marker state back. Playback is left alone.
    pub fn undo(&mut self) -> bool {
        let moved = self.history.undo();
        if moved {
            self.apply_visible_state();
        }
        moved
    }

    pub fn redo(&mut self) -> bool {
        let moved = self.history.redo();
        if moved {
            self.apply_visible_state();
        }
        moved
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    /// Drain track notifications and run any timers that are due.
    ///
    /// Call this regularly from the thread that owns the controller.
    pub fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();

        for track in self.tracks.iter_mut() {
            track.pump();
        }
        while let Ok(notification) = self.notifications_rx.try_recv() {
            self.dispatch(notification, &mut events);
        }

        if !self.announced_ready && self.is_ensemble_ready() {
            self.announced_ready = true;
            tracing::info!(
                tracks = self.tracks.len(),
                master = self.master_name().unwrap_or_default(),
                "Ensemble ready"
            );
            events.push(TransportEvent::EnsembleReady);
        }

        let now = self.clock.now();
        if self.finish_check_at.is_some_and(|at| now >= at) {
            self.finish_check_at = None;
            if self.is_playing() && !self.tracks.iter().any(TrackHandle::is_playing) {
                self.drift.stop();
                self.state = PlaybackState::Finished;
                tracing::info!(position = self.master_position(), "Ensemble finished");
                events.push(TransportEvent::Finished);
            }
        }

        if self.is_playing() {
            events.extend(
                self.drift
                    .tick(now, &mut self.tracks)
                    .into_iter()
                    .map(TransportEvent::DriftCorrected),
            );
        }

        events
    }

    fn dispatch(&mut self, notification: TrackNotification, events: &mut Vec<TransportEvent>) {
        let TrackNotification { track, event } = notification;
        match event {
            TrackEvent::Ready => {}
            TrackEvent::LoadFailed(reason) => {
                tracing::warn!(track = %track, "Ensemble cannot become ready");
                events.push(TransportEvent::TrackFailed { track, reason });
            }
            TrackEvent::Finished => {
                if self.is_playing() && self.finish_check_at.is_none() {
                    self.finish_check_at = Some(self.clock.now() + self.config.finish_settle());
                    tracing::debug!(track = %track, "Track finished, checking ensemble shortly");
                }
            }
            TrackEvent::UserSeeked(time) => {
                if !self.seek(&track, time) {
                    return;
                }
                events.push(TransportEvent::Seeked {
                    source: track,
                    time,
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_ready(&self, operation: &str) -> bool {
        let ready = self.is_ensemble_ready();
        if !ready {
            tracing::debug!(
                operation,
                ready = self.ready_count(),
                expected = self.expected_tracks,
                "Ensemble not ready, ignoring"
            );
        }
        ready
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.name() == name)
    }

    fn is_sole_unmuted(&self, index: usize) -> bool {
        let muted = self.mute_set();
        self.tracks
            .iter()
            .enumerate()
            .all(|(i, t)| (i == index) != muted.contains(t.name()))
    }

    /// Pause, line everything up on the master, play, start correcting.
    /// A finished ensemble starts over from 0.
    fn start_playback(&mut self) {
        self.pause_each();
        if self.state == PlaybackState::Finished {
            for track in self.tracks.iter_mut() {
                track.seek(0.0);
            }
        }
        self.align_to_master();
        self.state = PlaybackState::Playing;
        self.finish_check_at = None;
        self.drift.start(self.clock.now());
        self.resume_each();
        tracing::debug!(position = self.master_position(), "Ensemble playing");
    }

    /// Play every track. If none of them can move (all at their end), the
    /// next poll finishes the ensemble since no track will report it.
    fn resume_each(&mut self) {
        self.play_each();
        if !self.tracks.iter().any(TrackHandle::is_playing) {
            tracing::debug!("No track left to play, finishing on next poll");
            self.finish_check_at = Some(self.clock.now());
        }
    }

    fn align_to_master(&mut self) {
        let tolerance = self.config.realign_tolerance_secs();
        let Some((master, others)) = self.tracks.split_first_mut() else {
            return;
        };
        let Some(target) = master.position() else {
            return;
        };
        for track in others.iter_mut() {
            let aligned = track
                .position()
                .is_some_and(|position| (position - target).abs() <= tolerance);
            if !aligned {
                track.seek(target);
            }
        }
    }

    fn snap_to_master(&mut self, index: usize) {
        let Some(target) = self.master_position() else {
            return;
        };
        let track = &mut self.tracks[index];
        tracing::debug!(track = %track.name(), from = track.position(), to = target, "Realigned");
        track.seek(target);
    }

    fn pause_each(&mut self) {
        for track in self.tracks.iter_mut() {
            track.pause();
        }
    }

    fn play_each(&mut self) {
        for track in self.tracks.iter_mut() {
            track.play();
        }
    }

    fn settle_after_seek(&mut self) {
        if matches!(self.state, PlaybackState::Stopped | PlaybackState::Finished) {
            self.state = PlaybackState::Paused;
        }
    }

    fn apply_visible_state(&mut self) {
        let muted = self.history.current().muted();
        for track in self.tracks.iter_mut() {
            track.set_muted(muted.contains(track.name()));
        }
    }
}

impl std::fmt::Debug for TransportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportController")
            .field("state", &self.state)
            .field("expected_tracks", &self.expected_tracks)
            .field("tracks", &self.tracks)
            .field("history_len", &self.history.len())
            .field("history_cursor", &self.history.cursor())
            .finish()
    }
}
