use stems_engine::StemPlayer;
use stems_transport::{
    Clock, MarkerId, MonotonicClock, PlaybackBackend, PlaybackState, TrackHandle,
    TransportConfig, TransportController, TransportError, TransportEvent,
};

use crate::config::Config;
use crate::snapshot::SessionSnapshot;
use crate::stems::{Stem, StemSet};

/// One song's stems loaded into a transport.
pub struct Session {
    stems: StemSet,
    controller: TransportController,
}

impl Session {
    /// Start loading every stem on the default output device.
    pub fn open(stems: StemSet, config: &Config) -> anyhow::Result<Self> {
        let root = config.stems_root.clone();
        Self::with_backends(
            stems,
            config.transport.clone(),
            MonotonicClock::new(),
            |stem| Box::new(StemPlayer::new(stem.label.clone(), root.clone())),
        )
    }

    /// Build a session whose stems play through backends from `make_backend`.
    pub fn with_backends<C, F>(
        stems: StemSet,
        transport: TransportConfig,
        clock: C,
        mut make_backend: F,
    ) -> anyhow::Result<Self>
    where
        C: Clock + 'static,
        F: FnMut(&Stem) -> Box<dyn PlaybackBackend>,
    {
        if stems.is_empty() {
            anyhow::bail!("no stems to play");
        }

        let mut controller = TransportController::new(stems.len(), transport, clock);
        for stem in stems.iter() {
            let mut handle = TrackHandle::new(stem.label.clone(), make_backend(stem));
            handle.load(&stem.url);
            controller.register_track(handle)?;
        }
        tracing::info!(
            stems = stems.len(),
            master = stems.labels().next().unwrap_or_default(),
            "Session opened"
        );

        Ok(Self { stems, controller })
    }

    pub fn stems(&self) -> &StemSet {
        &self.stems
    }

    pub fn controller(&self) -> &TransportController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut TransportController {
        &mut self.controller
    }

    /// Find a stem label, ignoring case.
    pub fn resolve_track(&self, query: &str) -> Option<&str> {
        self.stems
            .labels()
            .find(|label| label.eq_ignore_ascii_case(query))
    }

    pub fn poll(&mut self) -> Vec<TransportEvent> {
        self.controller.poll()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::capture(&self.controller)
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.controller.playback_state()
    }

    pub fn is_ready(&self) -> bool {
        self.controller.is_ensemble_ready()
    }

    pub fn play(&mut self) {
        self.controller.play_all();
    }

    pub fn pause(&mut self) {
        self.controller.pause_all();
    }

    pub fn stop(&mut self) {
        self.controller.stop_all();
    }

    pub fn seek(&mut self, seconds: f64) {
        self.controller.seek_all(seconds);
    }

    pub fn toggle_mute(&mut self, name: &str) -> Result<(), TransportError> {
        let label = self.require_track(name)?;
        self.controller.toggle_mute(&label);
        Ok(())
    }

    pub fn unmute_all(&mut self) {
        self.controller.unmute_all();
    }

    pub fn solo(&mut self, name: &str) -> Result<(), TransportError> {
        let label = self.require_track(name)?;
        self.controller.solo_play(&label);
        Ok(())
    }

    pub fn set_volume(&mut self, name: &str, volume: f32) -> Result<(), TransportError> {
        let label = self.require_track(name)?;
        self.controller.set_volume(&label, volume)
    }

    pub fn add_marker(&mut self) -> Result<MarkerId, TransportError> {
        self.controller.add_marker()
    }

    pub fn remove_marker(&mut self, index: usize) -> Result<(), TransportError> {
        self.controller.remove_marker(index)
    }

    pub fn jump_to_marker(&mut self, index: usize) -> Result<(), TransportError> {
        self.controller.jump_to_marker_index(index)
    }

    pub fn undo(&mut self) -> bool {
        self.controller.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.controller.redo()
    }

    fn require_track(&self, name: &str) -> Result<String, TransportError> {
        self.resolve_track(name)
            .map(str::to_string)
            .ok_or_else(|| TransportError::UnknownTrack(name.to_string()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.controller.teardown();
    }
}
