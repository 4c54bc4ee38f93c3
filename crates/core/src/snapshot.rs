//! Serializable view of a session for front ends.
//!
//! A snapshot is a copy of everything a UI needs to redraw, taken at one
//! point in time.

use serde::{Deserialize, Serialize};
use stems_transport::{PlaybackState, TransportController};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub playback_state: PlaybackStateDto,
    pub ready: bool,
    pub ready_count: usize,
    pub track_count: usize,
    /// Master position in seconds.
    pub position: Option<f64>,
    pub tracks: Vec<TrackSummary>,
    pub markers: Vec<MarkerSummary>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_label: Option<String>,
    pub redo_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStateDto {
    Stopped,
    Playing,
    Paused,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    pub name: String,
    pub master: bool,
    pub ready: bool,
    pub muted: bool,
    pub volume: f32,
    pub position: Option<f64>,
    pub duration: Option<f64>,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerSummary {
    pub label: String,
    pub time: f64,
    pub color_index: usize,
}

impl From<PlaybackState> for PlaybackStateDto {
    fn from(state: PlaybackState) -> Self {
        match state {
            PlaybackState::Stopped => PlaybackStateDto::Stopped,
            PlaybackState::Playing => PlaybackStateDto::Playing,
            PlaybackState::Paused => PlaybackStateDto::Paused,
            PlaybackState::Finished => PlaybackStateDto::Finished,
        }
    }
}

impl SessionSnapshot {
    pub fn capture(controller: &TransportController) -> Self {
        let history = controller.history();
        Self {
            playback_state: controller.playback_state().into(),
            ready: controller.is_ensemble_ready(),
            ready_count: controller.ready_count(),
            track_count: controller.expected_track_count(),
            position: controller.master_position(),
            tracks: controller
                .tracks()
                .iter()
                .enumerate()
                .map(|(i, track)| TrackSummary {
                    name: track.name().to_string(),
                    master: i == 0,
                    ready: track.is_ready(),
                    muted: controller.mute_set().contains(track.name()),
                    volume: track.volume(),
                    position: track.position(),
                    duration: track.duration(),
                    failure: track.failure().map(str::to_string),
                })
                .collect(),
            markers: controller
                .markers()
                .iter()
                .map(|m| MarkerSummary {
                    label: m.label.clone(),
                    time: m.time,
                    color_index: m.color_index,
                })
                .collect(),
            can_undo: controller.can_undo(),
            can_redo: controller.can_redo(),
            undo_label: history.undo_label().map(str::to_string),
            redo_label: history.redo_label().map(str::to_string),
        }
    }

    /// One-line human summary, used by the command-line front end.
    pub fn summary(&self) -> String {
        let position = self
            .position
            .map_or_else(|| "--".to_string(), |p| format!("{p:.2}s"));
        let tracks: Vec<String> = self
            .tracks
            .iter()
            .map(|t| {
                let flag = if t.failure.is_some() {
                    "!"
                } else if !t.ready {
                    "…"
                } else if t.muted {
                    "m"
                } else {
                    ""
                };
                format!("{}{}", t.name, flag)
            })
            .collect();
        let markers: Vec<String> = self
            .markers
            .iter()
            .map(|m| format!("{}@{:.2}", m.label, m.time))
            .collect();
        format!(
            "[{:?}] {} ({}/{} ready) tracks: {} markers: {}",
            self.playback_state,
            position,
            self.ready_count,
            self.track_count,
            tracks.join(" "),
            if markers.is_empty() {
                "-".to_string()
            } else {
                markers.join(" ")
            }
        )
    }
}
