//! Synchronized multi-stem transport.
//!
//! A [`TransportController`] owns one [`TrackHandle`] per stem and keeps them
//! on a single timeline: gated on every stem being ready, aligned to the
//! first registered (master) track, drift-corrected while playing, and
//! stopped together when the material runs out. Mute state and markers live
//! in an undoable [`HistoryLog`].

mod clock;
mod config;
mod controller;
mod drift;
mod error;
mod handle;
mod history;
mod markers;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{MUTE_GAIN, TransportConfig};
pub use controller::{PlaybackState, TransportController, TransportEvent};
pub use drift::{Correction, DriftCorrector};
pub use error::TransportError;
pub use handle::{PlaybackBackend, TrackEvent, TrackHandle, TrackNotification};
pub use history::{HistoryEntry, HistoryLog, HistoryPatch, MuteSet};
pub use markers::{MAX_MARKERS, Marker, MarkerId, MarkerStore};
