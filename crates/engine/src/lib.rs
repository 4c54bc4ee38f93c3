//! Audio output for stems: one cpal stream per stem, controlled through
//! lock-free ring buffers and exposed to the transport as a
//! [`PlaybackBackend`](stems_transport::PlaybackBackend).

mod player;
mod voice;

pub use player::StemPlayer;
