pub mod config;
pub mod session;
pub mod snapshot;
pub mod stems;

pub use config::Config;
pub use session::Session;
pub use snapshot::{MarkerSummary, PlaybackStateDto, SessionSnapshot, TrackSummary};
pub use stems::{Stem, StemError, StemKind, StemSet};

pub use stems_transport::{PlaybackState, TransportError, TransportEvent};
