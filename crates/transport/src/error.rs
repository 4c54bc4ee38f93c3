use crate::markers::MAX_MARKERS;

/// Recoverable rejections surfaced to the caller.
///
/// Fan-out operations (play, pause, seek, solo, mute) never return these: an
/// ensemble that is not ready simply ignores them. Only operations whose
/// outcome a UI needs to show report an error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("a track named '{0}' is already registered")]
    DuplicateTrack(String),

    #[error("ensemble expects {expected} tracks, cannot register '{name}'")]
    TooManyTracks { name: String, expected: usize },

    #[error("no track named '{0}'")]
    UnknownTrack(String),

    #[error("'{0}' is the master track and cannot be removed")]
    MasterTrack(String),

    #[error("ensemble is not ready")]
    NotReady,

    #[error("marker limit of {} reached", MAX_MARKERS)]
    MarkerCapacity,

    #[error("no marker at index {0}")]
    MarkerIndex(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            TransportError::DuplicateTrack("Vocals".into()).to_string(),
            "a track named 'Vocals' is already registered"
        );
        assert_eq!(
            TransportError::MarkerCapacity.to_string(),
            "marker limit of 3 reached"
        );
        assert_eq!(
            TransportError::TooManyTracks {
                name: "Piano".into(),
                expected: 2
            }
            .to_string(),
            "ensemble expects 2 tracks, cannot register 'Piano'"
        );
    }
}
