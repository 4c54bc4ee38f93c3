//! Naming and ordering the stems of one song.

use std::fs;
use std::path::{Path, PathBuf};

/// The stem types a separator produces, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StemKind {
    Vocals,
    Drums,
    Bass,
    Guitar,
    Piano,
    Other,
}

impl StemKind {
    pub const ALL: [StemKind; 6] = [
        StemKind::Vocals,
        StemKind::Drums,
        StemKind::Bass,
        StemKind::Guitar,
        StemKind::Piano,
        StemKind::Other,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            StemKind::Vocals => "vocals",
            StemKind::Drums => "drums",
            StemKind::Bass => "bass",
            StemKind::Guitar => "guitar",
            StemKind::Piano => "piano",
            StemKind::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StemKind::Vocals => "Vocals",
            StemKind::Drums => "Drums",
            StemKind::Bass => "Bass",
            StemKind::Guitar => "Guitar",
            StemKind::Piano => "Piano",
            StemKind::Other => "Other",
        }
    }

    /// First kind whose keyword appears in `file_name`, ignoring case.
    pub fn detect(file_name: &str) -> Option<StemKind> {
        let lower = file_name.to_lowercase();
        Self::ALL.into_iter().find(|kind| lower.contains(kind.keyword()))
    }

    pub fn from_label(label: &str) -> Option<StemKind> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StemError {
    #[error("no audio files found in '{0}'")]
    NoStems(PathBuf),

    #[error("stem label '{0}' is used twice")]
    DuplicateLabel(String),

    #[error("'{0}' is not a supported audio file")]
    Unsupported(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stem {
    pub label: String,
    pub url: String,
}

/// Uniquely labelled stems in playback order. The first entry becomes the
/// master track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StemSet {
    stems: Vec<Stem>,
}

impl StemSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: impl Into<String>, url: impl Into<String>) -> Result<(), StemError> {
        let label = label.into();
        if self.contains(&label) {
            return Err(StemError::DuplicateLabel(label));
        }
        self.stems.push(Stem {
            label,
            url: url.into(),
        });
        Ok(())
    }

    /// Label a file by keyword, falling back to its file name when the
    /// keyword label is missing or already taken.
    pub fn push_file(&mut self, path: &Path) -> Result<(), StemError> {
        if !stems_decode::is_supported(path) {
            return Err(StemError::Unsupported(path.to_path_buf()));
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StemError::Unsupported(path.to_path_buf()))?;

        let label = match StemKind::detect(file_name) {
            Some(kind) if !self.contains(kind.label()) => kind.label().to_string(),
            _ => file_name.to_string(),
        };
        self.push(label, path.to_string_lossy())
    }

    /// Build a set from explicit files and directories. Directories are
    /// scanned one level deep for supported audio.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self, StemError> {
        let mut set = Self::new();
        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                set.extend_from_dir(path)?;
            } else {
                set.push_file(path)?;
            }
        }
        set.sort();
        Ok(set)
    }

    pub fn scan_dir(dir: &Path) -> Result<Self, StemError> {
        let mut set = Self::new();
        set.extend_from_dir(dir)?;
        set.sort();
        Ok(set)
    }

    fn extend_from_dir(&mut self, dir: &Path) -> Result<(), StemError> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && stems_decode::is_supported(path))
            .collect();
        if files.is_empty() {
            return Err(StemError::NoStems(dir.to_path_buf()));
        }
        files.sort();
        for file in files {
            self.push_file(&file)?;
        }
        tracing::debug!(dir = %dir.display(), stems = self.len(), "Scanned stems directory");
        Ok(())
    }

    /// Canonical kinds first in [`StemKind`] order, then the rest by label.
    pub fn sort(&mut self) {
        self.stems.sort_by(|a, b| {
            let rank = |stem: &Stem| StemKind::from_label(&stem.label).map_or(usize::MAX, |k| k as usize);
            rank(a).cmp(&rank(b)).then_with(|| a.label.cmp(&b.label))
        });
    }

    pub fn contains(&self, label: &str) -> bool {
        self.stems.iter().any(|s| s.label == label)
    }

    pub fn get(&self, label: &str) -> Option<&Stem> {
        self.stems.iter().find(|s| s.label == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.stems.iter().map(|s| s.label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stem> {
        self.stems.iter()
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }
}
