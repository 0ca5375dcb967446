//! On-disk file layout of one settings store.

use crate::error::{PrefError, Result};
use std::path::{Path, PathBuf};

pub const LOCK_FILE_NAME: &str = "instance.lock";
pub const SIGNAL_FILE_NAME: &str = "instance.signal";

/// One of the two rotation files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub fn other(self) -> Self {
        match self {
            Slot::First => Slot::Second,
            Slot::Second => Slot::First,
        }
    }

    /// The byte stored in the marker file for this slot
    pub fn marker_byte(self) -> u8 {
        match self {
            Slot::First => b'1',
            Slot::Second => b'2',
        }
    }

    /// Decode marker file contents; anything but exactly one known byte is ambiguous
    pub fn from_marker(contents: &[u8]) -> Option<Self> {
        match contents {
            [b'1'] => Some(Slot::First),
            [b'2'] => Some(Slot::Second),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Slot::First => 1,
            Slot::Second => 2,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Paths of the rotation, marker, lock and signal files in a data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    dir: PathBuf,
    stem: String,
}

impl StoreLayout {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(dir: P, stem: S) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
        }
    }

    /// Layout inside the per-user data directory of `application`
    pub fn for_application(application: &str, stem: &str) -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| PrefError::config("no per-user data directory on this platform"))?;
        Ok(Self::new(base.join(application), stem))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn rotation_path(&self, slot: Slot) -> PathBuf {
        self.dir.join(format!("{}.{}.json", self.stem, slot.number()))
    }

    pub fn marker_path(&self) -> PathBuf {
        self.dir.join(format!("{}.marker", self.stem))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE_NAME)
    }

    pub fn signal_path(&self) -> PathBuf {
        self.dir.join(SIGNAL_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = StoreLayout::new("/data/app", "session");
        assert_eq!(layout.rotation_path(Slot::First), Path::new("/data/app/session.1.json"));
        assert_eq!(layout.rotation_path(Slot::Second), Path::new("/data/app/session.2.json"));
        assert_eq!(layout.marker_path(), Path::new("/data/app/session.marker"));
        assert_eq!(layout.lock_path(), Path::new("/data/app/instance.lock"));
        assert_eq!(layout.signal_path(), Path::new("/data/app/instance.signal"));
    }

    #[test]
    fn test_marker_bytes() {
        assert_eq!(Slot::from_marker(b"1"), Some(Slot::First));
        assert_eq!(Slot::from_marker(b"2"), Some(Slot::Second));
        assert_eq!(Slot::from_marker(b""), None);
        assert_eq!(Slot::from_marker(b"12"), None);
        assert_eq!(Slot::from_marker(b"3"), None);
        for slot in [Slot::First, Slot::Second] {
            assert_eq!(Slot::from_marker(&[slot.marker_byte()]), Some(slot));
            assert_eq!(slot.other().other(), slot);
        }
    }
}
