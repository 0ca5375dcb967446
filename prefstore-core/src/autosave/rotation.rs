//! Dual-file rotation with a one-byte marker.
//!
//! Writes alternate between two rotation files. The marker names the file that
//! was last written completely, and is only updated after that file has been
//! flushed to disk, so a crash at any point leaves the marker pointing at an
//! intact document.

use crate::codec::{self, Writer};
use crate::error::Result;
use crate::layout::{Slot, StoreLayout};
use crate::schema::Schema;
use crate::store::Snapshot;
use crate::value::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::{debug, info, warn};

/// Open handles on the rotation and marker files, owned by the auto-save worker
#[derive(Debug)]
pub struct RotationState {
    layout: StoreLayout,
    first: File,
    second: File,
    marker: File,
    last_written: Slot,
    writer: Writer,
    #[cfg(test)]
    injected_failures: usize,
}

/// Outcome of loading at startup
#[derive(Debug)]
pub struct Loaded {
    pub snapshot: Snapshot,
    /// The slot the snapshot came from, `None` when both files were unusable
    pub slot: Option<Slot>,
}

fn open_rw(path: &std::path::Path) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

fn read_all(file: &mut File) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(0))?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

fn parse_bytes(bytes: &[u8]) -> std::result::Result<Value, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| format!("not UTF-8: {e}"))?;
    codec::parse(text).map_err(|e| e.to_string())
}

impl RotationState {
    /// Create the data directory and open both rotation files and the marker
    ///
    /// Handles are acquired in the order first, second, marker.
    pub fn acquire(layout: &StoreLayout) -> Result<Self> {
        fs::create_dir_all(layout.dir())?;
        let first = open_rw(&layout.rotation_path(Slot::First))?;
        let second = open_rw(&layout.rotation_path(Slot::Second))?;
        let marker = open_rw(&layout.marker_path())?;
        debug!(dir = %layout.dir().display(), "Acquired rotation files");
        Ok(Self {
            layout: layout.clone(),
            first,
            second,
            marker,
            last_written: Slot::Second,
            writer: Writer::new(),
            #[cfg(test)]
            injected_failures: 0,
        })
    }

    /// Prefix every written document with `header` as a comment
    pub fn with_header(mut self, header: Option<&str>) -> Self {
        self.writer = match header {
            Some(header) => Writer::new().header(header),
            None => Writer::new(),
        };
        self
    }

    fn file(&mut self, slot: Slot) -> &mut File {
        match slot {
            Slot::First => &mut self.first,
            Slot::Second => &mut self.second,
        }
    }

    pub fn last_written(&self) -> Slot {
        self.last_written
    }

    /// Fail the next `count` writes after the data is written but before it is
    /// synced, leaving a torn target file
    #[cfg(test)]
    pub(crate) fn inject_write_failures(&mut self, count: usize) {
        self.injected_failures = count;
    }

    #[cfg(test)]
    fn fail_if_injected(&mut self) -> std::io::Result<()> {
        if self.injected_failures == 0 {
            return Ok(());
        }
        self.injected_failures -= 1;
        Err(std::io::Error::new(std::io::ErrorKind::Other, "injected write failure"))
    }

    #[cfg(test)]
    pub(crate) fn replace_handle(&mut self, slot: Slot, file: File) -> File {
        std::mem::replace(self.file(slot), file)
    }

    /// Decide which slot to try first
    ///
    /// A valid marker wins. Without one, a lone non-empty rotation file is
    /// preferred; otherwise the first file.
    fn preferred_slot(&mut self) -> Result<Slot> {
        let marker = read_all(&mut self.marker)?;
        if let Some(slot) = Slot::from_marker(&marker) {
            return Ok(slot);
        }
        let first_len = self.first.metadata()?.len();
        let second_len = self.second.metadata()?.len();
        Ok(match (first_len > 0, second_len > 0) {
            (false, true) => Slot::Second,
            _ => Slot::First,
        })
    }

    fn load_slot(&mut self, slot: Slot, schema: &Schema) -> std::result::Result<Snapshot, String> {
        let bytes = read_all(self.file(slot)).map_err(|e| e.to_string())?;
        if bytes.is_empty() {
            return Err("file is empty".to_string());
        }
        let value = parse_bytes(&bytes)?;
        Snapshot::from_value(schema.clone(), value).map_err(|e| e.to_string())
    }

    /// Load the most recent intact snapshot
    ///
    /// Tries the preferred slot, then the other one, and finally settles on
    /// `fallback`. Failures are traced, never returned: a corrupt data file must
    /// not prevent startup.
    pub fn load(&mut self, schema: &Schema, fallback: &Snapshot) -> Result<Loaded> {
        let preferred = self.preferred_slot()?;
        for slot in [preferred, preferred.other()] {
            match self.load_slot(slot, schema) {
                Ok(snapshot) => {
                    info!(slot = %slot, entries = snapshot.len(), "Loaded settings");
                    self.last_written = slot;
                    return Ok(Loaded {
                        snapshot,
                        slot: Some(slot),
                    });
                }
                Err(error) => {
                    warn!(
                        path = %self.layout.rotation_path(slot).display(),
                        error = %error,
                        "Rotation file unusable"
                    );
                }
            }
        }
        // Nothing loaded: the first write goes to the preferred slot
        self.last_written = preferred.other();
        info!("No usable rotation file, starting from defaults");
        Ok(Loaded {
            snapshot: fallback.clone(),
            slot: None,
        })
    }

    /// Serialize `snapshot` into the slot not last written, then flip the marker
    ///
    /// The order is truncate, write, fsync, marker, fsync. On error the marker and
    /// the `last_written` slot are unchanged. Returns the number of bytes written.
    pub fn write(&mut self, snapshot: &Snapshot) -> Result<usize> {
        let target = self.last_written.other();
        let text = self.writer.write(&snapshot.to_value());

        let file = self.file(target);
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(text.as_bytes())?;
        #[cfg(test)]
        self.fail_if_injected()?;
        let file = self.file(target);
        file.flush()?;
        file.sync_all()?;

        self.marker.seek(SeekFrom::Start(0))?;
        self.marker.write_all(&[target.marker_byte()])?;
        self.marker.set_len(1)?;
        self.marker.sync_all()?;

        self.last_written = target;
        debug!(slot = %target, bytes = text.len(), "Wrote rotation file");
        Ok(text.len())
    }

    /// Close the handles in reverse order of acquisition
    pub fn release(self) {
        let Self {
            first,
            second,
            marker,
            layout,
            ..
        } = self;
        drop(marker);
        drop(second);
        drop(first);
        debug!(dir = %layout.dir().display(), "Released rotation files");
    }
}

/// What a rotation file currently holds
#[derive(Debug, Clone, PartialEq)]
pub enum SlotStatus {
    Missing,
    Empty,
    Valid(Value),
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotReport {
    pub slot: Slot,
    pub len: u64,
    pub status: SlotStatus,
}

/// Schema-free view of a store's rotation files
#[derive(Debug, Clone, PartialEq)]
pub struct RotationReport {
    /// Slot named by the marker, if the marker is valid
    pub marker: Option<Slot>,
    pub first: SlotReport,
    pub second: SlotReport,
}

impl RotationReport {
    pub fn slot(&self, slot: Slot) -> &SlotReport {
        match slot {
            Slot::First => &self.first,
            Slot::Second => &self.second,
        }
    }

    /// The value a loader would pick, using the same preference order
    pub fn latest_value(&self) -> Option<(Slot, &Value)> {
        let preferred = match self.marker {
            Some(slot) => slot,
            None => match (self.first.len > 0, self.second.len > 0) {
                (false, true) => Slot::Second,
                _ => Slot::First,
            },
        };
        [preferred, preferred.other()]
            .into_iter()
            .find_map(|slot| match &self.slot(slot).status {
                SlotStatus::Valid(value) => Some((slot, value)),
                _ => None,
            })
    }
}

fn inspect_slot(layout: &StoreLayout, slot: Slot) -> SlotReport {
    let path = layout.rotation_path(slot);
    match fs::read(&path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => SlotReport {
            slot,
            len: 0,
            status: SlotStatus::Missing,
        },
        Err(e) => SlotReport {
            slot,
            len: 0,
            status: SlotStatus::Invalid(e.to_string()),
        },
        Ok(bytes) if bytes.is_empty() => SlotReport {
            slot,
            len: 0,
            status: SlotStatus::Empty,
        },
        Ok(bytes) => SlotReport {
            slot,
            len: bytes.len() as u64,
            status: match parse_bytes(&bytes) {
                Ok(value) => SlotStatus::Valid(value),
                Err(e) => SlotStatus::Invalid(e),
            },
        },
    }
}

/// Read the rotation files without opening them for writing
///
/// Safe to call while another process owns the store.
pub fn inspect(layout: &StoreLayout) -> RotationReport {
    let marker = fs::read(layout.marker_path())
        .ok()
        .and_then(|bytes| Slot::from_marker(&bytes));
    RotationReport {
        marker,
        first: inspect_slot(layout, Slot::First),
        second: inspect_slot(layout, Slot::Second),
    }
}
