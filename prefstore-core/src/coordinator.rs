/*!
Single-instance election through a lock file.

The first process to open `instance.lock` exclusively becomes the owner of the
data directory and the only one allowed to run the auto-save engine. It writes a
[`LockRecord`] into the file: its 8-byte handle followed by a fresh random
16-byte token. A process that finds the file locked reads that record and sends
the owner an activation request through a [`Handshake`], proving with the token
that it read the live record.
*/

use crate::config::PrefStoreConfig;
use crate::error::Result;
use crate::layout::StoreLayout;
use crate::settings_file::write_atomic;
use prefstore_retry::{permanent_error, transient_error, with_fixed_retry, RetryPolicy, RetryResult, RetryableError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Serialized size of a [`LockRecord`]
pub const LOCK_RECORD_LEN: usize = 24;

/// Serialized size of an activation request in the signal file
const SIGNAL_LEN: usize = 24;

/// Identity of the owning instance, as stored in the lock file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRecord {
    pub handle: u64,
    pub token: [u8; 16],
}

impl LockRecord {
    /// A record for `handle` with a fresh random token
    pub fn generate(handle: u64) -> Self {
        Self {
            handle,
            token: *Uuid::new_v4().as_bytes(),
        }
    }

    /// Little-endian handle followed by the token
    pub fn to_bytes(&self) -> [u8; LOCK_RECORD_LEN] {
        let mut bytes = [0u8; LOCK_RECORD_LEN];
        bytes[..8].copy_from_slice(&self.handle.to_le_bytes());
        bytes[8..].copy_from_slice(&self.token);
        bytes
    }

    /// Parse a record; `None` unless exactly [`LOCK_RECORD_LEN`] bytes are given
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != LOCK_RECORD_LEN {
            return None;
        }
        let mut handle = [0u8; 8];
        handle.copy_from_slice(&bytes[..8]);
        let mut token = [0u8; 16];
        token.copy_from_slice(&bytes[8..]);
        Some(Self {
            handle: u64::from_le_bytes(handle),
            token,
        })
    }

    /// The token formatted for display
    pub fn token_string(&self) -> String {
        Uuid::from_bytes(self.token).to_string()
    }
}

/// Delivers an activation request to the owning instance
#[cfg_attr(test, mockall::automock)]
pub trait Handshake: Send + Sync {
    fn notify(&self, layout: &StoreLayout, owner: &LockRecord) -> Result<()>;
}

/// Handshake through a signal file next to the lock file
///
/// The file holds the owner's token followed by the requester's handle. The
/// owner polls it with [`InstanceLock::take_activation_request`].
#[derive(Debug, Clone, Copy)]
pub struct SignalFileHandshake {
    requester: u64,
}

impl SignalFileHandshake {
    pub fn new(requester: u64) -> Self {
        Self { requester }
    }
}

impl Handshake for SignalFileHandshake {
    fn notify(&self, layout: &StoreLayout, owner: &LockRecord) -> Result<()> {
        let mut contents = [0u8; SIGNAL_LEN];
        contents[..16].copy_from_slice(&owner.token);
        contents[16..].copy_from_slice(&self.requester.to_le_bytes());
        write_atomic(&layout.signal_path(), &contents)?;
        debug!(owner = owner.handle, requester = self.requester, "Sent activation request");
        Ok(())
    }
}

/// A request from another instance to bring the owner to the foreground
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationRequest {
    pub requester: u64,
}

/// Proof of ownership of a data directory; held for the life of the process
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    record: LockRecord,
    layout: StoreLayout,
}

impl InstanceLock {
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Consume a pending activation request, if one carries this owner's token
    ///
    /// Requests bearing another token (left over from a previous owner) are
    /// discarded.
    pub fn take_activation_request(&self) -> Option<ActivationRequest> {
        let path = self.layout.signal_path();
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read activation request");
                return None;
            }
        };
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "Could not remove activation request");
        }

        if contents.len() != SIGNAL_LEN || contents[..16] != self.record.token {
            warn!("Discarding activation request with a foreign token");
            return None;
        }
        let mut requester = [0u8; 8];
        requester.copy_from_slice(&contents[16..]);
        Some(ActivationRequest {
            requester: u64::from_le_bytes(requester),
        })
    }

    /// Give up ownership
    pub fn release(self) {
        #[cfg(not(windows))]
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!(error = %e, "Could not unlock instance lock");
        }
        drop(self.file);
        info!(dir = %self.layout.dir().display(), "Released instance lock");
    }
}

/// Outcome of [`InstanceCoordinator::elect`]
#[derive(Debug)]
pub enum Election {
    /// This process owns the directory and may run the auto-save engine
    Owner(InstanceLock),
    /// Another process owns the directory
    Secondary { owner: LockRecord, notified: bool },
    /// Ownership could not be determined; continue without auto-save
    Unavailable,
}

impl Election {
    pub fn is_owner(&self) -> bool {
        matches!(self, Election::Owner(_))
    }
}

enum Attempt {
    Owner(File, LockRecord),
    Secondary(LockRecord),
}

/// Elects the single writer of a data directory
pub struct InstanceCoordinator {
    layout: StoreLayout,
    policy: RetryPolicy,
    handle: u64,
    handshake: Arc<dyn Handshake>,
}

impl std::fmt::Debug for InstanceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceCoordinator")
            .field("layout", &self.layout)
            .field("policy", &self.policy)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl InstanceCoordinator {
    /// A coordinator identifying this process by its process id
    pub fn new(layout: StoreLayout, config: &PrefStoreConfig) -> Self {
        let handle = u64::from(std::process::id());
        Self {
            layout,
            policy: config.retry_policy(),
            handle,
            handshake: Arc::new(SignalFileHandshake::new(handle)),
        }
    }

    /// Identify this instance by `handle` instead, such as a window handle
    pub fn with_handle(mut self, handle: u64) -> Self {
        self.handle = handle;
        self
    }

    pub fn with_handshake<H: Handshake + 'static>(mut self, handshake: H) -> Self {
        self.handshake = Arc::new(handshake);
        self
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Try to become the owner; otherwise notify the current one
    ///
    /// Environment failures never propagate. After the retry budget is spent the
    /// result is [`Election::Unavailable`].
    pub fn elect(&self) -> Election {
        if let Err(e) = fs::create_dir_all(self.layout.dir()) {
            warn!(dir = %self.layout.dir().display(), error = %e, "Cannot create data directory");
            return Election::Unavailable;
        }

        // Owner record from the latest attempt that got far enough to read it
        let mut seen_owner = None;
        let outcome = with_fixed_retry("instance election", &self.policy, |attempt| {
            self.attempt(attempt, &mut seen_owner)
        });
        match outcome {
            Ok(Attempt::Owner(file, record)) => {
                info!(handle = record.handle, dir = %self.layout.dir().display(), "Acquired instance lock");
                Election::Owner(InstanceLock {
                    file,
                    record,
                    layout: self.layout.clone(),
                })
            }
            Ok(Attempt::Secondary(owner)) => {
                info!(owner = owner.handle, "Another instance owns the settings directory");
                Election::Secondary { owner, notified: true }
            }
            Err(e) => match seen_owner {
                Some(owner) => {
                    warn!(owner = owner.handle, error = %e, "Could not notify the owning instance");
                    Election::Secondary { owner, notified: false }
                }
                None => {
                    warn!(error = %e, "Instance election failed, continuing without auto-save");
                    Election::Unavailable
                }
            },
        }
    }

    /// One round: take the lock, or read the owner's record and notify it
    fn attempt(&self, attempt: usize, seen_owner: &mut Option<LockRecord>) -> RetryResult<Attempt> {
        const OP: &str = "instance election";
        let path = self.layout.lock_path();
        match open_exclusive(&path) {
            Ok(mut file) => {
                let record = LockRecord::generate(self.handle);
                write_record(&mut file, &record).map_err(|e| permanent_error!(OP, e))?;
                Ok(Attempt::Owner(file, record))
            }
            Err(e) if is_contended(&e) => {
                debug!(attempt, "Instance lock is held, reading owner record");
                match read_owner(&path) {
                    Ok(Some(owner)) => {
                        *seen_owner = Some(owner);
                        // The owner may still be starting up and not listening yet
                        self.handshake
                            .notify(&self.layout, &owner)
                            .map_err(|e| transient_error!(OP, e))?;
                        Ok(Attempt::Secondary(owner))
                    }
                    // The owner is still writing its record
                    Ok(None) => Err(transient_error!(
                        OP,
                        io::Error::new(io::ErrorKind::UnexpectedEof, "owner record is incomplete")
                    )),
                    Err(e) if e.is_transient() => Err(transient_error!(OP, e)),
                    Err(e) => Err(permanent_error!(OP, e)),
                }
            }
            Err(e) => Err(permanent_error!(OP, e)),
        }
    }
}

/// Open the lock file for writing while other processes may only read it
#[cfg(windows)]
fn open_exclusive(path: &std::path::Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;
    const FILE_SHARE_READ: u32 = 0x0000_0001;
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .share_mode(FILE_SHARE_READ)
        .open(path)
}

/// Open the lock file for writing while other processes may only read it
#[cfg(not(windows))]
fn open_exclusive(path: &std::path::Path) -> io::Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    fs2::FileExt::try_lock_exclusive(&file)?;
    Ok(file)
}

fn is_contended(e: &io::Error) -> bool {
    #[cfg(windows)]
    {
        const ERROR_SHARING_VIOLATION: i32 = 32;
        if e.raw_os_error() == Some(ERROR_SHARING_VIOLATION) {
            return true;
        }
    }
    e.kind() == io::ErrorKind::WouldBlock
        || (e.raw_os_error().is_some() && e.raw_os_error() == fs2::lock_contended_error().raw_os_error())
}

fn write_record(file: &mut File, record: &LockRecord) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&record.to_bytes())?;
    file.sync_all()
}

/// Read the owner's record with a shared open
pub fn read_owner(path: &std::path::Path) -> io::Result<Option<LockRecord>> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::with_capacity(LOCK_RECORD_LEN);
    file.read_to_end(&mut bytes)?;
    Ok(LockRecord::from_bytes(&bytes))
}
