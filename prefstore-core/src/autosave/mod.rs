/*!
Debounced, crash-safe background persistence of the current settings.

[`AutoSave`] holds the current [`Snapshot`] in memory. Callers commit edits with
[`AutoSave::persist`] or [`AutoSave::update`]; both return immediately and perform
no I/O. A background worker waits for the edits to settle, keeps only the most
recent snapshot and writes it to one of two rotation files.

```no_run
use prefstore_core::{AutoSave, PrefStoreConfig, Property, Schema, Snapshot, StoreLayout};
use prefstore_core::types::HostInteger;

let zoom = Property::new("zoom", HostInteger::<u8>::new());
let schema = Schema::builder().property(&zoom).build()?;
let layout = StoreLayout::new("/tmp/app", "session");

let engine = AutoSave::start(&layout, &Snapshot::empty(schema), &PrefStoreConfig::default())?;
engine.persist_value(&zoom, &3);
engine.close();
# Ok::<(), prefstore_core::PrefError>(())
```
*/

pub mod rotation;
mod worker;

pub use rotation::{inspect, RotationReport, RotationState, SlotReport, SlotStatus};

use crate::config::PrefStoreConfig;
use crate::error::Result;
use crate::layout::StoreLayout;
use crate::schema::Property;
use crate::store::{Snapshot, WorkingCopy};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};
use worker::Worker;

/// Header comment of auto-saved documents
pub const AUTOSAVE_HEADER: &str = "Auto-saved settings. Changes made while the application runs are overwritten.";

/// Lifecycle of an [`AutoSave`] engine
///
/// Acquiring the files and loading happen inside [`AutoSave::start`], so an
/// engine value is `Running` from the moment it exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    Closing,
    Closed,
}

/// Counters maintained by the background worker
#[derive(Debug, Default)]
pub struct WriteStats {
    writes: AtomicU64,
    failures: AtomicU64,
    coalesced: AtomicU64,
}

impl WriteStats {
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    pub(crate) fn add_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_coalesced(&self, count: u64) {
        self.coalesced.fetch_add(count, Ordering::Relaxed);
    }
}

/// The auto-save engine
pub struct AutoSave {
    current: RwLock<Snapshot>,
    queue: Option<mpsc::UnboundedSender<Snapshot>>,
    cancel: Option<watch::Sender<bool>>,
    worker: Mutex<Option<JoinHandle<RotationState>>>,
    state: Mutex<EngineState>,
    stats: Arc<WriteStats>,
}

impl std::fmt::Debug for AutoSave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSave")
            .field("state", &self.state())
            .field("durable", &self.is_durable())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl AutoSave {
    /// Acquire the rotation files of `layout`, load the latest snapshot and start
    /// the background worker
    ///
    /// Corrupt or missing rotation files are not an error: the engine starts
    /// from `defaults`. Only failing to open the files or to start the worker is.
    ///
    /// # Arguments
    /// * `layout` - Where the rotation and marker files live
    /// * `defaults` - Snapshot used when nothing usable is on disk; its schema
    ///   is the schema of every loaded snapshot
    /// * `config` - Debounce interval and header settings
    ///
    /// # Returns
    /// A running engine
    pub fn start(layout: &StoreLayout, defaults: &Snapshot, config: &PrefStoreConfig) -> Result<Self> {
        debug!(dir = %layout.dir().display(), "Initializing auto-save");
        let header = config.write_header.then_some(AUTOSAVE_HEADER);
        let mut rotation = RotationState::acquire(layout)?.with_header(header);
        let loaded = rotation.load(defaults.schema(), defaults)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let stats = Arc::new(WriteStats::default());

        let worker = Worker {
            rotation,
            queue: queue_rx,
            cancel: cancel_rx,
            debounce: config.debounce(),
            last_remote: loaded.snapshot.clone(),
            stats: Arc::clone(&stats),
        };
        let handle = thread::Builder::new()
            .name("prefstore-autosave".to_string())
            .spawn(move || runtime.block_on(worker.run()))?;

        info!(
            dir = %layout.dir().display(),
            debounce_ms = config.debounce_ms,
            "Auto-save running"
        );
        Ok(Self {
            current: RwLock::new(loaded.snapshot),
            queue: Some(queue_tx),
            cancel: Some(cancel_tx),
            worker: Mutex::new(Some(handle)),
            state: Mutex::new(EngineState::Running),
            stats,
        })
    }

    /// An engine that keeps settings in memory only
    ///
    /// Used when another instance owns the store or the files cannot be opened.
    pub fn in_memory(initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(initial),
            queue: None,
            cancel: None,
            worker: Mutex::new(None),
            state: Mutex::new(EngineState::Running),
            stats: Arc::new(WriteStats::default()),
        }
    }

    /// Whether commits eventually reach disk
    pub fn is_durable(&self) -> bool {
        self.queue.is_some()
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> &WriteStats {
        &self.stats
    }

    /// The most recently committed snapshot
    pub fn current_settings(&self) -> Snapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Commit `working_copy` and schedule it for writing
    ///
    /// Returns `false` when it equals the current snapshot and nothing was done.
    pub fn persist(&self, working_copy: WorkingCopy) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        self.commit_locked(&mut current, working_copy)
    }

    /// Edit the current snapshot in place and commit the result
    ///
    /// `edit` runs while the engine's commit lock is held and must not call back
    /// into this engine.
    pub fn update<F>(&self, edit: F) -> bool
    where
        F: FnOnce(&mut WorkingCopy),
    {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut working_copy = current.edit();
        edit(&mut working_copy);
        self.commit_locked(&mut current, working_copy)
    }

    /// Set a single property and commit
    pub fn persist_value<T>(&self, property: &Property<T>, value: &T) -> bool {
        self.update(|working_copy| {
            working_copy.add_or_replace(property, value);
        })
    }

    fn commit_locked(&self, current: &mut Snapshot, working_copy: WorkingCopy) -> bool {
        let snapshot = working_copy.commit();
        if snapshot.equal_to(current) {
            return false;
        }
        *current = snapshot.clone();
        // Sent under the lock so the queue order is the commit order
        if let Some(queue) = &self.queue {
            if queue.send(snapshot).is_err() {
                debug!("Auto-save worker stopped, change kept in memory");
            }
        }
        true
    }

    /// Flush pending changes, stop the worker and release the rotation files
    ///
    /// Blocks until the last pending snapshot is written. Calling it again, or
    /// dropping the engine afterwards, does nothing.
    pub fn close(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(*state, EngineState::Closing | EngineState::Closed) {
                return;
            }
            *state = EngineState::Closing;
        }

        if let Some(cancel) = &self.cancel {
            cancel.send_replace(true);
        }
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            match handle.join() {
                Ok(rotation) => rotation.release(),
                Err(_) => error!("Auto-save worker panicked, rotation files released by the OS"),
            }
        }

        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = EngineState::Closed;
        info!(
            writes = self.stats.writes(),
            coalesced = self.stats.coalesced(),
            "Auto-save closed"
        );
    }
}

impl Drop for AutoSave {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::types::{HostInteger, StringType};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        layout: StoreLayout,
        count: Property<u32>,
        name: Property<String>,
        defaults: Snapshot,
        config: PrefStoreConfig,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path(), "settings");
        let count = Property::new("count", HostInteger::<u32>::new());
        let name = Property::new("name", StringType);
        let schema = Schema::builder().property(&count).property(&name).build().unwrap();
        let config = PrefStoreConfig {
            debounce_ms: 20,
            ..Default::default()
        };
        Fixture {
            _dir: dir,
            layout,
            count,
            name,
            defaults: Snapshot::empty(schema),
            config,
        }
    }

    #[test]
    fn test_persist_is_visible_immediately() {
        let f = fixture();
        let engine = AutoSave::start(&f.layout, &f.defaults, &f.config).unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        assert!(engine.is_durable());

        assert!(engine.persist_value(&f.count, &5));
        assert_eq!(engine.current_settings().try_get(&f.count), Some(5));
        engine.close();
        assert_eq!(engine.state(), EngineState::Closed);
    }

    #[test]
    fn test_engine_is_running_once_constructed() {
        let f = fixture();
        let engine = AutoSave::in_memory(f.defaults.clone());
        assert_eq!(engine.state(), EngineState::Running);
        engine.close();
        engine.close();
        assert_eq!(engine.state(), EngineState::Closed);
    }

    #[test]
    fn test_unchanged_commit_is_skipped() {
        let f = fixture();
        let engine = AutoSave::in_memory(f.defaults.clone());
        assert!(engine.persist_value(&f.name, &"a".to_string()));
        assert!(!engine.persist_value(&f.name, &"a".to_string()));
        assert!(!engine.persist(engine.current_settings().edit()));
        assert!(!engine.is_durable());
    }

    #[test]
    fn test_update_builds_on_current() {
        let f = fixture();
        let engine = AutoSave::in_memory(f.defaults.clone());
        engine.persist_value(&f.count, &1);
        engine.update(|wc| {
            let next = wc.get(&f.count).unwrap_or(0) + 1;
            wc.add_or_replace(&f.count, &next);
            wc.add_or_replace(&f.name, &"two".to_string());
        });
        let current = engine.current_settings();
        assert_eq!(current.try_get(&f.count), Some(2));
        assert_eq!(current.try_get(&f.name), Some("two".to_string()));
    }

    #[test]
    fn test_close_flushes_and_reopen_loads() {
        let f = fixture();
        let engine = AutoSave::start(&f.layout, &f.defaults, &f.config).unwrap();
        engine.persist_value(&f.name, &"flushed".to_string());
        engine.close();
        assert_eq!(engine.stats().writes(), 1);

        let reopened = AutoSave::start(&f.layout, &f.defaults, &f.config).unwrap();
        assert_eq!(
            reopened.current_settings().try_get(&f.name),
            Some("flushed".to_string())
        );
    }

    #[test]
    fn test_settled_change_is_written_before_close() {
        let f = fixture();
        let engine = AutoSave::start(&f.layout, &f.defaults, &f.config).unwrap();
        engine.persist_value(&f.count, &9);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.stats().writes() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(engine.stats().writes(), 1);
        assert!(matches!(
            inspect(&f.layout).latest_value(),
            Some((_, value)) if value.get("count") == Some(&crate::Value::from(9u32))
        ));
    }

    #[test]
    fn test_close_is_idempotent_and_persist_after_close_stays_in_memory() {
        let f = fixture();
        let engine = AutoSave::start(&f.layout, &f.defaults, &f.config).unwrap();
        engine.close();
        engine.close();
        assert!(engine.persist_value(&f.count, &3));
        assert_eq!(engine.current_settings().try_get(&f.count), Some(3));
        assert_eq!(engine.stats().writes(), 0);
    }

    #[test]
    fn test_concurrent_persists_from_many_threads() {
        let f = fixture();
        let engine = Arc::new(AutoSave::start(&f.layout, &f.defaults, &f.config).unwrap());
        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let engine = Arc::clone(&engine);
                let count = f.count.clone();
                thread::spawn(move || {
                    for i in 0..25u32 {
                        engine.persist_value(&count, &(t * 100 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let last = engine.current_settings();
        engine.close();

        let report = inspect(&f.layout);
        let (_, on_disk) = report.latest_value().unwrap();
        assert_eq!(on_disk, &last.to_value());
    }
}
