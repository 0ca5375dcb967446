//! Process-wide settings context.
//!
//! Constructed once at startup, passed to whoever needs settings, and closed
//! explicitly at shutdown.

use crate::autosave::{inspect, AutoSave};
use crate::config::PrefStoreConfig;
use crate::coordinator::{ActivationRequest, Election, InstanceCoordinator, InstanceLock, LockRecord};
use crate::layout::StoreLayout;
use crate::schema::Property;
use crate::store::{Snapshot, WorkingCopy};
use tracing::{info, warn};

/// How this process takes part in the settings directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns the directory and auto-saves
    Primary,
    /// Another instance owns the directory; changes stay in memory
    Secondary { owner: LockRecord },
    /// Ownership or the rotation files were unavailable; changes stay in memory
    Standalone,
}

/// The election outcome, the engine and the lock, bundled
#[derive(Debug)]
pub struct SettingsContext {
    // Dropped before the lock
    engine: AutoSave,
    lock: Option<InstanceLock>,
    role: Role,
    layout: StoreLayout,
}

impl SettingsContext {
    /// Elect an owner for `layout` and start the matching engine
    ///
    /// Never fails: when this process cannot own the directory, or owns it but
    /// cannot open the rotation files, settings are loaded read-only and kept
    /// in memory.
    pub fn open(layout: &StoreLayout, defaults: &Snapshot, config: &PrefStoreConfig) -> Self {
        Self::open_with(InstanceCoordinator::new(layout.clone(), config), defaults, config)
    }

    /// Like [`open`](Self::open), with a preconfigured coordinator
    pub fn open_with(coordinator: InstanceCoordinator, defaults: &Snapshot, config: &PrefStoreConfig) -> Self {
        let layout = coordinator.layout().clone();
        let (engine, lock, role) = match coordinator.elect() {
            Election::Owner(lock) => match AutoSave::start(&layout, defaults, config) {
                Ok(engine) => (engine, Some(lock), Role::Primary),
                Err(e) => {
                    warn!(error = %e, "Auto-save unavailable, settings kept in memory");
                    let engine = AutoSave::in_memory(load_read_only(&layout, defaults));
                    (engine, Some(lock), Role::Standalone)
                }
            },
            Election::Secondary { owner, .. } => {
                let engine = AutoSave::in_memory(load_read_only(&layout, defaults));
                (engine, None, Role::Secondary { owner })
            }
            Election::Unavailable => {
                let engine = AutoSave::in_memory(load_read_only(&layout, defaults));
                (engine, None, Role::Standalone)
            }
        };
        info!(role = ?role, dir = %layout.dir().display(), "Settings context opened");
        Self {
            engine,
            lock,
            role,
            layout,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn engine(&self) -> &AutoSave {
        &self.engine
    }

    pub fn is_durable(&self) -> bool {
        self.engine.is_durable()
    }

    pub fn current_settings(&self) -> Snapshot {
        self.engine.current_settings()
    }

    pub fn persist(&self, working_copy: WorkingCopy) -> bool {
        self.engine.persist(working_copy)
    }

    pub fn persist_value<T>(&self, property: &Property<T>, value: &T) -> bool {
        self.engine.persist_value(property, value)
    }

    pub fn update<F>(&self, edit: F) -> bool
    where
        F: FnOnce(&mut WorkingCopy),
    {
        self.engine.update(edit)
    }

    /// A pending request from a later instance to activate this one
    pub fn activation_request(&self) -> Option<ActivationRequest> {
        self.lock.as_ref()?.take_activation_request()
    }

    /// Flush and stop the engine, then give up the lock
    pub fn close(self) {
        let Self { engine, lock, .. } = self;
        engine.close();
        drop(engine);
        if let Some(lock) = lock {
            lock.release();
        }
    }
}

/// Latest on-disk snapshot without taking any file for writing
fn load_read_only(layout: &StoreLayout, defaults: &Snapshot) -> Snapshot {
    let report = inspect(layout);
    match report.latest_value() {
        Some((slot, value)) => match Snapshot::from_value(defaults.schema().clone(), value.clone()) {
            Ok(snapshot) => {
                info!(slot = %slot, "Loaded settings read-only");
                snapshot
            }
            Err(e) => {
                warn!(slot = %slot, error = %e, "Rotation file is not a settings document");
                defaults.clone()
            }
        },
        None => defaults.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::types::HostInteger;
    use tempfile::TempDir;

    fn setup() -> (TempDir, StoreLayout, Property<u16>, Snapshot, PrefStoreConfig) {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path(), "settings");
        let port = Property::new("port", HostInteger::<u16>::new());
        let schema = Schema::builder().property(&port).build().unwrap();
        let config = PrefStoreConfig {
            debounce_ms: 10,
            lock_attempts: 2,
            lock_retry_pause_ms: 1,
            ..Default::default()
        };
        (dir, layout, port, Snapshot::empty(schema), config)
    }

    #[test]
    fn test_primary_then_secondary_sees_saved_state() {
        let (_dir, layout, port, defaults, config) = setup();
        let primary = SettingsContext::open(&layout, &defaults, &config);
        assert_eq!(primary.role(), Role::Primary);
        assert!(primary.is_durable());
        primary.persist_value(&port, &8080);
        primary.engine().close();

        let secondary = SettingsContext::open(&layout, &defaults, &config);
        assert!(matches!(secondary.role(), Role::Secondary { .. }));
        assert!(!secondary.is_durable());
        assert_eq!(secondary.current_settings().try_get(&port), Some(8080));

        // Changes in the secondary never reach disk
        secondary.persist_value(&port, &9090);
        secondary.close();
        assert!(primary.activation_request().is_some());
        primary.close();

        let reopened = SettingsContext::open(&layout, &defaults, &config);
        assert_eq!(reopened.role(), Role::Primary);
        assert_eq!(reopened.current_settings().try_get(&port), Some(8080));
        reopened.close();
    }

    #[test]
    fn test_unwritable_directory_is_standalone() {
        let (dir, _layout, port, defaults, config) = setup();
        // A regular file where the data directory should be
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let layout = StoreLayout::new(blocker.join("nested"), "settings");

        let context = SettingsContext::open(&layout, &defaults, &config);
        assert_eq!(context.role(), Role::Standalone);
        assert!(context.persist_value(&port, &1));
        assert_eq!(context.current_settings().try_get(&port), Some(1));
        assert_eq!(context.activation_request(), None);
        context.close();
    }
}
