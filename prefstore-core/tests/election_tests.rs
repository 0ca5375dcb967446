/*!
Integration tests for single-instance election and the settings context.
*/

use mockall::mock;
use prefstore_core::types::BooleanType;
use prefstore_core::{
    Election, Handshake, InstanceCoordinator, LockRecord, PrefStoreConfig, Property, Result,
    Role, Schema, SettingsContext, Snapshot, StoreLayout,
};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

mock! {
    pub Notifier {}
    impl Handshake for Notifier {
        fn notify(&self, layout: &StoreLayout, owner: &LockRecord) -> Result<()>;
    }
}

fn config() -> PrefStoreConfig {
    PrefStoreConfig {
        debounce_ms: 10,
        lock_attempts: 3,
        lock_retry_pause_ms: 5,
        ..Default::default()
    }
}

#[test]
fn test_exactly_one_owner_among_concurrent_contenders() {
    let dir = TempDir::new().unwrap();
    let layout = StoreLayout::new(dir.path(), "settings");
    let contenders = 6;
    let barrier = Arc::new(Barrier::new(contenders));

    let handles: Vec<_> = (0..contenders as u64)
        .map(|handle| {
            let layout = layout.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let coordinator = InstanceCoordinator::new(layout, &config()).with_handle(handle + 1);
                barrier.wait();
                coordinator.elect()
            })
        })
        .collect();
    let elections: Vec<Election> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let owners: Vec<&LockRecord> = elections
        .iter()
        .filter_map(|e| match e {
            Election::Owner(lock) => Some(lock.record()),
            _ => None,
        })
        .collect();
    assert_eq!(owners.len(), 1, "elections: {elections:?}");
    let owner = *owners[0];

    for election in &elections {
        match election {
            Election::Owner(_) => {}
            Election::Secondary { owner: seen, .. } => assert_eq!(*seen, owner),
            Election::Unavailable => panic!("contender gave up while the owner record was readable"),
        }
    }
}

#[test]
fn test_secondary_notifies_owner_exactly_once() {
    let dir = TempDir::new().unwrap();
    let layout = StoreLayout::new(dir.path(), "settings");
    let first = InstanceCoordinator::new(layout.clone(), &config()).with_handle(10).elect();
    let Election::Owner(lock) = first else {
        panic!("first contender must own the directory");
    };
    let owner = *lock.record();

    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .withf(move |_, record| record.handle == 10 && record.token == owner.token)
        .times(1)
        .returning(|_, _| Ok(()));

    let second = InstanceCoordinator::new(layout, &config())
        .with_handle(20)
        .with_handshake(notifier)
        .elect();
    assert!(matches!(second, Election::Secondary { notified: true, .. }));
    lock.release();
}

#[test]
fn test_context_hands_ownership_over_after_close() {
    let dir = TempDir::new().unwrap();
    let layout = StoreLayout::new(dir.path(), "settings");
    let dark = Property::new("dark.mode", BooleanType);
    let schema = Schema::builder().property(&dark).build().unwrap();
    let defaults = Snapshot::empty(schema);

    let primary = SettingsContext::open(&layout, &defaults, &config());
    assert_eq!(primary.role(), Role::Primary);
    primary.persist_value(&dark, &true);

    let mut notifier = MockNotifier::new();
    notifier.expect_notify().times(1).returning(|_, _| Ok(()));
    let coordinator = InstanceCoordinator::new(layout.clone(), &config()).with_handshake(notifier);
    let secondary = SettingsContext::open_with(coordinator, &defaults, &config());
    match secondary.role() {
        Role::Secondary { owner } => assert_eq!(owner.handle, u64::from(std::process::id())),
        other => panic!("expected secondary, got {other:?}"),
    }
    secondary.close();
    primary.close();

    let next = SettingsContext::open(&layout, &defaults, &config());
    assert_eq!(next.role(), Role::Primary);
    assert_eq!(next.current_settings().try_get(&dark), Some(true));
    next.close();
}
