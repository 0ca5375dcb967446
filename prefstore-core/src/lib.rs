/*!
# Prefstore Core Engine

Durable, schema-bound application settings for desktop processes that edit
settings continuously but must not pay for disk I/O on every edit.

This crate provides:

- A small value model (booleans, arbitrary-precision integers, strings, lists, maps)
  and composable types that convert between values and Rust types
- Schemas, mutable working copies and immutable snapshots
- A JSON-with-comments text codec
- A debounced auto-save engine that rotates between two files plus a marker, so a
  crash never leaves a torn document behind
- A lock-file election that makes one process the sole writer of a data directory

## Usage

```no_run
use prefstore_core::types::{non_blank_string, BooleanType};
use prefstore_core::{PrefStoreConfig, Property, Role, Schema, SettingsContext, StoreLayout};

let theme = Property::new("theme", non_blank_string()).with_doc("Color theme");
let wrap = Property::new("editor.wrap", BooleanType);
let schema = Schema::builder().property(&theme).property(&wrap).build()?;

let mut defaults = prefstore_core::WorkingCopy::new(schema);
defaults.add_or_replace(&theme, &"light".to_string());
let defaults = defaults.commit();

let config = PrefStoreConfig::default();
let layout = StoreLayout::for_application("my-editor", &config.file_stem)?;
let context = SettingsContext::open(&layout, &defaults, &config);
if context.role() == Role::Primary {
    context.persist_value(&wrap, &true);
}
let wrap_enabled = context.current_settings().get_or(&wrap, false);
context.close();
# let _ = wrap_enabled;
# Ok::<(), prefstore_core::PrefError>(())
```
*/

pub mod autosave;
pub mod codec;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod layout;
pub mod observability;
pub mod schema;
pub mod settings_file;
pub mod store;
pub mod types;
pub mod value;


pub use autosave::{AutoSave, EngineState, WriteStats};
pub use config::PrefStoreConfig;
pub use context::{Role, SettingsContext};
pub use coordinator::{ActivationRequest, Election, Handshake, InstanceCoordinator, InstanceLock, LockRecord, SignalFileHandshake};
pub use error::{PrefError, Result};
pub use layout::{Slot, StoreLayout};
pub use schema::{Property, PropertyDescriptor, Schema};
pub use settings_file::SettingsFile;
pub use store::{SettingsSource, Snapshot, WorkingCopy};
pub use value::{Key, Value, ValueKind, ValueMap};
