/*!
The setting store: mutable working copies and immutable committed snapshots.

A [`WorkingCopy`] is the staging area for edits; committing it produces a
[`Snapshot`], which never changes afterwards and can be shared freely between
threads. Snapshots compare structurally with [`Snapshot::equal_to`], which is what
lets the auto-save engine skip commits that did not change anything.
*/

use crate::error::{SchemaError, ValidationError};
use crate::schema::{Property, Schema};
use crate::value::{Key, Value, ValueKind, ValueMap};
use std::sync::Arc;
use tracing::debug;

/// Read access to raw entries, shared by working copies and snapshots
pub trait SettingsSource {
    fn raw(&self, key: &str) -> Option<&Value>;
}

/// A mutable, schema-bound set of edits
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    schema: Schema,
    values: ValueMap,
}

impl WorkingCopy {
    /// A fresh, empty working copy
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            values: ValueMap::new(),
        }
    }

    /// Start editing from a committed snapshot
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            schema: snapshot.inner.schema.clone(),
            values: snapshot.inner.values.clone(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn require_member(&self, key: &Key) {
        if !self.schema.contains(key.as_str()) {
            panic!("{}", SchemaError::UnknownProperty(key.clone()));
        }
    }

    /// Set `property` to `value`, replacing any previous value
    ///
    /// # Panics
    ///
    /// Panics if `property` is not part of this working copy's schema.
    pub fn add_or_replace<T>(&mut self, property: &Property<T>, value: &T) -> &mut Self {
        self.require_member(property.key());
        self.values
            .insert(property.key().clone(), property.encode(value));
        self
    }

    /// Remove `property`, returning whether it was present
    pub fn remove<T>(&mut self, property: &Property<T>) -> bool {
        self.values.remove(property.key().as_str()).is_some()
    }

    pub fn get<T>(&self, property: &Property<T>) -> Option<T> {
        self.values
            .get(property.key().as_str())
            .and_then(|value| property.value_type().try_decode(value))
    }

    /// Copy `other_member` out of `other` into `member` of this working copy
    ///
    /// The value is decoded with the source property's type, re-encoded with the
    /// destination's and must then pass the destination's validation. When the source has no value
    /// the member is removed here too. Returns whether a value was copied; on a
    /// validation failure this working copy is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if `member` is not part of this working copy's schema.
    pub fn assign_from<T, S>(
        &mut self,
        member: &Property<T>,
        other: &S,
        other_member: &Property<T>,
    ) -> Result<bool, ValidationError>
    where
        S: SettingsSource + ?Sized,
    {
        self.require_member(member.key());
        match other.raw(other_member.key().as_str()) {
            Some(raw) => {
                let encoded = member.encode(&other_member.decode(raw)?);
                member.decode(&encoded)?;
                self.values.insert(member.key().clone(), encoded);
                Ok(true)
            }
            None => {
                self.values.remove(member.key().as_str());
                Ok(false)
            }
        }
    }

    /// Discard all edits and reload the contents of `snapshot`
    pub fn revert(&mut self, snapshot: &Snapshot) {
        self.schema = snapshot.inner.schema.clone();
        self.values = snapshot.inner.values.clone();
    }

    /// Keys whose value differs from `origin`, in key order
    pub fn changed_keys(&self, origin: &Snapshot) -> Vec<Key> {
        let theirs = &origin.inner.values;
        let mut changed: Vec<Key> = self
            .values
            .iter()
            .filter(|(key, value)| theirs.get(key.as_str()) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect();
        changed.extend(
            theirs
                .keys()
                .filter(|key| !self.values.contains_key(key.as_str()))
                .cloned(),
        );
        changed.sort();
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Freeze the edits into a snapshot
    pub fn commit(self) -> Snapshot {
        Snapshot {
            inner: Arc::new(SnapshotInner {
                schema: self.schema,
                values: self.values,
            }),
        }
    }
}

impl SettingsSource for WorkingCopy {
    fn raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

#[derive(Debug)]
struct SnapshotInner {
    schema: Schema,
    values: ValueMap,
}

/// An immutable, committed set of settings
///
/// Cloning is cheap: clones share the same underlying data.
#[derive(Debug, Clone)]
pub struct Snapshot {
    inner: Arc<SnapshotInner>,
}

impl Snapshot {
    pub fn empty(schema: Schema) -> Self {
        WorkingCopy::new(schema).commit()
    }

    /// Build a snapshot from a parsed document
    ///
    /// The document must be a map. Entries the schema does not name are kept
    /// verbatim so that settings written by a newer version survive a round trip.
    pub fn from_value(schema: Schema, value: Value) -> Result<Self, ValidationError> {
        match value {
            Value::Map(values) => Ok(Self {
                inner: Arc::new(SnapshotInner { schema, values }),
            }),
            other => Err(ValidationError::WrongKind {
                expected: ValueKind::Map,
                found: other.kind(),
            }),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Decode `property`, or `None` when it is absent or fails validation
    pub fn try_get<T>(&self, property: &Property<T>) -> Option<T> {
        let raw = self.inner.values.get(property.key().as_str())?;
        match property.decode(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key = %property.key(), error = %e, "Stored setting rejected by its type");
                None
            }
        }
    }

    pub fn get_or<T>(&self, property: &Property<T>, default: T) -> T {
        self.try_get(property).unwrap_or(default)
    }

    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.inner.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty()
    }

    /// The canonical map form of this snapshot
    pub fn to_value(&self) -> Value {
        Value::Map(self.inner.values.clone())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.inner.values.iter()
    }

    /// Structural comparison of the stored values
    ///
    /// Independent of how either side was produced (built in memory, or parsed
    /// back from disk in a different entry order). The schemas are not compared.
    pub fn equal_to(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.values == other.inner.values
    }

    /// A snapshot holding this one's entries, replaced or extended by `other`'s
    pub fn overlay(&self, other: &Snapshot) -> Snapshot {
        let mut values = self.inner.values.clone();
        for (key, value) in other.entries() {
            values.insert(key.clone(), value.clone());
        }
        Snapshot {
            inner: Arc::new(SnapshotInner {
                schema: self.inner.schema.clone(),
                values,
            }),
        }
    }

    /// Start a working copy seeded with this snapshot
    pub fn edit(&self) -> WorkingCopy {
        WorkingCopy::from_snapshot(self)
    }
}

impl SettingsSource for Snapshot {
    fn raw(&self, key: &str) -> Option<&Value> {
        self.inner.values.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{non_blank_string, ranged, BooleanType, StringType};

    struct Fixture {
        schema: Schema,
        font: Property<String>,
        size: Property<u32>,
        wrap: Property<bool>,
    }

    fn fixture() -> Fixture {
        let font = Property::new("editor.font", non_blank_string());
        let size = Property::new("editor.size", ranged(6u32, 72));
        let wrap = Property::new("editor.wrap", BooleanType);
        let schema = Schema::builder()
            .property(&font)
            .property(&size)
            .property(&wrap)
            .build()
            .unwrap();
        Fixture {
            schema,
            font,
            size,
            wrap,
        }
    }

    fn seeded(f: &Fixture) -> Snapshot {
        let mut wc = WorkingCopy::new(f.schema.clone());
        wc.add_or_replace(&f.font, &"Fira Code".to_string())
            .add_or_replace(&f.size, &12)
            .add_or_replace(&f.wrap, &false);
        wc.commit()
    }

    #[test]
    fn test_commit_and_typed_lookup() {
        let f = fixture();
        let snapshot = seeded(&f);
        assert_eq!(snapshot.try_get(&f.font), Some("Fira Code".to_string()));
        assert_eq!(snapshot.try_get(&f.size), Some(12));
        assert!(!snapshot.get_or(&f.wrap, true));
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_invalid_stored_value_reads_as_none() {
        let f = fixture();
        let mut entries = ValueMap::new();
        entries.insert(f.size.key().clone(), Value::from(500));
        let snapshot = Snapshot::from_value(f.schema.clone(), Value::Map(entries)).unwrap();
        assert_eq!(snapshot.try_get(&f.size), None);
        assert_eq!(snapshot.get_or(&f.size, 11), 11);
    }

    #[test]
    fn test_from_value_requires_map() {
        let f = fixture();
        assert!(matches!(
            Snapshot::from_value(f.schema, Value::from(1)),
            Err(ValidationError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_unchanged_copy_equals_origin_after_edits() {
        let f = fixture();
        let origin = seeded(&f);

        let mut wc = origin.edit();
        wc.add_or_replace(&f.size, &30);
        wc.remove(&f.font);
        wc.revert(&origin);
        wc.add_or_replace(&f.wrap, &true);
        wc.add_or_replace(&f.wrap, &false);
        wc.assign_from(&f.size, &origin, &f.size).unwrap();

        assert!(wc.changed_keys(&origin).is_empty());
        assert!(wc.commit().equal_to(&origin));
    }

    #[test]
    fn test_equal_to_ignores_construction_order() {
        let f = fixture();
        let mut first = WorkingCopy::new(f.schema.clone());
        first.add_or_replace(&f.wrap, &true).add_or_replace(&f.size, &9);
        let mut second = WorkingCopy::new(f.schema.clone());
        second.add_or_replace(&f.size, &9).add_or_replace(&f.wrap, &true);

        assert!(first.commit().equal_to(&second.commit()));
    }

    #[test]
    fn test_changed_keys_reports_edits_and_removals() {
        let f = fixture();
        let origin = seeded(&f);
        let mut wc = origin.edit();
        wc.add_or_replace(&f.size, &14);
        wc.remove(&f.wrap);

        let changed = wc.changed_keys(&origin);
        assert_eq!(changed, vec![f.size.key().clone(), f.wrap.key().clone()]);
        assert!(!wc.commit().equal_to(&origin));
    }

    #[test]
    fn test_assign_from_other_schema() {
        let f = fixture();
        let defaults_font = Property::new("font", StringType);
        let defaults_schema = Schema::builder().property(&defaults_font).build().unwrap();
        let mut defaults = WorkingCopy::new(defaults_schema);
        defaults.add_or_replace(&defaults_font, &"  Iosevka ".to_string());
        let defaults = defaults.commit();

        let mut local = WorkingCopy::new(f.schema.clone());
        assert_eq!(local.assign_from(&f.font, &defaults, &defaults_font), Ok(true));
        // Destination type trims on read
        assert_eq!(local.get(&f.font), Some("Iosevka".to_string()));

        let missing = Property::new("missing", StringType);
        assert_eq!(local.assign_from(&f.font, &defaults, &missing), Ok(false));
        assert_eq!(local.get(&f.font), None);
    }

    #[test]
    fn test_assign_from_rejects_invalid_source() {
        let f = fixture();
        let mut source = WorkingCopy::new(f.schema.clone());
        source.add_or_replace(&f.font, &"Mono".to_string());
        let mut target = WorkingCopy::new(f.schema.clone());
        target.add_or_replace(&f.font, &"Serif".to_string());

        // Reading a font entry through the size property fails validation
        let err = target.assign_from(&f.size, &source, &Property::new("editor.font", ranged(6u32, 72)));
        assert!(matches!(err, Err(ValidationError::WrongKind { .. })));
        assert_eq!(target.get(&f.font), Some("Serif".to_string()));
        assert_eq!(target.get(&f.size), None);
    }

    #[test]
    #[should_panic(expected = "not part of the schema")]
    fn test_writing_foreign_property_panics() {
        let f = fixture();
        let stranger = Property::new("stranger", BooleanType);
        WorkingCopy::new(f.schema).add_or_replace(&stranger, &true);
    }

    #[test]
    fn test_unknown_entries_survive_edit() {
        let f = fixture();
        let mut entries = ValueMap::new();
        entries.insert(Key::new("future.option").unwrap(), Value::from("kept"));
        let snapshot = Snapshot::from_value(f.schema.clone(), Value::Map(entries)).unwrap();

        let mut wc = snapshot.edit();
        wc.add_or_replace(&f.wrap, &true);
        let committed = wc.commit();
        assert_eq!(committed.get_raw("future.option"), Some(&Value::from("kept")));
    }
}
