//! Flat configuration snapshots.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use indexmap::{map::Entry, IndexMap};

/// Delimiter used when joining the segments of a key path.
pub const KEY_DELIMITER: &str = ".";

/// A configuration key whose equality and hashing ignore case.
///
/// The original casing is preserved for display and when reconstructing nested data.
#[derive(Clone, Debug, Eq)]
pub struct SnapshotKey(String);

impl SnapshotKey {
    /// Returns the key as it was originally written.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn folded(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars().flat_map(char::to_lowercase)
    }
}

impl PartialEq for SnapshotKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded().eq(other.folded())
    }
}

impl Hash for SnapshotKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.folded() {
            c.hash(state);
        }
    }
}

impl From<&str> for SnapshotKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for SnapshotKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A flat, point-in-time view of configuration data.
///
/// Keys are delimited paths (`a.b.0.c`) compared without regard to case. Values are optional: `None` is the absent
/// marker, which distinguishes a key that exists without a value (an empty object, or a JSON `null`) from a key that
/// does not exist at all.
///
/// Snapshots are never patched in place once published by a provider. Each reload builds a new snapshot and replaces
/// the previous one wholesale.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    entries: IndexMap<SnapshotKey, Option<String>>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any existing value for the same key.
    pub fn insert<K>(&mut self, key: K, value: Option<String>)
    where
        K: Into<SnapshotKey>,
    {
        self.entries.insert(key.into(), value);
    }

    /// Inserts a value only if the key is not already present.
    ///
    /// Returns `false`, leaving the snapshot untouched, if the key already exists.
    pub fn try_insert<K>(&mut self, key: K, value: Option<String>) -> bool
    where
        K: Into<SnapshotKey>,
    {
        match self.entries.entry(key.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// Returns the value for the given key.
    ///
    /// The outer `Option` is `None` when the key does not exist; the inner `Option` is `None` when the key exists but
    /// holds the absent marker.
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.entries.get(&SnapshotKey::from(key)).map(|v| v.as_deref())
    }

    /// Returns `true` if the key exists, with or without a value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&SnapshotKey::from(key))
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        crate::change::settings_match(self, other)
    }
}

impl<K, V> FromIterator<(K, Option<V>)> for Snapshot
where
    K: Into<SnapshotKey>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for (key, value) in iter {
            snapshot.insert(key, value.map(Into::into));
        }
        snapshot
    }
}
