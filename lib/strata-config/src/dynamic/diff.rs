//! Functions for diffing configuration snapshots.

use super::event::ConfigChangeEvent;
use crate::snapshot::Snapshot;

/// Diffs two snapshots and returns a list of changes.
///
/// Additions and modifications are reported in the order of `new`, followed by removals in the order of `old`. Keys
/// are matched without regard to case, and are reported with the spelling used in `new` (or `old`, for removals).
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> Vec<ConfigChangeEvent> {
    let mut changes = Vec::new();

    for (key, new_value) in new.iter() {
        match old.get(key) {
            Some(old_value) if old_value == new_value => {}
            Some(old_value) => changes.push(ConfigChangeEvent::Modified {
                key: key.to_string(),
                old_value: old_value.map(str::to_string),
                new_value: new_value.map(str::to_string),
            }),
            None => changes.push(ConfigChangeEvent::Added {
                key: key.to_string(),
                value: new_value.map(str::to_string),
            }),
        }
    }

    for (key, old_value) in old.iter() {
        if !new.contains_key(key) {
            changes.push(ConfigChangeEvent::Removed {
                key: key.to_string(),
                old_value: old_value.map(str::to_string),
            });
        }
    }

    changes
}
