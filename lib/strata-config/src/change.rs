//! Change detection between successive fetches.

use chrono::{DateTime, Utc};

use crate::snapshot::Snapshot;

/// Returns `true` if both snapshots hold the same set of keys mapped to identical values.
///
/// Keys are compared without regard to case and values are compared exactly. Insertion order is ignored.
pub fn settings_match(old: &Snapshot, new: &Snapshot) -> bool {
    if old.len() != new.len() {
        return false;
    }

    old.iter().all(|(key, old_value)| new.get(key) == Some(old_value))
}

/// Returns `true` if a remote resource modified at `current` should be fetched again given the last observed
/// modification time.
///
/// A resource that has never been observed is always considered newer.
pub fn is_newer(last_observed: Option<DateTime<Utc>>, current: DateTime<Utc>) -> bool {
    match last_observed {
        Some(last_observed) => current > last_observed,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    #[test]
    fn match_ignores_order_and_key_case() {
        let old = Snapshot::from_iter([("A", Some("1")), ("b", Some("2")), ("c", None)]);
        let new = Snapshot::from_iter([("c", None), ("B", Some("2")), ("a", Some("1"))]);

        assert!(settings_match(&old, &new));
        assert_eq!(old, new);
    }

    #[test]
    fn match_compares_values_exactly() {
        let old = Snapshot::from_iter([("a", Some("value"))]);
        let new = Snapshot::from_iter([("a", Some("Value"))]);
        assert!(!settings_match(&old, &new));

        let absent = Snapshot::from_iter([("a", None::<&str>)]);
        let empty_string = Snapshot::from_iter([("a", Some(""))]);
        assert!(!settings_match(&absent, &empty_string));
    }

    #[test]
    fn match_detects_added_and_removed_keys() {
        let old = Snapshot::from_iter([("a", Some("1"))]);
        let added = Snapshot::from_iter([("a", Some("1")), ("b", Some("2"))]);
        let replaced = Snapshot::from_iter([("b", Some("1"))]);

        assert!(!settings_match(&old, &added));
        assert!(!settings_match(&added, &old));
        assert!(!settings_match(&old, &replaced));
        assert!(settings_match(&Snapshot::new(), &Snapshot::new()));
    }

    #[test]
    fn newer_timestamps() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap();

        assert!(is_newer(None, t0));
        assert!(is_newer(Some(t0), t1));
        assert!(!is_newer(Some(t0), t0));
        assert!(!is_newer(Some(t1), t0));
    }
}
