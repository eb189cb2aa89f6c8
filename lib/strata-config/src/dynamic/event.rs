//! Defines the event type for configuration changes.

/// An event that occurs when the configuration changes.
///
/// Values are `None` when the key exists without a value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigChangeEvent {
    /// A configuration key was added.
    Added {
        /// The key that was added.
        key: String,
        /// The new value.
        value: Option<String>,
    },
    /// A configuration key was modified.
    Modified {
        /// The key that was updated.
        key: String,
        /// The old value.
        old_value: Option<String>,
        /// The new value.
        new_value: Option<String>,
    },
    /// A configuration key was removed.
    Removed {
        /// The key that was removed.
        key: String,
        /// The value before removal.
        old_value: Option<String>,
    },
}

impl ConfigChangeEvent {
    /// Returns the key this event refers to.
    pub fn key(&self) -> &str {
        match self {
            Self::Added { key, .. } | Self::Modified { key, .. } | Self::Removed { key, .. } => key,
        }
    }

    /// Returns the value before the change, if the key existed and had one.
    pub fn old_value(&self) -> Option<&str> {
        match self {
            Self::Added { .. } => None,
            Self::Modified { old_value, .. } | Self::Removed { old_value, .. } => old_value.as_deref(),
        }
    }

    /// Returns the value after the change, if the key still exists and has one.
    pub fn new_value(&self) -> Option<&str> {
        match self {
            Self::Added { value, .. } => value.as_deref(),
            Self::Modified { new_value, .. } => new_value.as_deref(),
            Self::Removed { .. } => None,
        }
    }
}
