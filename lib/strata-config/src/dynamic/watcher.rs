//! A watcher for a specific configuration key.

use std::{future::pending as pending_forever, str::FromStr};

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::{dynamic::ConfigChangeEvent, snapshot::SnapshotKey};

/// A watcher for a specific configuration key.
///
/// It filters [`ConfigChangeEvent`]s down to the requested key, compared without regard to case.
///
/// If the configuration has no refreshing providers, [`changed`](Self::changed) will wait indefinitely and never
/// yield.
pub struct FieldUpdateWatcher {
    key: SnapshotKey,
    rx: Option<broadcast::Receiver<ConfigChangeEvent>>,
}

impl FieldUpdateWatcher {
    pub(crate) fn new(key: &str, rx: Option<broadcast::Receiver<ConfigChangeEvent>>) -> Self {
        Self {
            key: SnapshotKey::from(key),
            rx,
        }
    }

    /// Returns the watched key.
    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    /// Waits until the watched key changes and returns a typed (old, new) tuple.
    ///
    /// Values which are missing or fail to parse as `T` are returned as `None`. A change where neither side parses is
    /// skipped.
    pub async fn changed<T>(&mut self) -> (Option<T>, Option<T>)
    where
        T: FromStr,
    {
        let Some(rx) = self.rx.as_mut() else {
            return pending_forever().await;
        };

        loop {
            match rx.recv().await {
                Ok(event) if SnapshotKey::from(event.key()) == self.key => {
                    let old_t = event.old_value().and_then(|v| v.parse().ok());
                    let new_t = event.new_value().and_then(|v| v.parse().ok());

                    if new_t.is_some() || old_t.is_some() {
                        return (old_t, new_t);
                    }
                }
                // Ignore other key changes.
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(key = %self.key, skipped, "Configuration watcher lagged behind. Some changes were missed.");
                }
                Err(RecvError::Closed) => return pending_forever().await,
            }
        }
    }
}
