//! Change notifications for the layered configuration.

mod diff;
mod event;
mod watcher;

pub use self::diff::diff_snapshots;
pub use self::event::ConfigChangeEvent;
pub use self::watcher::FieldUpdateWatcher;
