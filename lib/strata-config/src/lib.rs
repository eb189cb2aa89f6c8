//! Layered configuration with dynamically refreshing sources.
//!
//! Configuration is assembled from an ordered list of sources (files, environment variables, command-line overrides,
//! and [refreshing providers][refresh::RefreshingProvider] that poll a remote store) into a single key/value tree.
//! Later sources take precedence over earlier ones. When a refreshing provider applies new data, the tree is rebuilt
//! and the individual key changes are broadcast to subscribers.
#![deny(warnings)]
#![deny(missing_docs)]

use std::{
    borrow::Cow,
    collections::HashSet,
    fmt,
    path::PathBuf,
    sync::{Arc, Weak},
};

use arc_swap::ArcSwap;
pub use figment::value;
use figment::{error::Kind, providers::Serialized, Figment};
use serde::Deserialize;
use serde_json::Value;
use snafu::Snafu;
use tokio::{
    select,
    sync::{broadcast, broadcast::error::RecvError, Notify},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub mod change;
pub mod dynamic;
mod errors;
pub mod flatten;
mod provider;
pub mod refresh;
pub mod snapshot;
pub mod sources;

pub use self::errors::{FetchError, FormatError, GenericError};
use self::{
    dynamic::{diff_snapshots, ConfigChangeEvent, FieldUpdateWatcher},
    provider::{merge_layers, Layer},
    refresh::{RefreshingProvider, ReloadEvent},
    snapshot::{Snapshot, SnapshotKey, KEY_DELIMITER},
};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// Requested field was missing from the configuration.
    #[snafu(display("Missing field '{}' in configuration. {}", field, help_text))]
    MissingField {
        /// Help text describing how to set the missing field.
        ///
        /// This is meant to be displayed to the user, and includes environment variable-specific text if environment
        /// variables had been loaded originally.
        help_text: String,

        /// Name of the missing field.
        field: Cow<'static, str>,
    },

    /// Requested field's data type was not the unexpected data type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Name of the invalid field.
        ///
        /// This is a period-separated path to the field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// A configuration file could not be read.
    #[snafu(display("Failed to read configuration file '{}': {}", path.display(), source))]
    ReadFile {
        /// Path to the file.
        path: PathBuf,

        /// Error source.
        source: std::io::Error,
    },

    /// A configuration file was malformed.
    #[snafu(display("Configuration file '{}' is malformed: {}", path.display(), source))]
    InvalidDocument {
        /// Path to the file.
        path: PathBuf,

        /// Error source.
        source: FormatError,
    },

    /// A provider was configured without a connection string.
    #[snafu(display("Connection string for provider '{}' must not be empty.", provider))]
    MissingConnectionString {
        /// Name of the provider.
        provider: &'static str,
    },

    /// A provider's connection string could not be interpreted.
    #[snafu(display("Invalid connection string for provider '{}': {}", provider, source))]
    InvalidConnectionString {
        /// Name of the provider.
        provider: &'static str,

        /// Error source.
        source: GenericError,
    },

    /// The remote document provider was configured without a document path.
    #[snafu(display("Remote document path must not be empty."))]
    MissingDocumentPath,

    /// The remote document path was not of the form `container/path/to/file.ext`.
    #[snafu(display(
        "Remote document path '{}' must name a container and a file with an extension, such as 'container/settings.json'.",
        path
    ))]
    InvalidDocumentPath {
        /// The configured path.
        path: String,
    },

    /// The refresh interval was below the allowed minimum.
    #[snafu(display(
        "Refresh interval of {} seconds is too short. Must be at least {} seconds.",
        interval_secs,
        minimum_secs
    ))]
    RefreshIntervalTooShort {
        /// The configured interval, in seconds.
        interval_secs: u64,

        /// The minimum interval, in seconds.
        minimum_secs: u64,
    },

    /// A table or column name was not a plain SQL identifier.
    #[snafu(display("'{}' is not a valid table or column name.", name))]
    InvalidIdentifier {
        /// The rejected name.
        name: String,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to query configuration."))]
    Generic {
        /// Error source.
        source: GenericError,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        from_figment_error(&HashSet::new(), e)
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
enum LookupSource {
    /// The configuration key is looked up in a form suitable for environment variables.
    Environment { prefix: String },
}

impl LookupSource {
    fn transform_key(&self, key: &str) -> String {
        match self {
            // The prefix is already uppercased with a trailing underscore, and nested keys use a double underscore.
            LookupSource::Environment { prefix } => {
                format!("{}{}", prefix, key.replace(KEY_DELIMITER, "__").to_uppercase())
            }
        }
    }
}

/// A configuration loader that can pull from various sources.
///
/// Sources are layered with an implicit priority based on the order in which they are added: sources added later take
/// precedence over sources added before them. Keys are compared without regard to case across all sources.
///
/// # Supported sources
///
/// - JSON file
/// - YAML file
/// - environment variables (must be prefixed; see [`from_environment`][Self::from_environment])
/// - command-line overrides (see [`from_command_line`][Self::from_command_line])
/// - refreshing providers (see [`with_refreshing_provider`][Self::with_refreshing_provider])
#[derive(Default)]
pub struct ConfigurationLoader {
    lookup_sources: HashSet<LookupSource>,
    layers: Vec<Layer>,
}

impl ConfigurationLoader {
    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid YAML, an error will be returned.
    pub fn from_yaml<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<std::path::Path>,
    {
        self.layers.push(Layer::from_yaml(path)?);
        Ok(self)
    }

    /// Attempts to load the given YAML configuration file, ignoring any errors.
    ///
    /// Errors include the file not existing, not being readable/accessible, and not being valid YAML.
    pub fn try_from_yaml<P>(mut self, path: P) -> Self
    where
        P: AsRef<std::path::Path>,
    {
        match Layer::from_yaml(&path) {
            Ok(layer) => self.layers.push(layer),
            Err(e) => {
                debug!(error = %e, file_path = %path.as_ref().to_string_lossy(), "Unable to read YAML configuration file. Ignoring.");
            }
        }
        self
    }

    /// Loads the given JSON configuration file.
    ///
    /// The file is flattened the same way as documents fetched by refreshing providers, so a file with duplicate keys
    /// is rejected.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not a valid configuration document, an error will be returned.
    pub fn from_json<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<std::path::Path>,
    {
        self.layers.push(Layer::from_json(path)?);
        Ok(self)
    }

    /// Attempts to load the given JSON configuration file, ignoring any errors.
    ///
    /// Errors include the file not existing, not being readable/accessible, and not being a valid configuration
    /// document.
    pub fn try_from_json<P>(mut self, path: P) -> Self
    where
        P: AsRef<std::path::Path>,
    {
        match Layer::from_json(&path) {
            Ok(layer) => self.layers.push(layer),
            Err(e) => {
                debug!(error = %e, file_path = %path.as_ref().to_string_lossy(), "Unable to read JSON configuration file. Ignoring.");
            }
        }
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// The prefix given will have an underscore appended to it if it does not already end with one. For example, with a
    /// prefix of `app`, any environment variable starting with `app_` would be matched. A double underscore in the
    /// remainder of the name separates nested keys: `APP_WORKER__NAME` sets `worker.name`.
    ///
    /// The prefix is case-insensitive.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, an error will be returned.
    pub fn from_environment(mut self, prefix: &'static str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = if prefix.ends_with('_') {
            prefix.to_uppercase()
        } else {
            format!("{}_", prefix.to_uppercase())
        };

        self.layers.push(Layer::from_environment(&prefix));
        self.lookup_sources.insert(LookupSource::Environment { prefix });
        Ok(self)
    }

    /// Loads configuration overrides from command-line arguments.
    ///
    /// Accepted forms are `key=value`, `--key=value`, `--key value`, `/key=value` and `/key value`. Arguments in any
    /// other form are ignored, so the full argument list can be passed as-is.
    pub fn from_command_line<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.layers.push(Layer::from_command_line(args));
        self
    }

    /// Adds a refreshing provider.
    ///
    /// The provider should already be loaded. Each time it applies new data, the configuration built by
    /// [`into_generic`][Self::into_generic] is rebuilt and the resulting changes are broadcast to subscribers.
    pub fn with_refreshing_provider(mut self, provider: Arc<dyn RefreshingProvider>) -> Self {
        self.layers.push(Layer::Refreshing(provider));
        self
    }

    /// Creates a bootstrap `GenericConfiguration` without consuming the loader.
    ///
    /// This creates a static snapshot of the configuration loaded so far, typically used to read the settings needed
    /// to construct refreshing providers. It will not be updated at runtime.
    pub fn bootstrap_generic(&self) -> GenericConfiguration {
        GenericConfiguration::new(Resolved::from_layers(&self.layers), self.lookup_sources.clone(), None)
    }

    /// Consumes the configuration loader and wraps it in a generic wrapper.
    ///
    /// If any refreshing providers were added, a background task is spawned which rebuilds the configuration each time
    /// one of them reloads. The background tasks stop once every clone of the returned configuration has been dropped.
    /// This must be called from within a Tokio runtime.
    pub fn into_generic(self) -> GenericConfiguration {
        let resolved = Resolved::from_layers(&self.layers);
        let reload_sources = self
            .layers
            .iter()
            .filter_map(|layer| match layer {
                Layer::Refreshing(provider) => Some(provider.subscribe()),
                Layer::Static { .. } => None,
            })
            .collect::<Vec<_>>();

        for layer in &self.layers {
            debug!(source = %layer.name(), "Configuration source added.");
        }

        if reload_sources.is_empty() {
            return GenericConfiguration::new(resolved, self.lookup_sources, None);
        }

        let (events, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let generic_config = GenericConfiguration::new(resolved, self.lookup_sources, Some(events));

        let shutdown = generic_config.inner.shutdown.clone();
        let reload_needed = Arc::new(Notify::new());
        for reloads in reload_sources {
            tokio::spawn(forward_reloads(reloads, Arc::clone(&reload_needed), shutdown.clone()));
        }

        // Now that the final config object is created, spawn the background task to handle subsequent updates.
        tokio::spawn(run_configuration_updater(
            Arc::downgrade(&generic_config.inner),
            self.layers,
            reload_needed,
            shutdown,
        ));

        generic_config
    }
}

async fn forward_reloads(
    mut reloads: broadcast::Receiver<ReloadEvent>, reload_needed: Arc<Notify>, shutdown: CancellationToken,
) {
    loop {
        let result = select! {
            biased;

            _ = shutdown.cancelled() => break,
            result = reloads.recv() => result,
        };

        match result {
            // A lagged receiver still means at least one reload happened.
            Ok(ReloadEvent) | Err(RecvError::Lagged(_)) => reload_needed.notify_one(),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn run_configuration_updater(
    inner: Weak<Inner>, layers: Vec<Layer>, reload_needed: Arc<Notify>, shutdown: CancellationToken,
) {
    loop {
        select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("Configuration dropped. Stopping configuration updater.");
                break;
            }
            _ = reload_needed.notified() => {}
        }

        let Some(inner) = inner.upgrade() else {
            debug!("Configuration dropped. Stopping configuration updater.");
            break;
        };

        let resolved = Resolved::from_layers(&layers);
        let changes = diff_snapshots(&inner.current.load().snapshot, &resolved.snapshot);
        if changes.is_empty() {
            debug!("Provider reloaded without changing the resolved configuration.");
            continue;
        }

        inner.current.store(Arc::new(resolved));
        info!(changes = changes.len(), "Configuration updated.");

        if let Some(events) = &inner.events {
            for change in changes {
                // No receivers is expected and fine.
                let _ = events.send(change);
            }
        }
    }
}

/// The merged view of every layer at one point in time.
struct Resolved {
    snapshot: Arc<Snapshot>,
    tree: Value,
    figment: Figment,
}

impl Resolved {
    fn from_layers(layers: &[Layer]) -> Self {
        let snapshot = merge_layers(layers);
        let tree = flatten::unflatten(&snapshot);
        let figment = Figment::from(Serialized::defaults(tree.clone()));

        Self {
            snapshot: Arc::new(snapshot),
            tree,
            figment,
        }
    }

    /// Rewrites `key` using the spelling of each path segment present in the tree.
    ///
    /// Segments that do not exist are kept as given.
    fn resolve_path(&self, key: &str) -> String {
        let mut current = Some(&self.tree);
        let mut path = Vec::new();

        for segment in key.split(KEY_DELIMITER) {
            let found = match current {
                Some(Value::Object(members)) => members
                    .iter()
                    .find(|(name, _)| SnapshotKey::from(name.as_str()) == SnapshotKey::from(segment))
                    .map(|(name, value)| (name.as_str(), value)),
                Some(Value::Array(elements)) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| elements.get(index))
                    .map(|value| (segment, value)),
                _ => None,
            };

            match found {
                Some((name, value)) => {
                    path.push(name);
                    current = Some(value);
                }
                None => {
                    path.push(segment);
                    current = None;
                }
            }
        }

        path.join(KEY_DELIMITER)
    }
}

struct Inner {
    current: ArcSwap<Resolved>,
    lookup_sources: HashSet<LookupSource>,
    events: Option<broadcast::Sender<ConfigChangeEvent>>,
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A generic configuration object.
///
/// This represents the merged configuration derived from [`ConfigurationLoader`]. Values can be queried by key, and
/// can be extracted either as typed values or in their raw string form.
///
/// Keys must be in the form of `a.b.c`, where periods (`.`) are used to indicate a nested value, and are matched
/// without regard to case.
///
/// Every value is stored as a string. Typed extraction converts strings to booleans and numbers where the target type
/// requires it, so `"true"` can be read as a `bool` and `"8080"` as a `u16`.
///
/// Using an example JSON configuration:
///
/// ```json
/// {
///   "a": {
///     "b": {
///       "c": "value"
///     }
///   }
/// }
/// ```
///
/// Querying for the value of `a.b.c` would return `"value"`, and querying for `a.b` would return the nested object `{
/// "c": "value" }`.
#[derive(Clone)]
pub struct GenericConfiguration {
    inner: Arc<Inner>,
}

impl GenericConfiguration {
    fn new(
        resolved: Resolved, lookup_sources: HashSet<LookupSource>, events: Option<broadcast::Sender<ConfigChangeEvent>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: ArcSwap::from_pointee(resolved),
                lookup_sources,
                events,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn get<'a, T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        let current = self.inner.current.load();
        let path = current.resolve_path(key);
        current
            .figment
            .extract_inner_lossy(&path)
            .map_err(|e| from_figment_error(&self.inner.lookup_sources, e))
    }

    /// Gets the raw value for a key.
    ///
    /// Returns `None` if the key does not exist, or if it exists without a value.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.inner
            .current
            .load()
            .snapshot
            .get(key)
            .flatten()
            .map(str::to_string)
    }

    /// Returns the current merged snapshot of every source.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.current.load().snapshot)
    }

    /// Gets a configuration value by key.
    ///
    /// The key must be in the form of `a.b.c`, where periods (`.`) are used to indicate a nested lookup.
    ///
    /// ## Errors
    ///
    /// If the key does not exist in the configuration, or if the value could not be deserialized into `T`, an error
    /// variant will be returned.
    pub fn get_typed<'a, T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.get(key)
    }

    /// Gets a configuration value by key, or the default value if a key does not exist or could not be deserialized.
    ///
    /// The `Default` implementation of `T` will be used both if the key could not be found, as well as for any error
    /// during deserialization. This effectively swallows any errors and should generally be used sparingly.
    ///
    /// The key must be in the form of `a.b.c`, where periods (`.`) are used to indicate a nested lookup.
    pub fn get_typed_or_default<'a, T>(&self, key: &str) -> T
    where
        T: Default + Deserialize<'a>,
    {
        self.get(key).unwrap_or_default()
    }

    /// Gets a configuration value by key, if it exists.
    ///
    /// If the key exists in the configuration, and can be deserialized, `Ok(Some(value))` is returned. Otherwise,
    /// `Ok(None)` will be returned.
    ///
    /// The key must be in the form of `a.b.c`, where periods (`.`) are used to indicate a nested lookup.
    ///
    /// ## Errors
    ///
    /// If the value could not be deserialized into `T`, an error will be returned.
    pub fn try_get_typed<'a, T>(&self, key: &str) -> Result<Option<T>, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigurationError::MissingField { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Attempts to deserialize the entire configuration as `T`.
    ///
    /// ## Errors
    ///
    /// If the value could not be deserialized into `T`, an error will be returned.
    pub fn as_typed<'a, T>(&self) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.inner
            .current
            .load()
            .figment
            .extract_lossy()
            .map_err(|e| from_figment_error(&self.inner.lookup_sources, e))
    }

    /// Subscribes for updates to the configuration.
    ///
    /// Returns `None` if no refreshing providers were added, as the configuration can then never change.
    pub fn subscribe_for_updates(&self) -> Option<broadcast::Receiver<ConfigChangeEvent>> {
        self.inner.events.as_ref().map(|events| events.subscribe())
    }

    /// Creates a watcher for changes to a single key.
    pub fn watch_for_updates(&self, key: &str) -> FieldUpdateWatcher {
        FieldUpdateWatcher::new(key, self.subscribe_for_updates())
    }
}

impl fmt::Debug for GenericConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericConfiguration")
            .field("keys", &self.inner.current.load().snapshot.len())
            .field("dynamic", &self.inner.events.is_some())
            .finish()
    }
}

fn from_figment_error(lookup_sources: &HashSet<LookupSource>, e: figment::Error) -> ConfigurationError {
    match e.kind {
        Kind::MissingField(field) => {
            let mut valid_keys = lookup_sources
                .iter()
                .map(|source| source.transform_key(&field))
                .collect::<Vec<_>>();

            // Always specify the original key as a valid key to try.
            valid_keys.insert(0, field.to_string());

            let help_text = format!("Try setting `{}`.", valid_keys.join("` or `"));

            ConfigurationError::MissingField { help_text, field }
        }
        Kind::InvalidType(actual_ty, expected_ty) => ConfigurationError::InvalidFieldType {
            field: e.path.join("."),
            expected_ty,
            actual_ty: actual_ty.to_string(),
        },
        _ => ConfigurationError::Generic { source: e.into() },
    }
}
