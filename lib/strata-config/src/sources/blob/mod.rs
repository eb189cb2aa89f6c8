//! Configuration from a JSON document in a blob store.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use figment::{
    value::{Dict, Map},
    Metadata, Profile, Source,
};
use serde::Deserialize;
use snafu::{ensure, OptionExt as _, ResultExt as _};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    change::is_newer,
    errors::{Format, FetchError, Store},
    flatten,
    refresh::{Lifecycle, OnLoad, RefreshOutcome, Refresher, RefreshingProvider, ReloadEvent, SharedSnapshot},
    snapshot::Snapshot,
    ConfigurationError, GenericConfiguration, InvalidConnectionString, InvalidDocumentPath, MissingConnectionString,
    MissingDocumentPath, RefreshIntervalTooShort,
};

mod client;
pub use self::client::{
    BlobClient, BlobConnector, BlobLocation, BlobProperties, DefaultBlobConnector, FileBlobClient, HttpBlobClient,
};

const PROVIDER_NAME: &str = "remote_document";

/// Shortest refresh interval accepted by [`RemoteDocumentProvider`].
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Remote document provider configuration.
#[derive(Clone, Deserialize)]
pub struct RemoteDocumentConfiguration {
    /// Connection string for the blob store.
    ///
    /// See [`DefaultBlobConnector`] for the supported forms.
    #[serde(default)]
    connection_string: String,

    /// Path to the document, in the form `container/path/to/file.json`.
    #[serde(default)]
    blob_path: String,

    /// Interval between checks for a modified document, in seconds.
    ///
    /// Must be at least 10 seconds.
    #[serde(default)]
    refresh_interval_secs: u64,

    #[serde(skip)]
    on_load: Option<OnLoad>,
}

impl RemoteDocumentConfiguration {
    /// Creates a new `RemoteDocumentConfiguration` for the given store and document path.
    pub fn new<C, P>(connection_string: C, blob_path: P, refresh_interval: Duration) -> Self
    where
        C: Into<String>,
        P: Into<String>,
    {
        Self {
            connection_string: connection_string.into(),
            blob_path: blob_path.into(),
            refresh_interval_secs: refresh_interval.as_secs(),
            on_load: None,
        }
    }

    /// Creates a new `RemoteDocumentConfiguration` from the section at `key` in the given configuration.
    ///
    /// # Errors
    ///
    /// If the section cannot be deserialized, an error will be returned.
    pub fn from_configuration(config: &GenericConfiguration, key: &str) -> Result<Self, ConfigurationError> {
        config.get_typed(key)
    }

    /// Sets a callback to run each time a downloaded document replaces the current snapshot.
    pub fn with_on_load<F>(mut self, on_load: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_load = Some(Arc::new(on_load));
        self
    }

    /// Returns the refresh interval.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    fn validate(&self) -> Result<BlobLocation, ConfigurationError> {
        ensure!(
            !self.connection_string.trim().is_empty(),
            MissingConnectionString {
                provider: PROVIDER_NAME
            }
        );
        ensure!(!self.blob_path.trim().is_empty(), MissingDocumentPath);
        ensure!(
            self.refresh_interval() >= MIN_REFRESH_INTERVAL,
            RefreshIntervalTooShort {
                interval_secs: self.refresh_interval_secs,
                minimum_secs: MIN_REFRESH_INTERVAL.as_secs(),
            }
        );

        BlobLocation::parse(&self.blob_path).context(InvalidDocumentPath {
            path: self.blob_path.clone(),
        })
    }
}

/// A configuration provider backed by a JSON document in a blob store.
///
/// On [`load`][Self::load], the document is downloaded and flattened into a [`Snapshot`]. Afterwards, the document's
/// modification time is checked every refresh interval, and the document is only downloaded again when it is newer
/// than the last applied version. Each applied change sends a [`ReloadEvent`] to subscribers.
///
/// Fetch failures, including malformed documents, never escape the provider: they are logged and the last applied
/// snapshot remains in place until a later refresh succeeds.
pub struct RemoteDocumentProvider {
    config: RemoteDocumentConfiguration,
    connector: Arc<dyn BlobConnector>,
    shared: SharedSnapshot,
    lifecycle: Lifecycle,
}

impl RemoteDocumentProvider {
    /// Creates a new `RemoteDocumentProvider` using the [`DefaultBlobConnector`].
    pub fn new(config: RemoteDocumentConfiguration) -> Self {
        Self::with_connector(config, Arc::new(DefaultBlobConnector::default()))
    }

    /// Creates a new `RemoteDocumentProvider` that reaches its blob store through the given connector.
    pub fn with_connector(config: RemoteDocumentConfiguration, connector: Arc<dyn BlobConnector>) -> Self {
        Self {
            config,
            connector,
            shared: SharedSnapshot::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Loads the document and starts polling for changes.
    ///
    /// The first download completes before this returns. If it fails, the failure is logged, the provider keeps an
    /// empty snapshot, and the next refresh tries again.
    ///
    /// Calling `load` again after a successful call has no effect.
    ///
    /// # Errors
    ///
    /// If the connection string or document path is missing or malformed, or if the refresh interval is shorter than
    /// [`MIN_REFRESH_INTERVAL`], an error is returned and nothing is fetched.
    pub async fn load(&self) -> Result<(), ConfigurationError> {
        let location = self.config.validate()?;
        let client = self
            .connector
            .connect(&self.config.connection_string, &location)
            .context(InvalidConnectionString {
                provider: PROVIDER_NAME,
            })?;

        if !self.lifecycle.begin_load(PROVIDER_NAME) {
            return Ok(());
        }

        debug!(container = %location.container, blob = %location.blob_name, "Loading remote configuration document.");

        let refresher = DocumentRefresher {
            client,
            last_modified: None,
            shared: self.shared.clone(),
            on_load: self.config.on_load.clone(),
        };
        self.lifecycle
            .start(refresher, Some(self.config.refresh_interval()))
            .await;

        Ok(())
    }

    /// Stops polling for changes.
    ///
    /// The current snapshot stays readable. Calling this more than once has no further effect.
    pub fn dispose(&self) {
        self.lifecycle.dispose();
    }
}

impl RefreshingProvider for RemoteDocumentProvider {
    fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.load()
    }

    fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.shared.subscribe()
    }
}

impl figment::Provider for RemoteDocumentProvider {
    fn metadata(&self) -> Metadata {
        Metadata::from("Remote JSON document", Source::Custom(self.config.blob_path.clone()))
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        self.shared.figment_data()
    }
}

struct DocumentRefresher {
    client: Arc<dyn BlobClient>,
    last_modified: Option<DateTime<Utc>>,
    shared: SharedSnapshot,
    on_load: Option<OnLoad>,
}

#[async_trait]
impl Refresher for DocumentRefresher {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn refresh(&mut self, initial: bool) -> Result<RefreshOutcome, FetchError> {
        let properties = self.client.get_properties().await.context(Store)?;

        // The first load always downloads; afterwards, only a newer document is worth fetching.
        if !initial && !is_newer(self.last_modified, properties.last_modified) {
            debug!(last_modified = %properties.last_modified, "Remote configuration document not modified.");
            return Ok(RefreshOutcome::Unchanged);
        }

        let document = self.client.download().await.context(Store)?;
        let snapshot = flatten::parse(&document).context(Format)?;

        self.shared.store(snapshot);
        if let Some(on_load) = &self.on_load {
            on_load();
        }
        self.last_modified = Some(properties.last_modified);

        if !initial {
            self.shared.notify();
        }

        Ok(RefreshOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use anyhow::anyhow;
    use bytes::Bytes;
    use chrono::TimeZone as _;
    use tokio::time::timeout;

    use super::*;
    use crate::errors::GenericError;

    #[derive(Default)]
    struct InMemoryBlob {
        document: Mutex<(DateTime<Utc>, Bytes)>,
        fail: Mutex<bool>,
        property_calls: AtomicUsize,
        downloads: AtomicUsize,
    }

    impl InMemoryBlob {
        fn new(modified_secs: i64, document: &'static str) -> Arc<Self> {
            let blob = Self::default();
            blob.set(modified_secs, document);
            Arc::new(blob)
        }

        fn set(&self, modified_secs: i64, document: &'static str) {
            let modified = Utc.timestamp_opt(modified_secs, 0).unwrap();
            *self.document.lock().unwrap() = (modified, Bytes::from_static(document.as_bytes()));
        }

        fn set_failing(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }

        fn downloads(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BlobClient for InMemoryBlob {
        async fn get_properties(&self) -> Result<BlobProperties, GenericError> {
            self.property_calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                return Err(anyhow!("connection reset"));
            }
            Ok(BlobProperties {
                last_modified: self.document.lock().unwrap().0,
            })
        }

        async fn download(&self) -> Result<Bytes, GenericError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.document.lock().unwrap().1.clone())
        }
    }

    struct InMemoryConnector {
        blob: Arc<InMemoryBlob>,
        connects: AtomicUsize,
    }

    impl BlobConnector for InMemoryConnector {
        fn connect(&self, _: &str, _: &BlobLocation) -> Result<Arc<dyn BlobClient>, GenericError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(self.blob.clone())
        }
    }

    fn build(
        blob: &Arc<InMemoryBlob>, config: RemoteDocumentConfiguration,
    ) -> (RemoteDocumentProvider, Arc<InMemoryConnector>) {
        let connector = Arc::new(InMemoryConnector {
            blob: Arc::clone(blob),
            connects: AtomicUsize::new(0),
        });
        let provider = RemoteDocumentProvider::with_connector(config, connector.clone());
        (provider, connector)
    }

    fn config(refresh_secs: u64) -> RemoteDocumentConfiguration {
        RemoteDocumentConfiguration::new(
            "memory",
            "content/Config/WorkerSettings.json",
            Duration::from_secs(refresh_secs),
        )
    }

    const INTERVAL: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn load_rejects_path_without_extension() {
        let blob = InMemoryBlob::new(1, "{}");
        let config = RemoteDocumentConfiguration::new("memory", "container/file", INTERVAL);
        let (provider, connector) = build(&blob, config);

        let error = provider.load().await.unwrap_err();
        assert!(matches!(error, ConfigurationError::InvalidDocumentPath { .. }));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert_eq!(blob.property_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn load_rejects_missing_settings() {
        let blob = InMemoryBlob::new(1, "{}");

        let (provider, _) = build(&blob, RemoteDocumentConfiguration::new(" ", "c/f.json", INTERVAL));
        assert!(matches!(
            provider.load().await.unwrap_err(),
            ConfigurationError::MissingConnectionString { .. }
        ));

        let (provider, _) = build(&blob, RemoteDocumentConfiguration::new("memory", "", INTERVAL));
        assert!(matches!(
            provider.load().await.unwrap_err(),
            ConfigurationError::MissingDocumentPath
        ));
        assert_eq!(blob.downloads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn load_enforces_minimum_refresh_interval() {
        let blob = InMemoryBlob::new(1, r#"{"a": "b"}"#);

        let (short, _) = build(&blob, config(5));
        assert!(matches!(
            short.load().await.unwrap_err(),
            ConfigurationError::RefreshIntervalTooShort {
                interval_secs: 5,
                minimum_secs: 10
            }
        ));
        assert_eq!(blob.downloads(), 0);

        let (ok, _) = build(&blob, config(10));
        ok.load().await.unwrap();
        assert_eq!(ok.snapshot().get("a"), Some(Some("b")));
        ok.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn load_reports_invalid_connection_string() {
        let config = RemoteDocumentConfiguration::new("https://", "content/settings.json", INTERVAL);
        let provider = RemoteDocumentProvider::new(config);

        assert!(matches!(
            provider.load().await.unwrap_err(),
            ConfigurationError::InvalidConnectionString { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn load_runs_hook_without_notifying() {
        let blob = InMemoryBlob::new(1, r#"{"WorkerSettings": {"IsEnabled": true}}"#);
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let hook_counter = Arc::clone(&hook_calls);
        let config = config(10).with_on_load(move || {
            hook_counter.fetch_add(1, Ordering::SeqCst);
        });

        let (provider, _) = build(&blob, config);
        let mut reloads = provider.subscribe();
        provider.load().await.unwrap();

        assert_eq!(provider.snapshot().get("workersettings.isenabled"), Some(Some("true")));
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
        assert!(reloads.try_recv().is_err());
        provider.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_timestamp_skips_download_and_notification() {
        let blob = InMemoryBlob::new(1, r#"{"a": "1"}"#);
        let (provider, _) = build(&blob, config(10));
        let mut reloads = provider.subscribe();

        provider.load().await.unwrap();
        assert_eq!(blob.downloads(), 1);

        // Several ticks pass with the same modification time.
        assert!(timeout(INTERVAL * 5 + Duration::from_secs(1), reloads.recv()).await.is_err());
        assert!(blob.property_calls.load(Ordering::SeqCst) >= 5);
        assert_eq!(blob.downloads(), 1);
        provider.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn newer_document_is_applied_and_notified() {
        let blob = InMemoryBlob::new(1, r#"{"a": "1"}"#);
        let (provider, _) = build(&blob, config(10));
        let mut reloads = provider.subscribe();
        provider.load().await.unwrap();

        blob.set(2, r#"{"a": "2", "b": {}}"#);
        reloads.recv().await.unwrap();

        let snapshot = provider.snapshot();
        assert_eq!(snapshot.get("a"), Some(Some("2")));
        assert_eq!(snapshot.get("b"), Some(None));
        assert_eq!(blob.downloads(), 2);

        // The same timestamp again is not re-downloaded.
        assert!(timeout(INTERVAL * 3, reloads.recv()).await.is_err());
        assert_eq!(blob.downloads(), 2);
        provider.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_keeps_snapshot_and_retries() {
        let blob = InMemoryBlob::new(1, r#"{"a": "1"}"#);
        let (provider, _) = build(&blob, config(10));
        let mut reloads = provider.subscribe();
        provider.load().await.unwrap();
        let before = provider.snapshot();

        blob.set(2, r#"{"a": "2"}"#);
        blob.set_failing(true);
        tokio::time::sleep(INTERVAL * 2 + Duration::from_secs(1)).await;
        assert_eq!(*provider.snapshot(), *before);
        assert!(reloads.try_recv().is_err());

        blob.set_failing(false);
        reloads.recv().await.unwrap();
        assert_eq!(provider.snapshot().get("a"), Some(Some("2")));
        provider.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_document_keeps_snapshot_and_timestamp() {
        let blob = InMemoryBlob::new(1, r#"{"a": "1"}"#);
        let (provider, _) = build(&blob, config(10));
        let mut reloads = provider.subscribe();
        provider.load().await.unwrap();

        blob.set(2, r#"{"a": 1, "a": 2}"#);
        tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(provider.snapshot().get("a"), Some(Some("1")));

        // The timestamp was not advanced, so the next tick downloads again and picks up the fix.
        let downloads = blob.downloads();
        blob.set(2, r#"{"a": "3"}"#);
        reloads.recv().await.unwrap();
        assert_eq!(provider.snapshot().get("a"), Some(Some("3")));
        assert_eq!(blob.downloads(), downloads + 1);
        provider.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_initial_load_leaves_empty_snapshot() {
        let blob = InMemoryBlob::new(1, "[1, 2]");
        let (provider, _) = build(&blob, config(10));
        let mut reloads = provider.subscribe();

        provider.load().await.unwrap();
        assert!(provider.snapshot().is_empty());

        // Same timestamp, but nothing has been applied yet, so the next tick still downloads.
        blob.set(1, r#"{"a": "1"}"#);
        reloads.recv().await.unwrap();
        assert_eq!(provider.snapshot().get("a"), Some(Some("1")));
        provider.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_stops_polling() {
        let blob = InMemoryBlob::new(1, r#"{"a": "1"}"#);
        let (provider, _) = build(&blob, config(10));
        provider.load().await.unwrap();

        provider.dispose();
        provider.dispose();
        let calls = blob.property_calls.load(Ordering::SeqCst);

        blob.set(2, r#"{"a": "2"}"#);
        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(blob.property_calls.load(Ordering::SeqCst), calls);
        assert_eq!(provider.snapshot().get("a"), Some(Some("1")));

        // Loading a disposed provider does nothing.
        provider.load().await.unwrap();
        assert_eq!(blob.property_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn figment_data_reflects_current_snapshot() {
        let blob = InMemoryBlob::new(1, r#"{"worker": {"enabled": true}}"#);
        let (provider, _) = build(&blob, config(10));
        provider.load().await.unwrap();

        let value = figment::Figment::from(&provider)
            .extract_inner::<String>("worker.enabled")
            .unwrap();
        assert_eq!(value, "true");
        provider.dispose();
    }
}
