//! Shared lifecycle for providers that poll a backing store.
//!
//! A refreshing provider performs its first fetch synchronously during `load`, then hands its fetch state to a
//! dedicated background task that re-runs the fetch on a fixed interval until the provider is disposed. The task runs
//! one refresh at a time, so a refresh never overlaps with the next one for the same provider, and all fetch state
//! (timestamps, previously applied settings) is owned by that task alone.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use figment::{
    providers::Serialized,
    value::{Dict, Map},
    Profile, Provider as _,
};
use tokio::{
    select,
    sync::broadcast,
    time::{interval_at, timeout, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{errors::FetchError, flatten::unflatten, snapshot::Snapshot};

/// Upper bound on a single fetch, including the first one performed during `load`.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

const RELOAD_CHANNEL_CAPACITY: usize = 16;

/// Callback invoked after a provider replaces its snapshot.
pub type OnLoad = Arc<dyn Fn() + Send + Sync>;

/// Notification sent after a provider applies a changed snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReloadEvent;

/// Result of a single successful refresh.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RefreshOutcome {
    /// The backing store had nothing new; the snapshot was left untouched.
    Unchanged,

    /// A new snapshot was applied.
    Applied,
}

/// A configuration provider whose data can change after it has been loaded.
pub trait RefreshingProvider: figment::Provider + Send + Sync {
    /// Returns the current snapshot.
    fn snapshot(&self) -> Arc<Snapshot>;

    /// Subscribes to reload notifications.
    ///
    /// A notification is sent each time a refresh applies a changed snapshot. The first load never sends one.
    fn subscribe(&self) -> broadcast::Receiver<ReloadEvent>;
}

/// The published state of a provider: its current snapshot and the channel used to announce replacements.
#[derive(Clone)]
pub(crate) struct SharedSnapshot {
    current: Arc<ArcSwap<Snapshot>>,
    reloads: broadcast::Sender<ReloadEvent>,
}

impl SharedSnapshot {
    pub(crate) fn new() -> Self {
        let (reloads, _) = broadcast::channel(RELOAD_CHANNEL_CAPACITY);
        Self {
            current: Arc::new(ArcSwap::from_pointee(Snapshot::new())),
            reloads,
        }
    }

    pub(crate) fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub(crate) fn store(&self, snapshot: Snapshot) {
        self.current.store(Arc::new(snapshot));
    }

    pub(crate) fn notify(&self) {
        // No subscribers is the common case before the layered configuration is built.
        let _ = self.reloads.send(ReloadEvent);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.reloads.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.reloads.receiver_count()
    }

    /// Renders the current snapshot as nested figment data under the default profile.
    pub(crate) fn figment_data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Serialized::defaults(unflatten(&self.load())).data()
    }
}

/// Fetch state owned by a provider's refresh task.
#[async_trait]
pub(crate) trait Refresher: Send + 'static {
    /// Name used in log output.
    fn name(&self) -> &str;

    /// Fetches from the backing store and applies any change.
    ///
    /// `initial` is `true` only for the synchronous fetch performed during `load`.
    async fn refresh(&mut self, initial: bool) -> Result<RefreshOutcome, FetchError>;
}

/// Load state and shutdown signal shared by every refreshing provider.
pub(crate) struct Lifecycle {
    loaded: AtomicBool,
    shutdown: CancellationToken,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            loaded: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Marks the provider as loaded, returning `false` if it was already loaded or has been disposed.
    pub(crate) fn begin_load(&self, name: &str) -> bool {
        if self.shutdown.is_cancelled() {
            warn!(provider = name, "Provider has been disposed. Ignoring load request.");
            return false;
        }
        if self.loaded.swap(true, Ordering::AcqRel) {
            debug!(provider = name, "Provider already loaded. Ignoring load request.");
            return false;
        }
        true
    }

    /// Runs the first refresh, then, if an interval is given, spawns the background task that keeps refreshing.
    pub(crate) async fn start<R>(&self, mut refresher: R, refresh_interval: Option<Duration>)
    where
        R: Refresher,
    {
        run_refresh(&mut refresher, true).await;

        let Some(refresh_interval) = refresh_interval else {
            debug!(provider = refresher.name(), "No refresh interval configured. Provider will not poll.");
            return;
        };

        if self.shutdown.is_cancelled() {
            return;
        }

        let shutdown = self.shutdown.clone();
        tokio::spawn(run_refresh_loop(refresher, refresh_interval, shutdown));
    }

    /// Stops future refreshes.
    ///
    /// A refresh already in flight is allowed to finish. Calling this more than once has no further effect.
    pub(crate) fn dispose(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_refresh_loop<R>(mut refresher: R, refresh_interval: Duration, shutdown: CancellationToken)
where
    R: Refresher,
{
    let mut ticker = interval_at(Instant::now() + refresh_interval, refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(provider = refresher.name(), interval_secs = refresh_interval.as_secs(), "Refresh task started.");

    loop {
        select! {
            biased;

            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        run_refresh(&mut refresher, false).await;
    }

    debug!(provider = refresher.name(), "Refresh task stopped.");
}

async fn run_refresh<R>(refresher: &mut R, initial: bool) -> Option<RefreshOutcome>
where
    R: Refresher,
{
    let result = match timeout(FETCH_TIMEOUT, refresher.refresh(initial)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            timeout_secs: FETCH_TIMEOUT.as_secs(),
        }),
    };

    match result {
        Ok(RefreshOutcome::Applied) => {
            info!(provider = refresher.name(), initial, "Applied configuration from backing store.");
            Some(RefreshOutcome::Applied)
        }
        Ok(RefreshOutcome::Unchanged) => {
            debug!(provider = refresher.name(), "Configuration unchanged.");
            Some(RefreshOutcome::Unchanged)
        }
        Err(e) => {
            warn!(provider = refresher.name(), initial, error = %e, "Failed to refresh configuration. Keeping last applied configuration.");
            None
        }
    }
}
