use std::{path::Path, sync::Arc};

use figment::{
    providers::{Data, Env, Yaml},
    Profile, Provider as _,
};
use snafu::ResultExt as _;
use tracing::debug;

use crate::{
    flatten,
    refresh::RefreshingProvider,
    snapshot::{Snapshot, KEY_DELIMITER},
    ConfigurationError, InvalidDocument, ReadFile,
};

/// A single source in the layered configuration.
#[derive(Clone)]
pub(crate) enum Layer {
    /// Data read once while the loader was being built.
    Static { name: String, snapshot: Arc<Snapshot> },

    /// Data owned by a provider which may replace it at any time.
    Refreshing(Arc<dyn RefreshingProvider>),
}

impl Layer {
    pub(crate) fn from_json<P>(path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let document = std::fs::read(path).context(ReadFile { path })?;
        let snapshot = flatten::parse(&document).context(InvalidDocument { path })?;

        Ok(Self::from_snapshot(format!("JSON file {}", path.display()), snapshot))
    }

    pub(crate) fn from_yaml<P>(path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file_data = std::fs::read_to_string(path).context(ReadFile { path })?;

        let mut data = Data::<Yaml>::string(&file_data)
            .data()
            .map_err(|e| ConfigurationError::Generic { source: e.into() })?;
        let dict = data.remove(&Profile::Default).unwrap_or_default();
        let value = serde_json::to_value(dict).map_err(|e| ConfigurationError::Generic { source: e.into() })?;
        let snapshot = flatten::flatten_value(value).context(InvalidDocument { path })?;

        Ok(Self::from_snapshot(format!("YAML file {}", path.display()), snapshot))
    }

    /// Reads environment variables starting with `prefix`, which is stripped.
    ///
    /// A double underscore in the remaining name separates nested keys, so `APP_WORKER__NAME` with a prefix of `APP_`
    /// becomes `worker.name`.
    pub(crate) fn from_environment(prefix: &str) -> Self {
        let snapshot = Env::prefixed(prefix)
            .split("__")
            .iter()
            .map(|(key, value)| (key.as_str().to_string(), Some(value)))
            .collect::<Snapshot>();

        Self::from_snapshot(format!("environment variables {}*", prefix), snapshot)
    }

    pub(crate) fn from_command_line<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let snapshot = parse_command_line(args.into_iter().map(Into::into));
        Self::from_snapshot("command line".to_string(), snapshot)
    }

    pub(crate) fn from_snapshot(name: String, snapshot: Snapshot) -> Self {
        debug!(source = %name, keys = snapshot.len(), "Loaded configuration source.");
        Self::Static {
            name,
            snapshot: Arc::new(snapshot),
        }
    }

    pub(crate) fn name(&self) -> String {
        match self {
            Self::Static { name, .. } => name.clone(),
            Self::Refreshing(provider) => provider.metadata().name.to_string(),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<Snapshot> {
        match self {
            Self::Static { snapshot, .. } => Arc::clone(snapshot),
            Self::Refreshing(provider) => provider.snapshot(),
        }
    }
}

/// Merges layers in order, with later layers taking precedence.
///
/// Keys keep the spelling of the first layer that introduced them.
pub(crate) fn merge_layers(layers: &[Layer]) -> Snapshot {
    let mut merged = Snapshot::new();
    for layer in layers {
        for (key, value) in layer.snapshot().iter() {
            merged.insert(key, value.map(str::to_string));
        }
    }
    merged
}

/// Parses command-line overrides.
///
/// Accepted forms are `key=value`, `--key=value`, `--key value`, `/key=value` and `/key value`. An argument naming a
/// key with no value following it is ignored, as is any other argument.
fn parse_command_line<I>(args: I) -> Snapshot
where
    I: Iterator<Item = String>,
{
    let mut snapshot = Snapshot::new();
    let mut args = args.peekable();

    while let Some(arg) = args.next() {
        let (prefixed, rest) = match arg.strip_prefix("--").or_else(|| arg.strip_prefix('/')) {
            Some(rest) => (true, rest),
            None => (false, arg.as_str()),
        };

        let (key, value) = match rest.split_once('=') {
            Some((key, value)) => (key, value.to_string()),
            None if prefixed => match args.next_if(|next| !next.starts_with("--")) {
                Some(value) => (rest, value),
                None => continue,
            },
            None => continue,
        };

        let key = normalize_key(key);
        if key.is_empty() {
            continue;
        }
        snapshot.insert(key, Some(value));
    }

    snapshot
}

fn normalize_key(key: &str) -> String {
    key.trim().replace(':', KEY_DELIMITER)
}
