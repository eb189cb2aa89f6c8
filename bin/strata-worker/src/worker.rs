use std::{collections::HashMap, time::Duration};

use serde::Deserialize;
use strata_config::{dynamic::ConfigChangeEvent, GenericConfiguration};
use tokio::{
    sync::broadcast::error::RecvError,
    time::{interval_at, Instant},
};
use tracing::{debug, info, warn};

const PING_INTERVAL: Duration = Duration::from_secs(2);

/// Settings bound from the `WorkerSettings` section.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WorkerSettings {
    pub prop1: Option<String>,
    pub is_enabled: bool,
    pub nested_settings: NestedSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NestedSettings {
    pub prop2: Option<String>,
    pub array_prop: Vec<i64>,
    pub dic_prop: HashMap<String, String>,
}

/// Logs the worker settings every couple of seconds, both as raw values and as bound settings.
pub async fn run_worker(config: GenericConfiguration) {
    info!("Starting worker.");

    let mut ping = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    loop {
        ping.tick().await;

        let settings = match config.try_get_typed::<WorkerSettings>("WorkerSettings") {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to bind worker settings.");
                WorkerSettings::default()
            }
        };

        info!(
            configuration.is_enabled = ?config.get_raw("WorkerSettings.IsEnabled"),
            settings.is_enabled = settings.is_enabled,
            configuration.prop2 = ?config.get_raw("WorkerSettings.NestedSettings.Prop2"),
            settings.prop2 = ?settings.nested_settings.prop2,
            "Timer ping."
        );
        debug!(
            prop1 = ?settings.prop1,
            array_prop = ?settings.nested_settings.array_prop,
            dic_prop = ?settings.nested_settings.dic_prop,
            "Current worker settings."
        );
    }
}

/// Logs every configuration change until the configuration stops changing.
pub async fn log_changes(config: GenericConfiguration) {
    let Some(mut changes) = config.subscribe_for_updates() else {
        debug!("No refreshing providers configured. Configuration will not change.");
        return;
    };

    loop {
        match changes.recv().await {
            Ok(ConfigChangeEvent::Added { key, value }) => info!(%key, ?value, "Configuration key added."),
            Ok(ConfigChangeEvent::Modified {
                key,
                old_value,
                new_value,
            }) => info!(%key, ?old_value, ?new_value, "Configuration key modified."),
            Ok(ConfigChangeEvent::Removed { key, old_value }) => {
                info!(%key, ?old_value, "Configuration key removed.")
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed configuration changes."),
            Err(RecvError::Closed) => break,
        }
    }
}
