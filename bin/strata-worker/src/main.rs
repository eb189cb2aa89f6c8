//! A worker whose settings are layered from local files, the environment, the command line, a settings database and a
//! remote JSON document, and refreshed while it runs.
#![deny(warnings)]
#![deny(missing_docs)]

use std::sync::Arc;

use clap::Parser as _;
use strata_config::{
    sources::{
        blob::{RemoteDocumentConfiguration, RemoteDocumentProvider},
        sql::{RelationalSettingsConfiguration, RelationalSettingsProvider},
    },
    ConfigurationError, ConfigurationLoader, GenericConfiguration, GenericError,
};
use tokio::select;
use tracing::{error, info};

mod config;
use self::config::Cli;

mod logging;
use self::logging::{fatal_and_exit, initialize_logging};

mod worker;
use self::worker::{log_changes, run_worker};

const RELATIONAL_SETTINGS_KEY: &str = "RelationalSettings";
const REMOTE_DOCUMENT_KEY: &str = "RemoteDocument";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(cli.log_level()) {
        fatal_and_exit(format!("failed to initialize logging: {}", e));
    }

    match run(cli).await {
        Ok(()) => info!("strata-worker stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<(), GenericError> {
    let mut loader = ConfigurationLoader::default()
        .from_json(cli.settings_path())?
        .try_from_json(cli.environment_settings_path())
        .from_environment("STRATA")?
        .from_command_line(cli.overrides.iter().cloned());

    let bootstrap_config = loader.bootstrap_generic();
    let mut providers = Providers::default();

    match RelationalSettingsConfiguration::from_configuration(&bootstrap_config, RELATIONAL_SETTINGS_KEY) {
        Ok(settings_config) => {
            let provider = Arc::new(RelationalSettingsProvider::new(settings_config));
            provider.load().await?;
            loader = loader.with_refreshing_provider(provider.clone());
            providers.relational = Some(provider);
        }
        Err(ConfigurationError::MissingField { .. }) => {
            info!("No relational settings configured. Skipping settings database.")
        }
        Err(e) => return Err(e.into()),
    }

    match RemoteDocumentConfiguration::from_configuration(&bootstrap_config, REMOTE_DOCUMENT_KEY) {
        Ok(document_config) => {
            let document_config = document_config.with_on_load(|| info!("Remote settings document reloaded."));
            let provider = Arc::new(RemoteDocumentProvider::new(document_config));
            provider.load().await?;
            loader = loader.with_refreshing_provider(provider.clone());
            providers.remote_document = Some(provider);
        }
        Err(ConfigurationError::MissingField { .. }) => {
            info!("No remote document configured. Skipping remote settings.")
        }
        Err(e) => return Err(e.into()),
    }

    let config = loader.into_generic();
    info!(environment = %cli.environment, "Configuration loaded.");

    tokio::spawn(log_changes(config.clone()));

    let result = run_until_interrupted(config).await;
    providers.dispose();
    result
}

async fn run_until_interrupted(config: GenericConfiguration) -> Result<(), GenericError> {
    select! {
        _ = run_worker(config) => Ok(()),
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received SIGINT, shutting down...");
            Ok(())
        }
    }
}

#[derive(Default)]
struct Providers {
    relational: Option<Arc<RelationalSettingsProvider>>,
    remote_document: Option<Arc<RemoteDocumentProvider>>,
}

impl Providers {
    fn dispose(&self) {
        if let Some(provider) = &self.relational {
            provider.dispose();
        }
        if let Some(provider) = &self.remote_document {
            provider.dispose();
        }
    }
}
