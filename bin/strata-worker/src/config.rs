use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(about)]
pub struct Cli {
    /// Enable verbose output. (Specify twice for more verbosity.)
    #[arg(short = 'v', long, action = ArgAction::Count, default_value_t = 0)]
    verbose: u8,

    /// Directory holding `appsettings.json` and its environment-specific variants.
    #[arg(long, default_value = ".")]
    pub content_root: PathBuf,

    /// Hosting environment name, used to select `appsettings.{environment}.json`.
    #[arg(long, env = "STRATA_ENVIRONMENT", default_value = "Production")]
    pub environment: String,

    /// Configuration overrides, as `--key=value` or `--key value`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub overrides: Vec<String>,
}

impl Cli {
    /// Gets the configured log level based on the user-supplied verbosity level.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Path to the base settings file.
    pub fn settings_path(&self) -> PathBuf {
        self.content_root.join("appsettings.json")
    }

    /// Path to the environment-specific settings file.
    pub fn environment_settings_path(&self) -> PathBuf {
        self.content_root
            .join(format!("appsettings.{}.json", self.environment))
    }
}
