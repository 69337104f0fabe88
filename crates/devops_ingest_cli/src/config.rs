//! Configuration file support for devops-ingest.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `DEVOPS_INGEST_`, nested keys joined by `__`,
//!    e.g. `DEVOPS_INGEST_CREDENTIALS__PERSONAL_ACCESS_TOKEN`)
//! 3. A file passed with `--config`, else `./devops-ingest.toml`
//! 4. `~/.config/devops-ingest/config.toml`
//! 5. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [connector]
//! organization = "contoso"
//! project = "Fabrikam"
//! data_types = ["work_items", "commits", "wikis"]
//! page_size = 100
//!
//! [credentials]
//! personal_access_token = "..."  # or DEVOPS_INGEST_CREDENTIALS__PERSONAL_ACCESS_TOKEN
//!
//! [sync]
//! lookback_days = 30
//! checkpoint_path = "~/.local/state/devops-ingest/contoso-fabrikam.json"
//! ```

use std::path::{Path, PathBuf};

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use devops_ingest::{ConnectorConfig, Credentials};
use directories::ProjectDirs;
use serde::Deserialize;

const APP_NAME: &str = "devops-ingest";
const LOCAL_CONFIG: &str = "devops-ingest.toml";
const ENV_PREFIX: &str = "DEVOPS_INGEST";

/// Keys that accept a comma-separated list from the environment.
const LIST_KEYS: [&str; 3] = [
    "connector.data_types",
    "connector.work_item_types",
    "connector.repositories",
];

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Organization, project and tuning knobs, passed straight to the library.
    pub connector: ConnectorConfig,
    /// Personal access token. Kept out of `connector` so it never gets logged.
    pub credentials: Credentials,
    /// Driver options.
    pub sync: SyncConfig,
}

/// Options for the `sync` command.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Window length for the very first run, when no state file exists.
    pub lookback_days: i64,
    /// Where run state is kept between invocations.
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            checkpoint_path: None,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// A config that fails to parse is reported and replaced with defaults;
    /// the connector's own validation then names what is missing.
    pub fn load(explicit: Option<&Path>) -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = Self::default_config_path()
            && path.exists()
        {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        match explicit {
            Some(path) => {
                tracing::debug!("Loading config from {:?}", path);
                builder = builder.add_source(
                    File::from(path.to_path_buf())
                        .format(FileFormat::Toml)
                        .required(true),
                );
            }
            None => {
                let local = PathBuf::from(LOCAL_CONFIG);
                if local.exists() {
                    tracing::debug!("Loading config from ./{LOCAL_CONFIG}");
                    builder = builder
                        .add_source(File::from(local).format(FileFormat::Toml).required(false));
                }
            }
        }

        builder = builder.add_source(environment());

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/devops-ingest` or `~/.local/state/devops-ingest`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| {
            dirs.state_dir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }

    /// Where the sync command keeps run state for this organization/project.
    pub fn checkpoint_path(&self) -> Option<PathBuf> {
        self.sync.checkpoint_path.clone().or_else(|| {
            let name = format!(
                "{}-{}.json",
                sanitize(&self.connector.organization),
                sanitize(&self.connector.project)
            );
            Self::default_state_dir().map(|dir| dir.join(name))
        })
    }
}

fn environment() -> Environment {
    let mut env = Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .try_parsing(true);
    for key in LIST_KEYS {
        env = env.with_list_parse_key(key);
    }
    env
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
