//! Configuration types for crm-api.
//!
//! [`Config::load`] layers, lowest precedence first: the embedded defaults,
//! an optional TOML file, `CRM_*` environment variables (`__` separates
//! sections, e.g. `CRM_STORAGE__BACKEND=firestore`), and finally the
//! well-known variables `PORT`, `FIRESTORE_PROJECT_ID`, `FIRESTORE_DATABASE`,
//! `FIRESTORE_ACCESS_TOKEN` and `FIRESTORE_EMULATOR_HOST`.
//! [`Config::defaults`] returns the embedded defaults alone (useful in tests).

use crate::query::UpdatePolicy;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[server]
host = "0.0.0.0"
port = 3000

[storage]
backend    = "memory"
collection = "companies"

[storage.firestore]
project_id = ""
database   = "(default)"
base_url   = "https://firestore.googleapis.com"

[updates]
policy = "permissive"
"#;

/// Config file picked up from the working directory when no path is given.
pub const LOCAL_CONFIG_FILE: &str = "crm.toml";

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub updates: UpdatesConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: Backend,
    pub collection: String,
    pub firestore: FirestoreConfig,
}

/// Which [`CompanyStore`](crate::store::CompanyStore) implementation to serve from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Firestore,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "firestore" => Ok(Backend::Firestore),
            other => anyhow::bail!("unknown storage backend {other:?} (expected memory or firestore)"),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Memory => write!(f, "memory"),
            Backend::Firestore => write!(f, "firestore"),
        }
    }
}

/// `[storage.firestore]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub base_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// `[updates]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatesConfig {
    #[serde(default)]
    pub policy: UpdatePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load from the process environment, layered on the built-in defaults.
    ///
    /// `path` must exist when given. Without one, [`LOCAL_CONFIG_FILE`] is
    /// read if present. The result is not validated, so command-line
    /// overrides can still be applied; call [`Config::validate`] afterwards.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(path, std::env::vars().collect())
    }

    /// Same as [`Config::load`] with an explicit environment.
    pub fn load_with_env(path: Option<&Path>, env: HashMap<String, String>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name(LOCAL_CONFIG_FILE).required(false)),
        };

        let emulator_url = env
            .get("FIRESTORE_EMULATOR_HOST")
            .filter(|h| !h.is_empty())
            .map(|host| format!("http://{host}"));

        builder = builder
            .add_source(
                config::Environment::with_prefix("CRM")
                    .prefix_separator("_")
                    .separator("__")
                    .source(Some(env.clone())),
            )
            .set_override_option("server.port", env.get("PORT").cloned())?
            .set_override_option("storage.firestore.project_id", env.get("FIRESTORE_PROJECT_ID").cloned())?
            .set_override_option("storage.firestore.database", env.get("FIRESTORE_DATABASE").cloned())?
            .set_override_option(
                "storage.firestore.access_token",
                env.get("FIRESTORE_ACCESS_TOKEN").cloned(),
            )?
            .set_override_option("storage.firestore.base_url", emulator_url)?;

        builder
            .build()?
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Return the built-in defaults without reading files or the environment.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .expect("built-in default config must be valid TOML")
            .try_deserialize()
            .expect("built-in default config must deserialize correctly")
    }

    /// Reject combinations that cannot serve.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.collection.trim().is_empty() {
            anyhow::bail!("storage.collection must not be empty");
        }
        if self.storage.backend == Backend::Firestore
            && self.storage.firestore.project_id.trim().is_empty()
        {
            anyhow::bail!(
                "the firestore backend needs a project id (FIRESTORE_PROJECT_ID or storage.firestore.project_id)"
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
