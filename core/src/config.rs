//! Client configuration.
//!
//! # Design
//! `ClientConfig` is plain serde data so it can come from code, a file, or the
//! environment. `load` layers an optional file under `TRANSIT__*` environment
//! overrides (e.g. `TRANSIT__BASE_URL`, `TRANSIT__MAX_CONCURRENT`); every
//! field except `base_url` has a default matching the production app.

use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::info;

use crate::error::ClientError;

const ENV_PREFIX: &str = "TRANSIT";

/// Everything the request builder needs to talk to the REST API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the primary (OneBusAway REST) API.
    pub base_url: String,

    /// Base URL of the secondary (snake_case, ISO-8601) API, if any.
    #[serde(default)]
    pub secondary_base_url: Option<String>,

    #[serde(default = "default_api_key")]
    pub api_key: String,

    #[serde(default = "default_app_uid")]
    pub app_uid: String,

    #[serde(default = "default_app_version")]
    pub app_version: String,

    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,

    /// Ceiling on operations in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// The fixed query parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub api_key: String,
    pub app_uid: String,
    pub app_version: String,
    pub protocol_version: u32,
}

impl ClientConfig {
    /// Defaults for everything but the base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            secondary_base_url: None,
            api_key: default_api_key(),
            app_uid: default_app_uid(),
            app_version: default_app_version(),
            protocol_version: default_protocol_version(),
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Load from an optional file, then apply `TRANSIT__*` environment overrides.
    ///
    /// The file format follows its extension (TOML, JSON, YAML, ...). Without
    /// a file, `TRANSIT__BASE_URL` must be set.
    pub fn load(path: Option<&Path>) -> Result<Self, ClientError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("loading client config from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()?;
        Ok(config)
    }

    pub fn with_secondary_base_url(mut self, url: &str) -> Self {
        self.secondary_base_url = Some(url.to_string());
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn identity(&self) -> AppIdentity {
        AppIdentity {
            api_key: self.api_key.clone(),
            app_uid: self.app_uid.clone(),
            app_version: self.app_version.clone(),
            protocol_version: self.protocol_version,
        }
    }
}

fn default_api_key() -> String {
    "org.onebusaway.iphone".to_string()
}

fn default_app_uid() -> String {
    "BD88D98C-A72D-47BE-8F4A-C60467239736".to_string()
}

fn default_app_version() -> String {
    "20181001.23".to_string()
}

fn default_protocol_version() -> u32 {
    2
}

fn default_max_concurrent() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30
}
