//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The login password comes from API_PASSWORD only and is never read from
//! the TOML file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use api_client::{ClientConfig, EntityReference, ErrorNormalizer, ExemptionSet};
use common::Secret;
use serde::Deserialize;
use session_auth::DEFAULT_BASE_URL;

const DEFAULT_CONFIG_FILE: &str = "session-cli.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub errors: ErrorsSection,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
}

/// API connection settings
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
    /// Paths that never carry a credential, on top of the auth endpoints
    #[serde(default)]
    pub extra_exempt_paths: Vec<String>,
}

/// Where the credential pair is persisted between runs
#[derive(Debug, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_session_path")]
    pub path: PathBuf,
}

/// Vocabulary used when formatting nested error objects
#[derive(Debug, Deserialize)]
pub struct ErrorsSection {
    #[serde(default = "default_entity_label")]
    pub entity_label: String,
    #[serde(default = "default_entity_key")]
    pub entity_key: String,
    #[serde(default = "default_entity_id_key")]
    pub entity_id_key: String,
    #[serde(default = "default_validation_keys")]
    pub validation_keys: Vec<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_refresh_timeout() -> u64 {
    5
}

fn default_session_path() -> PathBuf {
    PathBuf::from("session.json")
}

fn default_entity_label() -> String {
    "Entity".into()
}

fn default_entity_key() -> String {
    "entity".into()
}

fn default_entity_id_key() -> String {
    "entity_id".into()
}

fn default_validation_keys() -> Vec<String> {
    vec!["details".into()]
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            refresh_timeout_secs: default_refresh_timeout(),
            extra_exempt_paths: Vec::new(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            path: default_session_path(),
        }
    }
}

impl Default for ErrorsSection {
    fn default() -> Self {
        Self {
            entity_label: default_entity_label(),
            entity_key: default_entity_key(),
            entity_id_key: default_entity_id_key(),
            validation_keys: default_validation_keys(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse, overlay `API_BASE_URL` / `API_PASSWORD`, and validate.
    pub fn from_toml(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Ok(url) = std::env::var("API_BASE_URL") {
            config.client.base_url = url;
        }
        if let Some(password) = std::env::var("API_PASSWORD").ok().filter(|p| !p.is_empty()) {
            config.password = Some(Secret::new(password));
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let url = &self.client.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(common::Error::invalid(
                "client.base_url",
                format!("must start with http:// or https://, got: {url}"),
            ));
        }
        if self.client.timeout_secs == 0 {
            return Err(common::Error::invalid(
                "client.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.client.refresh_timeout_secs == 0 {
            return Err(common::Error::invalid(
                "client.refresh_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.session.path.as_os_str().is_empty() {
            return Err(common::Error::invalid("session.path", "must not be empty"));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// The flag tells whether the path was asked for explicitly; only the
    /// implicit default may be missing.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_FILE), false)
    }

    pub fn client_config(&self) -> ClientConfig {
        let errors = &self.errors;
        ClientConfig {
            base_url: self.client.base_url.clone(),
            timeout: Duration::from_secs(self.client.timeout_secs),
            refresh_timeout: Duration::from_secs(self.client.refresh_timeout_secs),
            exemptions: ExemptionSet::with_extra(self.client.extra_exempt_paths.iter().cloned()),
            normalizer: ErrorNormalizer::new(
                Arc::new(EntityReference::new(
                    errors.entity_label.clone(),
                    errors.entity_key.clone(),
                    errors.entity_id_key.clone(),
                )),
                errors.validation_keys.clone(),
            ),
        }
    }
}
