//! Harness configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::poll::PollOptions;

/// Environment variable holding the application URL
pub const BASE_URL_VAR: &str = "BASE_URL";

/// Environment variable holding the API token
pub const AUTH_TOKEN_VAR: &str = "AUTH_TOKEN";

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root URL of the application under test, e.g. `https://staging.opensupplyhub.org`
    pub base_url: String,

    /// API token sent as `Authorization: Token <token>` on authenticated calls
    pub auth_token: String,

    /// Per-request timeout
    pub request_timeout_ms: u64,

    /// Directory containing YAML API specs
    pub specs_dir: PathBuf,

    /// Output directory for results
    pub output_dir: PathBuf,

    /// Extra schema fixtures loaded next to the built-in ones
    pub schemas_dir: Option<PathBuf>,

    /// Poll defaults for specs that do not set their own
    pub poll: PollDefaults,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_token: String::new(),
            request_timeout_ms: 30_000,
            specs_dir: PathBuf::from("specs"),
            output_dir: PathBuf::from("test-results"),
            schemas_dir: None,
            poll: PollDefaults::default(),
        }
    }
}

/// Poll configuration used when a spec leaves it out
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollDefaults {
    pub intervals_ms: Vec<u64>,
    pub timeout_ms: u64,
}

impl Default for PollDefaults {
    fn default() -> Self {
        Self {
            intervals_ms: vec![500, 1_000, 2_000, 5_000],
            timeout_ms: 60_000,
        }
    }
}

impl PollDefaults {
    pub fn options(&self, description: impl Into<String>) -> PollOptions {
        PollOptions::from_millis(description, &self.intervals_ms, self.timeout_ms)
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            debug!("Loaded harness config from {}", path.display());
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Override connection settings from `BASE_URL` / `AUTH_TOKEN`
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup(BASE_URL_VAR).filter(|v| !v.is_empty()) {
            self.base_url = base_url;
        }
        if let Some(token) = lookup(AUTH_TOKEN_VAR).filter(|v| !v.is_empty()) {
            self.auth_token = token;
        }
    }

    /// Fail fast on settings every API run needs
    pub fn validate(&self) -> E2eResult<()> {
        for (name, value) in [(BASE_URL_VAR, &self.base_url), (AUTH_TOKEN_VAR, &self.auth_token)] {
            if value.trim().is_empty() {
                return Err(E2eError::InvalidConfig(format!(
                    "'{}' env variable is not defined",
                    name
                )));
            }
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(E2eError::InvalidConfig(format!(
                "base URL must be http(s), got {}",
                self.base_url
            )));
        }
        self.poll_defaults_options().validate().map_err(E2eError::InvalidConfig)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn poll_defaults_options(&self) -> PollOptions {
        self.poll.options("default poll settings")
    }
}
