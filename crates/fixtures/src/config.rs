//! Fixture manager configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FixtureError, FixtureResult};
use crate::model::Role;
use crate::tagger::TaggingConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Backend API connection
    pub api: ApiConfig,

    /// Login credentials per role
    pub credentials: CredentialsConfig,

    /// Sweep behaviour
    pub cleanup: CleanupConfig,

    /// Seeding behaviour
    pub seeding: SeedingConfig,

    /// Fixture classification rules
    pub tagging: TaggingConfig,

    /// Default poll bounds
    pub polling: PollingConfig,

    /// Optional YAML hook table replacing the built-in one
    pub hooks_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, e.g. `http://localhost:8080/api`
    pub base_url: String,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// Retries after the first attempt for network errors and 5xx
    pub max_retries: u32,

    /// Fixed delay between retries
    pub retry_backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            request_timeout_secs: 30,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub admin: Credentials,
    pub user: Credentials,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            admin: Credentials::new("admin", "admin123"),
            user: Credentials::new("testuser", "test123"),
        }
    }
}

impl CredentialsConfig {
    pub fn for_role(&self, role: Role) -> &Credentials {
        match role {
            Role::Admin => &self.admin,
            Role::StandardUser => &self.user,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Page size used when listing records to sweep
    pub page_size: u32,

    /// Pause before a sweep so in-flight writes from the UI land first
    pub settle_delay_ms: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            page_size: 2000,
            settle_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedingConfig {
    /// Inserted into generated names so parallel workers never share fixtures
    pub worker_tag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 200,
        }
    }
}

impl FixtureConfig {
    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> FixtureResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Override settings from `NURSERY_*` environment variables
    pub fn apply_env(&mut self) -> FixtureResult<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) -> FixtureResult<()> {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("NURSERY_API_URL") {
            self.api.base_url = url;
        }
        if let Some(v) = non_empty("NURSERY_ADMIN_USER") {
            self.credentials.admin.username = v;
        }
        if let Some(v) = non_empty("NURSERY_ADMIN_PASS") {
            self.credentials.admin.password = v;
        }
        if let Some(v) = non_empty("NURSERY_STD_USER") {
            self.credentials.user.username = v;
        }
        if let Some(v) = non_empty("NURSERY_STD_PASS") {
            self.credentials.user.password = v;
        }
        if let Some(v) = non_empty("NURSERY_WORKER_TAG") {
            self.seeding.worker_tag = Some(v);
        }
        if let Some(v) = non_empty("NURSERY_PROTECTED_ID_THRESHOLD") {
            self.tagging.protected_id_threshold = v.trim().parse().map_err(|_| {
                FixtureError::Config(format!("NURSERY_PROTECTED_ID_THRESHOLD is not an integer: {v}"))
            })?;
        }
        Ok(())
    }

    /// Check the settings that would otherwise fail deep inside a run
    pub fn validate(&self) -> FixtureResult<()> {
        url::Url::parse(&self.api.base_url)?;
        if self.cleanup.page_size == 0 {
            return Err(FixtureError::Config("cleanup.page_size must be positive".to_string()));
        }
        if self.polling.max_attempts == 0 {
            return Err(FixtureError::Config("polling.max_attempts must be positive".to_string()));
        }
        Ok(())
    }
}
