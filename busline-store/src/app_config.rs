use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Upper bound on any single store call.
    pub store_timeout_ms: u64,
    pub max_passengers: u32,
    #[serde(default = "default_number_prefix")]
    pub booking_number_prefix: String,
    /// Drafts untouched for this long are dropped.
    #[serde(default = "default_draft_idle_secs")]
    pub draft_idle_timeout_secs: u64,
    #[serde(default = "default_max_drafts")]
    pub max_drafts_per_user: u32,
}

fn default_number_prefix() -> String { "BK".to_string() }
fn default_draft_idle_secs() -> u64 { 1800 }
fn default_max_drafts() -> u32 { 5 }

impl BusinessRules {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn draft_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.draft_idle_timeout_secs)
    }
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            store_timeout_ms: 3000,
            max_passengers: 10,
            booking_number_prefix: default_number_prefix(),
            draft_idle_timeout_secs: default_draft_idle_secs(),
            max_drafts_per_user: default_max_drafts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// JSON file of routes and trips loaded into the memory backend at startup.
    #[serde(default)]
    pub seed_file: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `BUSLINE_BUSINESS_RULES__MAX_PASSENGERS=6`
            .add_source(config::Environment::with_prefix("BUSLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
