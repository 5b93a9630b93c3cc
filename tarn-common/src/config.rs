use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Per-queue concurrency policy.
#[derive(Clone, Deserialize, Debug)]
pub struct QueuePolicy {
    pub min: usize,
    pub max: usize,
    pub batch_size: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    #[serde(default = "default_true")]
    pub enable_adaptive: bool,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_lease_ttl_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            min: 1,
            max: 8,
            batch_size: 4,
            poll_interval_secs: default_poll_interval_secs(),
            lease_ttl_secs: default_lease_ttl_secs(),
            enable_adaptive: true,
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,
    #[serde(default = "default_sample_interval_secs")]
    pub health_sample_interval_secs: u64,
    #[serde(default)]
    pub default_policy: QueuePolicy,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_completed_ttl_secs")]
    pub completed_ttl_secs: i64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> u32 {
    768
}

fn default_extraction_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_sample_interval_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_completed_ttl_secs() -> i64 {
    7 * 24 * 3600
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
