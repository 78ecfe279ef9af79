use secrecy::SecretString;
use serde::Deserialize;

/// Settings for the relational backend. Exactly one of
/// `HISHTORY_POSTGRES_DB` / `HISHTORY_SQLITE_DB` supplies `url` in
/// production.
#[derive(Clone, Debug, Deserialize)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default)]
    pub min_idle: Option<u32>,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_ms: u64,
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    30_000
}

/// Settings for the object-store backend. The secret is read only
/// from `HISHTORY_S3_SECRET_ACCESS_KEY` and is never logged or persisted
/// outside of process memory.
#[derive(Clone, Debug, Deserialize)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(skip)]
    pub secret_access_key: Option<SecretString>,
}
