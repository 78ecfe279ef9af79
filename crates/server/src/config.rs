use std::sync::OnceLock;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use hishtory_data::config::{DbConfig, ObjectStoreConfig};
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::AppError;

pub static CONFIG: OnceLock<ServerConfig> = OnceLock::new();

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_owned()
}

fn default_release_refresh_interval_secs() -> u64 {
    3600
}

fn default_prune_interval_secs() -> u64 {
    300
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout_ms() -> u64 {
    30_000
}

/// Whether this process runs in a deployment environment that should enable
/// production-only behaviors (strict healthcheck, deep clean of idle users).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnv {
    #[default]
    Dev,
    Prod,
}

/// The raw, flat shape `figment` extracts from TOML + `HISHTORY_`-prefixed
/// environment. Assembled into [`ServerConfig`] by [`init`], which is where
/// the relational and object-store sub-configs (and the S3 secret, sourced
/// only from the environment) get built.
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    #[serde(default = "default_listen_addr")]
    listen_addr: String,
    max_num_users: Option<u32>,
    #[serde(default)]
    env: DeployEnv,
    #[serde(default)]
    test: bool,

    postgres_db: Option<String>,
    sqlite_db: Option<String>,
    #[serde(default = "default_pool_size")]
    db_pool_size: u32,
    db_min_idle: Option<u32>,
    #[serde(default = "default_connection_timeout_ms")]
    db_connection_timeout_ms: u64,

    s3_bucket: Option<String>,
    s3_region: Option<String>,
    s3_endpoint: Option<String>,
    s3_access_key_id: Option<String>,
    s3_prefix: Option<String>,

    #[serde(default = "default_release_refresh_interval_secs")]
    release_refresh_interval_secs: u64,
    #[serde(default = "default_prune_interval_secs")]
    prune_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub max_num_users: Option<u32>,
    pub env: DeployEnv,
    pub test: bool,
    pub db: DbConfig,
    pub object_store: Option<ObjectStoreConfig>,
    pub release_refresh_interval_secs: u64,
    pub prune_interval_secs: u64,
}

impl ServerConfig {
    pub fn is_prod(&self) -> bool {
        self.env == DeployEnv::Prod
    }
}

/// Loads configuration the same way on every run: an optional TOML file
/// named by `HISHTORY_CONFIG` (default `hishtory.toml`, missing is fine),
/// overridden by `HISHTORY_`-prefixed environment variables, which in turn
/// is overridden by `HISHTORY_S3_SECRET_ACCESS_KEY` handled out of band so it
/// never round-trips through a file.
pub fn init() -> Result<(), AppError> {
    let raw = Figment::new()
        .merge(Toml::file(Env::var("HISHTORY_CONFIG").as_deref().unwrap_or("hishtory.toml")))
        .merge(Env::prefixed("HISHTORY_").global());

    let raw: RawConfig = raw.extract()?;

    let db_url = raw
        .postgres_db
        .clone()
        .or(raw.sqlite_db.clone())
        .unwrap_or_default();
    let db = DbConfig {
        url: db_url,
        pool_size: raw.db_pool_size,
        min_idle: raw.db_min_idle,
        connection_timeout_ms: raw.db_connection_timeout_ms,
    };

    let object_store = raw.s3_bucket.map(|bucket| ObjectStoreConfig {
        bucket,
        region: raw.s3_region,
        endpoint: raw.s3_endpoint,
        access_key_id: raw.s3_access_key_id,
        prefix: raw.s3_prefix,
        secret_access_key: std::env::var("HISHTORY_S3_SECRET_ACCESS_KEY").ok().map(SecretString::from),
    });

    let conf = ServerConfig {
        listen_addr: raw.listen_addr,
        max_num_users: raw.max_num_users,
        env: raw.env,
        test: raw.test,
        db,
        object_store,
        release_refresh_interval_secs: raw.release_refresh_interval_secs,
        prune_interval_secs: raw.prune_interval_secs,
    };

    if !conf.test && conf.db.url.is_empty() && conf.object_store.is_none() {
        return Err(AppError::invalid(
            "one of HISHTORY_POSTGRES_DB, HISHTORY_SQLITE_DB, or an object-store bucket must be set unless HISHTORY_TEST=1",
        ));
    }

    CONFIG.set(conf).map_err(|_| AppError::invalid("config already initialized"))?;
    Ok(())
}

pub fn get() -> &'static ServerConfig {
    CONFIG.get().expect("config should be initialized before use")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listen_addr_binds_every_interface() {
        assert_eq!(default_listen_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn deploy_env_defaults_to_dev() {
        assert_eq!(DeployEnv::default(), DeployEnv::Dev);
        assert!(!ServerConfig {
            listen_addr: default_listen_addr(),
            max_num_users: None,
            env: DeployEnv::default(),
            test: true,
            db: DbConfig { url: String::new(), pool_size: default_pool_size(), min_idle: None, connection_timeout_ms: default_connection_timeout_ms() },
            object_store: None,
            release_refresh_interval_secs: default_release_refresh_interval_secs(),
            prune_interval_secs: default_prune_interval_secs(),
        }
        .is_prod());
    }
}
