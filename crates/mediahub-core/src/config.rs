//! Typed configuration tree, loaded from a JSON file.
//!
//! Mirrors the flat `config.json` the original service reads, but gives every
//! section its own struct and documented defaults so a minimal file — just
//! the connection fields the pipeline cannot function without — is enough
//! to boot.

use std::path::Path;

use serde::Deserialize;

use crate::error::CoreError;

/// The default path checked when no path is given explicitly.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Environment variable that overrides the config file path.
pub const CONFIG_PATH_ENV: &str = "MEDIAHUB_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub r2: R2Config,
    pub webp_worker: WebpWorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(rename = "read_timeout", default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(rename = "write_timeout", default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_request_body_mb")]
    pub max_request_body: u64,
    #[serde(default = "default_max_multipart_memory_mb")]
    pub max_multipart_memory: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisNode {
    pub host: String,
    pub port: u16,
}

impl RedisNode {
    /// `host:port`, as passed to the client builder.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database_id: i64,
    #[serde(rename = "health_check_interval", default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(rename = "dial_timeout", default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(rename = "read_timeout", default = "default_redis_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(rename = "write_timeout", default = "default_redis_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    pub nodes: Vec<RedisNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct R2Config {
    pub account_id: String,
    pub bucket_name: String,
    pub access_key_id: String,
    pub secret_key: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl R2Config {
    /// Path-style account-scoped endpoint, unless an explicit override is configured.
    pub fn base_endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            format!("https://{}.r2.cloudflarestorage.com", self.account_id)
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebpWorkerConfig {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_len")]
    pub max_len: i64,
    #[serde(rename = "backoff_base", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(rename = "block_timeout", default = "default_block_timeout_ms")]
    pub block_timeout_ms: u64,
}

fn default_read_timeout_ms() -> u64 {
    15_000
}
fn default_write_timeout_ms() -> u64 {
    15_000
}
fn default_max_request_body_mb() -> u64 {
    25
}
fn default_max_multipart_memory_mb() -> u64 {
    10
}
fn default_health_check_interval_ms() -> u64 {
    5_000
}
fn default_dial_timeout_ms() -> u64 {
    5_000
}
fn default_redis_read_timeout_ms() -> u64 {
    3_000
}
fn default_redis_write_timeout_ms() -> u64 {
    3_000
}
fn default_pool_size() -> u32 {
    10
}
fn default_workers() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    5
}
fn default_max_len() -> i64 {
    10_000
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_block_timeout_ms() -> u64 {
    5_000
}

impl Config {
    /// Read and parse the config file at `path`.
    pub fn read(path: impl AsRef<Path>) -> Result<Config, CoreError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|source| CoreError::ConfigRead { path: path.display().to_string(), source })?;
        let cfg: Config = serde_json::from_str(&data)
            .map_err(|source| CoreError::ConfigParse { path: path.display().to_string(), source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Resolve the config path from an explicit override, the environment, or the default.
    pub fn resolve_path(explicit: Option<&str>) -> String {
        if let Some(p) = explicit {
            return p.to_string();
        }
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.r2.bucket_name.trim().is_empty() {
            return Err(CoreError::MissingField("r2.bucket_name"));
        }
        if self.r2.account_id.trim().is_empty() {
            return Err(CoreError::MissingField("r2.account_id"));
        }
        if self.redis.nodes.is_empty() {
            return Err(CoreError::MissingField("redis.nodes"));
        }
        if self.webp_worker.stream.trim().is_empty() {
            return Err(CoreError::MissingField("webp_worker.stream"));
        }
        if self.webp_worker.group.trim().is_empty() {
            return Err(CoreError::MissingField("webp_worker.group"));
        }
        if self.webp_worker.consumer.trim().is_empty() {
            return Err(CoreError::MissingField("webp_worker.consumer"));
        }
        Ok(())
    }
}
