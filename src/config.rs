/*!
 * Configuration types for the router, the executor and logging
 *
 * Every setting is read once at invocation entry, either from
 * environment-style key/value lookups or (router only) from a TOML file,
 * and validated before any collaborator is called.
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::crypto::DEFAULT_STREAM_BUFFER_BYTES;
use crate::error::{DecryptError, Result};
use crate::request::env_keys::{DESTINATION_BUCKET, TRANSFER_SERVER_ID};

/// Environment keys read by the router and the executor
pub mod keys {
    pub const ECS_CLUSTER_NAME: &str = "ECS_CLUSTER_NAME";
    pub const TASK_DEFINITION: &str = "TASK_DEFINITION";
    pub const SUBNET_IDS: &str = "SUBNET_IDS";
    pub const SECURITY_GROUP_ID: &str = "SECURITY_GROUP_ID";
    pub const CONTAINER_NAME: &str = "CONTAINER_NAME";
    pub const FARGATE_THRESHOLD_BYTES: &str = "FARGATE_THRESHOLD_BYTES";
    pub const ASSIGN_PUBLIC_IP: &str = "ASSIGN_PUBLIC_IP";
    pub const WORK_DIR: &str = "WORK_DIR";
    pub const STREAM_BUFFER_BYTES: &str = "STREAM_BUFFER_BYTES";
}

/// Default delegation threshold (1 GiB)
pub const DEFAULT_THRESHOLD_BYTES: u64 = 1024 * 1024 * 1024;

/// Default name of the container whose environment is overridden
pub const DEFAULT_CONTAINER_NAME: &str = "decrypt-container";

/// Where and how delegated executor tasks are started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationConfig {
    /// Cluster the task runs in
    pub cluster: String,

    /// Task definition (family[:revision] or ARN)
    pub task_definition: String,

    /// Subnets for awsvpc networking
    pub subnets: Vec<String>,

    /// Security group attached to the task
    pub security_group: String,

    /// Container receiving the request environment
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Assign a public IP to the task
    #[serde(default = "default_true")]
    pub assign_public_ip: bool,
}

/// Router settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Files of at least this many bytes are delegated
    #[serde(default = "default_threshold_bytes")]
    pub threshold_bytes: u64,

    /// Bucket receiving decrypted output
    pub destination_bucket: String,

    /// Transfer server used when the event does not name one
    #[serde(default)]
    pub server_id: Option<String>,

    pub delegation: DelegationConfig,
}

/// Executor settings (the request itself is read separately)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Directory holding the working file pair
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Plaintext authenticated before release in the binary strategy
    #[serde(default = "default_stream_buffer_bytes")]
    pub stream_buffer_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            stream_buffer_bytes: default_stream_buffer_bytes(),
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Console log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    /// Write JSON logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_container_name() -> String {
    DEFAULT_CONTAINER_NAME.to_string()
}

fn default_threshold_bytes() -> u64 {
    DEFAULT_THRESHOLD_BYTES
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_stream_buffer_bytes() -> usize {
    DEFAULT_STREAM_BUFFER_BYTES
}

fn lookup_non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup_non_empty(lookup, name) {
        Some(raw) => raw.parse().map_err(|_| {
            DecryptError::Config(format!("{} must be a whole number of bytes, got {:?}", name, raw))
        }),
        None => Ok(default),
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_uppercase().as_str() {
        "ENABLED" | "TRUE" | "YES" | "1" => Ok(true),
        "DISABLED" | "FALSE" | "NO" | "0" => Ok(false),
        _ => Err(DecryptError::Config(format!(
            "{} must be ENABLED or DISABLED, got {:?}",
            name, raw
        ))),
    }
}

impl RouterConfig {
    /// Read router settings from environment-style lookups
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| lookup_non_empty(&lookup, name).unwrap_or_default();

        let assign_public_ip = match lookup_non_empty(&lookup, keys::ASSIGN_PUBLIC_IP) {
            Some(raw) => parse_flag(keys::ASSIGN_PUBLIC_IP, &raw)?,
            None => true,
        };

        let config = Self {
            threshold_bytes: parse_number(
                &lookup,
                keys::FARGATE_THRESHOLD_BYTES,
                DEFAULT_THRESHOLD_BYTES,
            )?,
            destination_bucket: text(DESTINATION_BUCKET),
            server_id: lookup_non_empty(&lookup, TRANSFER_SERVER_ID),
            delegation: DelegationConfig {
                cluster: text(keys::ECS_CLUSTER_NAME),
                task_definition: text(keys::TASK_DEFINITION),
                subnets: text(keys::SUBNET_IDS)
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
                security_group: text(keys::SECURITY_GROUP_ID),
                container_name: lookup_non_empty(&lookup, keys::CONTAINER_NAME)
                    .unwrap_or_else(default_container_name),
                assign_public_ip,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Read from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load router settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DecryptError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: RouterConfig = toml::from_str(&contents).map_err(|e| {
            DecryptError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every required setting is present
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.destination_bucket.is_empty() {
            missing.push(DESTINATION_BUCKET);
        }
        if self.delegation.cluster.is_empty() {
            missing.push(keys::ECS_CLUSTER_NAME);
        }
        if self.delegation.task_definition.is_empty() {
            missing.push(keys::TASK_DEFINITION);
        }
        if self.delegation.subnets.is_empty() {
            missing.push(keys::SUBNET_IDS);
        }
        if self.delegation.security_group.is_empty() {
            missing.push(keys::SECURITY_GROUP_ID);
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DecryptError::Config(format!(
                "Missing required router settings: {}",
                missing.join(", ")
            )))
        }
    }
}

impl ExecutorConfig {
    /// Read executor settings from environment-style lookups
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let stream_buffer_bytes = parse_number(
            &lookup,
            keys::STREAM_BUFFER_BYTES,
            DEFAULT_STREAM_BUFFER_BYTES,
        )?;
        if stream_buffer_bytes == 0 {
            return Err(DecryptError::Config(format!(
                "{} must be greater than zero",
                keys::STREAM_BUFFER_BYTES
            )));
        }

        Ok(Self {
            work_dir: lookup_non_empty(&lookup, keys::WORK_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(default_work_dir),
            stream_buffer_bytes,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}
