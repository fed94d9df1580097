// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative configuration: child processes, proxy routes, API settings.
//!
//! Loaded from a TOML file (`prox.toml` by convention). Environment for a
//! child is merged from three layers: the global env file, the per-process
//! env file, and the inline `env` table, with the inline table winning.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("invalid env file {path} at line {line}: {reason}")]
    EnvFile { path: PathBuf, line: usize, reason: String },

    #[error("process `{0}` has an empty command")]
    EmptyCommand(String),
}

/// Health check specification for a child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthSpec {
    /// Shell command executed with the child's environment
    pub command: String,
    /// Seconds between checks
    #[serde(default = "default_health_interval")]
    pub interval: u64,
    /// Seconds before a single check is considered failed
    #[serde(default = "default_health_timeout")]
    pub timeout: u64,
    /// Consecutive failures before the process is marked unhealthy
    #[serde(default = "default_health_retries")]
    pub retries: u32,
}

fn default_health_interval() -> u64 {
    10
}

fn default_health_timeout() -> u64 {
    5
}

fn default_health_retries() -> u32 {
    3
}

/// A single child process declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessDefinition {
    /// Unique name (map key in the config file, filled in after parse)
    #[serde(skip)]
    pub name: String,
    /// Command line, run via `sh -c`
    pub command: String,
    /// Inline environment, highest precedence
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Per-process env file, middle precedence
    #[serde(default)]
    pub env_file: Option<PathBuf>,
    /// Working directory (defaults to the supervisor's)
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Optional health check
    #[serde(default)]
    pub health: Option<HealthSpec>,
}

/// A proxied backend service: `<subdomain>.<domain>` routes here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceTarget {
    #[serde(default = "default_service_host")]
    pub host: String,
    pub port: u16,
}

fn default_service_host() -> String {
    "127.0.0.1".to_string()
}

/// Reverse proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Domain suffix, e.g. `local.dev`; requests arrive as `<sub>.<domain>`
    pub domain: String,
    /// HTTPS listener port
    #[serde(default = "default_https_port")]
    pub https_port: u16,
    /// Optional plain-HTTP listener port
    #[serde(default)]
    pub http_port: Option<u16>,
    /// PEM certificate chain path
    pub cert_file: PathBuf,
    /// PEM private key path
    pub key_file: PathBuf,
    /// Subdomain -> backend port (or host:port) mappings
    #[serde(default)]
    pub services: BTreeMap<String, ServiceTarget>,
    /// Capture request/response headers and bodies
    #[serde(default)]
    pub capture: bool,
    /// Per-body capture cap in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

fn default_https_port() -> u16 {
    443
}

fn default_max_body_bytes() -> u64 {
    1024 * 1024
}

/// Control API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Require `Authorization: Bearer <token>` on every endpoint but /health
    #[serde(default = "default_true")]
    pub auth: bool,
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    4777
}

fn default_true() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { host: default_api_host(), port: default_api_port(), auth: true }
    }
}

/// Tunables with defaults suitable for local development.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Ring capacity of the in-memory log buffer
    #[serde(default = "default_log_buffer_size")]
    pub log_buffer_size: usize,
    /// Ring capacity of the proxy request tracker
    #[serde(default = "default_request_buffer_size")]
    pub request_buffer_size: usize,
    /// Seconds between SIGTERM and SIGKILL on stop
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: u64,
    /// Unexpected exits tolerated before a process is marked failed
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

fn default_log_buffer_size() -> usize {
    1000
}

fn default_request_buffer_size() -> usize {
    1000
}

fn default_grace_seconds() -> u64 {
    10
}

fn default_max_restarts() -> u32 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_buffer_size: default_log_buffer_size(),
            request_buffer_size: default_request_buffer_size(),
            grace_seconds: default_grace_seconds(),
            max_restarts: default_max_restarts(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Global env file, lowest precedence
    #[serde(default)]
    pub env_file: Option<PathBuf>,
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessDefinition>,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub settings: Settings,
    /// Absolute path of the file this config was loaded from
    #[serde(skip)]
    pub path: PathBuf,
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let mut config: Config =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;

        config.path = path.canonicalize().map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;

        for (name, def) in config.processes.iter_mut() {
            if def.command.trim().is_empty() {
                return Err(ConfigError::EmptyCommand(name.clone()));
            }
            def.name = name.clone();
        }

        Ok(config)
    }

    /// Merged environment for one process: global file < process file < inline.
    pub fn merged_env(&self, def: &ProcessDefinition) -> Result<BTreeMap<String, String>, ConfigError> {
        let base = self.path.parent().unwrap_or(Path::new("."));
        let mut merged = BTreeMap::new();

        if let Some(ref global) = self.env_file {
            merged.extend(parse_env_file(&base.join(global))?);
        }
        if let Some(ref file) = def.env_file {
            merged.extend(parse_env_file(&base.join(file))?);
        }
        for (k, v) in &def.env {
            merged.insert(k.clone(), v.clone());
        }

        Ok(merged)
    }
}

/// Parse a `KEY=VALUE` env file. Blank lines and `#` comments are skipped;
/// single/double quotes around the value are stripped.
pub fn parse_env_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let mut vars = BTreeMap::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::EnvFile {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: "expected KEY=VALUE".to_string(),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::EnvFile {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: "empty key".to_string(),
            });
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }

    Ok(vars)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
