//! Configuration for the Themis grading engine

use std::env;
use std::time::Duration;

use crate::sandbox::denylist::default_denylist;

/// Wall-clock budget for a single snippet
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 1024;
pub const DEFAULT_MAX_WORKERS: usize = 16;
pub const DEFAULT_PYTHON_BIN: &str = "python3";

/// Themis configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment (development, staging, production)
    pub environment: String,

    /// Prometheus metrics port; metrics are not served when unset
    pub metrics_port: Option<u16>,

    /// Emit JSON log lines instead of the human-readable format
    pub json_logs: bool,

    /// Sandbox settings
    pub sandbox: SandboxConfig,
}

/// Sandbox worker settings
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Interpreter used for worker processes
    pub python_bin: String,

    /// Budget for each snippet execution
    pub timeout: Duration,

    /// Address-space cap applied inside the worker (0 disables)
    pub memory_limit_bytes: u64,

    /// Maximum number of live worker processes
    pub max_workers: usize,

    /// Substrings that remove a candidate code line
    pub denylist: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python_bin: DEFAULT_PYTHON_BIN.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_MB * 1024 * 1024,
            max_workers: DEFAULT_MAX_WORKERS,
            denylist: default_denylist(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            metrics_port: env::var("METRICS_PORT").ok().and_then(|v| v.parse().ok()),
            json_logs: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            sandbox: SandboxConfig {
                python_bin: env::var("PYTHON_BIN")
                    .unwrap_or_else(|_| DEFAULT_PYTHON_BIN.to_string()),
                timeout: Duration::from_secs(
                    env::var("SANDBOX_TIMEOUT_SECS")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(DEFAULT_TIMEOUT_SECS),
                ),
                memory_limit_bytes: env::var("SANDBOX_MEMORY_LIMIT_MB")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_MEMORY_LIMIT_MB)
                    * 1024
                    * 1024,
                max_workers: env::var("SANDBOX_MAX_WORKERS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(DEFAULT_MAX_WORKERS),
                denylist: env::var("SANDBOX_DENYLIST")
                    .ok()
                    .map(|v| parse_list(&v))
                    .filter(|list| !list.is_empty())
                    .unwrap_or_else(default_denylist),
            },
        }
    }
}

/// Split a comma-separated list, dropping blanks
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
