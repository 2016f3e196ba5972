use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::PoolOptions;
use crate::{Result, SyncLensError};

#[derive(Parser, Debug, Clone)]
#[command(name = "synclens")]
#[command(about = "synclens - migration log and live progress insights", long_about = None)]
pub struct Config {
    // Server configuration
    #[arg(long, default_value = "127.0.0.1", env = "SYNCLENS_HOST")]
    pub host: String,

    #[arg(short, long, default_value = "3030", env = "SYNCLENS_PORT")]
    pub port: u16,

    #[arg(long, default_value = "info", env = "SYNCLENS_LOG_LEVEL")]
    pub log_level: String,

    #[arg(long, default_value = "10737418240", env = "SYNCLENS_MAX_FILE_SIZE", help = "Maximum accepted upload size in bytes (default: 10GB)")]
    pub max_file_size: u64,

    // Session configuration
    #[arg(long, default_value = "3600", env = "SYNCLENS_SESSION_TIMEOUT", help = "Idle timeout for server-side sessions in seconds")]
    pub session_timeout: u64,

    #[arg(long, default_value = "true", env = "SYNCLENS_SECURE_COOKIES", action = clap::ArgAction::Set, help = "Restrict the session cookie to secure transports")]
    pub secure_cookies: bool,

    // Database connection pool configuration
    #[arg(long, default_value = "10", env = "SYNCLENS_POOL_SIZE", help = "Maximum number of pooled database connections")]
    pub pool_size: u32,

    #[arg(long, default_value = "1", env = "SYNCLENS_MIN_POOL_SIZE", help = "Minimum number of pooled database connections")]
    pub min_pool_size: u32,

    #[arg(long, default_value = "5000", env = "SYNCLENS_TIMEOUT_MS", help = "Connect, server selection and socket timeout in milliseconds")]
    pub timeout_ms: u64,

    #[arg(long, default_value = "30000", env = "SYNCLENS_MAX_IDLE_MS", help = "Maximum idle time of a pooled connection in milliseconds")]
    pub max_idle_ms: u64,

    // Live monitoring configuration
    #[arg(long, default_value = "10", env = "SYNCLENS_REFRESH_TIME", help = "Refresh interval of live metrics in seconds")]
    pub refresh_time: u64,

    #[arg(long, env = "SYNCLENS_CONNECTION_STRING", help = "Connection string of the destination cluster; overrides per-session credentials")]
    pub connection_string: Option<String>,

    #[arg(long, env = "SYNCLENS_PROGRESS_ENDPOINT_URL", help = "Progress endpoint in the form host:port/api/v1/progress")]
    pub progress_endpoint_url: Option<String>,

    // One-shot archive inspection
    #[arg(long, env = "SYNCLENS_INPUT", help = "Decode this log archive and report what it contains")]
    pub input: Option<PathBuf>,

    #[arg(long, default_value = "application/octet-stream", env = "SYNCLENS_CONTENT_TYPE", help = "Declared content type of --input")]
    pub content_type: String,
}

lazy_static::lazy_static! {
    static ref PROGRESS_ENDPOINT_PATTERN: Regex =
        Regex::new(r"^[\w.\-]+:\d+/api/v1/progress$").expect("progress endpoint pattern is valid");
}

impl Config {
    /// Get a configuration instance with all values resolved from CLI args and environment variables
    pub fn load() -> Self {
        Config::parse()
    }

    /// Reject configurations the rest of the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(SyncLensError::InvalidConfig("port must be between 1 and 65535".to_string()));
        }
        if self.session_timeout == 0 {
            return Err(SyncLensError::InvalidConfig("session timeout must be positive".to_string()));
        }
        if self.pool_size == 0 {
            return Err(SyncLensError::InvalidConfig("pool size must be positive".to_string()));
        }
        if self.min_pool_size > self.pool_size {
            return Err(SyncLensError::InvalidConfig(format!(
                "min pool size ({}) exceeds pool size ({})",
                self.min_pool_size, self.pool_size
            )));
        }
        if self.timeout_ms == 0 {
            return Err(SyncLensError::InvalidConfig("timeout must be positive".to_string()));
        }
        if let Some(url) = &self.progress_endpoint_url {
            if !validate_progress_endpoint_url(url) {
                return Err(SyncLensError::InvalidConfig(format!(
                    "progress endpoint URL must look like host:port/api/v1/progress, got {url}"
                )));
            }
        }
        Ok(())
    }

    /// Get the session idle timeout as Duration
    pub fn session_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.session_timeout)
    }

    /// Get the connect/selection/socket timeout as Duration
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the live metrics refresh interval as Duration
    pub fn refresh_interval_duration(&self) -> Duration {
        Duration::from_secs(self.refresh_time)
    }

    /// Pool tuning handed to the database connector
    pub fn pool_options(&self) -> PoolOptions {
        let timeout = self.connect_timeout_duration();
        PoolOptions {
            max_pool_size: self.pool_size,
            min_pool_size: self.min_pool_size,
            max_idle_time: Duration::from_millis(self.max_idle_ms),
            connect_timeout: timeout,
            server_selection_timeout: timeout,
            socket_timeout: timeout,
        }
    }
}

/// Check that a progress endpoint URL has the form host:port/api/v1/progress
pub fn validate_progress_endpoint_url(url: &str) -> bool {
    !url.is_empty() && PROGRESS_ENDPOINT_PATTERN.is_match(url)
}
