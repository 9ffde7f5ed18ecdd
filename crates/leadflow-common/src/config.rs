//! Configuration for LeadFlow

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Dispatch worker configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Feedback worker configuration
    #[serde(default)]
    pub feedback: FeedbackConfig,

    /// Reputation thresholds
    #[serde(default)]
    pub reputation: ReputationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (postgres)
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Dispatch worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Seconds between dispatch cycles
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Per-campaign processing budget within one cycle (milliseconds).
    /// A slow campaign must not hold up the rest of the cycle.
    #[serde(default = "default_campaign_budget_ms")]
    pub campaign_budget_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            campaign_budget_ms: default_campaign_budget_ms(),
        }
    }
}

fn default_tick_secs() -> u64 {
    60
}

fn default_campaign_budget_ms() -> u64 {
    30_000
}

/// Feedback worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Seconds between feedback polls
    #[serde(default = "default_feedback_tick_secs")]
    pub tick_secs: u64,

    /// Maximum delivery events consumed per poll
    #[serde(default = "default_feedback_batch_size")]
    pub batch_size: i64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_feedback_tick_secs(),
            batch_size: default_feedback_batch_size(),
        }
    }
}

fn default_feedback_tick_secs() -> u64 {
    15
}

fn default_feedback_batch_size() -> i64 {
    50
}

/// Reputation thresholds for the account-level sending health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// Bounce rate above which the account is considered poor (0.0 - 1.0)
    #[serde(default = "default_bounce_rate_threshold")]
    pub bounce_rate_threshold: f64,

    /// Complaint rate above which the account is considered poor (0.0 - 1.0)
    #[serde(default = "default_complaint_rate_threshold")]
    pub complaint_rate_threshold: f64,

    /// Minimum sends before rates are meaningful
    #[serde(default = "default_min_sample")]
    pub min_sample: i64,

    /// Seconds a computed verdict stays cached
    #[serde(default = "default_reputation_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            bounce_rate_threshold: default_bounce_rate_threshold(),
            complaint_rate_threshold: default_complaint_rate_threshold(),
            min_sample: default_min_sample(),
            cache_ttl_secs: default_reputation_cache_ttl_secs(),
        }
    }
}

fn default_bounce_rate_threshold() -> f64 {
    0.05
}

fn default_complaint_rate_threshold() -> f64 {
    0.001
}

fn default_min_sample() -> i64 {
    200
}

fn default_reputation_cache_ttl_secs() -> u64 {
    300
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info,leadflow=debug".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/leadflow/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}
