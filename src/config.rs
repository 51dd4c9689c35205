//! Service configuration
//!
//! Loading order (priority from highest to lowest):
//! 1. Command line arguments
//! 2. Environment variables
//! 3. Configuration file (config.toml)
//! 4. Default values

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub upstream: UpstreamConfig,
    pub patterns: PatternsConfig,
    pub query: QuerySettings,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bounded pool size for parallel detector execution
    pub worker_pool_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 50051, worker_pool_size: 4 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,lumen=debug".to_string(), file: None }
    }
}

/// Telemetry backend access; consumed only by the upstream client,
/// never by the analytical core
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub api_key: String,
    pub account_id: String,
    /// "US" or "EU"; selects the default endpoint
    pub region: String,
    pub graphql_endpoint: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            account_id: String::new(),
            region: "US".to_string(),
            graphql_endpoint: String::new(),
        }
    }
}

impl UpstreamConfig {
    /// Endpoint, falling back to the regional default
    pub fn endpoint(&self) -> String {
        if !self.graphql_endpoint.is_empty() {
            return self.graphql_endpoint.clone();
        }
        if self.region.eq_ignore_ascii_case("eu") {
            "https://api.eu.telemetry.io/graphql".to_string()
        } else {
            "https://api.telemetry.io/graphql".to_string()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    pub min_confidence: f64,
    pub enable_pattern_detection: bool,
    pub enable_anomaly_detection: bool,
    pub enable_caching: bool,
    pub cache_size: usize,
    pub pattern_limit: usize,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            enable_pattern_detection: true,
            enable_anomaly_detection: true,
            enable_caching: true,
            cache_size: 100,
            pattern_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub cache_size: usize,
    pub history_size: usize,
    /// "cost" | "speed" | "balanced"
    pub optimizer_mode: String,
    pub enable_caching: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            cache_size: 100,
            history_size: 1000,
            optimizer_mode: "balanced".to_string(),
            enable_caching: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub max_concurrent_requests: usize,
    /// Hard outer deadline for a single analysis, in seconds
    pub request_timeout_secs: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { max_concurrent_requests: 100, request_timeout_secs: 30 }
    }
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "lumen")]
#[command(version, about = "Lumen - Observability Intelligence Service")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Logging level (overrides config file, e.g. "info,lumen=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Query optimizer mode: cost, speed or balanced
    #[arg(long, value_name = "MODE")]
    pub optimizer_mode: Option<String>,

    /// Worker pool size for parallel detectors
    #[arg(long, value_name = "N")]
    pub worker_pool_size: Option<usize>,
}

impl Config {
    /// Load configuration with command line, environment variable and
    /// file support
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables: API_KEY, ACCOUNT_ID, GRAPHQL_ENDPOINT, HOST,
    /// PORT, WORKER_POOL_SIZE, LOG_LEVEL, ENABLE_PATTERN_DETECTION,
    /// ENABLE_ANOMALY_DETECTION, ENABLE_CACHING, PATTERN_MIN_CONFIDENCE,
    /// QUERY_CACHE_SIZE, QUERY_OPTIMIZER_MODE, MAX_CONCURRENT_REQUESTS,
    /// REQUEST_TIMEOUT
    fn apply_env_overrides(&mut self) {
        if let Ok(api_key) = std::env::var("API_KEY") {
            self.upstream.api_key = api_key;
            tracing::info!("Override upstream.api_key from env");
        }
        if let Ok(account_id) = std::env::var("ACCOUNT_ID") {
            self.upstream.account_id = account_id;
            tracing::info!("Override upstream.account_id from env");
        }
        if let Ok(endpoint) = std::env::var("GRAPHQL_ENDPOINT") {
            self.upstream.graphql_endpoint = endpoint;
            tracing::info!("Override upstream.graphql_endpoint from env");
        }

        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }
        if let Ok(port) = std::env::var("PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }
        if let Ok(size) = std::env::var("WORKER_POOL_SIZE")
            && let Ok(size) = size.parse()
        {
            self.server.worker_pool_size = size;
            tracing::info!(
                "Override server.worker_pool_size from env: {}",
                self.server.worker_pool_size
            );
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(enabled) = std::env::var("ENABLE_PATTERN_DETECTION")
            && let Ok(enabled) = enabled.parse()
        {
            self.patterns.enable_pattern_detection = enabled;
        }
        if let Ok(enabled) = std::env::var("ENABLE_ANOMALY_DETECTION")
            && let Ok(enabled) = enabled.parse()
        {
            self.patterns.enable_anomaly_detection = enabled;
        }
        if let Ok(enabled) = std::env::var("ENABLE_CACHING")
            && let Ok(enabled) = enabled.parse::<bool>()
        {
            self.patterns.enable_caching = enabled;
            self.query.enable_caching = enabled;
        }
        if let Ok(confidence) = std::env::var("PATTERN_MIN_CONFIDENCE") {
            match confidence.parse() {
                Ok(value) => self.patterns.min_confidence = value,
                Err(e) => tracing::warn!(
                    "Invalid PATTERN_MIN_CONFIDENCE '{}': {} (keep {})",
                    confidence,
                    e,
                    self.patterns.min_confidence
                ),
            }
        }

        if let Ok(size) = std::env::var("QUERY_CACHE_SIZE")
            && let Ok(size) = size.parse()
        {
            self.query.cache_size = size;
        }
        if let Ok(mode) = std::env::var("QUERY_OPTIMIZER_MODE") {
            self.query.optimizer_mode = mode;
            tracing::info!(
                "Override query.optimizer_mode from env: {}",
                self.query.optimizer_mode
            );
        }

        if let Ok(max) = std::env::var("MAX_CONCURRENT_REQUESTS")
            && let Ok(max) = max.parse()
        {
            self.performance.max_concurrent_requests = max;
        }
        if let Ok(timeout) = std::env::var("REQUEST_TIMEOUT")
            && let Ok(timeout) = timeout.parse()
        {
            self.performance.request_timeout_secs = timeout;
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }
        if let Some(port) = args.port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }
        if let Some(mode) = &args.optimizer_mode {
            self.query.optimizer_mode = mode.clone();
            tracing::info!("Override query.optimizer_mode from CLI: {}", self.query.optimizer_mode);
        }
        if let Some(size) = args.worker_pool_size {
            self.server.worker_pool_size = size;
            tracing::info!("Override server.worker_pool_size from CLI: {}", size);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }
        if self.server.worker_pool_size == 0 {
            anyhow::bail!("server.worker_pool_size must be > 0");
        }
        if !(0.0..=1.0).contains(&self.patterns.min_confidence) {
            anyhow::bail!("patterns.min_confidence must be within [0, 1]");
        }
        if !["cost", "speed", "balanced"].contains(&self.query.optimizer_mode.as_str()) {
            anyhow::bail!(
                "query.optimizer_mode must be cost, speed or balanced (got '{}')",
                self.query.optimizer_mode
            );
        }
        if self.upstream.api_key.is_empty() {
            tracing::warn!("API_KEY is not set; upstream submission is disabled");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 50051);
        assert_eq!(config.server.worker_pool_size, 4);
        assert_eq!(config.patterns.min_confidence, 0.7);
        assert_eq!(config.patterns.pattern_limit, 50);
        assert_eq!(config.query.optimizer_mode, "balanced");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_regional_endpoints() {
        let us = UpstreamConfig::default();
        assert!(us.endpoint().contains("api.telemetry.io"));

        let eu = UpstreamConfig { region: "EU".to_string(), ..UpstreamConfig::default() };
        assert!(eu.endpoint().contains("api.eu."));

        let explicit = UpstreamConfig {
            graphql_endpoint: "https://example.com/graphql".to_string(),
            ..UpstreamConfig::default()
        };
        assert_eq!(explicit.endpoint(), "https://example.com/graphql");
    }

    #[test]
    fn test_toml_parsing() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000
            worker_pool_size = 8

            [query]
            optimizer_mode = "cost"
            cache_size = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.worker_pool_size, 8);
        assert_eq!(config.query.optimizer_mode, "cost");
        assert_eq!(config.query.cache_size, 10);
        // Unspecified sections keep their defaults
        assert_eq!(config.patterns.pattern_limit, 50);
    }

    #[test]
    fn test_invalid_optimizer_mode_rejected() {
        let config = Config {
            query: QuerySettings { optimizer_mode: "warp".to_string(), ..Default::default() },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
