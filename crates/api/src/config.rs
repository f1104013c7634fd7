use domain::models::{EmailClient, PerformanceTargets, Severity};
use domain::services::ValidationLevel;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub generation: GenerationConfig,
    pub cache: CacheConfig,
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub performance: PerformanceTargets,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Largest accepted request body, in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Ceiling on distinct generations running at once.
    #[serde(default = "default_max_concurrent_generations")]
    pub max_concurrent_generations: usize,

    /// How long a duplicate request waits on an in-flight generation.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,

    #[serde(default = "default_cache_ttl")]
    pub default_cache_ttl_secs: u64,

    /// Clients targeted when a request names none.
    #[serde(default)]
    pub default_target_clients: Vec<EmailClient>,

    /// Upper bound on items in a batch or compatibility report call.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_minutes: u64,

    #[serde(default = "default_idle_eviction_hours")]
    pub idle_eviction_hours: i64,

    #[serde(default = "default_min_hits_to_keep")]
    pub min_hits_to_keep: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilerProvider {
    Builtin,
    Process,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompilerConfig {
    #[serde(default = "default_compiler_provider")]
    pub provider: CompilerProvider,

    /// Path of the `mjml` executable (process provider).
    #[serde(default)]
    pub binary_path: String,

    /// Render endpoint (http provider).
    #[serde(default)]
    pub api_url: String,

    #[serde(default)]
    pub app_id: String,

    #[serde(default)]
    pub secret_key: String,

    #[serde(default = "default_compiler_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub validation_level: ValidationLevel,

    #[serde(default)]
    pub keep_comments: bool,

    /// Diagnostics at or above this severity fail the compile.
    #[serde(default)]
    pub fail_on: Option<Severity>,

    /// Number of failures before circuit breaker opens
    #[serde(default = "default_circuit_breaker_failures")]
    pub circuit_breaker_failures: u32,

    /// Seconds to keep circuit breaker open before retry
    #[serde(default = "default_circuit_breaker_reset_secs")]
    pub circuit_breaker_reset_secs: u64,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    60
}
fn default_max_body_size() -> usize {
    2_097_152
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_max_concurrent_generations() -> usize {
    5
}
fn default_wait_timeout() -> u64 {
    30
}
fn default_cache_ttl() -> u64 {
    7200
}
fn default_max_batch_size() -> usize {
    50
}
fn default_true() -> bool {
    true
}
fn default_sweep_interval() -> u64 {
    30
}
fn default_idle_eviction_hours() -> i64 {
    24
}
fn default_min_hits_to_keep() -> u64 {
    2
}
fn default_max_entries() -> usize {
    1000
}
fn default_compiler_provider() -> CompilerProvider {
    CompilerProvider::Builtin
}
fn default_compiler_timeout_ms() -> u64 {
    10_000
}
fn default_circuit_breaker_failures() -> u32 {
    5
}
fn default_circuit_breaker_reset_secs() -> u64 {
    60
}

impl GenerationConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Defaults mirrored from `config/default.toml` for file-less loading.
const EMBEDDED_DEFAULTS: &str = r#"
    [server]
    host = "0.0.0.0"
    port = 8080
    request_timeout_secs = 60
    max_body_size = 2097152
    cors_origins = []

    [logging]
    level = "info"
    format = "json"

    [generation]
    max_concurrent_generations = 5
    wait_timeout_secs = 30
    default_cache_ttl_secs = 7200
    default_target_clients = ["outlook", "gmail", "apple_mail", "yahoo"]
    max_batch_size = 50

    [cache]
    enabled = true
    sweep_interval_minutes = 30
    idle_eviction_hours = 24
    min_hits_to_keep = 2
    max_entries = 1000

    [compiler]
    provider = "builtin"
    timeout_ms = 10000
    validation_level = "soft"
    keep_comments = false
    circuit_breaker_failures = 5
    circuit_breaker_reset_secs = 60

    [performance]
    compression_level = "standard"
    max_size_kb = 100
"#;

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with MC__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("MC").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration from embedded defaults plus overrides, without
    /// touching the file system. Validation is skipped so partial configs
    /// can be exercised.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(EMBEDDED_DEFAULTS, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.generation.max_concurrent_generations == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "max_concurrent_generations must be at least 1".to_string(),
            ));
        }

        if self.generation.default_cache_ttl_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "default_cache_ttl_secs must be positive".to_string(),
            ));
        }

        match self.compiler.provider {
            CompilerProvider::Process if self.compiler.binary_path.is_empty() => {
                return Err(ConfigValidationError::MissingRequired(
                    "MC__COMPILER__BINARY_PATH must be set for the process compiler".to_string(),
                ));
            }
            CompilerProvider::Http if self.compiler.api_url.is_empty() => {
                return Err(ConfigValidationError::MissingRequired(
                    "MC__COMPILER__API_URL must be set for the http compiler".to_string(),
                ));
            }
            _ => {}
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::CompressionLevel;

    #[test]
    fn test_config_load_with_defaults() {
        let config = Config::load_for_test(&[]).expect("Failed to load config");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.generation.max_concurrent_generations, 5);
        assert_eq!(config.generation.wait_timeout(), Duration::from_secs(30));
        assert_eq!(config.generation.default_cache_ttl_secs, 7200);
        assert_eq!(config.generation.default_target_clients.len(), 4);
        assert_eq!(config.cache.idle_eviction_hours, 24);
        assert_eq!(config.cache.min_hits_to_keep, 2);
        assert_eq!(config.compiler.provider, CompilerProvider::Builtin);
        assert_eq!(config.compiler.validation_level, ValidationLevel::Soft);
        assert_eq!(config.compiler.fail_on, None);
        assert_eq!(config.performance.compression_level, CompressionLevel::Standard);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_env_override() {
        let config = Config::load_for_test(&[
            ("server.port", "9000"),
            ("logging.level", "debug"),
            ("compiler.fail_on", "high"),
            ("performance.compression_level", "aggressive"),
        ])
        .expect("Failed to load config");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.compiler.fail_on, Some(Severity::High));
        assert_eq!(
            config.performance.compression_level,
            CompressionLevel::Aggressive
        );
    }

    #[test]
    fn test_config_validation_zero_ceiling() {
        let config = Config::load_for_test(&[("generation.max_concurrent_generations", "0")])
            .expect("Failed to load config");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_concurrent_generations"));
    }

    #[test]
    fn test_config_validation_process_without_binary() {
        let config = Config::load_for_test(&[("compiler.provider", "process")])
            .expect("Failed to load config");
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("BINARY_PATH"));

        let config = Config::load_for_test(&[
            ("compiler.provider", "process"),
            ("compiler.binary_path", "/usr/local/bin/mjml"),
        ])
        .expect("Failed to load config");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_http_without_url() {
        let config = Config::load_for_test(&[("compiler.provider", "http")])
            .expect("Failed to load config");
        assert!(config.validate().unwrap_err().to_string().contains("API_URL"));
    }

    #[test]
    fn test_config_validation_port_zero() {
        let config =
            Config::load_for_test(&[("server.port", "0")]).expect("Failed to load config");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_socket_addr() {
        let config = Config::load_for_test(&[
            ("server.host", "127.0.0.1"),
            ("server.port", "3000"),
        ])
        .expect("Failed to load config");

        let addr = config.socket_addr().expect("valid address");
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }
}
