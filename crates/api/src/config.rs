use chrono_tz::Tz;
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    /// Email delivery configuration
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Where schedules and run history live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// Process-local storage for development and tests.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    /// JSON fixture file served as report data by the memory backend.
    #[serde(default)]
    pub fixtures_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            fixtures_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Whether the clock-driven dispatcher runs in this process
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between polls for due schedules
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Schedules processed in parallel per tick
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Upper bound for one mail transport round-trip
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Seconds after which an unfinished claim may be taken over
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: i64,

    /// IANA time zone scheduled times are interpreted in
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Run history older than this is purged daily
    #[serde(default = "default_run_retention_days")]
    pub run_retention_days: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
            max_concurrency: default_max_concurrency(),
            send_timeout_secs: default_send_timeout(),
            claim_lease_secs: default_claim_lease(),
            timezone: default_timezone(),
            run_retention_days: default_run_retention_days(),
        }
    }
}

impl DispatcherConfig {
    /// Parsed time zone. Falls back to UTC for names rejected by `validate`.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportsConfig {
    /// Shown in the header of rendered documents
    #[serde(default = "default_organization_name")]
    pub organization_name: String,

    /// Itemized rows beyond this are omitted with a note
    #[serde(default = "default_max_itemized_rows")]
    pub max_itemized_rows: usize,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            organization_name: default_organization_name(),
            max_itemized_rows: default_max_itemized_rows(),
        }
    }
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
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_storage_backend() -> StorageBackend {
    StorageBackend::Postgres
}
fn default_true() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    60
}
fn default_max_concurrency() -> usize {
    4
}
fn default_send_timeout() -> u64 {
    30
}
fn default_claim_lease() -> i64 {
    domain::services::DEFAULT_CLAIM_LEASE_SECS
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_run_retention_days() -> i64 {
    90
}
fn default_organization_name() -> String {
    "Asset Console".to_string()
}
fn default_max_itemized_rows() -> usize {
    5000
}

/// Email delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Whether email sending is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Email provider: smtp, sendgrid, or console (for development)
    #[serde(default = "default_email_provider")]
    pub provider: String,

    /// SMTP server host (for smtp provider)
    #[serde(default)]
    pub smtp_host: String,

    /// SMTP server port (for smtp provider)
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// SMTP username (for smtp provider)
    #[serde(default)]
    pub smtp_username: String,

    /// SMTP password (for smtp provider)
    #[serde(default)]
    pub smtp_password: String,

    /// Whether to use STARTTLS for SMTP (default: true)
    #[serde(default = "default_smtp_tls")]
    pub smtp_use_tls: bool,

    /// SendGrid API key (for sendgrid provider)
    #[serde(default)]
    pub sendgrid_api_key: String,

    /// Sender email address (From header)
    #[serde(default = "default_sender_email")]
    pub sender_email: String,

    /// Sender name (From header)
    #[serde(default = "default_sender_name")]
    pub sender_name: String,

    /// Prepended to every report subject
    #[serde(default)]
    pub subject_prefix: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_email_provider(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_use_tls: default_smtp_tls(),
            sendgrid_api_key: String::new(),
            sender_email: default_sender_email(),
            sender_name: default_sender_name(),
            subject_prefix: String::new(),
        }
    }
}

fn default_email_provider() -> String {
    "console".to_string() // Default to console logging for development
}

fn default_smtp_port() -> u16 {
    587 // TLS submission port
}

fn default_smtp_tls() -> bool {
    true
}

fn default_sender_email() -> String {
    "reports@assetconsole.app".to_string()
}

fn default_sender_name() -> String {
    "Asset Console Reports".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Defaults used by `load_for_test`, mirroring config/default.toml.
#[cfg(test)]
const TEST_DEFAULTS: &str = r#"
    [server]
    host = "0.0.0.0"
    port = 8080
    request_timeout_secs = 60

    [database]
    url = ""
    max_connections = 20
    min_connections = 5
    connect_timeout_secs = 10
    idle_timeout_secs = 600

    [logging]
    level = "info"
    format = "json"

    [storage]
    backend = "memory"

    [dispatcher]
    enabled = false
    poll_interval_secs = 60
    max_concurrency = 4
    send_timeout_secs = 30
    claim_lease_secs = 900
    timezone = "UTC"
    run_retention_days = 90

    [email]
    enabled = false
    provider = "console"
    sender_email = "test@example.com"
    sender_name = "Test"

    [reports]
    organization_name = "Test Org"
    max_itemized_rows = 100
"#;

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with RS__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("RS").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Built entirely from embedded defaults plus overrides, without config
    /// files. Validation is skipped so tests can build partial configs.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(TEST_DEFAULTS, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.storage.backend == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "RS__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        let dispatcher = &self.dispatcher;
        if dispatcher.poll_interval_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatcher.poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if dispatcher.max_concurrency == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatcher.max_concurrency must be greater than 0".to_string(),
            ));
        }
        if dispatcher.send_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatcher.send_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.server.request_timeout_secs <= dispatcher.send_timeout_secs {
            return Err(ConfigValidationError::InvalidValue(format!(
                "server.request_timeout_secs ({}) must exceed dispatcher.send_timeout_secs ({})",
                self.server.request_timeout_secs, dispatcher.send_timeout_secs
            )));
        }
        if dispatcher.claim_lease_secs <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatcher.claim_lease_secs must be greater than 0".to_string(),
            ));
        }
        if dispatcher.timezone.parse::<Tz>().is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "dispatcher.timezone '{}' is not a known IANA time zone",
                dispatcher.timezone
            )));
        }

        if self.reports.max_itemized_rows == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "reports.max_itemized_rows must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigValidationError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                ConfigValidationError::InvalidValue(format!("Invalid socket address: {}", e))
            })
    }
}
