use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub lifecycle: LifecycleConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidLogFormat(raw))?,
            Err(_) => LogFormat::default(),
        };

        let defaults = LifecycleConfig::default();
        let lifecycle = LifecycleConfig {
            cache_ttl_secs: numeric_var("APP_CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            cache_capacity: numeric_var("APP_CACHE_CAPACITY", defaults.cache_capacity)?,
            min_signature_bytes: numeric_var(
                "APP_MIN_SIGNATURE_BYTES",
                defaults.min_signature_bytes,
            )?,
            application_ttl_days: bounded_var(
                "APP_APPLICATION_TTL_DAYS",
                defaults.application_ttl_days,
                MAX_APPLICATION_TTL_DAYS,
            )?,
            auto_submit_on_payment: flag_var(
                "APP_AUTO_SUBMIT_ON_PAYMENT",
                defaults.auto_submit_on_payment,
            )?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            lifecycle,
        })
    }
}

fn numeric_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn bounded_var(name: &'static str, default: u32, max: u32) -> Result<u32, ConfigError> {
    let value = numeric_var(name, default)?;
    if value > max {
        return Err(ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn flag_var(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { name, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Line layout for the fmt subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "full" => Some(Self::Full),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Upper bound accepted for `APP_APPLICATION_TTL_DAYS`.
pub const MAX_APPLICATION_TTL_DAYS: u32 = 3650;

/// Knobs for the application lifecycle service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Lifetime of a cached status view.
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    /// Smallest accepted encoded signature image.
    pub min_signature_bytes: usize,
    /// Days between creation and the expiry deadline of a new application. Zero disables expiry.
    pub application_ttl_days: u32,
    /// Advance `pending_payment` through to `submitted` once the ledger reports paid.
    pub auto_submit_on_payment: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 30,
            cache_capacity: 256,
            min_signature_bytes: 64,
            application_ttl_days: 30,
            auto_submit_on_payment: true,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str, value: String },
    InvalidFlag { name: &'static str, value: String },
    InvalidLogFormat(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be a non-negative number in range (found '{value}')")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be true or false (found '{value}')")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be compact, full or pretty (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidFlag { .. }
            | ConfigError::InvalidLogFormat(_) => None,
        }
    }
}
