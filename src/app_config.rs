// Centralized configuration management for the convênio backend
// Load ALL env vars ONCE at startup into a single immutable struct

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Global application configuration loaded once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    #[cfg(test)]
    dotenv::dotenv().ok();

    AppConfig::from_env().expect("Failed to load configuration")
});

pub fn config() -> &'static AppConfig {
    &CONFIG
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Server
    pub bind_address: String,
    pub environment: Environment,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_min_connections: u32,
    pub database_connect_timeout: u64,
    pub database_idle_timeout: u64,
    pub database_max_lifetime: u64,

    // Redis
    pub redis_url: String,
    pub redis_pool_size: usize,

    // JWT
    pub jwt: JwtConfig,
    pub jti_hash_salt: Option<String>,

    // Payment gateway
    pub payment_gateway: PaymentGatewayConfig,

    // Security / rate limiting
    pub security: SecurityConfig,

    // Expiry sweeper
    pub expiry_sweep_hour: u32,

    // Features
    pub enable_rate_limiting: bool,
}

/// Environment type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl From<String> for Environment {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    /// Access token lifetime in seconds (default 15 minutes)
    pub access_expiry: u64,
    /// Refresh token lifetime in seconds (default 7 days)
    pub refresh_expiry: u64,
    pub audience: String,
    pub issuer: String,
}

/// Payment gateway (Mercado Pago style) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentGatewayConfig {
    pub base_url: String,
    pub access_token: String,
    pub sandbox: bool,
    /// Public URL the gateway calls back on payment events
    pub notification_url: String,
    /// Where the hosted checkout sends the payer afterwards
    pub back_url_success: String,
    pub back_url_failure: String,
    pub back_url_pending: String,
    /// Outbound request timeout in seconds
    pub request_timeout: u64,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub login_rate_limit_per_ip: u32,
    pub login_rate_window_seconds: u64,
    pub track_click_rate_limit: u32,
    pub track_click_rate_window_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Ok(AppConfig {
            bind_address: get_env_or("BIND_ADDRESS", "0.0.0.0:8080"),
            environment: Environment::from(get_env_or("ENVIRONMENT", "development")),

            database_url: get_env_required("DATABASE_URL")?,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
            database_min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 2)?,
            database_connect_timeout: parse_env("DATABASE_CONNECT_TIMEOUT", 10)?,
            database_idle_timeout: parse_env("DATABASE_IDLE_TIMEOUT", 300)?,
            database_max_lifetime: parse_env("DATABASE_MAX_LIFETIME", 1800)?,

            redis_url: get_env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            redis_pool_size: parse_env("REDIS_POOL_SIZE", 16)?,

            jwt: JwtConfig {
                access_secret: get_env_required("JWT_ACCESS_SECRET")?,
                refresh_secret: get_env_required("JWT_REFRESH_SECRET")?,
                access_expiry: parse_env("JWT_ACCESS_EXPIRY", 900)?,
                refresh_expiry: parse_env("JWT_REFRESH_EXPIRY", 604_800)?,
                audience: get_env_or("JWT_AUDIENCE", "convenio.app"),
                issuer: get_env_or("JWT_ISSUER", "convenio.app"),
            },
            jti_hash_salt: env::var("JTI_HASH_SALT").ok(),

            payment_gateway: PaymentGatewayConfig {
                base_url: get_env_or("PAYMENT_GATEWAY_URL", "https://api.mercadopago.com"),
                access_token: get_env_required("PAYMENT_GATEWAY_ACCESS_TOKEN")?,
                sandbox: parse_env("PAYMENT_GATEWAY_SANDBOX", true)?,
                notification_url: get_env_or(
                    "PAYMENT_NOTIFICATION_URL",
                    "https://localhost/api/webhooks/payment-success",
                ),
                back_url_success: get_env_or("PAYMENT_BACK_URL_SUCCESS", "https://localhost/pagamento/sucesso"),
                back_url_failure: get_env_or("PAYMENT_BACK_URL_FAILURE", "https://localhost/pagamento/erro"),
                back_url_pending: get_env_or("PAYMENT_BACK_URL_PENDING", "https://localhost/pagamento/pendente"),
                request_timeout: parse_env("PAYMENT_GATEWAY_TIMEOUT", 10)?,
            },

            security: SecurityConfig {
                login_rate_limit_per_ip: parse_env("LOGIN_RATE_LIMIT_PER_IP", 10)?,
                login_rate_window_seconds: parse_env("LOGIN_RATE_WINDOW_SECONDS", 60)?,
                track_click_rate_limit: parse_env("TRACK_CLICK_RATE_LIMIT", 30)?,
                track_click_rate_window_seconds: parse_env("TRACK_CLICK_RATE_WINDOW_SECONDS", 60)?,
            },

            expiry_sweep_hour: parse_env("EXPIRY_SWEEP_HOUR", 3)?,

            enable_rate_limiting: parse_env("ENABLE_RATE_LIMITING", true)?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), v)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(Environment::from("prod".to_string()), Environment::Production);
        assert_eq!(Environment::from("staging".to_string()), Environment::Staging);
        assert_eq!(Environment::from("anything".to_string()), Environment::Development);
    }

    #[test]
    fn test_parse_env_defaults() {
        std::env::remove_var("THIS_VAR_DOES_NOT_EXIST");
        let v: u64 = parse_env("THIS_VAR_DOES_NOT_EXIST", 42).unwrap();
        assert_eq!(v, 42);
    }
}
