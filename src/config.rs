// Configuration loaded from environment variables

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{clock::Clock, error::AuthError, password::PasswordHasher, token::TokenService};
use crate::rate_limit::{RateLimitRule, RateLimiter};

/// Prefix applied to rate limit route names given without a leading slash
const AUTH_ROUTE_PREFIX: &str = "/api/auth/";

/// Credential, token and rate limit settings
#[derive(Clone)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub password_hash_work_factor: u32,
    pub password_hash_memory_kib: u32,
    pub min_password_length: usize,
    pub rotate_refresh_tokens: bool,
    /// Budgets keyed by full route path
    pub rate_limits: HashMap<String, RateLimitRule>,
    pub rate_limit_sweep_interval: Duration,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("password_hash_work_factor", &self.password_hash_work_factor)
            .field("password_hash_memory_kib", &self.password_hash_memory_kib)
            .field("min_password_length", &self.min_password_length)
            .field("rotate_refresh_tokens", &self.rotate_refresh_tokens)
            .field("rate_limits", &self.rate_limits)
            .field("rate_limit_sweep_interval", &self.rate_limit_sweep_interval)
            .finish()
    }
}

/// Listener and database settings for the server binary
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Without a database URL the server runs on the in-memory store
    pub database_url: Option<String>,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            host: lookup("HOST").unwrap_or_else(default_host),
            port: parse_or(&lookup, "PORT", default_port())?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
        })
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_access_token_ttl_secs() -> u64 {
    900 // 15 minutes
}

fn default_refresh_token_ttl_secs() -> u64 {
    604800 // 7 days
}

fn default_work_factor() -> u32 {
    2
}

fn default_memory_kib() -> u32 {
    19456
}

fn default_min_password_length() -> usize {
    8
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Default budgets for the public auth routes
pub fn default_rate_limits() -> HashMap<String, RateLimitRule> {
    HashMap::from([
        (
            "/api/auth/login".to_string(),
            RateLimitRule::new(5, Duration::from_secs(60)),
        ),
        (
            "/api/auth/register".to_string(),
            RateLimitRule::new(5, Duration::from_secs(3600)),
        ),
        (
            "/api/auth/refresh".to_string(),
            RateLimitRule::new(20, Duration::from_secs(60)),
        ),
    ])
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        None => Ok(default),
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingVar(key))
}

/// Parse `RATE_LIMITS`, e.g. `login=5/60;register=5/3600;/api/auth/refresh=20/60`
///
/// Names without a leading slash are taken as auth routes. Entries override
/// the defaults one route at a time.
pub fn parse_rate_limits(raw: &str) -> Result<HashMap<String, RateLimitRule>, ConfigError> {
    let invalid = |entry: &str| ConfigError::InvalidValue("RATE_LIMITS", entry.to_string());
    let mut rules = HashMap::new();

    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (route, budget) = entry.split_once('=').ok_or_else(|| invalid(entry))?;
        let (max, secs) = budget.split_once('/').ok_or_else(|| invalid(entry))?;

        let route = route.trim();
        if route.is_empty() {
            return Err(invalid(entry));
        }
        let max_requests: u32 = max.trim().parse().map_err(|_| invalid(entry))?;
        let window_secs: u64 = secs.trim().parse().map_err(|_| invalid(entry))?;
        if window_secs == 0 {
            return Err(invalid(entry));
        }

        let route = if route.starts_with('/') {
            route.to_string()
        } else {
            format!("{}{}", AUTH_ROUTE_PREFIX, route)
        };
        rules.insert(
            route,
            RateLimitRule::new(max_requests, Duration::from_secs(window_secs)),
        );
    }

    Ok(rules)
}

impl AuthConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a signing secret is missing or any value is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut rate_limits = default_rate_limits();
        if let Some(raw) = lookup("RATE_LIMITS") {
            rate_limits.extend(parse_rate_limits(&raw)?);
        }

        let config = Self {
            access_secret: required(&lookup, "JWT_ACCESS_SECRET")?,
            refresh_secret: required(&lookup, "JWT_REFRESH_SECRET")?,
            access_token_ttl: Duration::from_secs(parse_or(
                &lookup,
                "ACCESS_TOKEN_TTL_SECS",
                default_access_token_ttl_secs(),
            )?),
            refresh_token_ttl: Duration::from_secs(parse_or(
                &lookup,
                "REFRESH_TOKEN_TTL_SECS",
                default_refresh_token_ttl_secs(),
            )?),
            password_hash_work_factor: parse_or(
                &lookup,
                "PASSWORD_HASH_WORK_FACTOR",
                default_work_factor(),
            )?,
            password_hash_memory_kib: parse_or(
                &lookup,
                "PASSWORD_HASH_MEMORY_KIB",
                default_memory_kib(),
            )?,
            min_password_length: parse_or(
                &lookup,
                "MIN_PASSWORD_LENGTH",
                default_min_password_length(),
            )?,
            rotate_refresh_tokens: parse_or(&lookup, "ROTATE_REFRESH_TOKENS", true)?,
            rate_limits,
            rate_limit_sweep_interval: Duration::from_secs(parse_or(
                &lookup,
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                default_sweep_interval_secs(),
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the core cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::InvalidValue(
                "JWT_REFRESH_SECRET",
                "must differ from JWT_ACCESS_SECRET".to_string(),
            ));
        }
        if self.access_token_ttl.is_zero() {
            return Err(ConfigError::InvalidValue("ACCESS_TOKEN_TTL_SECS", "0".to_string()));
        }
        if self.refresh_token_ttl.is_zero() {
            return Err(ConfigError::InvalidValue("REFRESH_TOKEN_TTL_SECS", "0".to_string()));
        }
        if self.password_hash_work_factor == 0 {
            return Err(ConfigError::InvalidValue(
                "PASSWORD_HASH_WORK_FACTOR",
                "0".to_string(),
            ));
        }
        if self.min_password_length == 0 {
            return Err(ConfigError::InvalidValue("MIN_PASSWORD_LENGTH", "0".to_string()));
        }
        if self.rate_limit_sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                "0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn password_hasher(&self) -> Result<PasswordHasher, ConfigError> {
        PasswordHasher::new(
            self.password_hash_work_factor,
            self.password_hash_memory_kib,
            self.min_password_length,
        )
        .map_err(ConfigError::from)
    }

    pub fn token_service(&self, clock: Arc<dyn Clock>) -> Result<TokenService, ConfigError> {
        TokenService::new(
            &self.access_secret,
            &self.refresh_secret,
            self.access_token_ttl,
            self.refresh_token_ttl,
            clock,
        )
        .map_err(ConfigError::from)
    }

    /// Build the limiter and start its background sweep
    ///
    /// Must be called inside a tokio runtime.
    pub fn rate_limiter(&self, clock: Arc<dyn Clock>) -> Arc<RateLimiter> {
        RateLimiter::spawn(clock, self.rate_limits.clone(), self.rate_limit_sweep_interval)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid auth settings: {0}")]
    Auth(#[from] AuthError),
}
