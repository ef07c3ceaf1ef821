use serde::Deserialize;
use service_core::config::{self as core_config, get_env, parse_env};
use service_core::error::AppError;
use std::time::Duration;

pub use core_config::Environment;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionServiceConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreBackend,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    /// Process-local; single instance only.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid session store backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Users are read from Postgres when set; otherwise an empty in-memory
    /// directory is used (development only).
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub access_token_expiry_minutes: i64,
}

/// Every TTL and threshold the session subsystem uses.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub session_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
    /// How long the immediately preceding refresh generation stays
    /// redeemable (once) after a rotation.
    pub grace_window_seconds: u64,
    pub lock_ttl_ms: u64,
    pub lock_max_retries: u32,
    pub lock_backoff_ms: u64,
    pub audit_retention_days: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: 7 * 24 * 3600,
            refresh_token_ttl_seconds: 7 * 24 * 3600,
            grace_window_seconds: 5,
            lock_ttl_ms: 5_000,
            lock_max_retries: 5,
            lock_backoff_ms: 25,
            audit_retention_days: 90,
        }
    }
}

impl SessionConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_seconds)
    }

    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_seconds)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn lock_backoff(&self) -> Duration {
        Duration::from_millis(self.lock_backoff_ms)
    }

    pub fn audit_retention(&self) -> Duration {
        Duration::from_secs(self.audit_retention_days * 24 * 3600)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl SessionServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let environment = Environment::from_env()?;
        let is_prod = environment.is_prod();

        let config = SessionServiceConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("session-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: std::env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            store: get_env("SESSION_STORE", Some("redis"), is_prod)?
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("5"), false)?,
            },
            jwt: JwtConfig {
                secret: get_env(
                    "JWT_SECRET",
                    Some("dev-only-secret-change-me-0123456789abcdef"),
                    is_prod,
                )?,
                issuer: get_env("JWT_ISSUER", Some("session-service"), is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
            },
            session: SessionConfig {
                session_ttl_seconds: parse_env("SESSION_TTL_SECONDS", Some("604800"), is_prod)?,
                refresh_token_ttl_seconds: parse_env(
                    "REFRESH_TOKEN_TTL_SECONDS",
                    Some("604800"),
                    is_prod,
                )?,
                grace_window_seconds: parse_env(
                    "REFRESH_GRACE_WINDOW_SECONDS",
                    Some("5"),
                    is_prod,
                )?,
                lock_ttl_ms: parse_env("LOCK_TTL_MS", Some("5000"), is_prod)?,
                lock_max_retries: parse_env("LOCK_MAX_RETRIES", Some("5"), is_prod)?,
                lock_backoff_ms: parse_env("LOCK_BACKOFF_MS", Some("25"), is_prod)?,
                audit_retention_days: parse_env("AUDIT_RETENTION_DAYS", Some("90"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("5"), is_prod)?,
                login_window_seconds: parse_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(config_error(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive",
            ));
        }

        if self.jwt.secret.len() < 32 {
            return Err(config_error("JWT_SECRET must be at least 32 bytes"));
        }

        let session = &self.session;
        if session.session_ttl_seconds == 0 || session.refresh_token_ttl_seconds == 0 {
            return Err(config_error("Session and refresh token TTLs must be positive"));
        }

        if session.grace_window_seconds >= session.refresh_token_ttl_seconds {
            return Err(config_error(
                "REFRESH_GRACE_WINDOW_SECONDS must be shorter than REFRESH_TOKEN_TTL_SECONDS",
            ));
        }

        if session.lock_ttl_ms == 0 {
            return Err(config_error("LOCK_TTL_MS must be positive"));
        }

        if session.audit_retention_days == 0 {
            return Err(config_error("AUDIT_RETENTION_DAYS must be positive"));
        }

        // In production, ensure stricter validation
        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }

            if self.store == StoreBackend::Memory {
                return Err(config_error(
                    "SESSION_STORE=memory is single-instance only and not allowed in production",
                ));
            }
        }

        Ok(())
    }
}

fn config_error(msg: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION_VARS: [&str; 5] = [
        "ENVIRONMENT",
        "SESSION_STORE",
        "REFRESH_GRACE_WINDOW_SECONDS",
        "REFRESH_TOKEN_TTL_SECONDS",
        "ALLOWED_ORIGINS",
    ];

    fn unset_all() -> Vec<(&'static str, Option<&'static str>)> {
        SESSION_VARS.iter().map(|k| (*k, None)).collect()
    }

    #[test]
    fn defaults_load_in_dev() {
        temp_env::with_vars(unset_all(), || {
            let config = SessionServiceConfig::from_env().expect("dev defaults should load");

            assert_eq!(config.environment, Environment::Dev);
            assert_eq!(config.store, StoreBackend::Redis);
            assert_eq!(config.session.grace_window(), Duration::from_secs(5));
            assert_eq!(config.session.audit_retention_days, 90);
        });
    }

    #[test]
    fn grace_window_must_be_shorter_than_refresh_ttl() {
        let vars = [
            ("ENVIRONMENT", None),
            ("SESSION_STORE", None),
            ("ALLOWED_ORIGINS", None),
            ("REFRESH_GRACE_WINDOW_SECONDS", Some("60")),
            ("REFRESH_TOKEN_TTL_SECONDS", Some("60")),
        ];

        temp_env::with_vars(vars, || {
            let err = SessionServiceConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("REFRESH_GRACE_WINDOW_SECONDS"));
        });
    }

    #[test]
    fn memory_store_is_rejected_in_prod() {
        let mut config = temp_env::with_vars(unset_all(), || {
            SessionServiceConfig::from_env().expect("dev defaults should load")
        });
        config.environment = Environment::Prod;
        config.store = StoreBackend::Memory;

        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_store_backend_fails() {
        let vars = [("ENVIRONMENT", None), ("SESSION_STORE", Some("memcached"))];

        temp_env::with_vars(vars, || {
            assert!(SessionServiceConfig::from_env().is_err());
        });
    }
}
