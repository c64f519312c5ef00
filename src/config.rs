//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `JWT_SECRET` - token signing secret (min 32 chars)
//!
//! ## Optional
//! - `DATABASE_URL` - PostgreSQL connection string; the in-memory store is used when unset
//! - `HOST` - bind address (default: 0.0.0.0)
//! - `PORT` - listen port (default: 8083)
//! - `JWT_TTL_HOURS` - access token lifetime (default: 24)
//! - `BCRYPT_COST` - password hashing cost, 4..=31 (default: 12)
//! - `NATS_URL` - event bus; events are only logged when unset
//! - `BACKEND_URL` - public URL of this API, used for gateway callbacks (default: http://localhost:8083)
//! - `FRONTEND_URL` - where gateway callbacks redirect to (default: http://localhost:3000)
//! - `CURRENCY` - deposit currency (default: BDT)
//! - `SSLCOMMERZ_STORE_ID`, `SSLCOMMERZ_STORE_PASSWORD` - gateway credentials; deposits are
//!   rejected when either is missing
//! - `SSLCOMMERZ_SANDBOX` - use the sandbox gateway (default: true)

use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<SecretString>,
    pub host: IpAddr,
    pub port: u16,
    pub jwt_secret: SecretString,
    pub jwt_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub nats_url: Option<String>,
    pub backend_url: String,
    pub frontend_url: String,
    pub currency: String,
    pub gateway: Option<SslCommerzConfig>,
}

/// Hosted payment page credentials.
#[derive(Debug, Clone)]
pub struct SslCommerzConfig {
    pub store_id: String,
    pub store_password: SecretString,
    pub sandbox: bool,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first
    /// when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("JWT_SECRET").ok_or_else(|| ConfigError::MissingEnvVar("JWT_SECRET".into()))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::InvalidEnvVar(
                "JWT_SECRET".into(),
                format!("must be at least {MIN_JWT_SECRET_LENGTH} characters"),
            ));
        }

        let bcrypt_cost: u32 = parse_or("BCRYPT_COST", get("BCRYPT_COST"), 12)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidEnvVar("BCRYPT_COST".into(), "must be between 4 and 31".into()));
        }

        let jwt_ttl_hours: i64 = parse_or("JWT_TTL_HOURS", get("JWT_TTL_HOURS"), 24)?;
        if jwt_ttl_hours <= 0 {
            return Err(ConfigError::InvalidEnvVar("JWT_TTL_HOURS".into(), "must be positive".into()));
        }

        let gateway = match (get("SSLCOMMERZ_STORE_ID"), get("SSLCOMMERZ_STORE_PASSWORD")) {
            (Some(store_id), Some(password)) => Some(SslCommerzConfig {
                store_id,
                store_password: SecretString::from(password),
                sandbox: parse_bool("SSLCOMMERZ_SANDBOX", get("SSLCOMMERZ_SANDBOX"), true)?,
            }),
            _ => None,
        };

        Ok(Self {
            database_url: get("DATABASE_URL").map(SecretString::from),
            host: parse_or("HOST", get("HOST"), IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or("PORT", get("PORT"), 8083)?,
            jwt_secret: SecretString::from(jwt_secret),
            jwt_ttl_hours,
            bcrypt_cost,
            nats_url: get("NATS_URL"),
            backend_url: trim_slash(get("BACKEND_URL").unwrap_or_else(|| "http://localhost:8083".into())),
            frontend_url: trim_slash(get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".into())),
            currency: get("CURRENCY").unwrap_or_else(|| "BDT".into()),
            gateway,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.into(), e.to_string())),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidEnvVar(key.into(), format!("not a boolean: {other}"))),
    }
}

fn trim_slash(url: String) -> String { url.trim_end_matches('/').to_string() }

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("JWT_SECRET", SECRET)]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.port, 8083);
        assert_eq!(config.bcrypt_cost, 12);
        assert_eq!(config.currency, "BDT");
        assert!(config.gateway.is_none());
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8083");
    }

    #[test]
    fn test_jwt_secret_is_required_and_long() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingEnvVar(k)) if k == "JWT_SECRET"));
        assert!(matches!(load(&[("JWT_SECRET", "short")]), Err(ConfigError::InvalidEnvVar(k, _)) if k == "JWT_SECRET"));
    }

    #[test]
    fn test_gateway_needs_both_credentials() {
        let config = load(&[("JWT_SECRET", SECRET), ("SSLCOMMERZ_STORE_ID", "store")]).unwrap();
        assert!(config.gateway.is_none());

        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("SSLCOMMERZ_STORE_ID", "store"),
            ("SSLCOMMERZ_STORE_PASSWORD", "pw"),
            ("SSLCOMMERZ_SANDBOX", "false"),
        ])
        .unwrap();
        let gateway = config.gateway.unwrap();
        assert_eq!(gateway.store_id, "store");
        assert_eq!(gateway.store_password.expose_secret(), "pw");
        assert!(!gateway.sandbox);
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("JWT_SECRET", SECRET), ("PORT", "http")]).is_err());
        assert!(load(&[("JWT_SECRET", SECRET), ("BCRYPT_COST", "2")]).is_err());
        assert!(load(&[("JWT_SECRET", SECRET), ("SSLCOMMERZ_STORE_ID", "s"), ("SSLCOMMERZ_STORE_PASSWORD", "p"), ("SSLCOMMERZ_SANDBOX", "maybe")]).is_err());
    }

    #[test]
    fn test_urls_lose_trailing_slash() {
        let config = load(&[("JWT_SECRET", SECRET), ("FRONTEND_URL", "https://shop.example/")]).unwrap();
        assert_eq!(config.frontend_url, "https://shop.example");
    }
}
