//! Server configuration from the process environment.
//!
//! `ServerConfig::from_env` reads the variables below; a `.env` file in
//! the working directory is loaded first by the binaries.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` | `ws://127.0.0.1:8000` |
//! | `DATABASE_NAMESPACE` / `DATABASE_NAME` | `clinic` / `main` |
//! | `DATABASE_USER` / `DATABASE_PASSWORD` | `root` / `root` |
//! | `SECRET_KEY` | required unless `ENVIRONMENT=development` |
//! | `ACCESS_TOKEN_EXPIRE_MINUTES` | `10080` |
//! | `ALLOWED_ORIGINS` | empty (no cross-origin access) |
//! | `BIND_ADDR` | `0.0.0.0:8080` |
//! | `REQUEST_TIMEOUT_SECS` | `30` |
//! | `AUDIT_QUEUE_CAPACITY` | `1024` |
//! | `TRUSTED_PROXIES` | empty (`X-Forwarded-For` ignored) |

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use clinic_audit::AuditConfig;
use clinic_auth::AuthConfig;
use clinic_auth::config::MIN_SECRET_KEY_LEN;
use clinic_auth::token::generate_password;
use clinic_db::DbConfig;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub environment: String,
    pub bind_addr: SocketAddr,
    pub allowed_origins: Vec<String>,
    pub request_timeout: Duration,
    /// Reverse proxies allowed to report the client address.
    pub trusted_proxies: Vec<IpAddr>,
    pub db: DbConfig,
    pub auth: AuthConfig,
    pub audit: AuditConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = var("ENVIRONMENT").unwrap_or_else(|| "production".into());
        let development = environment.eq_ignore_ascii_case("development");

        let secret_key = match var("SECRET_KEY") {
            Some(key) if key.len() >= MIN_SECRET_KEY_LEN => key,
            Some(_) if !development => {
                return Err(ConfigError::Invalid {
                    key: "SECRET_KEY",
                    reason: format!("must be at least {MIN_SECRET_KEY_LEN} bytes"),
                });
            }
            None if !development => return Err(ConfigError::Missing("SECRET_KEY")),
            _ => {
                warn!("SECRET_KEY unset or short; using an ephemeral development key");
                generate_password(48)
            }
        };

        let defaults = DbConfig::default();
        let db = DbConfig {
            url: var("DATABASE_URL").unwrap_or(defaults.url),
            namespace: var("DATABASE_NAMESPACE").unwrap_or(defaults.namespace),
            database: var("DATABASE_NAME").unwrap_or(defaults.database),
            username: var("DATABASE_USER").or(defaults.username),
            password: var("DATABASE_PASSWORD").or(defaults.password),
        };

        let mut auth = AuthConfig {
            secret_key,
            ..Default::default()
        };
        if let Some(minutes) = parse::<u64>(&var, "ACCESS_TOKEN_EXPIRE_MINUTES")? {
            if minutes == 0 {
                return Err(ConfigError::Invalid {
                    key: "ACCESS_TOKEN_EXPIRE_MINUTES",
                    reason: "must be positive".into(),
                });
            }
            auth.access_token_lifetime_secs = minutes * 60;
        }

        let mut audit = AuditConfig::default();
        if let Some(capacity) = parse::<usize>(&var, "AUDIT_QUEUE_CAPACITY")? {
            audit.queue_capacity = capacity;
        }

        let bind_addr = parse::<SocketAddr>(&var, "BIND_ADDR")?
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));
        let request_timeout =
            Duration::from_secs(parse::<u64>(&var, "REQUEST_TIMEOUT_SECS")?.unwrap_or(30));
        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let trusted_proxies = var("TRUSTED_PROXIES")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| {
                        p.parse::<IpAddr>().map_err(|e| ConfigError::Invalid {
                            key: "TRUSTED_PROXIES",
                            reason: format!("{p}: {e}"),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            environment,
            bind_addr,
            allowed_origins,
            request_timeout,
            trusted_proxies,
            db,
            auth,
            audit,
        })
    }
}

fn parse<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            })
        })
        .transpose()
}
