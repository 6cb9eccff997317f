// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `nakama.redb` | `./data` |
//! | `SESSION_SECRET` | HS256 key for session tokens (≥32 bytes) | Required unless built with `dev` |
//! | `SESSION_TTL_SECS` | Session lifetime | `86400` |
//! | `CHALLENGE_TTL_SECS` | Sign-in challenge lifetime | `300` |
//! | `APP_DOMAIN` | Domain named in the sign-in message | `nakama.app` |
//! | `CONFIRMATION_POLL_SECS` | Confirmation poller interval | `10` |
//! | `RPC_TIMEOUT_SECS` | Per-request blockchain RPC timeout | `15` |
//! | `<FAMILY>_RPC_URL` | RPC endpoint per chain (`SOLANA_RPC_URL`, `BASE_RPC_URL`, ...) | Public endpoint |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use ring::rand::{SecureRandom, SystemRandom};

use crate::auth::{AuthConfig, DEFAULT_CHALLENGE_TTL_SECS, DEFAULT_SESSION_TTL_SECS};
use crate::blockchain::confirm::DEFAULT_POLL_INTERVAL;
use crate::blockchain::ChainFamily;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
/// Directory for the redb database file.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const SESSION_SECRET_ENV: &str = "SESSION_SECRET";
pub const SESSION_TTL_ENV: &str = "SESSION_TTL_SECS";
pub const CHALLENGE_TTL_ENV: &str = "CHALLENGE_TTL_SECS";
pub const APP_DOMAIN_ENV: &str = "APP_DOMAIN";
pub const CONFIRMATION_POLL_ENV: &str = "CONFIRMATION_POLL_SECS";
pub const RPC_TIMEOUT_ENV: &str = "RPC_TIMEOUT_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_APP_DOMAIN: &str = "nakama.app";
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 15;

/// Shortest accepted session secret, in bytes.
pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    session_secret: Vec<u8>,
    /// No `SESSION_SECRET` was given and a random one was generated (`dev` builds).
    pub ephemeral_session_secret: bool,
    pub session_ttl_secs: u64,
    pub challenge_ttl_secs: u64,
    pub app_domain: String,
    pub confirmation_poll: Duration,
    pub rpc_timeout: Duration,
    pub rpc_urls: BTreeMap<ChainFamily, String>,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let (session_secret, ephemeral_session_secret) = match get(SESSION_SECRET_ENV) {
            Some(secret) if secret.len() < MIN_SECRET_BYTES => {
                return Err(ConfigError::Invalid {
                    name: SESSION_SECRET_ENV,
                    reason: format!("must be at least {MIN_SECRET_BYTES} bytes"),
                })
            }
            Some(secret) => (secret.into_bytes(), false),
            None if cfg!(feature = "dev") => (random_secret()?, true),
            None => return Err(ConfigError::Missing(SESSION_SECRET_ENV)),
        };

        let rpc_urls = ChainFamily::ALL
            .into_iter()
            .map(|family| {
                let caps = family.capabilities();
                let url = get(caps.rpc_url_env).unwrap_or_else(|| caps.default_rpc_url.to_string());
                (family, url)
            })
            .collect();

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    reason: format!("expected `json` or `pretty`, got `{other}`"),
                })
            }
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(get(PORT_ENV), PORT_ENV, 8080)?,
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            session_secret,
            ephemeral_session_secret,
            session_ttl_secs: positive(get(SESSION_TTL_ENV), SESSION_TTL_ENV, DEFAULT_SESSION_TTL_SECS as u64)?,
            challenge_ttl_secs: positive(
                get(CHALLENGE_TTL_ENV),
                CHALLENGE_TTL_ENV,
                DEFAULT_CHALLENGE_TTL_SECS as u64,
            )?,
            app_domain: get(APP_DOMAIN_ENV).unwrap_or_else(|| DEFAULT_APP_DOMAIN.to_string()),
            confirmation_poll: Duration::from_secs(positive(
                get(CONFIRMATION_POLL_ENV),
                CONFIRMATION_POLL_ENV,
                DEFAULT_POLL_INTERVAL.as_secs(),
            )?),
            rpc_timeout: Duration::from_secs(positive(
                get(RPC_TIMEOUT_ENV),
                RPC_TIMEOUT_ENV,
                DEFAULT_RPC_TIMEOUT_SECS,
            )?),
            rpc_urls,
            log_format,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("nakama.redb")
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(&self.session_secret, self.app_domain.clone())
            .with_session_ttl(chrono::Duration::seconds(self.session_ttl_secs as i64))
            .with_challenge_ttl(chrono::Duration::seconds(self.challenge_ttl_secs as i64))
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

fn positive(value: Option<String>, name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match parse_or(value, name, default)? {
        0 => Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_string(),
        }),
        n => Ok(n),
    }
}

fn random_secret() -> Result<Vec<u8>, ConfigError> {
    let mut secret = vec![0u8; MIN_SECRET_BYTES];
    SystemRandom::new()
        .fill(&mut secret)
        .map_err(|_| ConfigError::Invalid {
            name: SESSION_SECRET_ENV,
            reason: "system RNG unavailable".to_string(),
        })?;
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[(SESSION_SECRET_ENV, SECRET)]).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.database_path(), PathBuf::from("./data/nakama.redb"));
        assert_eq!(config.session_ttl_secs, 86_400);
        assert_eq!(config.challenge_ttl_secs, 300);
        assert_eq!(config.confirmation_poll, Duration::from_secs(10));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(!config.ephemeral_session_secret);
        assert_eq!(
            config.rpc_urls[&ChainFamily::Solana],
            "https://api.mainnet-beta.solana.com"
        );
        assert_eq!(config.auth_config().domain, "nakama.app");
    }

    #[test]
    fn overrides_are_read() {
        let config = load(&[
            (SESSION_SECRET_ENV, SECRET),
            (PORT_ENV, "9000"),
            (CHALLENGE_TTL_ENV, "60"),
            (LOG_FORMAT_ENV, "json"),
            ("BASE_RPC_URL", "http://localhost:8545"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.auth_config().challenge_ttl, chrono::Duration::seconds(60));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.rpc_urls[&ChainFamily::Base], "http://localhost:8545");
    }

    #[test]
    fn invalid_values_fail() {
        assert!(matches!(
            load(&[(SESSION_SECRET_ENV, SECRET), (PORT_ENV, "eighty")]),
            Err(ConfigError::Invalid { name: PORT_ENV, .. })
        ));
        assert!(matches!(
            load(&[(SESSION_SECRET_ENV, SECRET), (SESSION_TTL_ENV, "0")]),
            Err(ConfigError::Invalid { name: SESSION_TTL_ENV, .. })
        ));
        assert!(matches!(
            load(&[(SESSION_SECRET_ENV, "short")]),
            Err(ConfigError::Invalid { name: SESSION_SECRET_ENV, .. })
        ));
        assert!(matches!(
            load(&[(SESSION_SECRET_ENV, SECRET), (LOG_FORMAT_ENV, "xml")]),
            Err(ConfigError::Invalid { name: LOG_FORMAT_ENV, .. })
        ));
    }

    #[test]
    fn missing_secret_depends_on_build() {
        let result = load(&[]);
        if cfg!(feature = "dev") {
            assert!(result.unwrap().ephemeral_session_secret);
        } else {
            assert!(matches!(result, Err(ConfigError::Missing(SESSION_SECRET_ENV))));
        }
    }
}
