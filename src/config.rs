// src/config.rs — Service settings read from the environment (after dotenv).

use std::net::{IpAddr, SocketAddr};

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_JWT_SECRET: &str = "secret123";
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60; // One day, like the login tokens it replaces

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr:          SocketAddr,
    pub jwt_secret:         String,
    pub token_ttl_secs:     i64,
    /// Refuse `receiver-join` without a token.
    pub require_credential: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key → value source. Missing keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host: IpAddr = parse(&lookup, "HOST", "IP address")?
            .unwrap_or(IpAddr::from([0, 0, 0, 0]));
        let port: u16 = parse(&lookup, "PORT", "port number")?.unwrap_or(DEFAULT_PORT);
        let token_ttl_secs: i64 = parse(&lookup, "TOKEN_TTL_SECS", "number of seconds")?
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        let require_credential: bool = parse(&lookup, "REQUIRE_CREDENTIAL", "boolean")?
            .unwrap_or(false);

        if token_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                var:      "TOKEN_TTL_SECS",
                expected: "positive number of seconds",
                value:    token_ttl_secs.to_string(),
            });
        }

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_JWT_SECRET.to_owned());

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            jwt_secret,
            token_ttl_secs,
            require_credential,
        })
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

fn parse<T, F>(lookup: &F, var: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value: raw,
        }),
    }
}
