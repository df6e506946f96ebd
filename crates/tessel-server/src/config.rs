use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

/// Server settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = var_or("TESSEL_PORT", "3000")
            .parse()
            .context("TESSEL_PORT must be a port number")?;
        let token_ttl_days = var_or("TESSEL_TOKEN_TTL_DAYS", "30")
            .parse()
            .context("TESSEL_TOKEN_TTL_DAYS must be a whole number of days")?;

        Ok(Self {
            jwt_secret: var_or("TESSEL_JWT_SECRET", "dev-secret-change-me"),
            db_path: PathBuf::from(var_or("TESSEL_DB_PATH", "tessel.db")),
            host: var_or("TESSEL_HOST", "0.0.0.0"),
            port,
            token_ttl_days,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}
