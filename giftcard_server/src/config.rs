//! Environment-driven configuration.
//!
//! All options are read from environment variables with the `GCB_` prefix; a `.env` file is
//! honoured via `dotenvy` in the binaries. Missing values fall back to development defaults with
//! a log line, so a bare `cargo run` against local services works out of the box.

use std::{env, fmt::Display, str::FromStr, time::Duration};

use gc_common::{parse_boolean_flag, Sats, Secret};
use giftcard_engine::{
    cache::redis_url,
    node::{Network, NodeConfig},
    PoolSettings,
};
use log::*;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub node: NodeConfig,
    /// Which spot-price source funds cards: "coinbase", "coingecko" or "bitstamp".
    pub oracle_provider: String,
    /// Confirmations required before an on-chain redemption is considered settled.
    pub confirmation_target: i32,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub database: String,
    pub ssl_mode: String,
    pub pool: PoolSettings,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user,
            self.password.reveal(),
            self.host,
            self.port,
            self.database,
            self.ssl_mode
        )
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Secret<String>,
    pub db: i64,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        let password = self.password.reveal();
        redis_url(&self.host, self.port, (!password.is_empty()).then_some(password.as_str()), self.db)
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let host = env_or("GCB_HOST", DEFAULT_HOST);
        let port = env_parse_or("GCB_PORT", DEFAULT_PORT);
        let database = DatabaseConfig {
            host: env_or("GCB_DB_HOST", "localhost"),
            port: env_parse_or("GCB_DB_PORT", 5432),
            user: env_or("GCB_DB_USER", "giftcard"),
            password: Secret::new(env_or("GCB_DB_PASSWORD", "")),
            database: env_or("GCB_DB_NAME", "giftcard"),
            ssl_mode: env_or("GCB_DB_SSL_MODE", "disable"),
            pool: PoolSettings {
                max_conns: env_parse_or("GCB_DB_MAX_CONNS", 25),
                min_conns: env_parse_or("GCB_DB_MIN_CONNS", 5),
                max_conn_lifetime: Duration::from_secs(60 * env_parse_or("GCB_DB_MAX_CONN_LIFETIME", 5u64)),
                max_conn_idle_time: Duration::from_secs(60 * env_parse_or("GCB_DB_MAX_CONN_IDLE_TIME", 1u64)),
            },
        };
        let redis = RedisConfig {
            host: env_or("GCB_REDIS_HOST", "localhost"),
            port: env_parse_or("GCB_REDIS_PORT", 6379),
            password: Secret::new(env_or("GCB_REDIS_PASSWORD", "")),
            db: env_parse_or("GCB_REDIS_DB", 0),
        };
        let node = NodeConfig {
            grpc_host: env_or("GCB_NODE_GRPC_HOST", "localhost"),
            grpc_port: env_parse_or("GCB_NODE_GRPC_PORT", 10009),
            tls_cert_path: env_or("GCB_NODE_TLS_CERT_PATH", "./lnd-data/tls.cert"),
            macaroon_path: env_or("GCB_NODE_MACAROON_PATH", "./lnd-data/admin.macaroon"),
            network: env_parse_or("GCB_NODE_NETWORK", Network::Testnet),
            payment_timeout_seconds: env_parse_or("GCB_NODE_PAYMENT_TIMEOUT_SECONDS", 60),
            max_payment_fee_sats: Sats::from(env_parse_or("GCB_NODE_MAX_PAYMENT_FEE_SATS", 100i64)),
        };
        Self {
            host,
            port,
            database,
            redis,
            node,
            oracle_provider: env_or("GCB_ORACLE_PROVIDER", "coinbase"),
            confirmation_target: env_parse_or("GCB_CONFIRMATION_TARGET", 1),
        }
    }
}

pub fn skip_preflight() -> bool {
    parse_boolean_flag(env::var("GCB_SKIP_PREFLIGHT").ok(), false)
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).ok().unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|e| {
            error!("{s} is not a valid value for {key}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod test {
    use gc_common::Secret;
    use giftcard_engine::PoolSettings;

    use super::{DatabaseConfig, RedisConfig};

    #[test]
    fn database_url_formatting() {
        let cfg = DatabaseConfig {
            host: "db".to_string(),
            port: 5433,
            user: "gc".to_string(),
            password: Secret::new("s3cret".to_string()),
            database: "cards".to_string(),
            ssl_mode: "require".to_string(),
            pool: PoolSettings::default(),
        };
        assert_eq!(cfg.url(), "postgres://gc:s3cret@db:5433/cards?sslmode=require");
    }

    #[test]
    fn redis_url_omits_empty_passwords() {
        let mut cfg = RedisConfig {
            host: "cache".to_string(),
            port: 6379,
            password: Secret::new(String::new()),
            db: 1,
        };
        assert_eq!(cfg.url(), "redis://cache:6379/1");
        cfg.password = Secret::new("pw".to_string());
        assert_eq!(cfg.url(), "redis://:pw@cache:6379/1");
    }
}
