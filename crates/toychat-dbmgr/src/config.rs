use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use toychat_broker::{ClientConfig, DispatcherConfig};
use toychat_db::DbConfig;
use toychat_db::queries::DEFAULT_AGENT_CAPACITY;

#[derive(Debug, Clone)]
pub struct Config {
    pub nats_url: String,
    pub db_path: PathBuf,
    pub db: DbConfig,
    pub subject: String,
    pub request_timeout: Duration,
    pub agent_capacity: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their default; a set key
    /// that does not parse is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let pool_size: usize = number(&lookup, "TOYCHAT_DB_POOL_SIZE", 4)?;
        if pool_size == 0 {
            anyhow::bail!("TOYCHAT_DB_POOL_SIZE must be at least 1");
        }
        let busy_timeout_ms: u64 = number(&lookup, "TOYCHAT_DB_BUSY_TIMEOUT_MS", 5000)?;
        let request_timeout_ms: u64 = number(&lookup, "TOYCHAT_REQUEST_TIMEOUT_MS", 2000)?;
        let agent_capacity: i64 = number(&lookup, "TOYCHAT_AGENT_CAPACITY", DEFAULT_AGENT_CAPACITY)?;

        Ok(Self {
            nats_url: string("TOYCHAT_NATS_URL", "nats://127.0.0.1:4222"),
            db_path: PathBuf::from(string("TOYCHAT_DB_PATH", "toychat.db")),
            db: DbConfig {
                pool_size,
                busy_timeout: Duration::from_millis(busy_timeout_ms),
            },
            subject: string("TOYCHAT_DB_SUBJECT", "forDB"),
            request_timeout: Duration::from_millis(request_timeout_ms),
            agent_capacity,
        })
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            subject: self.subject.clone(),
            agent_capacity: self.agent_capacity,
        }
    }

    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            subject: self.subject.clone(),
            timeout: self.request_timeout,
        }
    }
}

fn number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} is not a valid number: {:?}", key, raw)),
    }
}
