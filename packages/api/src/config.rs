//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use broker::{AckMode, BrokerConfig};
use db::DbConfig;
use job_core::DEFAULT_QUEUE;
use thiserror::Error;
use workers::{DispatcherConfig, HandlerConfig, MalformedPolicy};

/// A variable was set to something that does not parse.
#[derive(Debug, Error)]
#[error("Invalid value for {key}: {value:?} ({reason})")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Where job status is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusBackend {
    /// The `job_status` table of the main database.
    Surreal,
    /// Plain keys on a Redis server.
    Redis { url: String },
}

/// Everything the server needs to start.
///
/// All fields have defaults suitable for a single process with in-memory
/// broker and database.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub broker_url: String,
    pub queue: String,
    pub database_url: String,
    pub database_namespace: String,
    pub database_name: String,
    pub status_backend: StatusBackend,
    pub retry_interval: Duration,
    pub ack_mode: AckMode,
    /// `None` when unbounded.
    pub max_in_flight: Option<usize>,
    pub max_attempts: u32,
    pub on_malformed: MalformedPolicy,
    pub persist_delay: Duration,
    pub callback_delay: Duration,
    pub mail_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        let db = DbConfig::default();
        let dispatcher = DispatcherConfig::default();
        let handlers = HandlerConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            broker_url: "memory://".to_string(),
            queue: DEFAULT_QUEUE.to_string(),
            database_url: db.endpoint,
            database_namespace: db.namespace,
            database_name: db.database,
            status_backend: StatusBackend::Surreal,
            retry_interval: dispatcher.retry_interval,
            ack_mode: dispatcher.ack_mode,
            max_in_flight: dispatcher.max_in_flight,
            max_attempts: dispatcher.max_attempts,
            on_malformed: dispatcher.on_malformed,
            persist_delay: handlers.persist_delay,
            callback_delay: handlers.callback_delay,
            mail_delay: handlers.mail_delay,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default              |
    /// |-----------------------|----------------------|
    /// | `HOST`                | `0.0.0.0`            |
    /// | `PORT`                | `8080`               |
    /// | `BROKER_URL`          | `memory://`          |
    /// | `QUEUE_NAME`          | `job`                |
    /// | `DATABASE_URL`        | `mem://`             |
    /// | `DATABASE_NAMESPACE`  | `dispatch`           |
    /// | `DATABASE_NAME`       | `main`               |
    /// | `STATUS_STORE`        | `surreal`            |
    /// | `STATUS_REDIS_URL`    | `redis://127.0.0.1/` |
    /// | `RETRY_INTERVAL_SECS` | `5`                  |
    /// | `ACK_MODE`            | `after_completion`   |
    /// | `MAX_IN_FLIGHT`       | `32` (`0` = no limit)|
    /// | `MAX_ATTEMPTS`        | `3`                  |
    /// | `ON_MALFORMED`        | `skip`               |
    /// | `PERSIST_DELAY_MS`    | `2000`               |
    /// | `CALLBACK_DELAY_MS`   | `30000`              |
    /// | `MAIL_DELAY_MS`       | `2000`               |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = Env { lookup };

        let status_backend = match env
            .string("STATUS_STORE", "surreal")
            .to_ascii_lowercase()
            .as_str()
        {
            "surreal" | "surrealdb" => StatusBackend::Surreal,
            "redis" => StatusBackend::Redis {
                url: env.string("STATUS_REDIS_URL", "redis://127.0.0.1/"),
            },
            other => {
                return Err(ConfigError {
                    key: "STATUS_STORE",
                    value: other.to_string(),
                    reason: "expected surreal or redis".to_string(),
                });
            }
        };

        let max_in_flight: usize =
            env.parse("MAX_IN_FLIGHT", defaults.max_in_flight.unwrap_or(0))?;

        Ok(Self {
            host: env.string("HOST", &defaults.host),
            port: env.parse("PORT", defaults.port)?,
            broker_url: env.string("BROKER_URL", &defaults.broker_url),
            queue: env.string("QUEUE_NAME", &defaults.queue),
            database_url: env.string("DATABASE_URL", &defaults.database_url),
            database_namespace: env.string("DATABASE_NAMESPACE", &defaults.database_namespace),
            database_name: env.string("DATABASE_NAME", &defaults.database_name),
            status_backend,
            retry_interval: Duration::from_secs(
                env.parse("RETRY_INTERVAL_SECS", defaults.retry_interval.as_secs())?,
            ),
            ack_mode: env.parse("ACK_MODE", defaults.ack_mode)?,
            max_in_flight: (max_in_flight > 0).then_some(max_in_flight),
            max_attempts: env.parse("MAX_ATTEMPTS", defaults.max_attempts)?,
            on_malformed: env.parse("ON_MALFORMED", defaults.on_malformed)?,
            persist_delay: env.millis("PERSIST_DELAY_MS", defaults.persist_delay)?,
            callback_delay: env.millis("CALLBACK_DELAY_MS", defaults.callback_delay)?,
            mail_delay: env.millis("MAIL_DELAY_MS", defaults.mail_delay)?,
        })
    }

    /// Address to bind the HTTP listener to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::endpoint(&self.database_url)
            .with_namespace(&self.database_namespace)
            .with_database(&self.database_name)
            .with_retry_interval(self.retry_interval)
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig::new(&self.broker_url).with_retry_interval(self.retry_interval)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::default()
            .with_queue(&self.queue)
            .with_ack_mode(self.ack_mode)
            .with_max_in_flight(self.max_in_flight)
            .with_max_attempts(self.max_attempts)
            .with_on_malformed(self.on_malformed)
            .with_retry_interval(self.retry_interval)
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            persist_delay: self.persist_delay,
            callback_delay: self.callback_delay,
            mail_delay: self.mail_delay,
            ..Default::default()
        }
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str, default: &str) -> String {
        (self.lookup)(key)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.lookup)(key).filter(|v| !v.trim().is_empty()) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn millis(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let ms = self.parse(key, default.as_millis() as u64)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = load(&[]).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:8080");
        assert_eq!(config.broker_url, "memory://");
        assert_eq!(config.queue, "job");
        assert_eq!(config.status_backend, StatusBackend::Surreal);
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.ack_mode, AckMode::AfterCompletion);
        assert_eq!(config.max_in_flight, Some(32));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.on_malformed, MalformedPolicy::Skip);
        assert_eq!(config.callback_delay, Duration::from_secs(30));
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("PORT", "9000"),
            ("BROKER_URL", "redis://broker:6379/"),
            ("STATUS_STORE", "redis"),
            ("STATUS_REDIS_URL", "redis://status:6379/"),
            ("ACK_MODE", "auto"),
            ("MAX_IN_FLIGHT", "0"),
            ("ON_MALFORMED", "abort"),
            ("MAIL_DELAY_MS", "5"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.broker_config().endpoint, "redis://broker:6379/");
        assert_eq!(
            config.status_backend,
            StatusBackend::Redis {
                url: "redis://status:6379/".to_string()
            }
        );
        assert_eq!(config.ack_mode, AckMode::Auto);
        assert_eq!(config.max_in_flight, None);
        assert_eq!(config.dispatcher_config().max_in_flight, None);
        assert_eq!(config.on_malformed, MalformedPolicy::Abort);
        assert_eq!(config.handler_config().mail_delay, Duration::from_millis(5));
    }

    #[test]
    fn rejects_unparsable_values() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.key, "PORT");

        let err = load(&[("STATUS_STORE", "postgres")]).unwrap_err();
        assert_eq!(err.key, "STATUS_STORE");

        let err = load(&[("ACK_MODE", "sometimes")]).unwrap_err();
        assert_eq!(err.key, "ACK_MODE");
    }
}
