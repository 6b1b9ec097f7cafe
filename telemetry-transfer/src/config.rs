use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use thiserror::Error;

use crate::retry::RetryPolicy;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3301")]
    pub port: u16,

    #[envconfig(from = "DISPATCH_URI", default = "http://localhost:8080")]
    pub dispatch_uri: String,

    #[envconfig(from = "OPENSEARCH_URI", default = "http://localhost:9200")]
    pub opensearch_uri: String,

    #[envconfig(from = "CORE_INDEX", default = "core_events")]
    pub core_index: NonEmptyString,

    #[envconfig(from = "HEARTBEAT_INDEX", default = "heartbeat_events")]
    pub heartbeat_index: NonEmptyString,

    #[envconfig(from = "SESSION_CACHE_SIZE", default = "200000")]
    pub session_cache_size: usize,

    // When set, sessions also expire after this many idle seconds
    #[envconfig(from = "SESSION_CACHE_TTL_SECONDS")]
    pub session_cache_ttl_seconds: Option<u64>,

    #[envconfig(from = "BUFFER_CAPACITY", default = "30000")]
    pub buffer_capacity: usize,

    #[envconfig(from = "BATCH_SIZE", default = "6000")]
    pub batch_size: usize,

    #[envconfig(from = "MAX_CONCURRENT_WRITES", default = "4")]
    pub max_concurrent_writes: usize,

    #[envconfig(from = "REQUEST_TIMEOUT_MS", default = "10000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(from = "CONNECT_TIMEOUT_MS", default = "10000")]
    pub connect_timeout: EnvMsDuration,

    #[envconfig(from = "SHUTDOWN_TIMEOUT_MS", default = "30000")]
    pub shutdown_timeout: EnvMsDuration,

    #[envconfig(from = "STATS_INTERVAL_MS", default = "60000")]
    pub stats_interval: EnvMsDuration,

    #[envconfig(nested = true)]
    pub stream_retry: StreamRetryConfig,

    #[envconfig(from = "PRINT_SINK", default = "false")]
    pub print_sink: bool,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("BATCH_SIZE", self.batch_size),
            ("BUFFER_CAPACITY", self.buffer_capacity),
            ("MAX_CONCURRENT_WRITES", self.max_concurrent_writes),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }

        // A zero period panics the stats ticker; zero timeouts or backoff are never usable.
        for (name, value) in [
            ("REQUEST_TIMEOUT_MS", self.request_timeout),
            ("CONNECT_TIMEOUT_MS", self.connect_timeout),
            ("SHUTDOWN_TIMEOUT_MS", self.shutdown_timeout),
            ("STATS_INTERVAL_MS", self.stats_interval),
            ("STREAM_RETRY_INITIAL_INTERVAL_MS", self.stream_retry.initial_interval),
            ("STREAM_RETRY_MAX_INTERVAL_MS", self.stream_retry.max_interval),
        ] {
            if value.0.is_zero() {
                return Err(ConfigError::Zero(name));
            }
        }

        for (name, value) in [
            ("DISPATCH_URI", &self.dispatch_uri),
            ("OPENSEARCH_URI", &self.opensearch_uri),
        ] {
            url::Url::parse(value).map_err(|error| ConfigError::InvalidUri {
                name,
                value: value.clone(),
                error,
            })?;
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.stream_retry.initial_interval.0,
            self.stream_retry.max_interval.0,
            self.stream_retry.max_attempts,
        )
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct StreamRetryConfig {
    #[envconfig(from = "STREAM_RETRY_MAX_ATTEMPTS", default = "5")]
    pub max_attempts: u32,

    #[envconfig(from = "STREAM_RETRY_INITIAL_INTERVAL_MS", default = "5000")]
    pub initial_interval: EnvMsDuration,

    #[envconfig(from = "STREAM_RETRY_MAX_INTERVAL_MS", default = "60000")]
    pub max_interval: EnvMsDuration,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("{name} is not a valid absolute URL ({value}): {error}")]
    InvalidUri {
        name: &'static str,
        value: String,
        error: url::ParseError,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
