// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::SenderError;
use reqwest::Url;
use std::env;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8200";
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000_000;
pub const DEFAULT_CONNECTION_LIMIT: usize = 20;
/// Largest capacity a tokio bounded channel accepts.
pub const MAX_QUEUE_CAPACITY: usize = tokio::sync::Semaphore::MAX_PERMITS;
const DEFAULT_DNS_REFRESH: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

/// What `enqueue` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait for the dispatcher to free a slot.
    #[default]
    Block,
    /// Discard the incoming artifact and log it.
    DropNewest,
}

impl OverflowPolicy {
    fn parse(val: &str) -> Option<Self> {
        match val.trim().to_lowercase().as_str() {
            "block" => Some(OverflowPolicy::Block),
            "drop" | "drop_newest" | "drop-newest" => Some(OverflowPolicy::DropNewest),
            _ => None,
        }
    }
}

/// Settings for the queue and the dispatcher loop.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Extra attempts for artifacts rejected with a retryable status.
    pub max_retries: u32,
    pub retry_backoff_base: Duration,
    /// How long `stop` waits for in-flight and queued artifacts.
    pub shutdown_grace_period: Duration,
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), SenderError> {
        if self.capacity == 0 {
            return Err(SenderError::InvalidConfig(
                "queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.capacity > MAX_QUEUE_CAPACITY {
            return Err(SenderError::InvalidConfig(format!(
                "queue capacity {} exceeds the maximum of {MAX_QUEUE_CAPACITY}",
                self.capacity
            )));
        }

        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::Block,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_base: Duration::from_millis(100),
            shutdown_grace_period: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }
}

/// Connection settings, applied once when the transport is built.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub server_url: Url,
    /// Maximum idle pooled connections kept for the collector host.
    pub connection_limit: usize,
    /// How often the collector hostname is re-resolved. The transport
    /// replaces its client, and with it every pooled connection, at least
    /// this often.
    pub dns_refresh_interval: Duration,
    /// Maximum age of a pooled connection, busy or idle.
    pub connection_lease_timeout: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl TransportConfig {
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            connection_limit: DEFAULT_CONNECTION_LIMIT,
            dns_refresh_interval: DEFAULT_DNS_REFRESH,
            connection_lease_timeout: DEFAULT_DNS_REFRESH,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// How long a client and its connections may be reused, the shorter of
    /// the lease and the DNS refresh interval.
    pub fn max_connection_age(&self) -> Duration {
        self.connection_lease_timeout.min(self.dns_refresh_interval)
    }
}

/// Configuration for the payload sender
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Collector URLs, the first one is used
    pub server_urls: Vec<Url>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    pub service_name: Option<String>,
    pub service_version: Option<String>,
    pub environment: Option<String>,
    pub connection_limit: usize,
    pub dns_refresh_interval: Duration,
    pub connection_lease_timeout: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub queue: QueueConfig,
}

impl Default for SenderConfig {
    fn default() -> Self {
        let transport = TransportConfig::new(default_server_url());
        Self {
            server_urls: vec![transport.server_url],
            log_level: "info".to_string(),
            service_name: None,
            service_version: None,
            environment: None,
            connection_limit: transport.connection_limit,
            dns_refresh_interval: transport.dns_refresh_interval,
            connection_lease_timeout: transport.connection_lease_timeout,
            connect_timeout: transport.connect_timeout,
            request_timeout: transport.request_timeout,
            queue: QueueConfig::default(),
        }
    }
}

#[allow(clippy::expect_used)]
fn default_server_url() -> Url {
    Url::parse(DEFAULT_SERVER_URL).expect("default server url is valid")
}

impl SenderConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, SenderError> {
        let defaults = Self::default();

        let server_urls = env::var("ELASTIC_APM_SERVER_URLS")
            .ok()
            .map(|val| parse_server_urls(&val))
            .filter(|urls| !urls.is_empty())
            .unwrap_or(defaults.server_urls);
        let log_level = env::var("ELASTIC_APM_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);
        let service_name = non_empty_var("ELASTIC_APM_SERVICE_NAME");
        let service_version = non_empty_var("ELASTIC_APM_SERVICE_VERSION");
        let environment = non_empty_var("ELASTIC_APM_ENVIRONMENT");

        let queue = QueueConfig {
            capacity: env::var("ELASTIC_APM_QUEUE_CAPACITY")
                .ok()
                .and_then(|val| val.parse::<usize>().ok())
                .unwrap_or(defaults.queue.capacity),
            overflow_policy: env::var("ELASTIC_APM_QUEUE_OVERFLOW")
                .ok()
                .and_then(|val| OverflowPolicy::parse(&val))
                .unwrap_or(defaults.queue.overflow_policy),
            max_retries: env::var("ELASTIC_APM_MAX_RETRIES")
                .ok()
                .and_then(|val| val.parse::<u32>().ok())
                .unwrap_or(defaults.queue.max_retries),
            shutdown_grace_period: env::var("ELASTIC_APM_SHUTDOWN_TIMEOUT_MS")
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.queue.shutdown_grace_period),
            ..defaults.queue
        };

        let config = Self {
            server_urls,
            log_level,
            service_name,
            service_version,
            environment,
            queue,
            ..Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SenderError> {
        if self.server_urls.is_empty() {
            return Err(SenderError::InvalidConfig(
                "at least one server URL is required".to_string(),
            ));
        }

        self.queue.validate()?;

        if self.connection_limit == 0 {
            return Err(SenderError::InvalidConfig(
                "connection limit must be greater than 0".to_string(),
            ));
        }

        if normalize_log_level(&self.log_level).is_none() {
            return Err(SenderError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Transport settings bound to the first configured server URL.
    pub fn transport_config(&self) -> Result<TransportConfig, SenderError> {
        let server_url = self.server_urls.first().cloned().ok_or_else(|| {
            SenderError::InvalidConfig("at least one server URL is required".to_string())
        })?;
        Ok(TransportConfig {
            server_url,
            connection_limit: self.connection_limit,
            dns_refresh_interval: self.dns_refresh_interval,
            connection_lease_timeout: self.connection_lease_timeout,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        })
    }
}

/// Maps the accepted level spellings onto tracing's filter directives.
pub fn normalize_log_level(level: &str) -> Option<&'static str> {
    match level.to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" | "information" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        "off" | "none" => Some("off"),
        _ => None,
    }
}

fn parse_server_urls(val: &str) -> Vec<Url> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match Url::parse(s) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Some(url),
            Ok(url) => {
                warn!("Ignoring server URL with unsupported scheme: {url}");
                None
            }
            Err(e) => {
                warn!("Ignoring invalid server URL '{s}': {e}");
                None
            }
        })
        .collect()
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}
