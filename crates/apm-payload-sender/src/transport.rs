// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::{SenderError, TransportError};
use crate::serializer;

/// Delivers one serialized artifact to the collector.
///
/// Implementations are owned by the dispatcher and only ever called from its
/// task, one request at a time. Dropping the value releases the underlying
/// connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends `body` to `path` relative to the collector base address and
    /// returns the response status. Only failures that produced no response
    /// are errors.
    async fn send(&self, path: &str, body: Bytes) -> Result<StatusCode, TransportError>;
}

/// HTTP transport backed by a pooled `reqwest::Client`.
///
/// The client is replaced once it is older than
/// `min(connection_lease_timeout, dns_refresh_interval)`. Dropping the old
/// client closes its pooled connections, so even a connection that never
/// sits idle is retired and the next one resolves the collector host again.
#[derive(Debug)]
pub struct HttpTransport {
    config: TransportConfig,
    base: String,
    max_connection_age: Duration,
    pooled: Mutex<PooledClient>,
}

#[derive(Debug)]
struct PooledClient {
    client: reqwest::Client,
    built_at: Instant,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, SenderError> {
        let client = build_client(config)
            .map_err(|e| SenderError::TransportBuild(e.to_string()))?;
        let max_connection_age = config.max_connection_age();
        debug!(
            "Payload transport bound to {} with up to {} pooled connections, recycled every {} ms",
            config.server_url,
            config.connection_limit,
            max_connection_age.as_millis()
        );
        Ok(Self {
            config: config.clone(),
            base: base_address(&config.server_url),
            max_connection_age,
            pooled: Mutex::new(PooledClient {
                client,
                built_at: Instant::now(),
            }),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// The client to use for the next request, rebuilt first if it has
    /// outlived the connection lease.
    fn client(&self) -> reqwest::Client {
        let mut pooled = self.pooled.lock().unwrap_or_else(PoisonError::into_inner);
        if pooled.built_at.elapsed() >= self.max_connection_age {
            match build_client(&self.config) {
                Ok(client) => {
                    debug!("Recycling collector connections for {}", self.base);
                    *pooled = PooledClient {
                        client,
                        built_at: Instant::now(),
                    };
                }
                Err(e) => {
                    warn!("Failed to rebuild HTTP client, reusing current connections: {e}");
                    pooled.built_at = Instant::now();
                }
            }
        }
        pooled.client.clone()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, path: &str, body: Bytes) -> Result<StatusCode, TransportError> {
        let response = self
            .client()
            .post(self.url_for(path))
            .header(CONTENT_TYPE, serializer::CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        Ok(response.status())
    }
}

/// Builds a client with the pool tuning from `config`. Idle connections are
/// also dropped after the connection age limit.
fn build_client(config: &TransportConfig) -> Result<reqwest::Client, reqwest::Error> {
    let max_connection_age = config.max_connection_age();
    reqwest::Client::builder()
        .use_rustls_tls()
        .pool_max_idle_per_host(config.connection_limit)
        .pool_idle_timeout(Some(max_connection_age))
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .build()
}

/// The server URL without a trailing slash, so a path prefix on the
/// configured URL is kept when intake paths are appended.
fn base_address(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Observations shared between a test and the transport it hands over.
    #[derive(Clone, Default)]
    pub struct TransportProbe {
        requests: Arc<Mutex<Vec<(String, Bytes)>>>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        completed: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl TransportProbe {
        pub fn paths(&self) -> Vec<String> {
            self.requests
                .lock()
                .expect("lock poisoned")
                .iter()
                .map(|(path, _)| path.clone())
                .collect()
        }

        pub fn bodies(&self) -> Vec<String> {
            self.requests
                .lock()
                .expect("lock poisoned")
                .iter()
                .map(|(_, body)| String::from_utf8_lossy(body).into_owned())
                .collect()
        }

        pub fn started(&self) -> usize {
            self.requests.lock().expect("lock poisoned").len()
        }

        pub fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        pub fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }

        pub async fn wait_for_started(&self, count: usize) {
            while self.started() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    /// Scripted transport: replies from `responses` in order, then with
    /// `202 Accepted`.
    pub struct RecordingTransport {
        probe: TransportProbe,
        responses: Mutex<VecDeque<Result<StatusCode, TransportError>>>,
        delay: Duration,
    }

    impl RecordingTransport {
        pub fn new() -> (Self, TransportProbe) {
            let probe = TransportProbe::default();
            let transport = Self {
                probe: probe.clone(),
                responses: Mutex::new(VecDeque::new()),
                delay: Duration::ZERO,
            };
            (transport, probe)
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn with_responses(
            self,
            responses: impl IntoIterator<Item = Result<StatusCode, TransportError>>,
        ) -> Self {
            self.responses
                .lock()
                .expect("lock poisoned")
                .extend(responses);
            self
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, path: &str, body: Bytes) -> Result<StatusCode, TransportError> {
            let in_flight = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe
                .max_in_flight
                .fetch_max(in_flight, Ordering::SeqCst);
            self.probe
                .requests
                .lock()
                .expect("lock poisoned")
                .push((path.to_string(), body));

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let response = self
                .responses
                .lock()
                .expect("lock poisoned")
                .pop_front()
                .unwrap_or(Ok(StatusCode::ACCEPTED));
            self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.probe.completed.fetch_add(1, Ordering::SeqCst);
            response
        }
    }

    impl Drop for RecordingTransport {
        fn drop(&mut self) {
            self.probe.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    fn transport_for(url: &str) -> HttpTransport {
        let mut config = TransportConfig::new(Url::parse(url).expect("invalid url"));
        config.connect_timeout = Duration::from_secs(1);
        config.request_timeout = Duration::from_secs(2);
        HttpTransport::new(&config).expect("failed to build transport")
    }

    #[test]
    fn test_base_address_keeps_path_prefix() {
        let url = Url::parse("http://proxy:8080/apm/").expect("invalid url");
        assert_eq!(base_address(&url), "http://proxy:8080/apm");

        let url = Url::parse("http://localhost:8200").expect("invalid url");
        assert_eq!(base_address(&url), "http://localhost:8200");
    }

    #[tokio::test]
    async fn test_send_posts_json_to_path() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/errors")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Exact("{\"errors\":[]}".to_string()))
            .with_status(202)
            .expect(1)
            .create_async()
            .await;

        let transport = transport_for(&server.url());
        let status = transport
            .send("/v1/errors", Bytes::from_static(b"{\"errors\":[]}"))
            .await
            .expect("send failed");

        assert_eq!(status, StatusCode::ACCEPTED);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_returns_error_status_without_failing() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/transactions")
            .with_status(503)
            .create_async()
            .await;

        let transport = transport_for(&server.url());
        let status = transport
            .send("/v1/transactions", Bytes::from_static(b"{}"))
            .await
            .expect("a response status is not a transport error");

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_to_closed_port_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind failed");
        let addr = listener.local_addr().expect("no local addr");
        drop(listener);

        let transport = transport_for(&format!("http://{addr}"));
        let result = transport
            .send("/v1/errors", Bytes::from_static(b"{}"))
            .await;

        assert!(result.is_err());
    }

    /// Keep-alive HTTP/1.1 collector that answers every request with 202 and
    /// counts the connections it accepts.
    async fn counting_collector() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
        let addr = listener.local_addr().expect("no local addr");
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(answer_requests(stream));
            }
        });
        (format!("http://{addr}"), accepted)
    }

    async fn answer_requests(stream: TcpStream) {
        let mut reader = BufReader::new(stream);
        loop {
            let mut line = String::new();
            if !matches!(reader.read_line(&mut line).await, Ok(n) if n > 0) {
                return;
            }

            let mut content_length = 0;
            loop {
                line.clear();
                if !matches!(reader.read_line(&mut line).await, Ok(n) if n > 0) {
                    return;
                }
                let header = line.trim_end();
                if header.is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }

            let mut body = vec![0; content_length];
            if reader.read_exact(&mut body).await.is_err() {
                return;
            }
            let response = b"HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\n\r\n";
            if reader.get_mut().write_all(response).await.is_err() {
                return;
            }
        }
    }

    fn transport_with_lease(url: &str, lease: Duration) -> HttpTransport {
        let mut config = TransportConfig::new(Url::parse(url).expect("invalid url"));
        config.connection_lease_timeout = lease;
        config.dns_refresh_interval = lease;
        config.connect_timeout = Duration::from_secs(1);
        config.request_timeout = Duration::from_secs(2);
        HttpTransport::new(&config).expect("failed to build transport")
    }

    #[tokio::test]
    async fn test_busy_connection_is_retired_after_lease() {
        let (url, accepted) = counting_collector().await;
        let transport = transport_with_lease(&url, Duration::from_millis(200));

        for _ in 0..20 {
            let status = transport
                .send("/v1/transactions", Bytes::from_static(b"{}"))
                .await
                .expect("send failed");
            assert_eq!(status, StatusCode::ACCEPTED);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // ~1s of traffic with a 200ms lease
        let opened = accepted.load(Ordering::SeqCst);
        assert!(opened >= 3, "expected recycled connections, got {opened}");
    }

    #[tokio::test]
    async fn test_connection_reused_within_lease() {
        let (url, accepted) = counting_collector().await;
        let transport = transport_with_lease(&url, Duration::from_secs(60));

        for _ in 0..5 {
            transport
                .send("/v1/errors", Bytes::from_static(b"{}"))
                .await
                .expect("send failed");
        }

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }
}
