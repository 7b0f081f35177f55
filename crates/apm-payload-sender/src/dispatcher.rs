// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::artifact::TelemetryArtifact;
use crate::config::QueueConfig;
use crate::endpoint;
use crate::error::{SerializationError, TransportError};
use crate::metrics::SenderMetrics;
use crate::serializer;
use crate::transport::Transport;

/// Result of one pass through serialize, route and send.
#[derive(Debug)]
pub enum DispatchOutcome {
    Sent,
    SerializationFailed(SerializationError),
    TransportFailed(TransportError),
    /// The collector answered with a non-success status. `retryable` is set
    /// when the status was retryable and the retry budget ran out.
    Rejected {
        status: StatusCode,
        retryable: bool,
    },
    /// Shutdown cut the delivery short.
    Abandoned,
}

/// 408, 429 and 5xx are worth another attempt; any other non-success status
/// will not change by resending the same body.
pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// The single consumer of the ingestion queue.
///
/// Artifacts are processed strictly one at a time in queue order. No failure
/// ends the loop; it exits when the queue is closed and drained, or when the
/// abort token fires. The transport is dropped when `run` returns.
pub(crate) struct Dispatcher<T: Transport> {
    rx: mpsc::Receiver<TelemetryArtifact>,
    transport: T,
    shutdown: CancellationToken,
    abort: CancellationToken,
    metrics: Arc<SenderMetrics>,
    max_retries: u32,
    retry_backoff_base: Duration,
}

impl<T: Transport> Dispatcher<T> {
    pub(crate) fn new(
        rx: mpsc::Receiver<TelemetryArtifact>,
        transport: T,
        shutdown: CancellationToken,
        abort: CancellationToken,
        metrics: Arc<SenderMetrics>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            rx,
            transport,
            shutdown,
            abort,
            metrics,
            max_retries: config.max_retries,
            retry_backoff_base: config.retry_backoff_base,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Payload dispatcher started");
        let mut closing = false;

        loop {
            let artifact = tokio::select! {
                biased;
                () = self.abort.cancelled() => break,
                () = self.shutdown.cancelled(), if !closing => {
                    debug!("Payload dispatcher draining queue before shutdown");
                    self.rx.close();
                    closing = true;
                    continue;
                }
                next = self.rx.recv() => match next {
                    Some(artifact) => artifact,
                    None => break,
                },
            };

            let outcome = tokio::select! {
                biased;
                () = self.abort.cancelled() => DispatchOutcome::Abandoned,
                outcome = self.process(&artifact) => outcome,
            };
            self.report(&artifact, &outcome);
        }

        self.rx.close();
        let mut abandoned = 0;
        while self.rx.try_recv().is_ok() {
            abandoned += 1;
        }
        if abandoned > 0 {
            self.metrics.add_abandoned(abandoned);
            warn!("Abandoned {abandoned} queued artifacts at shutdown");
        }

        drop(self.transport);
        debug!("Payload dispatcher stopped, transport released");
    }

    async fn process(&self, artifact: &TelemetryArtifact) -> DispatchOutcome {
        let body = match serializer::serialize(artifact) {
            Ok(body) => body,
            Err(e) => return DispatchOutcome::SerializationFailed(e),
        };
        let path = endpoint::resolve(artifact);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let status = match self.transport.send(path, body.clone()).await {
                Ok(status) => status,
                Err(e) => return DispatchOutcome::TransportFailed(e),
            };

            if status.is_success() {
                return DispatchOutcome::Sent;
            }

            let retryable = is_retryable(status);
            if !retryable || attempt > self.max_retries {
                return DispatchOutcome::Rejected { status, retryable };
            }

            self.metrics.inc_retried();
            let backoff = self
                .retry_backoff_base
                .saturating_mul(2_u32.saturating_pow(attempt - 1));
            debug!(
                status = status.as_u16(),
                attempt,
                "Collector returned {status} for {} {}, retrying in {} ms",
                artifact.kind(),
                artifact.identifier(),
                backoff.as_millis()
            );
            tokio::time::sleep(backoff).await;
        }
    }

    fn report(&self, artifact: &TelemetryArtifact, outcome: &DispatchOutcome) {
        let kind = artifact.kind();
        let identifier = artifact.identifier();

        match outcome {
            DispatchOutcome::Sent => {
                self.metrics.inc_sent();
                debug!(%kind, identifier, "Sent {kind} {identifier}");
            }
            DispatchOutcome::SerializationFailed(e) => {
                self.metrics.inc_failed();
                warn!(%kind, identifier, "Failed serializing {kind} {identifier}");
                debug!(%kind, identifier, "Serialization failure detail: {e:?}");
            }
            DispatchOutcome::TransportFailed(e) => {
                self.metrics.inc_failed();
                warn!(%kind, identifier, "Failed sending {kind} {identifier}");
                debug!(%kind, identifier, "Transport failure detail: {e:?}");
            }
            DispatchOutcome::Rejected { status, retryable } => {
                self.metrics.inc_rejected();
                if *retryable {
                    warn!(
                        %kind,
                        identifier,
                        status = status.as_u16(),
                        "Collector kept rejecting {kind} {identifier} with {status}, giving up after {} retries",
                        self.max_retries
                    );
                } else {
                    warn!(
                        %kind,
                        identifier,
                        status = status.as_u16(),
                        "Collector rejected {kind} {identifier} with {status}, dropping"
                    );
                }
            }
            DispatchOutcome::Abandoned => {
                self.metrics.add_abandoned(1);
                warn!(%kind, identifier, "Abandoned in-flight {kind} {identifier} at shutdown");
            }
        }
    }
}
