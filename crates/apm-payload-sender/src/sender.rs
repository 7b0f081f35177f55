// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info_span, warn, Instrument};

use crate::artifact::{ErrorRecord, TelemetryArtifact, TracePayload};
use crate::config::{QueueConfig, SenderConfig};
use crate::dispatcher::Dispatcher;
use crate::error::SenderError;
use crate::metrics::{MetricsSnapshot, SenderMetrics};
use crate::queue::{self, PayloadQueue, PayloadSenderHandle};
use crate::transport::{HttpTransport, Transport};

/// Owns the dispatcher task and the transport for the agent's lifetime.
///
/// `start` returns as soon as the dispatcher is spawned. `stop` consumes the
/// sender, so it runs at most once. Dropping a sender without calling `stop`
/// still closes the queue; the dispatcher then drains in the background.
pub struct PayloadSender {
    handle: PayloadSenderHandle,
    shutdown: CancellationToken,
    abort: CancellationToken,
    worker: JoinHandle<()>,
    grace_period: Duration,
    metrics: Arc<SenderMetrics>,
    _shutdown_on_drop: DropGuard,
}

impl PayloadSender {
    /// Builds the HTTP transport for the first configured server URL and
    /// starts the dispatcher on the current tokio runtime.
    pub fn start(config: &SenderConfig) -> Result<Self, SenderError> {
        config.validate()?;
        let transport = HttpTransport::new(&config.transport_config()?)?;
        Self::start_with_transport(transport, &config.queue)
    }

    /// Starts the dispatcher with any transport.
    ///
    /// The runtime must have the time driver enabled; retries and shutdown
    /// deadlines rely on it.
    pub fn start_with_transport<T: Transport>(
        transport: T,
        config: &QueueConfig,
    ) -> Result<Self, SenderError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| SenderError::NoRuntime)?;

        let shutdown = CancellationToken::new();
        let abort = CancellationToken::new();
        let metrics = Arc::new(SenderMetrics::new());
        let (handle, rx) = queue::channel(config, shutdown.clone(), Arc::clone(&metrics));
        let dispatcher = Dispatcher::new(
            rx,
            transport,
            shutdown.clone(),
            abort.clone(),
            Arc::clone(&metrics),
            config,
        );
        let worker = runtime.spawn(dispatcher.run().instrument(info_span!("payload_dispatcher")));

        debug!(
            "Payload sender started with queue capacity {} ({:?} on overflow)",
            config.capacity, config.overflow_policy
        );

        Ok(Self {
            handle,
            shutdown: shutdown.clone(),
            abort,
            worker,
            grace_period: config.shutdown_grace_period,
            metrics,
            _shutdown_on_drop: shutdown.drop_guard(),
        })
    }

    /// A producer handle that can be cloned into any thread.
    pub fn handle(&self) -> PayloadSenderHandle {
        self.handle.clone()
    }

    pub fn enqueue(&self, artifact: impl Into<TelemetryArtifact>) {
        self.handle.enqueue(artifact);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Closes the queue and waits for the dispatcher to drain it.
    ///
    /// Artifacts already admitted are delivered until the grace period runs
    /// out. After that the in-flight send is cancelled, whatever is left is
    /// counted as abandoned, and this returns once the transport is released.
    pub async fn stop(mut self) -> MetricsSnapshot {
        debug!("Stopping payload sender");
        self.shutdown.cancel();

        match tokio::time::timeout(self.grace_period, &mut self.worker).await {
            Ok(Ok(())) => debug!("Payload sender drained"),
            Ok(Err(e)) => error!("Payload dispatcher task failed: {e:?}"),
            Err(_) => {
                warn!(
                    "Payload sender did not drain within {} ms, abandoning remaining artifacts",
                    self.grace_period.as_millis()
                );
                self.abort.cancel();
                if let Err(e) = (&mut self.worker).await {
                    error!("Payload dispatcher task failed: {e:?}");
                }
            }
        }

        self.metrics.snapshot()
    }
}

impl PayloadQueue for PayloadSender {
    fn queue_payload(&self, payload: TracePayload) {
        self.handle.queue_payload(payload);
    }

    fn queue_error(&self, error: ErrorRecord) {
        self.handle.queue_error(error);
    }
}
