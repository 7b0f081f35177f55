// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Producer side of the ingestion queue.
//!
//! The queue is a bounded tokio `mpsc` channel. Any number of producer
//! threads hold a cloned [`PayloadSenderHandle`]; the dispatcher owns the only
//! receiver. Nothing on this path returns an error or panics: artifacts that
//! cannot be admitted are logged, counted and discarded.

use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::artifact::{ErrorRecord, TelemetryArtifact, TracePayload};
use crate::config::{OverflowPolicy, QueueConfig, MAX_QUEUE_CAPACITY};
use crate::metrics::{MetricsSnapshot, SenderMetrics};

/// The producer-facing API a tracer needs.
pub trait PayloadQueue: Send + Sync {
    fn queue_payload(&self, payload: TracePayload);
    fn queue_error(&self, error: ErrorRecord);
}

/// Cheap-to-clone handle used by producers to hand off artifacts.
#[derive(Debug, Clone)]
pub struct PayloadSenderHandle {
    tx: mpsc::Sender<TelemetryArtifact>,
    policy: OverflowPolicy,
    shutdown: CancellationToken,
    metrics: Arc<SenderMetrics>,
}

/// Creates the queue. The receiver belongs to the dispatcher. Capacity is
/// expected to be validated already and is clamped to what tokio accepts.
pub(crate) fn channel(
    config: &QueueConfig,
    shutdown: CancellationToken,
    metrics: Arc<SenderMetrics>,
) -> (PayloadSenderHandle, mpsc::Receiver<TelemetryArtifact>) {
    let (tx, rx) = mpsc::channel(config.capacity.clamp(1, MAX_QUEUE_CAPACITY));
    let handle = PayloadSenderHandle {
        tx,
        policy: config.overflow_policy,
        shutdown,
        metrics,
    };
    (handle, rx)
}

impl PayloadSenderHandle {
    /// Hands an artifact to the dispatcher from any thread.
    ///
    /// Returns immediately while the queue has room. When it is full the
    /// configured [`OverflowPolicy`] applies. With `Block` on a tokio
    /// current-thread runtime the artifact is dropped instead, since waiting
    /// there would stall the dispatcher that has to free the slot.
    pub fn enqueue(&self, artifact: impl Into<TelemetryArtifact>) {
        let artifact = artifact.into();
        if self.shutdown.is_cancelled() {
            self.discard_after_shutdown(&artifact);
            return;
        }

        match self.tx.try_send(artifact) {
            Ok(()) => self.metrics.inc_enqueued(),
            Err(TrySendError::Full(artifact)) => match self.policy {
                OverflowPolicy::DropNewest => self.drop_on_overflow(&artifact),
                OverflowPolicy::Block => self.enqueue_blocking(artifact),
            },
            Err(TrySendError::Closed(artifact)) => self.discard_after_shutdown(&artifact),
        }
    }

    /// Async variant of [`enqueue`](Self::enqueue) for producers running on
    /// the runtime. With `Block` it awaits capacity instead of blocking.
    pub async fn enqueue_async(&self, artifact: impl Into<TelemetryArtifact>) {
        let artifact = artifact.into();
        if self.shutdown.is_cancelled() {
            self.discard_after_shutdown(&artifact);
            return;
        }

        let result = match self.policy {
            OverflowPolicy::Block => self.tx.send(artifact).await.map_err(|e| e.0),
            OverflowPolicy::DropNewest => match self.tx.try_send(artifact) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(artifact)) => {
                    self.drop_on_overflow(&artifact);
                    return;
                }
                Err(TrySendError::Closed(artifact)) => Err(artifact),
            },
        };

        match result {
            Ok(()) => self.metrics.inc_enqueued(),
            Err(artifact) => self.discard_after_shutdown(&artifact),
        }
    }

    /// True once the sender has been asked to stop.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.tx.is_closed()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn enqueue_blocking(&self, artifact: TelemetryArtifact) {
        let result = match Handle::try_current() {
            Err(_) => self.tx.blocking_send(artifact),
            Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) => {
                tokio::task::block_in_place(|| handle.block_on(self.tx.send(artifact)))
            }
            Ok(_) => {
                self.metrics.inc_dropped();
                warn!(
                    kind = %artifact.kind(),
                    identifier = artifact.identifier(),
                    "Payload queue full and a current-thread runtime cannot block, dropping {} {}",
                    artifact.kind(),
                    artifact.identifier()
                );
                return;
            }
        };

        match result {
            Ok(()) => self.metrics.inc_enqueued(),
            Err(mpsc::error::SendError(artifact)) => self.discard_after_shutdown(&artifact),
        }
    }

    fn drop_on_overflow(&self, artifact: &TelemetryArtifact) {
        self.metrics.inc_dropped();
        warn!(
            kind = %artifact.kind(),
            identifier = artifact.identifier(),
            "Payload queue full, dropping {} {}",
            artifact.kind(),
            artifact.identifier()
        );
    }

    fn discard_after_shutdown(&self, artifact: &TelemetryArtifact) {
        self.metrics.inc_dropped();
        debug!(
            kind = %artifact.kind(),
            identifier = artifact.identifier(),
            "Payload sender stopped, discarding {} {}",
            artifact.kind(),
            artifact.identifier()
        );
    }
}

impl PayloadQueue for PayloadSenderHandle {
    fn queue_payload(&self, payload: TracePayload) {
        self.enqueue(payload);
    }

    fn queue_error(&self, error: ErrorRecord) {
        self.enqueue(error);
    }
}
