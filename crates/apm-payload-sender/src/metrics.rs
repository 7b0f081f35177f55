// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Counters shared between the producer handles and the dispatcher.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SenderMetrics {
    /// Artifacts admitted to the queue
    enqueued: AtomicU64,
    /// Artifacts discarded before reaching the queue (overflow or shutdown)
    dropped: AtomicU64,
    /// Artifacts acknowledged by the collector
    sent: AtomicU64,
    /// Serialization and transport failures
    failed: AtomicU64,
    /// Artifacts the collector refused
    rejected: AtomicU64,
    /// Retry attempts after a retryable status
    retried: AtomicU64,
    /// Artifacts left undelivered when the grace period ran out
    abandoned: AtomicU64,
}

impl SenderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub sent: u64,
    pub failed: u64,
    pub rejected: u64,
    pub retried: u64,
    pub abandoned: u64,
}
