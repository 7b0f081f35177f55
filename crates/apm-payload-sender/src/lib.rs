// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Outbound shipping of APM artifacts.
//!
//! Instrumentation hands finished trace payloads and error records to a
//! [`PayloadSenderHandle`]. A single background dispatcher serializes each
//! artifact, picks its intake path and posts it to the collector, one at a
//! time and in order. Failures are logged and counted, never returned to
//! the producer.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod agent;
pub mod artifact;
pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod queue;
pub mod sender;
pub mod serializer;
pub mod transport;

pub use agent::AgentComponents;
pub use artifact::{ArtifactKind, ErrorRecord, Service, TelemetryArtifact, TracePayload};
pub use config::{OverflowPolicy, QueueConfig, SenderConfig, TransportConfig};
pub use dispatcher::DispatchOutcome;
pub use error::{SenderError, SerializationError, TransportError};
pub use metrics::MetricsSnapshot;
pub use queue::{PayloadQueue, PayloadSenderHandle};
pub use sender::PayloadSender;
pub use transport::{HttpTransport, Transport};
