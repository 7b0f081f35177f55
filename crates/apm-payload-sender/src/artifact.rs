// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Telemetry artifacts handed from instrumentation to the payload sender.
//!
//! Artifacts are fully built by the producer and moved into the ingestion
//! queue. From that point on they are only ever read, by the serializer and
//! for log identifiers. Field names are canonicalized to lowerCamelCase on
//! the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the monitored service, attached to every artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub agent: AgentInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<NameVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<NameVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<NameVersion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameVersion {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A batch of completed transactions for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePayload {
    pub service: Service,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub transaction_type: String,
    /// Duration in milliseconds.
    pub duration: f64,
    /// RFC 3339 start time.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default = "default_sampled")]
    pub sampled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<Span>,
}

fn default_sampled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub span_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Offset from the transaction start, in milliseconds.
    pub start: f64,
    /// Duration in milliseconds.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

/// One or more captured errors for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub service: Service,
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub id: String,
    /// RFC 3339 capture time.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culprit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<CapturedException>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<ErrorLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedException {
    pub message: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handled: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stacktrace: Vec<StackFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLog {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReference {
    pub id: String,
}

/// The closed set of things the sender knows how to ship.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryArtifact {
    Trace(TracePayload),
    Error(ErrorRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Trace,
    Error,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Trace => write!(f, "transaction"),
            ArtifactKind::Error => write!(f, "error"),
        }
    }
}

impl TelemetryArtifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            TelemetryArtifact::Trace(_) => ArtifactKind::Trace,
            TelemetryArtifact::Error(_) => ArtifactKind::Error,
        }
    }

    /// Stable identifier used in log lines: the first transaction name for
    /// trace payloads (falling back to the service name) and the first error
    /// id for error records.
    pub fn identifier(&self) -> &str {
        match self {
            TelemetryArtifact::Trace(payload) => payload
                .transactions
                .first()
                .map_or(payload.service.name.as_str(), |t| t.name.as_str()),
            TelemetryArtifact::Error(record) => record
                .errors
                .first()
                .map_or("<none>", |e| e.id.as_str()),
        }
    }
}

impl From<TracePayload> for TelemetryArtifact {
    fn from(payload: TracePayload) -> Self {
        TelemetryArtifact::Trace(payload)
    }
}

impl From<ErrorRecord> for TelemetryArtifact {
    fn from(record: ErrorRecord) -> Self {
        TelemetryArtifact::Error(record)
    }
}
