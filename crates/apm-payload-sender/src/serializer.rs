// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;

use crate::artifact::{ErrorRecord, TelemetryArtifact, TracePayload};
use crate::error::SerializationError;

pub const CONTENT_TYPE: &str = "application/json";

/// Encodes an artifact as the JSON body expected by the collector.
///
/// Field names are lowerCamelCase and absent optional fields are omitted.
/// Only malformed artifacts are rejected; everything the dispatcher receives
/// from a well-behaved tracer encodes successfully.
pub fn serialize(artifact: &TelemetryArtifact) -> Result<Bytes, SerializationError> {
    let body = match artifact {
        TelemetryArtifact::Trace(payload) => {
            validate_trace(payload)?;
            serde_json::to_vec(payload)?
        }
        TelemetryArtifact::Error(record) => {
            validate_error(record)?;
            serde_json::to_vec(record)?
        }
    };
    Ok(Bytes::from(body))
}

fn validate_trace(payload: &TracePayload) -> Result<(), SerializationError> {
    if payload.transactions.is_empty() {
        return Err(SerializationError::Malformed(
            "trace payload contains no transactions",
        ));
    }
    for transaction in &payload.transactions {
        if transaction.name.is_empty() {
            return Err(SerializationError::Malformed("transaction name is empty"));
        }
        if transaction.spans.iter().any(|span| span.name.is_empty()) {
            return Err(SerializationError::Malformed("span name is empty"));
        }
    }
    Ok(())
}

fn validate_error(record: &ErrorRecord) -> Result<(), SerializationError> {
    if record.errors.is_empty() {
        return Err(SerializationError::Malformed(
            "error record contains no entries",
        ));
    }
    if record.errors.iter().any(|entry| entry.id.is_empty()) {
        return Err(SerializationError::Malformed("error id is empty"));
    }
    Ok(())
}
