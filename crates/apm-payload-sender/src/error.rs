// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors that can occur while constructing the payload sender.
///
/// None of these are ever returned from the enqueue path; once the sender is
/// running, failures are only observable through logs and metrics.
#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No tokio runtime available to run the payload dispatcher")]
    NoRuntime,

    #[error("Failed to build HTTP transport: {0}")]
    TransportBuild(String),

    #[error("Failed to install log subscriber: {0}")]
    Logging(String),
}

/// An artifact could not be converted to its wire representation.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Malformed artifact: {0}")]
    Malformed(&'static str),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A request never produced a response from the collector.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}
