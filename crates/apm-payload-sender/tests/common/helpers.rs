// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Artifact and config builders shared by the integration tests

use apm_payload_sender::artifact::{
    AgentInfo, CapturedException, ErrorEntry, ErrorRecord, Service, Transaction, TracePayload,
};
use apm_payload_sender::{QueueConfig, SenderConfig};
use reqwest::Url;
use std::time::Duration;

pub fn service() -> Service {
    Service {
        name: "integration-service".to_string(),
        version: None,
        environment: Some("test".to_string()),
        agent: AgentInfo {
            name: "rust".to_string(),
            version: "0.1.0".to_string(),
        },
        language: None,
        framework: None,
        runtime: None,
    }
}

pub fn trace_payload(transaction_name: &str) -> TracePayload {
    TracePayload {
        service: service(),
        transactions: vec![Transaction {
            id: "945254c567a5417e".to_string(),
            trace_id: Some("0af7651916cd43dd8448eb211c80319c".to_string()),
            name: transaction_name.to_string(),
            transaction_type: "request".to_string(),
            duration: 32.592981,
            timestamp: "2026-10-15T09:30:00.000Z".to_string(),
            result: Some("HTTP 2xx".to_string()),
            sampled: true,
            context: None,
            spans: Vec::new(),
        }],
    }
}

pub fn error_record(error_id: &str) -> ErrorRecord {
    ErrorRecord {
        service: service(),
        errors: vec![ErrorEntry {
            id: error_id.to_string(),
            timestamp: "2026-10-15T09:30:01.000Z".to_string(),
            culprit: Some("orders::submit".to_string()),
            exception: Some(CapturedException {
                message: "inventory unavailable".to_string(),
                exception_type: Some("StockError".to_string()),
                module: None,
                handled: Some(true),
                stacktrace: Vec::new(),
            }),
            log: None,
            transaction: None,
            context: None,
        }],
    }
}

/// Sender config pointing at `server_url` with fast retries.
pub fn config_for(server_url: &str) -> SenderConfig {
    SenderConfig {
        server_urls: vec![Url::parse(server_url).expect("invalid server url")],
        log_level: "debug".to_string(),
        service_name: Some("integration-service".to_string()),
        connect_timeout: Duration::from_secs(1),
        request_timeout: Duration::from_secs(2),
        queue: QueueConfig {
            max_retries: 2,
            retry_backoff_base: Duration::from_millis(1),
            shutdown_grace_period: Duration::from_secs(5),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A URL nothing is listening on.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind failed");
    let addr = listener.local_addr().expect("no local addr");
    drop(listener);
    format!("http://{addr}")
}
