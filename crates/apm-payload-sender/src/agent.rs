// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Composition root: configuration, service identity and the payload sender.

use std::env;
use std::path::Path;

use crate::artifact::{AgentInfo, NameVersion, Service};
use crate::config::SenderConfig;
use crate::error::SenderError;
use crate::logger;
use crate::metrics::MetricsSnapshot;
use crate::queue::PayloadSenderHandle;
use crate::sender::PayloadSender;

pub const AGENT_NAME: &str = "rust";
const UNKNOWN_SERVICE: &str = "unknown-service";

pub struct AgentComponents {
    config: SenderConfig,
    service: Service,
    payload_sender: PayloadSender,
}

impl AgentComponents {
    /// Installs the agent log subscriber at `config.log_level` and starts a
    /// payload sender. Must be called from within a tokio runtime.
    pub fn new(config: SenderConfig) -> Result<Self, SenderError> {
        config.validate()?;
        logger::init(&config.log_level)?;
        let payload_sender = PayloadSender::start(&config)?;
        Ok(Self::with_payload_sender(config, payload_sender))
    }

    pub fn from_env() -> Result<Self, SenderError> {
        Self::new(SenderConfig::from_env()?)
    }

    /// Wires an already running sender, e.g. one built on a custom transport.
    pub fn with_payload_sender(config: SenderConfig, payload_sender: PayloadSender) -> Self {
        let service = default_service(&config);
        Self {
            config,
            service,
            payload_sender,
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn payload_sender(&self) -> PayloadSenderHandle {
        self.payload_sender.handle()
    }

    pub async fn shutdown(self) -> MetricsSnapshot {
        self.payload_sender.stop().await
    }
}

/// Service identity from configuration, falling back to the executable name.
pub fn default_service(config: &SenderConfig) -> Service {
    let name = config
        .service_name
        .clone()
        .or_else(executable_name)
        .map(|name| sanitize_service_name(&name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_SERVICE.to_string());

    Service {
        name,
        version: config.service_version.clone(),
        environment: config.environment.clone(),
        agent: AgentInfo {
            name: AGENT_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        language: Some(NameVersion {
            name: "Rust".to_string(),
            version: None,
        }),
        framework: None,
        runtime: None,
    }
}

/// The collector only accepts `[a-zA-Z0-9 _-]` in service names; anything
/// else becomes `_`.
pub fn sanitize_service_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn executable_name() -> Option<String> {
    let exe = env::current_exe().ok()?;
    Path::new(&exe)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}
