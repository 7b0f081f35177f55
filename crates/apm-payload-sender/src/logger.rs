// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log output for the agent.
//!
//! Lines are tagged with `APM_AGENT` so they can be told apart from the host
//! application's own logs.
//!
//! # Format
//!
//! ```text
//! APM_AGENT | LEVEL | [span{fields}: ...] message {event_fields}
//! ```
//!
//! Active spans are written outermost first, each followed by `: `. A span
//! without recorded fields is written by name only. The dispatcher runs in
//! `payload_dispatcher`, so its lines read:
//!
//! ```text
//! APM_AGENT | WARN | payload_dispatcher: Failed sending error err-42 kind=error identifier="err-42"
//! APM_AGENT | DEBUG | payload_dispatcher: Collector returned 503 Service Unavailable for transaction checkout, retrying in 100 ms status=503 attempt=1
//! ```

use std::fmt;
use tracing::debug;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{FormatEvent, FormatFields, Writer},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::normalize_log_level;
use crate::error::SenderError;

const LINE_PREFIX: &str = "APM_AGENT";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl Formatter {
    fn write_span_context<S, N>(ctx: &FmtContext<'_, S, N>, writer: &mut Writer<'_>) -> fmt::Result
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
        N: for<'a> FormatFields<'a> + 'static,
    {
        let Some(scope) = ctx.event_scope() else {
            return Ok(());
        };

        for span in scope.from_root() {
            let extensions = span.extensions();
            match extensions.get::<FormattedFields<N>>() {
                Some(fields) if !fields.is_empty() => {
                    write!(writer, "{}{{{fields}}}: ", span.name())?
                }
                _ => write!(writer, "{}: ", span.name())?,
            }
        }
        Ok(())
    }
}

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{LINE_PREFIX} | {} | ", event.metadata().level())?;
        Self::write_span_context(ctx, &mut writer)?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the global subscriber at `log_level`.
///
/// HTTP client internals are silenced regardless of level. When the host
/// application already installed a global subscriber, that one is kept and
/// this is a no-op.
pub fn init(log_level: &str) -> Result<(), SenderError> {
    let level = normalize_log_level(log_level)
        .ok_or_else(|| SenderError::InvalidConfig(format!("Invalid log level '{log_level}'")))?;
    let env_filter = EnvFilter::try_new(format!("h2=off,hyper=off,rustls=off,{level}"))
        .map_err(|e| SenderError::Logging(e.to_string()))?;

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .event_format(Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        debug!("Keeping the existing log subscriber: {e}");
    }
    Ok(())
}
