//! JSON-lines output on stdout. Logs go to stderr so the two never mix.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::domain::{DomainEvent, SinkError};
use cadence_core::ports::{Clock, EventSink};
use serde::Serialize;
use serde_json::json;

/// Writes one JSON object per line to stdout.
pub fn emit_line(value: &impl Serialize) -> anyhow::Result<()> {
    let line = serde_json::to_string(value)?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "{line}")?;
    Ok(())
}

/// Prints every domain event stamped with the simulated instant.
pub struct JsonLinesEventSink {
    clock: Arc<dyn Clock>,
}

impl JsonLinesEventSink {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl EventSink for JsonLinesEventSink {
    async fn emit(&self, event: &DomainEvent) -> Result<(), SinkError> {
        let line = json!({ "at": self.clock.now(), "event": event });
        emit_line(&line).map_err(|e| SinkError(e.to_string()))
    }
}
