//! EventSink port - 通知の送出
//!
//! Delivery is best-effort: the engine logs a failed `emit` and moves on,
//! because the state change behind the event is already persisted.

use async_trait::async_trait;

use crate::domain::errors::SinkError;
use crate::domain::events::DomainEvent;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &DomainEvent) -> Result<(), SinkError>;
}
