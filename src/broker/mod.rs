//! Durable queue client.
//!
//! A [`QueueTransport`] moves raw message strings; [`Publisher`] and
//! [`Consumer`] layer the envelope format, queue declaration, bounded
//! in-flight concurrency and the acknowledgement discipline on top of it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

mod consumer;
mod memory;
mod publisher;
mod redis_transport;

pub use consumer::{Consumer, HandlerError, MessageHandler, ShutdownSignal};
pub use memory::MemoryTransport;
pub use publisher::Publisher;
pub use redis_transport::RedisTransport;

/// Wire format of every queued message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub queue: String,
    pub published_at: DateTime<Utc>,
    pub payload: Value,
}

impl Envelope {
    pub fn new(queue: &str, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue: queue.to_string(),
            published_at: Utc::now(),
            payload,
        }
    }
}

/// Raw durable-queue operations.
///
/// Messages are opaque strings here. A fetched message stays parked on the
/// consumer's processing list until [`QueueTransport::ack`] removes it, so
/// a crash between fetch and ack leads to redelivery rather than loss.
#[async_trait]
pub trait QueueTransport: Send + Sync + 'static {
    /// Ensure the queue exists. Idempotent.
    async fn declare(&self, queue: &str) -> Result<(), BrokerError>;

    /// Append a message to the tail of the queue.
    async fn push(&self, queue: &str, message: String) -> Result<(), BrokerError>;

    /// Move the oldest message onto `consumer`'s processing list, waiting up
    /// to `wait` for one to arrive.
    async fn fetch(
        &self,
        queue: &str,
        consumer: &str,
        wait: Duration,
    ) -> Result<Option<String>, BrokerError>;

    /// Remove a fetched message from `consumer`'s processing list.
    async fn ack(&self, queue: &str, consumer: &str, message: &str) -> Result<(), BrokerError>;

    /// Return everything left on `consumer`'s processing list to the front
    /// of the queue. Returns the number of messages requeued.
    async fn recover(&self, queue: &str, consumer: &str) -> Result<usize, BrokerError>;

    /// Messages waiting for delivery.
    async fn depth(&self, queue: &str) -> Result<u64, BrokerError>;

    async fn ping(&self) -> Result<(), BrokerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Broker connection lost: {0}")]
    Disconnected(String),
}

impl BrokerError {
    /// Whether the failure came from the connection rather than the request,
    /// i.e. whether retrying on a fresh connection can help.
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            Self::Disconnected(_) => true,
            Self::Serialize(_) => false,
        }
    }
}
